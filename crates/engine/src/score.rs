//! Rule-based risk scoring.
//!
//! Each rule looks at one record plus the groups, bursts and cross matches
//! the caller resolved for it, and may emit one flag carrying points. Rules
//! are independent and additive: no rule suppresses another, and each fires
//! at most once per record. A rule whose context is missing stays silent.

use std::collections::BTreeSet;

use crate::burst::parse_timestamp;
use crate::config::ScoringConfig;
use crate::model::{
    BurstWindow, CrossMatch, Flag, FlagKind, Group, KeyKind, Record, RecordKind, RiskAssessment,
    Severity,
};
use crate::normalize::canonical_status;

/// Everything known about one record beyond its own fields.
#[derive(Debug, Clone, Default)]
pub struct RiskContext<'a> {
    pub groups: Vec<&'a Group<'a>>,
    pub bursts: Vec<&'a BurstWindow<'a>>,
    pub cross_matches: Vec<&'a CrossMatch<'a>>,
}

impl<'a> RiskContext<'a> {
    pub fn groups_of(&self, kind: KeyKind) -> impl Iterator<Item = &'a Group<'a>> + '_ {
        self.groups.iter().copied().filter(move |g| g.key_kind == kind)
    }
}

pub trait Rule {
    fn name(&self) -> &'static str;

    fn evaluate(&self, record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag>;
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct RiskScorer {
    config: ScoringConfig,
    rules: Vec<Box<dyn Rule>>,
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            rules: default_rules(),
        }
    }

    /// Append a rule after the built-in ones.
    pub fn with_rule(mut self, rule: Box<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn score(&self, record: &Record, ctx: &RiskContext<'_>) -> RiskAssessment {
        let mut flags: Vec<Flag> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evaluate(record, ctx, &self.config))
            .collect();

        let score = flags.iter().fold(0u32, |acc, f| acc.saturating_add(f.points));
        // Stable: equal severities keep rule order.
        flags.sort_by(|a, b| b.severity.cmp(&a.severity));

        RiskAssessment {
            record_id: record.id.clone(),
            record_kind: record.kind,
            score,
            level: self.config.thresholds.level(score),
            flags,
        }
    }
}

pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(VolumeRule),
        Box::new(MultiOwnerAddressRule),
        Box::new(SharedPhoneRule),
        Box::new(OwnerSpreadRule),
        Box::new(MultiStateOwnerRule),
        Box::new(CrossProgramRule),
        Box::new(MultiProgramRule),
        Box::new(RapidFormationRule),
        Box::new(InactiveStatusRule),
        Box::new(PostCutoffFormationRule),
        Box::new(OverCapacityRule),
    ]
}

fn flag(kind: FlagKind, severity: Severity, points: u32, detail: String) -> Option<Flag> {
    Some(Flag {
        kind,
        severity,
        points,
        detail,
    })
}

// ---------------------------------------------------------------------------
// Group rules
// ---------------------------------------------------------------------------

/// Tiered on the largest group the record belongs to. Tiers are coarse on
/// purpose: every size inside a tier scores the same.
pub struct VolumeRule;

impl Rule for VolumeRule {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn evaluate(&self, _record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let group = ctx.groups.iter().copied().max_by(|a, b| {
            a.member_count
                .cmp(&b.member_count)
                .then_with(|| b.key_kind.cmp(&a.key_kind))
                .then_with(|| b.key.cmp(&a.key))
        })?;

        let n = group.member_count;
        let w = &config.weights;
        let detail = format!("{n} records share {} '{}'", group.key_kind, group.key);
        if n >= config.volume_tiers.very_high {
            flag(FlagKind::VeryHighVolume, Severity::High, w.volume_very_high, detail)
        } else if n >= config.volume_tiers.high {
            flag(FlagKind::HighVolume, Severity::Moderate, w.volume_high, detail)
        } else if n >= config.min_group_size.get(group.key_kind) {
            flag(FlagKind::SharedAttribute, Severity::Low, w.volume_shared, detail)
        } else {
            None
        }
    }
}

/// Several distinct owners at one address. One owner holding several
/// licenses at the same address never fires.
pub struct MultiOwnerAddressRule;

impl Rule for MultiOwnerAddressRule {
    fn name(&self) -> &'static str {
        "multi_owner_address"
    }

    fn evaluate(&self, _record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let group = ctx
            .groups_of(KeyKind::Address)
            .filter(|g| g.distinct_owners > 1)
            .max_by(|a, b| a.distinct_owners.cmp(&b.distinct_owners).then_with(|| b.key.cmp(&a.key)))?;
        flag(
            FlagKind::MultiOwnerAddress,
            Severity::High,
            config.weights.multi_owner_address,
            format!(
                "{} distinct owners across {} records at '{}'",
                group.distinct_owners, group.member_count, group.key
            ),
        )
    }
}

pub struct SharedPhoneRule;

impl Rule for SharedPhoneRule {
    fn name(&self) -> &'static str {
        "shared_phone"
    }

    fn evaluate(&self, _record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let group = ctx
            .groups_of(KeyKind::Phone)
            .max_by(|a, b| a.member_count.cmp(&b.member_count).then_with(|| b.key.cmp(&a.key)))?;
        flag(
            FlagKind::SharedPhone,
            Severity::Moderate,
            config.weights.shared_phone,
            format!("{} records share phone {}", group.member_count, group.key),
        )
    }
}

pub struct OwnerSpreadRule;

impl Rule for OwnerSpreadRule {
    fn name(&self) -> &'static str {
        "owner_spread"
    }

    fn evaluate(&self, _record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let group = ctx
            .groups_of(KeyKind::Owner)
            .filter(|g| g.distinct_addresses >= config.owner_address_spread)
            .max_by(|a, b| a.distinct_addresses.cmp(&b.distinct_addresses).then_with(|| b.key.cmp(&a.key)))?;
        flag(
            FlagKind::OwnerMultiAddress,
            Severity::Moderate,
            config.weights.owner_spread,
            format!("owner '{}' linked to {} addresses", group.key, group.distinct_addresses),
        )
    }
}

pub struct MultiStateOwnerRule;

impl Rule for MultiStateOwnerRule {
    fn name(&self) -> &'static str {
        "multi_state_owner"
    }

    fn evaluate(&self, _record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let group = ctx
            .groups_of(KeyKind::Owner)
            .filter(|g| g.distinct_states >= 2)
            .max_by(|a, b| a.distinct_states.cmp(&b.distinct_states).then_with(|| b.key.cmp(&a.key)))?;
        flag(
            FlagKind::MultiStateOwner,
            Severity::Moderate,
            config.weights.multi_state_owner,
            format!("owner '{}' active in {} states", group.key, group.distinct_states),
        )
    }
}

// ---------------------------------------------------------------------------
// Cross-program rules
// ---------------------------------------------------------------------------

/// Programs other than the record's own that it is linked into, whether the
/// record was the source or a target of the match.
fn linked_programs(record: &Record, ctx: &RiskContext<'_>) -> BTreeSet<RecordKind> {
    ctx.cross_matches
        .iter()
        .map(|m| {
            if m.source.sort_key() == record.sort_key() {
                m.target_kind
            } else {
                m.source_kind
            }
        })
        .filter(|k| *k != record.kind)
        .collect()
}

fn program_list(kinds: &BTreeSet<RecordKind>) -> String {
    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

pub struct CrossProgramRule;

impl Rule for CrossProgramRule {
    fn name(&self) -> &'static str {
        "cross_program"
    }

    fn evaluate(&self, record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let programs = linked_programs(record, ctx);
        if programs.is_empty() {
            return None;
        }
        let points = config
            .weights
            .cross_program_per_domain
            .saturating_mul(programs.len() as u32);
        flag(
            FlagKind::CrossProgramLink,
            Severity::High,
            points,
            format!("linked to {} records", program_list(&programs)),
        )
    }
}

pub struct MultiProgramRule;

impl Rule for MultiProgramRule {
    fn name(&self) -> &'static str {
        "multi_program"
    }

    fn evaluate(&self, record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let programs = linked_programs(record, ctx);
        if programs.len() < 2 {
            return None;
        }
        flag(
            FlagKind::MultiProgramNetwork,
            Severity::Critical,
            config.weights.multi_program_bonus,
            format!("network spans {} programs: {}", programs.len(), program_list(&programs)),
        )
    }
}

// ---------------------------------------------------------------------------
// Temporal + lifecycle rules
// ---------------------------------------------------------------------------

pub struct RapidFormationRule;

impl Rule for RapidFormationRule {
    fn name(&self) -> &'static str {
        "rapid_formation"
    }

    fn evaluate(&self, _record: &Record, ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let burst = ctx.bursts.iter().copied().max_by(|a, b| {
            a.count
                .cmp(&b.count)
                .then_with(|| b.start.cmp(&a.start))
                .then_with(|| b.key.cmp(&a.key))
        })?;
        let detail = format!(
            "{} filings by '{}' within {} days ({} to {})",
            burst.count, burst.key, burst.span_days, burst.start, burst.end
        );
        if burst.count >= config.burst_large_count {
            flag(FlagKind::RapidFormation, Severity::High, config.weights.rapid_formation_large, detail)
        } else {
            flag(FlagKind::RapidFormation, Severity::Moderate, config.weights.rapid_formation, detail)
        }
    }
}

pub struct InactiveStatusRule;

impl Rule for InactiveStatusRule {
    fn name(&self) -> &'static str {
        "inactive_status"
    }

    fn evaluate(&self, record: &Record, _ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        if !canonical_status(&record.status).is_non_active() {
            return None;
        }
        flag(
            FlagKind::InactiveStatus,
            Severity::Moderate,
            config.weights.inactive_status,
            format!("status '{}'", record.status.trim()),
        )
    }
}

pub struct PostCutoffFormationRule;

impl Rule for PostCutoffFormationRule {
    fn name(&self) -> &'static str {
        "post_cutoff_formation"
    }

    fn evaluate(&self, record: &Record, _ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let cutoff = config.fraud_surge_cutoff?;
        let formed = parse_timestamp(&record.timestamp)?;
        if formed <= cutoff {
            return None;
        }
        flag(
            FlagKind::PostCutoffFormation,
            Severity::Low,
            config.weights.post_cutoff_formation,
            format!("formed {formed}, after {cutoff}"),
        )
    }
}

/// Typical licensed capacity for a facility program type.
pub fn estimate_capacity(facility_type: &str) -> u32 {
    let t = facility_type.trim().to_lowercase();
    if t.contains("center") {
        75
    } else if t.contains("family") && t.contains("group") {
        14
    } else if t.contains("family") {
        12
    } else if t.contains("school") || t.contains("age") {
        50
    } else if t.contains("head start") {
        if t.contains("early") {
            20
        } else {
            60
        }
    } else {
        25
    }
}

pub struct OverCapacityRule;

impl Rule for OverCapacityRule {
    fn name(&self) -> &'static str {
        "over_capacity"
    }

    fn evaluate(&self, record: &Record, _ctx: &RiskContext<'_>, config: &ScoringConfig) -> Option<Flag> {
        let capacity = record.capacity?;
        let typical = estimate_capacity(&record.facility_type);
        let limit = typical as f64 * config.capacity_factor;
        if (capacity as f64) <= limit {
            return None;
        }
        flag(
            FlagKind::OverCapacity,
            Severity::Moderate,
            config.weights.over_capacity,
            format!("capacity {capacity} vs typical {typical} for '{}'", record.facility_type.trim()),
        )
    }
}
