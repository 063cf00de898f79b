use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::EngineError;
use crate::model::{KeyKind, MatchKind, RecordKind, RiskLevel};
use crate::normalize::{IdScheme, MinKeyLengths, Normalizer, StopWords};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// Collapse repeated listings (same kind, name and address) before indexing.
    pub dedupe: bool,
    /// Formation dates after this day add points.
    pub fraud_surge_cutoff: Option<NaiveDate>,
    pub burst_window_days: u32,
    pub burst_min_count: usize,
    /// Bursts at least this large score as large.
    pub burst_large_count: usize,
    /// Capacity above `estimate × factor` is flagged.
    pub capacity_factor: f64,
    /// Distinct addresses an owner must span to be flagged.
    pub owner_address_spread: usize,
    pub min_group_size: GroupSizes,
    pub min_key_length: MinKeyLengths,
    pub score_thresholds: ScoreThresholds,
    pub volume_tiers: VolumeTiers,
    pub rule_weights: RuleWeights,
    pub kinds: BTreeMap<RecordKind, KindConfig>,
    pub cross_refs: Vec<CrossRefConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "ringscan".into(),
            dedupe: false,
            fraud_surge_cutoff: None,
            burst_window_days: 90,
            burst_min_count: 3,
            burst_large_count: 10,
            capacity_factor: 2.0,
            owner_address_spread: 3,
            min_group_size: GroupSizes::default(),
            min_key_length: MinKeyLengths::default(),
            score_thresholds: ScoreThresholds::default(),
            volume_tiers: VolumeTiers::default(),
            rule_weights: RuleWeights::default(),
            kinds: BTreeMap::new(),
            cross_refs: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Minimum members for a shared key to become a group, per key kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GroupSizes {
    pub name: usize,
    pub address: usize,
    pub phone: usize,
    pub owner: usize,
    pub identifier: usize,
}

impl Default for GroupSizes {
    fn default() -> Self {
        Self {
            name: 2,
            address: 2,
            phone: 2,
            owner: 2,
            identifier: 2,
        }
    }
}

impl GroupSizes {
    pub fn get(&self, kind: KeyKind) -> usize {
        match kind {
            KeyKind::Name => self.name,
            KeyKind::Address => self.address,
            KeyKind::Phone => self.phone,
            KeyKind::Owner => self.owner,
            KeyKind::Identifier => self.identifier,
        }
    }
}

/// Upper bounds (exclusive) of the low, moderate and high levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            low: 20,
            medium: 50,
            high: 80,
        }
    }
}

impl ScoreThresholds {
    pub fn level(&self, score: u32) -> RiskLevel {
        if score < self.low {
            RiskLevel::Low
        } else if score < self.medium {
            RiskLevel::Moderate
        } else if score < self.high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Group sizes at which the volume rule steps up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VolumeTiers {
    pub high: usize,
    pub very_high: usize,
}

impl Default for VolumeTiers {
    fn default() -> Self {
        Self {
            high: 10,
            very_high: 20,
        }
    }
}

/// Points each rule adds when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuleWeights {
    pub volume_shared: u32,
    pub volume_high: u32,
    pub volume_very_high: u32,
    pub multi_owner_address: u32,
    pub shared_phone: u32,
    pub owner_spread: u32,
    pub multi_state_owner: u32,
    pub cross_program_per_domain: u32,
    pub multi_program_bonus: u32,
    pub rapid_formation: u32,
    pub rapid_formation_large: u32,
    pub inactive_status: u32,
    pub post_cutoff_formation: u32,
    pub over_capacity: u32,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            volume_shared: 5,
            volume_high: 15,
            volume_very_high: 25,
            multi_owner_address: 20,
            shared_phone: 10,
            owner_spread: 10,
            multi_state_owner: 10,
            cross_program_per_domain: 15,
            multi_program_bonus: 25,
            rapid_formation: 15,
            rapid_formation_large: 25,
            inactive_status: 10,
            post_cutoff_formation: 5,
            over_capacity: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind adapter
// ---------------------------------------------------------------------------

/// Dataset-specific knobs for one record kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    /// Replaces the default name stop-list when set.
    pub stop_words: Option<Vec<String>>,
    /// Only owners whose `party_type` contains this text feed burst detection.
    pub agent_party_pattern: Option<String>,
    pub bursts: bool,
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            stop_words: None,
            agent_party_pattern: None,
            bursts: true,
        }
    }
}

impl KindConfig {
    /// Built-in adapter used when a kind has no `[kinds.*]` table.
    pub fn default_for(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Business => Self {
                agent_party_pattern: Some("agent".into()),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cross references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CrossRefConfig {
    pub source: RecordKind,
    pub target: RecordKind,
    #[serde(default = "default_match_keys")]
    pub keys: Vec<MatchKind>,
}

fn default_match_keys() -> Vec<MatchKind> {
    MatchKind::ALL.to_vec()
}

// ---------------------------------------------------------------------------
// Scoring view
// ---------------------------------------------------------------------------

/// The slice of configuration the risk scorer reads.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub thresholds: ScoreThresholds,
    pub weights: RuleWeights,
    pub volume_tiers: VolumeTiers,
    pub min_group_size: GroupSizes,
    pub burst_large_count: usize,
    pub fraud_surge_cutoff: Option<NaiveDate>,
    pub capacity_factor: f64,
    pub owner_address_spread: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        EngineConfig::default().scoring()
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let t = &self.score_thresholds;
        if t.low == 0 || t.low >= t.medium || t.medium >= t.high {
            return Err(EngineError::ConfigValidation(format!(
                "score_thresholds must be positive and strictly increasing, got low={} medium={} high={}",
                t.low, t.medium, t.high
            )));
        }

        for kind in [KeyKind::Name, KeyKind::Address, KeyKind::Phone, KeyKind::Owner, KeyKind::Identifier] {
            let size = self.min_group_size.get(kind);
            if size < 2 {
                return Err(EngineError::ConfigValidation(format!(
                    "min_group_size.{kind} must be at least 2, got {size}"
                )));
            }
        }

        if self.burst_window_days == 0 {
            return Err(EngineError::ConfigValidation(
                "burst_window_days must be at least 1".into(),
            ));
        }
        if self.burst_min_count < 2 {
            return Err(EngineError::ConfigValidation(format!(
                "burst_min_count must be at least 2, got {}",
                self.burst_min_count
            )));
        }
        if self.burst_large_count < self.burst_min_count {
            return Err(EngineError::ConfigValidation(format!(
                "burst_large_count ({}) must not be below burst_min_count ({})",
                self.burst_large_count, self.burst_min_count
            )));
        }

        let v = &self.volume_tiers;
        if v.high >= v.very_high {
            return Err(EngineError::ConfigValidation(format!(
                "volume_tiers must be strictly increasing, got high={} very_high={}",
                v.high, v.very_high
            )));
        }

        let w = &self.rule_weights;
        if w.volume_shared > w.volume_high || w.volume_high > w.volume_very_high {
            return Err(EngineError::ConfigValidation(format!(
                "rule_weights for volume tiers must not decrease, got volume_shared={} volume_high={} volume_very_high={}",
                w.volume_shared, w.volume_high, w.volume_very_high
            )));
        }
        if w.rapid_formation > w.rapid_formation_large {
            return Err(EngineError::ConfigValidation(format!(
                "rule_weights.rapid_formation ({}) must not exceed rapid_formation_large ({})",
                w.rapid_formation, w.rapid_formation_large
            )));
        }

        if !(self.capacity_factor > 0.0) {
            return Err(EngineError::ConfigValidation(format!(
                "capacity_factor must be positive, got {}",
                self.capacity_factor
            )));
        }
        if self.owner_address_spread < 2 {
            return Err(EngineError::ConfigValidation(format!(
                "owner_address_spread must be at least 2, got {}",
                self.owner_address_spread
            )));
        }

        for (i, xref) in self.cross_refs.iter().enumerate() {
            if xref.source == xref.target {
                return Err(EngineError::ConfigValidation(format!(
                    "cross_refs[{i}]: source and target are both '{}'",
                    xref.source
                )));
            }
            if xref.keys.is_empty() {
                return Err(EngineError::ConfigValidation(format!(
                    "cross_refs[{i}] ({} -> {}): keys must not be empty",
                    xref.source, xref.target
                )));
            }
        }

        Ok(())
    }

    /// Adapter for `kind`, falling back to the built-in one.
    pub fn kind(&self, kind: RecordKind) -> KindConfig {
        self.kinds
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| KindConfig::default_for(kind))
    }

    fn stop_words_for(&self, kind: RecordKind) -> StopWords {
        match self.kind(kind).stop_words {
            Some(words) => StopWords::new(words),
            None => StopWords::default(),
        }
    }

    pub fn normalizer_for(&self, kind: RecordKind) -> Normalizer {
        Normalizer::new(self.stop_words_for(kind), IdScheme::for_kind(kind), self.min_key_length)
    }

    /// Normalizer shared by both sides of one cross reference. Names are
    /// stripped with the union of both kinds' stop-lists, so a word dropped
    /// on one side cannot block a match on the other.
    pub fn cross_ref_normalizer(&self, source: RecordKind, target: RecordKind) -> Normalizer {
        let stop_words = self.stop_words_for(source).union(&self.stop_words_for(target));
        Normalizer::new(stop_words, IdScheme::License, self.min_key_length)
    }

    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            thresholds: self.score_thresholds,
            weights: self.rule_weights,
            volume_tiers: self.volume_tiers,
            min_group_size: self.min_group_size,
            burst_large_count: self.burst_large_count,
            fraud_surge_cutoff: self.fraud_surge_cutoff,
            capacity_factor: self.capacity_factor,
            owner_address_spread: self.owner_address_spread,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "Statewide sweep"
fraud_surge_cutoff = "2020-03-01"
burst_window_days = 60
burst_min_count = 4
burst_large_count = 8

[min_group_size]
address = 3

[score_thresholds]
low = 10
medium = 40
high = 70

[rule_weights]
multi_owner_address = 30

[kinds.facility]
stop_words = ["daycare", "llc"]
bursts = false

[[cross_refs]]
source = "vehicle"
target = "facility"
keys = ["name", "owner"]

[[cross_refs]]
source = "provider"
target = "facility"
"#;

    #[test]
    fn parse_full() {
        let config = EngineConfig::from_toml(FULL).unwrap();
        assert_eq!(config.name, "Statewide sweep");
        assert_eq!(config.fraud_surge_cutoff.unwrap().to_string(), "2020-03-01");
        assert_eq!(config.burst_window_days, 60);
        assert_eq!(config.burst_min_count, 4);
        assert_eq!(config.min_group_size.address, 3);
        assert_eq!(config.min_group_size.name, 2);
        assert_eq!(config.score_thresholds.medium, 40);
        assert_eq!(config.rule_weights.multi_owner_address, 30);
        assert_eq!(config.rule_weights.shared_phone, 10);
        assert_eq!(config.cross_refs.len(), 2);
        assert_eq!(config.cross_refs[0].keys, vec![MatchKind::Name, MatchKind::Owner]);
        assert_eq!(config.cross_refs[1].keys, MatchKind::ALL.to_vec());

        let facility = config.kind(RecordKind::Facility);
        assert!(!facility.bursts);
        assert_eq!(facility.stop_words.unwrap(), vec!["daycare", "llc"]);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config.burst_window_days, 90);
        assert_eq!(config.burst_min_count, 3);
        assert_eq!(config.score_thresholds, ScoreThresholds::default());
        let business = config.kind(RecordKind::Business);
        assert_eq!(business.agent_party_pattern.as_deref(), Some("agent"));
        assert!(config.kind(RecordKind::Vehicle).agent_party_pattern.is_none());
    }

    #[test]
    fn kind_stop_words_reach_normalizer() {
        let config = EngineConfig::from_toml(FULL).unwrap();
        let n = config.normalizer_for(RecordKind::Facility);
        assert_eq!(n.normalize(KeyKind::Name, "Tiny Tots Daycare LLC"), "tiny tots");
        assert_eq!(n.normalize(KeyKind::Name, "Tiny Tots Inc"), "tiny tots inc");
    }

    #[test]
    fn levels_follow_thresholds() {
        let t = ScoreThresholds::default();
        assert_eq!(t.level(0), RiskLevel::Low);
        assert_eq!(t.level(19), RiskLevel::Low);
        assert_eq!(t.level(20), RiskLevel::Moderate);
        assert_eq!(t.level(49), RiskLevel::Moderate);
        assert_eq!(t.level(50), RiskLevel::High);
        assert_eq!(t.level(79), RiskLevel::High);
        assert_eq!(t.level(80), RiskLevel::Critical);
        assert_eq!(t.level(1000), RiskLevel::Critical);
    }

    #[test]
    fn reject_non_monotonic_thresholds() {
        let err = EngineConfig::from_toml("[score_thresholds]\nlow = 50\nmedium = 40\nhigh = 80\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("strictly increasing"), "{err}");

        let err = EngineConfig::from_toml("[score_thresholds]\nlow = 20\nmedium = 50\nhigh = 50\n")
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigValidation(_)));
    }

    #[test]
    fn reject_tiny_group_size() {
        let err = EngineConfig::from_toml("[min_group_size]\nphone = 1\n").unwrap_err();
        assert!(err.to_string().contains("min_group_size.phone"));
    }

    #[test]
    fn reject_bad_burst_settings() {
        assert!(EngineConfig::from_toml("burst_window_days = 0").is_err());
        assert!(EngineConfig::from_toml("burst_min_count = 1").is_err());
        let err = EngineConfig::from_toml("burst_min_count = 5\nburst_large_count = 4").unwrap_err();
        assert!(err.to_string().contains("burst_large_count"));
    }

    #[test]
    fn reject_decreasing_tier_weights() {
        let err = EngineConfig::from_toml("[rule_weights]\nvolume_shared = 30\nvolume_high = 1\n").unwrap_err();
        assert!(matches!(err, EngineError::ConfigValidation(_)));
        assert!(err.to_string().contains("volume_shared=30"), "{err}");

        let err = EngineConfig::from_toml("[rule_weights]\nvolume_very_high = 10\n").unwrap_err();
        assert!(err.to_string().contains("volume_very_high=10"), "{err}");

        let err = EngineConfig::from_toml("[rule_weights]\nrapid_formation = 40\n").unwrap_err();
        assert!(err.to_string().contains("rapid_formation_large"), "{err}");

        // Equal weights are fine.
        let config = EngineConfig::from_toml("[rule_weights]\nvolume_high = 25\nrapid_formation = 25\n").unwrap();
        assert_eq!(config.rule_weights.volume_high, config.rule_weights.volume_very_high);
    }

    #[test]
    fn huge_burst_window_is_accepted() {
        let config = EngineConfig::from_toml("burst_window_days = 4294967295").unwrap();
        assert_eq!(config.burst_window_days, u32::MAX);
    }

    #[test]
    fn cross_ref_normalizer_unions_stop_words() {
        let config = EngineConfig::from_toml(FULL).unwrap();
        let n = config.cross_ref_normalizer(RecordKind::Vehicle, RecordKind::Facility);
        assert_eq!(n.normalize(KeyKind::Name, "Tiny Tots Daycare"), "tiny tots");
        assert_eq!(n.normalize(KeyKind::Name, "Tiny Tots Inc"), "tiny tots");
        assert_eq!(
            config.cross_ref_normalizer(RecordKind::Facility, RecordKind::Vehicle),
            config.cross_ref_normalizer(RecordKind::Vehicle, RecordKind::Facility)
        );
    }

    #[test]
    fn reject_self_cross_ref() {
        let input = r#"
[[cross_refs]]
source = "facility"
target = "facility"
"#;
        let err = EngineConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("cross_refs[0]"));
    }

    #[test]
    fn reject_empty_cross_ref_keys() {
        let input = r#"
[[cross_refs]]
source = "vehicle"
target = "facility"
keys = []
"#;
        assert!(EngineConfig::from_toml(input).is_err());
    }

    #[test]
    fn reject_unknown_record_kind() {
        let input = r#"
[[cross_refs]]
source = "boat"
target = "facility"
"#;
        let err = EngineConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }
}
