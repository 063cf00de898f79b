use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::burst::detect_group_bursts;
use crate::config::{EngineConfig, KindConfig};
use crate::crossref::{cross_match, TargetIndex};
use crate::error::EngineError;
use crate::index::build_index;
use crate::model::{BurstWindow, CrossMatch, Group, KeyKind, Record, RecordKind, RiskAssessment, RiskLevel};
use crate::network::build_groups;
use crate::normalize::{dedupe_records, Normalizer};
use crate::score::{RiskContext, RiskScorer, Rule};
use crate::summary::{compute_summary, ReportSummary};

type RecordRef<'a> = (RecordKind, &'a str);

/// Validated configuration plus the scorer built from it.
pub struct Engine {
    config: EngineConfig,
    scorer: RiskScorer,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub config_name: String,
    pub engine_version: String,
    /// Records received, before deduplication.
    pub record_count: usize,
}

/// Everything one analysis run produced. Borrows the input records.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub meta: ReportMeta,
    pub summary: ReportSummary,
    pub groups: Vec<Group<'a>>,
    pub bursts: Vec<BurstWindow<'a>>,
    pub cross_matches: Vec<CrossMatch<'a>>,
    /// Ordered by (kind, id).
    pub assessments: Vec<RiskAssessment>,
}

impl Report<'_> {
    /// Presentation order: score descending, then kind, then id.
    pub fn ranked(&self) -> Vec<&RiskAssessment> {
        let mut ranked: Vec<&RiskAssessment> = self.assessments.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.record_kind.cmp(&b.record_kind))
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        ranked
    }

    pub fn highest_level(&self) -> Option<RiskLevel> {
        self.assessments.iter().map(|a| a.level).max()
    }

    pub fn assessment(&self, kind: RecordKind, id: &str) -> Option<&RiskAssessment> {
        self.assessments
            .binary_search_by(|a| (a.record_kind, a.record_id.as_str()).cmp(&(kind, id)))
            .ok()
            .map(|i| &self.assessments[i])
    }
}

/// Validate `config` and analyze `records` in one call.
pub fn run<'a>(config: &EngineConfig, records: &'a [Record]) -> Result<Report<'a>, EngineError> {
    Ok(Engine::new(config.clone())?.analyze(records))
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let scorer = RiskScorer::new(config.scoring());
        Ok(Self { config, scorer })
    }

    /// Register an extra scoring rule after the built-in ones.
    pub fn with_rule(mut self, rule: Box<dyn Rule>) -> Self {
        self.scorer = self.scorer.with_rule(rule);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analyze<'a>(&self, records: &'a [Record]) -> Report<'a> {
        let partitions = self.partition(records);

        let mut groups: Vec<Group<'a>> = Vec::new();
        let mut bursts: Vec<BurstWindow<'a>> = Vec::new();

        for (&kind, members) in &partitions {
            let normalizer = self.config.normalizer_for(kind);
            let before = groups.len();
            for key_kind in KeyKind::GROUPED {
                let index = build_index(members.iter().copied(), key_kind, &normalizer);
                groups.extend(build_groups(
                    &index,
                    self.config.min_group_size.get(key_kind),
                    &normalizer,
                ));
            }
            debug!("{kind}: {} records, {} groups", members.len(), groups.len() - before);

            let adapter = self.config.kind(kind);
            if adapter.bursts {
                let found = self.kind_bursts(members, &adapter, &normalizer);
                debug!("{kind}: {} bursts", found.len());
                bursts.extend(found);
            }
        }

        groups.sort_by(|a, b| {
            b.member_count
                .cmp(&a.member_count)
                .then_with(|| a.key.cmp(&b.key))
                .then_with(|| a.record_kind.cmp(&b.record_kind))
                .then_with(|| a.key_kind.cmp(&b.key_kind))
        });
        bursts.sort_by(|a, b| {
            (a.record_kind, a.key.as_str(), a.start).cmp(&(b.record_kind, b.key.as_str(), b.start))
        });

        let cross_matches = self.cross_reference(&partitions);

        let assessments = self.score_all(&partitions, &groups, &bursts, &cross_matches);
        let summary = compute_summary(&groups, &bursts, &cross_matches, &assessments);

        info!(
            "{}: scored {} of {} records, {} groups, {} bursts, {} cross matches",
            self.config.name,
            assessments.len(),
            records.len(),
            groups.len(),
            bursts.len(),
            cross_matches.len()
        );

        Report {
            meta: ReportMeta {
                config_name: self.config.name.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                record_count: records.len(),
            },
            summary,
            groups,
            bursts,
            cross_matches,
            assessments,
        }
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    /// Records per kind, sorted by id, optionally deduplicated.
    fn partition<'a>(&self, records: &'a [Record]) -> BTreeMap<RecordKind, Vec<&'a Record>> {
        let mut partitions: BTreeMap<RecordKind, Vec<&'a Record>> = BTreeMap::new();
        for record in records {
            partitions.entry(record.kind).or_default().push(record);
        }

        for (kind, members) in partitions.iter_mut() {
            members.sort_by(|a, b| a.total_cmp(b));
            if self.config.dedupe {
                let normalizer = self.config.normalizer_for(*kind);
                let kept = dedupe_records(members, &normalizer);
                if kept.len() < members.len() {
                    debug!("{kind}: dedupe dropped {} records", members.len() - kept.len());
                }
                *members = kept;
            }
        }
        partitions
    }

    /// Owner clusters among filing parties that match the kind's agent
    /// pattern, swept for formation bursts.
    fn kind_bursts<'a>(
        &self,
        members: &[&'a Record],
        adapter: &KindConfig,
        normalizer: &Normalizer,
    ) -> Vec<BurstWindow<'a>> {
        let pattern = adapter
            .agent_party_pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_lowercase);

        let filers = members.iter().copied().filter(|r| match &pattern {
            Some(p) => r.party_type.to_lowercase().contains(p.as_str()),
            None => true,
        });

        let index = build_index(filers, KeyKind::Owner, normalizer);
        let clusters = build_groups(&index, self.config.burst_min_count, normalizer);
        clusters
            .iter()
            .flat_map(|g| {
                detect_group_bursts(g, self.config.burst_window_days, self.config.burst_min_count)
            })
            .collect()
    }

    fn cross_reference<'a>(
        &self,
        partitions: &BTreeMap<RecordKind, Vec<&'a Record>>,
    ) -> Vec<CrossMatch<'a>> {
        let empty: Vec<&'a Record> = Vec::new();
        let mut matches = Vec::new();

        for xref in &self.config.cross_refs {
            let sources = partitions.get(&xref.source).unwrap_or(&empty);
            let targets = partitions.get(&xref.target).unwrap_or(&empty);
            if sources.is_empty() || targets.is_empty() {
                debug!("cross ref {} -> {}: nothing to match", xref.source, xref.target);
                continue;
            }
            let normalizer = self.config.cross_ref_normalizer(xref.source, xref.target);
            let index = TargetIndex::build(targets.iter().copied(), &normalizer);
            let found = cross_match(sources, &index, &normalizer, &xref.keys);
            debug!("cross ref {} -> {}: {} matches", xref.source, xref.target, found.len());
            matches.extend(found);
        }
        matches
    }

    fn score_all<'a>(
        &self,
        partitions: &BTreeMap<RecordKind, Vec<&'a Record>>,
        groups: &[Group<'a>],
        bursts: &[BurstWindow<'a>],
        cross_matches: &[CrossMatch<'a>],
    ) -> Vec<RiskAssessment> {
        let mut group_ix: BTreeMap<RecordRef<'a>, Vec<usize>> = BTreeMap::new();
        for (i, g) in groups.iter().enumerate() {
            for &m in &g.members {
                group_ix.entry(m.sort_key()).or_default().push(i);
            }
        }

        let mut burst_ix: BTreeMap<RecordRef<'a>, Vec<usize>> = BTreeMap::new();
        for (i, b) in bursts.iter().enumerate() {
            for &m in &b.members {
                burst_ix.entry(m.sort_key()).or_default().push(i);
            }
        }

        // Both ends of a link see the match.
        let mut match_ix: BTreeMap<RecordRef<'a>, Vec<usize>> = BTreeMap::new();
        for (i, m) in cross_matches.iter().enumerate() {
            let source: &'a Record = m.source;
            match_ix.entry(source.sort_key()).or_default().push(i);
            for hit in &m.hits {
                let target: &'a Record = hit.target;
                let slot = match_ix.entry(target.sort_key()).or_default();
                if slot.last() != Some(&i) {
                    slot.push(i);
                }
            }
        }

        partitions
            .values()
            .flatten()
            .map(|&record| {
                let key = record.sort_key();
                let ctx = RiskContext {
                    groups: lookup(&group_ix, &key, groups),
                    bursts: lookup(&burst_ix, &key, bursts),
                    cross_matches: lookup(&match_ix, &key, cross_matches),
                };
                self.scorer.score(record, &ctx)
            })
            .collect()
    }
}

fn lookup<'c, 'k, T>(
    ix: &BTreeMap<RecordRef<'k>, Vec<usize>>,
    key: &RecordRef<'k>,
    items: &'c [T],
) -> Vec<&'c T> {
    ix.get(key)
        .map(|positions| positions.iter().map(|&i| &items[i]).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrossRefConfig;
    use crate::model::{FlagKind, MatchKind};

    fn facility(id: &str, address: &str, owner: &str) -> Record {
        let mut r = Record::new(RecordKind::Facility, id);
        r.name = format!("Little Stars {id}");
        r.address = address.into();
        r.owner = owner.into();
        r
    }

    #[test]
    fn invalid_config_fails_fast() {
        let config = EngineConfig {
            burst_window_days: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(Engine::new(config), Err(EngineError::ConfigValidation(_))));
    }

    #[test]
    fn empty_input_yields_empty_report() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let report = engine.analyze(&[]);
        assert!(report.groups.is_empty());
        assert!(report.assessments.is_empty());
        assert_eq!(report.highest_level(), None);
        assert_eq!(report.meta.record_count, 0);
    }

    #[test]
    fn every_record_is_assessed_in_id_order() {
        let records = vec![
            facility("F-3", "1 Oak Ave", ""),
            facility("F-1", "100 Main St", "Ann Lee"),
            facility("F-2", "100 Main Street", "Bob Roe"),
        ];
        let report = Engine::new(EngineConfig::default()).unwrap().analyze(&records);
        let ids: Vec<&str> = report.assessments.iter().map(|a| a.record_id.as_str()).collect();
        assert_eq!(ids, vec!["F-1", "F-2", "F-3"]);

        let f1 = report.assessment(RecordKind::Facility, "F-1").unwrap();
        assert!(f1.flags.iter().any(|f| f.kind == FlagKind::MultiOwnerAddress));
        assert_eq!(report.assessment(RecordKind::Facility, "F-3").unwrap().score, 0);
        assert_eq!(report.ranked()[2].record_id, "F-3");
    }

    #[test]
    fn dedupe_collapses_repeated_listings() {
        let records = vec![
            facility("F-1", "100 Main St", "Ann Lee"),
            facility("F-1", "100 Main St", "Ann Lee"),
        ];
        let mut config = EngineConfig::default();
        let plain = Engine::new(config.clone()).unwrap().analyze(&records);
        assert_eq!(plain.assessments.len(), 2);

        config.dedupe = true;
        let deduped = Engine::new(config).unwrap().analyze(&records);
        assert_eq!(deduped.assessments.len(), 1);
        assert!(deduped.groups.is_empty());
        assert_eq!(deduped.meta.record_count, 2);
    }

    #[test]
    fn dedupe_ignores_listing_order() {
        let first = facility("F-1", "100 Main St", "Ann Lee");
        let second = facility("F-1", "100 Main St", "Bob Roe");
        let other = facility("F-2", "9 Pine Rd", "Ann Lee");
        let config = EngineConfig {
            dedupe: true,
            ..EngineConfig::default()
        };
        let engine = Engine::new(config).unwrap();

        let a = [first.clone(), second.clone(), other.clone()];
        let b = [second, first, other];
        let report_a = engine.analyze(&a);
        let report_b = engine.analyze(&b);
        assert_eq!(
            serde_json::to_string(&report_a).unwrap(),
            serde_json::to_string(&report_b).unwrap()
        );
        assert_eq!(report_a.assessments.len(), 2);
        assert_eq!(report_a.groups.len(), 1);
        assert_eq!(report_a.groups[0].key, "ann lee");
    }

    #[test]
    fn huge_burst_window_sweeps_whole_history() {
        let config = EngineConfig::from_toml("burst_window_days = 4294967295").unwrap();
        let records: Vec<Record> = ["2024-01-01", "2024-05-01", "2024-11-30"]
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let mut r = Record::new(RecordKind::Business, format!("B-{i}"));
                r.owner = "Pat Filer".into();
                r.party_type = "Registered Agent".into();
                r.timestamp = (*date).into();
                r
            })
            .collect();
        let report = Engine::new(config).unwrap().analyze(&records);
        assert_eq!(report.bursts.len(), 1);
        assert_eq!(report.bursts[0].count, 3);
    }

    #[test]
    fn cross_match_uses_both_stop_lists() {
        let mut vehicle = Record::new(RecordKind::Vehicle, "V-1");
        vehicle.name = "Tiny Tots Academy".into();
        let mut school = Record::new(RecordKind::Facility, "F-1");
        school.name = "Tiny Tots".into();
        let records = vec![vehicle, school];

        let mut config = EngineConfig {
            cross_refs: vec![CrossRefConfig {
                source: RecordKind::Vehicle,
                target: RecordKind::Facility,
                keys: vec![MatchKind::Name],
            }],
            ..EngineConfig::default()
        };
        config.kinds.insert(
            RecordKind::Facility,
            KindConfig {
                stop_words: Some(vec!["academy".into()]),
                ..KindConfig::default()
            },
        );
        let report = Engine::new(config).unwrap().analyze(&records);
        assert_eq!(report.cross_matches.len(), 1);
        assert_eq!(report.cross_matches[0].hits[0].target.id, "F-1");
    }

    #[test]
    fn cross_match_reaches_both_ends() {
        let mut vehicle = Record::new(RecordKind::Vehicle, "V-1");
        vehicle.owner = "Ann Lee".into();
        let records = vec![vehicle, facility("F-1", "100 Main St", "Ann Lee")];

        let config = EngineConfig {
            cross_refs: vec![CrossRefConfig {
                source: RecordKind::Vehicle,
                target: RecordKind::Facility,
                keys: vec![MatchKind::Owner],
            }],
            ..EngineConfig::default()
        };
        let report = Engine::new(config).unwrap().analyze(&records);
        assert_eq!(report.cross_matches.len(), 1);
        for a in &report.assessments {
            assert!(a.flags.iter().any(|f| f.kind == FlagKind::CrossProgramLink), "{a:?}");
        }
    }

    #[test]
    fn bursts_only_from_agent_filings() {
        let mk = |id: &str, date: &str, party: &str| {
            let mut r = Record::new(RecordKind::Business, id);
            r.name = format!("Venture {id}");
            r.owner = "Pat Filer".into();
            r.party_type = party.into();
            r.timestamp = date.into();
            r
        };
        let records = vec![
            mk("B-1", "2024-01-01", "Registered Agent"),
            mk("B-2", "2024-01-05", "Registered Agent"),
            mk("B-3", "2024-01-09", "Organizer"),
        ];
        let engine = Engine::new(EngineConfig::default()).unwrap();
        assert!(engine.analyze(&records).bursts.is_empty());

        let mut config = EngineConfig::default();
        config.kinds.insert(
            RecordKind::Business,
            KindConfig {
                agent_party_pattern: None,
                ..KindConfig::default()
            },
        );
        let report = Engine::new(config).unwrap().analyze(&records);
        assert_eq!(report.bursts.len(), 1);
        assert_eq!(report.bursts[0].count, 3);
    }
}
