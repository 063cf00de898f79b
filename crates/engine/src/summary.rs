use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{BurstWindow, CrossMatch, Group, KeyKind, RiskAssessment, RiskLevel};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub records_scored: usize,
    pub total_groups: usize,
    pub groups_by_key: BTreeMap<KeyKind, usize>,
    pub bursts: usize,
    pub records_in_bursts: usize,
    pub cross_matches: usize,
    /// Keyed `"source->target"`.
    pub cross_links: BTreeMap<String, usize>,
    pub flag_counts: BTreeMap<String, usize>,
    pub level_counts: BTreeMap<RiskLevel, usize>,
}

/// Compute summary statistics over one analysis run.
pub fn compute_summary(
    groups: &[Group<'_>],
    bursts: &[BurstWindow<'_>],
    cross_matches: &[CrossMatch<'_>],
    assessments: &[RiskAssessment],
) -> ReportSummary {
    let mut groups_by_key: BTreeMap<KeyKind, usize> = BTreeMap::new();
    for g in groups {
        *groups_by_key.entry(g.key_kind).or_insert(0) += 1;
    }

    let mut cross_links: BTreeMap<String, usize> = BTreeMap::new();
    for m in cross_matches {
        *cross_links
            .entry(format!("{}->{}", m.source_kind, m.target_kind))
            .or_insert(0) += 1;
    }

    let mut flag_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut level_counts: BTreeMap<RiskLevel, usize> = BTreeMap::new();
    for a in assessments {
        *level_counts.entry(a.level).or_insert(0) += 1;
        for f in &a.flags {
            *flag_counts.entry(f.kind.to_string()).or_insert(0) += 1;
        }
    }

    ReportSummary {
        records_scored: assessments.len(),
        total_groups: groups.len(),
        groups_by_key,
        bursts: bursts.len(),
        records_in_bursts: bursts.iter().map(|b| b.count).sum(),
        cross_matches: cross_matches.len(),
        cross_links,
        flag_counts,
        level_counts,
    }
}
