use std::collections::BTreeSet;

use crate::index::KeyIndex;
use crate::model::{Group, KeyKind, Record};
use crate::normalize::Normalizer;

/// Turn index entries with at least `min_size` members into groups.
///
/// Sorted by member count descending, then key ascending.
pub fn build_groups<'a>(
    index: &KeyIndex<'a>,
    min_size: usize,
    normalizer: &Normalizer,
) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = index
        .iter()
        .filter(|(_, members)| !members.is_empty() && members.len() >= min_size)
        .map(|(key, members)| build_group(index.kind(), key, members, normalizer))
        .collect();

    groups.sort_by(|a, b| {
        b.member_count
            .cmp(&a.member_count)
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.record_kind.cmp(&b.record_kind))
    });
    groups
}

fn build_group<'a>(
    key_kind: KeyKind,
    key: &str,
    members: &[&'a Record],
    normalizer: &Normalizer,
) -> Group<'a> {
    let mut members = members.to_vec();
    members.sort_by(|a, b| a.total_cmp(b));

    let distinct_owners = distinct_keys(&members, KeyKind::Owner, normalizer);
    let distinct_addresses = distinct_keys(&members, KeyKind::Address, normalizer);
    let distinct_states = members
        .iter()
        .map(|r| r.state.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .len();

    Group {
        record_kind: members[0].kind,
        key_kind,
        key: key.to_string(),
        member_count: members.len(),
        distinct_owners,
        distinct_addresses,
        distinct_states,
        members,
    }
}

fn distinct_keys(members: &[&Record], kind: KeyKind, normalizer: &Normalizer) -> usize {
    members
        .iter()
        .filter_map(|r| normalizer.record_key(r, kind))
        .collect::<BTreeSet<_>>()
        .len()
}
