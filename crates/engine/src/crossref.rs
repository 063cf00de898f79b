use std::collections::{BTreeMap, BTreeSet};

use crate::index::{build_index, KeyIndex};
use crate::model::{CrossMatch, KeyKind, MatchHit, MatchKind, Record};
use crate::normalize::Normalizer;

/// Name, address and owner indices over one target population.
#[derive(Debug, Clone)]
pub struct TargetIndex<'a> {
    name: KeyIndex<'a>,
    address: KeyIndex<'a>,
    owner: KeyIndex<'a>,
}

impl<'a> TargetIndex<'a> {
    pub fn build<I>(targets: I, normalizer: &Normalizer) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
        I::IntoIter: Clone,
    {
        let targets = targets.into_iter();
        Self {
            name: build_index(targets.clone(), KeyKind::Name, normalizer),
            address: build_index(targets.clone(), KeyKind::Address, normalizer),
            owner: build_index(targets, KeyKind::Owner, normalizer),
        }
    }

    pub fn for_kind(&self, kind: MatchKind) -> &KeyIndex<'a> {
        match kind {
            MatchKind::Name => &self.name,
            MatchKind::Address => &self.address,
            MatchKind::Owner => &self.owner,
        }
    }
}

/// Link each source record to every target sharing an enabled key.
///
/// Hits are merged per target id, so a target matched by both name and
/// address appears once carrying both kinds. Sources with no hits produce
/// nothing. Output is ordered by source (kind, id); hits by target id.
pub fn cross_match<'a>(
    sources: &[&'a Record],
    targets: &TargetIndex<'a>,
    normalizer: &Normalizer,
    kinds: &[MatchKind],
) -> Vec<CrossMatch<'a>> {
    let mut kinds: Vec<MatchKind> = kinds.to_vec();
    kinds.sort();
    kinds.dedup();

    let mut sorted_sources: Vec<&'a Record> = sources.to_vec();
    sorted_sources.sort_by(|a, b| a.total_cmp(b));

    let mut matches = Vec::new();

    for source in sorted_sources {
        // Keyed by target id; first record seen for an id stays the representative.
        let mut hits: BTreeMap<&'a str, (&'a Record, BTreeSet<MatchKind>)> = BTreeMap::new();

        for &kind in &kinds {
            let Some(key) = normalizer.record_key(source, kind.key_kind()) else {
                continue;
            };
            let Some(found) = targets.for_kind(kind).get(&key) else {
                continue;
            };
            for &target in found {
                if std::ptr::eq(target, source) {
                    continue;
                }
                hits.entry(target.id.as_str())
                    .or_insert_with(|| (target, BTreeSet::new()))
                    .1
                    .insert(kind);
            }
        }

        if hits.is_empty() {
            continue;
        }

        let hits: Vec<MatchHit<'a>> = hits
            .into_values()
            .map(|(target, kinds)| MatchHit { target, kinds })
            .collect();
        let all_kinds: BTreeSet<MatchKind> = hits.iter().flat_map(|h| h.kinds.iter().copied()).collect();
        let target_kind = hits[0].target.kind;

        matches.push(CrossMatch {
            source,
            source_kind: source.kind,
            target_kind,
            kinds: all_kinds,
            hits,
        });
    }

    matches
}
