use std::collections::BTreeMap;

use crate::model::{KeyKind, Record};
use crate::normalize::Normalizer;

/// Inverted index from canonical key to the records carrying it.
///
/// Ordered by key, and each posting list is kept in input order, so two
/// indices built from the same slice are identical.
#[derive(Debug, Clone)]
pub struct KeyIndex<'a> {
    kind: KeyKind,
    entries: BTreeMap<String, Vec<&'a Record>>,
}

impl<'a> KeyIndex<'a> {
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<&[&'a Record]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[&'a Record])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index records by one key kind in a single pass. Records without a key are skipped.
pub fn build_index<'a, I>(records: I, kind: KeyKind, normalizer: &Normalizer) -> KeyIndex<'a>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut entries: BTreeMap<String, Vec<&'a Record>> = BTreeMap::new();

    for record in records {
        if let Some(key) = normalizer.record_key(record, kind) {
            entries.entry(key).or_default().push(record);
        }
    }

    KeyIndex { kind, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordKind;

    fn rec(id: &str, name: &str, address: &str, phone: &str) -> Record {
        let mut r = Record::new(RecordKind::Facility, id);
        r.name = name.into();
        r.address = address.into();
        r.phone = phone.into();
        r
    }

    #[test]
    fn groups_by_canonical_address() {
        let records = vec![
            rec("1", "Alpha Care", "100 Main Street", ""),
            rec("2", "Beta Care", "100 MAIN ST.", ""),
            rec("3", "Gamma Care", "200 Oak Ave", ""),
        ];
        let idx = build_index(&records, KeyKind::Address, &Normalizer::default());
        assert_eq!(idx.len(), 2);
        let ids: Vec<&str> = idx.get("100 main").unwrap().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(idx.get("200 oak").unwrap().len(), 1);
    }

    #[test]
    fn absent_keys_are_skipped() {
        let records = vec![
            rec("1", "", "", "555-0142"),
            rec("2", "X", "1 A", ""),
        ];
        let n = Normalizer::default();
        assert!(build_index(&records, KeyKind::Name, &n).is_empty());
        assert!(build_index(&records, KeyKind::Address, &n).is_empty());
        assert!(build_index(&records, KeyKind::Phone, &n).is_empty());
    }

    #[test]
    fn independent_indices_over_same_records() {
        let records = vec![
            rec("1", "Alpha Transport", "100 Main St", "612-555-0100"),
            rec("2", "Alpha Transport LLC", "9 Pine St", "612-555-0100"),
        ];
        let n = Normalizer::default();
        let by_name = build_index(&records, KeyKind::Name, &n);
        let by_phone = build_index(&records, KeyKind::Phone, &n);
        let by_address = build_index(&records, KeyKind::Address, &n);
        assert_eq!(by_name.kind(), KeyKind::Name);
        assert_eq!(by_name.get("alpha transport").unwrap().len(), 2);
        assert_eq!(by_phone.get("6125550100").unwrap().len(), 2);
        assert_eq!(by_address.len(), 2);
    }
}
