//! Canonical keys for names, addresses, phones and identifiers.
//!
//! Every function here is total: garbage in yields an empty string, which
//! callers treat as "no key". All of them are idempotent, so normalizing an
//! already-normalized key is a no-op.

use std::collections::{BTreeSet, HashSet};

use serde::Deserialize;

use crate::model::{KeyKind, Record, RecordKind, RecordStatus};

/// Corporate and generic words dropped from names before comparison.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "the", "of", "and", "llc", "pllc", "inc", "incorporated", "corp", "corporation", "company",
    "co", "ltd", "limited", "lp", "llp", "pc", "group", "holdings", "enterprises", "services",
    "service", "healthcare", "health", "care",
];

const STREET_SUFFIXES: &[&str] = &[
    "street", "st", "avenue", "ave", "av", "road", "rd", "boulevard", "blvd", "drive", "dr",
    "lane", "ln", "court", "ct", "place", "pl", "parkway", "pkwy", "highway", "hwy", "circle",
    "cir", "terrace", "ter", "trail", "trl", "way", "square", "sq",
];

const DIRECTIONS: &[&str] = &[
    "north", "n", "south", "s", "east", "e", "west", "w", "northeast", "ne", "northwest", "nw",
    "southeast", "se", "southwest", "sw",
];

const UNIT_DESIGNATORS: &[&str] = &[
    "suite", "ste", "unit", "apt", "apartment", "floor", "fl", "room", "rm", "bldg", "building",
];

// ---------------------------------------------------------------------------
// Stop words
// ---------------------------------------------------------------------------

/// Name stop-list. Datasets differ slightly, so each record kind can carry its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWords(BTreeSet<String>);

impl StopWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    /// Words in either list.
    pub fn union(&self, other: &StopWords) -> StopWords {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for StopWords {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_WORDS)
    }
}

// ---------------------------------------------------------------------------
// Field normalizers
// ---------------------------------------------------------------------------

pub fn normalize_name(raw: &str, stop_words: &StopWords) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !stop_words.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_address(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '#'))
        .collect();

    let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
    // Dropping a unit pair can expose another one; run until nothing changes.
    loop {
        let next = strip_address_tokens(&tokens);
        if next.len() == tokens.len() {
            break;
        }
        tokens = next;
    }
    tokens.join(" ")
}

fn strip_address_tokens<'t>(tokens: &[&'t str]) -> Vec<&'t str> {
    let mut kept = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if UNIT_DESIGNATORS.contains(&token) {
            if let Some(next) = tokens.get(i + 1) {
                if has_digit(next) {
                    i += 2;
                    continue;
                }
            }
        }
        if is_attached_unit(token) || STREET_SUFFIXES.contains(&token) || DIRECTIONS.contains(&token) {
            i += 1;
            continue;
        }
        kept.push(token);
        i += 1;
    }
    kept
}

/// `ste200`, `apt4b`, `fl3`.
fn is_attached_unit(token: &str) -> bool {
    UNIT_DESIGNATORS.iter().any(|unit| {
        token
            .strip_prefix(unit)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
    })
}

fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Last ten digits, or empty when fewer than ten are present.
pub fn normalize_phone(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return String::new();
    }
    digits[digits.len() - 10..].iter().collect()
}

/// How a record kind spells its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScheme {
    /// National Provider Identifier: ten digits, zero-padded.
    Npi,
    Vin,
    Plate,
    License,
}

impl IdScheme {
    pub fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Provider => Self::Npi,
            RecordKind::Vehicle => Self::Vin,
            RecordKind::Business | RecordKind::Facility => Self::License,
        }
    }
}

pub fn normalize_identifier(raw: &str, scheme: IdScheme) -> String {
    let alnum: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    match scheme {
        IdScheme::Npi if !alnum.is_empty() && alnum.chars().all(|c| c.is_ascii_digit()) => {
            format!("{alnum:0>10}")
        }
        _ => alnum.to_ascii_uppercase(),
    }
}

/// Map free-text status values onto a fixed lifecycle vocabulary.
pub fn canonical_status(raw: &str) -> RecordStatus {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return RecordStatus::Unknown;
    }
    // "inactive" contains "active"; negative states are checked first.
    if s.contains("revok") {
        RecordStatus::Revoked
    } else if s.contains("suspend") {
        RecordStatus::Suspended
    } else if s.contains("terminat") {
        RecordStatus::Terminated
    } else if s.contains("closed") || s == "close" {
        RecordStatus::Closed
    } else if ["inactive", "expired", "lapsed", "dissolved", "withdrawn", "not in good standing"]
        .iter()
        .any(|w| s.contains(w))
    {
        RecordStatus::Inactive
    } else if s.contains("pending") || s.contains("application") {
        RecordStatus::Pending
    } else if ["active", "open", "licensed", "current", "good standing", "in business"]
        .iter()
        .any(|w| s.contains(w))
    {
        RecordStatus::Active
    } else {
        RecordStatus::Unknown
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Minimum canonical key length per key kind. Shorter keys count as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MinKeyLengths {
    pub name: usize,
    pub address: usize,
    pub phone: usize,
    pub owner: usize,
    pub identifier: usize,
}

impl Default for MinKeyLengths {
    fn default() -> Self {
        Self {
            name: 3,
            address: 5,
            phone: 10,
            owner: 3,
            identifier: 1,
        }
    }
}

impl MinKeyLengths {
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

/// Per-record-kind key builder: stop-list, identifier scheme and length floors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalizer {
    stop_words: StopWords,
    id_scheme: IdScheme,
    min_len: MinKeyLengths,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(StopWords::default(), IdScheme::License, MinKeyLengths::default())
    }
}

impl Normalizer {
    pub fn new(stop_words: StopWords, id_scheme: IdScheme, min_len: MinKeyLengths) -> Self {
        Self {
            stop_words,
            id_scheme,
            min_len,
        }
    }

    pub fn stop_words(&self) -> &StopWords {
        &self.stop_words
    }

    /// Raw canonical form; may be empty.
    pub fn normalize(&self, kind: KeyKind, raw: &str) -> String {
        match kind {
            KeyKind::Name | KeyKind::Owner => normalize_name(raw, &self.stop_words),
            KeyKind::Address => normalize_address(raw),
            KeyKind::Phone => normalize_phone(raw),
            KeyKind::Identifier => normalize_identifier(raw, self.id_scheme),
        }
    }

    /// Canonical key, or `None` when empty or shorter than the kind's floor.
    pub fn key(&self, kind: KeyKind, raw: &str) -> Option<String> {
        let key = self.normalize(kind, raw);
        if key.is_empty() || key.chars().count() < self.min_len.get(kind) {
            None
        } else {
            Some(key)
        }
    }

    /// Canonical key of the record field that backs `kind`.
    pub fn record_key(&self, record: &Record, kind: KeyKind) -> Option<String> {
        self.key(kind, field_for(record, kind))
    }
}

pub fn field_for(record: &Record, kind: KeyKind) -> &str {
    match kind {
        KeyKind::Name => &record.name,
        KeyKind::Address => &record.address,
        KeyKind::Phone => &record.phone,
        KeyKind::Owner => &record.owner,
        KeyKind::Identifier => &record.identifier,
    }
}

/// Drop repeated listings of the same place: first record per
/// (kind, normalized name, normalized address) wins, in input order.
/// Records with neither a name nor an address are always kept.
pub fn dedupe_records<'a>(records: &[&'a Record], normalizer: &Normalizer) -> Vec<&'a Record> {
    let mut seen: HashSet<(RecordKind, String, String)> = HashSet::new();
    records
        .iter()
        .copied()
        .filter(|r| {
            let name = normalizer.normalize(KeyKind::Name, &r.name);
            let address = normalizer.normalize(KeyKind::Address, &r.address);
            if name.is_empty() && address.is_empty() {
                return true;
            }
            seen.insert((r.kind, name, address))
        })
        .collect()
}
