use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Which public-record program a record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Business,
    Facility,
    Vehicle,
    Provider,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Business,
        RecordKind::Facility,
        RecordKind::Vehicle,
        RecordKind::Provider,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Facility => "facility",
            Self::Vehicle => "vehicle",
            Self::Provider => "provider",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parsed public record.
///
/// Missing columns are empty strings (or `None`); the caller supplies the
/// defaults. The engine never mutates records, it only borrows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: RecordKind,
    /// Stable identifier: license number, NPI, file number, VIN.
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub phone: String,
    /// Owner, licensee, registered agent or filing party.
    #[serde(default)]
    pub owner: String,
    /// Role of `owner` on the filing, e.g. "Registered Agent".
    #[serde(default)]
    pub party_type: String,
    /// Raw NPI / VIN / plate.
    #[serde(default)]
    pub identifier: String,
    /// Raw formation, filing or issue date.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub facility_type: String,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Record {
    pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            phone: String::new(),
            owner: String::new(),
            party_type: String::new(),
            identifier: String::new(),
            timestamp: String::new(),
            amount: None,
            status: String::new(),
            facility_type: String::new(),
            capacity: None,
            extra: BTreeMap::new(),
        }
    }

    /// Deterministic ordering key, independent of input order.
    pub fn sort_key(&self) -> (RecordKind, &str) {
        (self.kind, self.id.as_str())
    }

    /// Total order: `sort_key` first, then every remaining field, so listings
    /// sharing an id still land in the same place whatever the input order.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.address.cmp(&other.address))
            .then_with(|| self.city.cmp(&other.city))
            .then_with(|| self.state.cmp(&other.state))
            .then_with(|| self.phone.cmp(&other.phone))
            .then_with(|| self.owner.cmp(&other.owner))
            .then_with(|| self.party_type.cmp(&other.party_type))
            .then_with(|| self.identifier.cmp(&other.identifier))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.status.cmp(&other.status))
            .then_with(|| self.facility_type.cmp(&other.facility_type))
            .then_with(|| self.capacity.cmp(&other.capacity))
            .then_with(|| match (self.amount, other.amount) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            })
            .then_with(|| self.extra.cmp(&other.extra))
    }
}

/// Canonical lifecycle status derived from the raw status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Pending,
    Inactive,
    Closed,
    Suspended,
    Revoked,
    Terminated,
    Unknown,
}

impl RecordStatus {
    /// Statuses that mean the entity is no longer operating in good standing.
    pub fn is_non_active(&self) -> bool {
        matches!(
            self,
            Self::Inactive | Self::Closed | Self::Suspended | Self::Revoked | Self::Terminated
        )
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Which attribute a canonical key was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Name,
    Address,
    Phone,
    Owner,
    Identifier,
}

impl KeyKind {
    /// Key kinds the engine clusters on.
    pub const GROUPED: [KeyKind; 4] = [KeyKind::Name, KeyKind::Address, KeyKind::Phone, KeyKind::Owner];
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Address => write!(f, "address"),
            Self::Phone => write!(f, "phone"),
            Self::Owner => write!(f, "owner"),
            Self::Identifier => write!(f, "identifier"),
        }
    }
}

/// Match strategy that linked two records across programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all(serialize = "SCREAMING_SNAKE_CASE", deserialize = "snake_case"))]
pub enum MatchKind {
    Name,
    Address,
    Owner,
}

impl MatchKind {
    pub const ALL: [MatchKind; 3] = [MatchKind::Name, MatchKind::Address, MatchKind::Owner];

    pub fn key_kind(&self) -> KeyKind {
        match self {
            Self::Name => KeyKind::Name,
            Self::Address => KeyKind::Address,
            Self::Owner => KeyKind::Owner,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived structures
// ---------------------------------------------------------------------------

/// Records of one kind sharing one canonical key.
#[derive(Debug, Clone, Serialize)]
pub struct Group<'a> {
    pub record_kind: RecordKind,
    pub key_kind: KeyKind,
    pub key: String,
    pub member_count: usize,
    /// Distinct normalized owners among members.
    pub distinct_owners: usize,
    /// Distinct normalized addresses among members.
    pub distinct_addresses: usize,
    /// Distinct states among members.
    pub distinct_states: usize,
    #[serde(serialize_with = "ser_record_ids")]
    pub members: Vec<&'a Record>,
}

impl Group<'_> {
    pub fn contains(&self, record: &Record) -> bool {
        self.members.iter().any(|m| m.sort_key() == record.sort_key())
    }
}

/// A dense run of same-key events inside a fixed-width time window.
#[derive(Debug, Clone, Serialize)]
pub struct BurstWindow<'a> {
    pub record_kind: RecordKind,
    pub key_kind: KeyKind,
    pub key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub span_days: i64,
    pub count: usize,
    #[serde(serialize_with = "ser_record_ids")]
    pub members: Vec<&'a Record>,
}

impl BurstWindow<'_> {
    pub fn contains(&self, record: &Record) -> bool {
        self.members.iter().any(|m| m.sort_key() == record.sort_key())
    }
}

/// One target record linked to a source record.
#[derive(Debug, Clone, Serialize)]
pub struct MatchHit<'a> {
    #[serde(rename = "target_id", serialize_with = "ser_record_id")]
    pub target: &'a Record,
    pub kinds: BTreeSet<MatchKind>,
}

/// All links from one source record into another program's population.
#[derive(Debug, Clone, Serialize)]
pub struct CrossMatch<'a> {
    #[serde(rename = "source_id", serialize_with = "ser_record_id")]
    pub source: &'a Record,
    pub source_kind: RecordKind,
    pub target_kind: RecordKind,
    /// Union of the match kinds across all hits.
    pub kinds: BTreeSet<MatchKind>,
    pub hits: Vec<MatchHit<'a>>,
}

// ---------------------------------------------------------------------------
// Scoring output
// ---------------------------------------------------------------------------

/// Flag severity. Declaration order is display order, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlagKind {
    VeryHighVolume,
    HighVolume,
    SharedAttribute,
    MultiOwnerAddress,
    SharedPhone,
    OwnerMultiAddress,
    MultiStateOwner,
    CrossProgramLink,
    MultiProgramNetwork,
    RapidFormation,
    InactiveStatus,
    PostCutoffFormation,
    OverCapacity,
    /// Emitted by caller-supplied rules.
    Custom(String),
}

impl FlagKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::VeryHighVolume => "VERY_HIGH_VOLUME",
            Self::HighVolume => "HIGH_VOLUME",
            Self::SharedAttribute => "SHARED_ATTRIBUTE",
            Self::MultiOwnerAddress => "MULTI_OWNER_ADDRESS",
            Self::SharedPhone => "SHARED_PHONE",
            Self::OwnerMultiAddress => "OWNER_MULTI_ADDRESS",
            Self::MultiStateOwner => "MULTI_STATE_OWNER",
            Self::CrossProgramLink => "CROSS_PROGRAM_LINK",
            Self::MultiProgramNetwork => "MULTI_PROGRAM_NETWORK",
            Self::RapidFormation => "RAPID_FORMATION",
            Self::InactiveStatus => "INACTIVE_STATUS",
            Self::PostCutoffFormation => "POST_CUTOFF_FORMATION",
            Self::OverCapacity => "OVER_CAPACITY",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for FlagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FlagKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flag {
    pub kind: FlagKind,
    pub severity: Severity,
    pub points: u32,
    pub detail: String,
}

/// Bucketed risk level. Declaration order is ascending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub record_id: String,
    pub record_kind: RecordKind,
    pub score: u32,
    pub level: RiskLevel,
    pub flags: Vec<Flag>,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

fn ser_record_id<S: Serializer>(record: &&Record, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&record.id)
}

fn ser_record_ids<S: Serializer>(records: &[&Record], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(records.iter().map(|r| r.id.as_str()))
}
