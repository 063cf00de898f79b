//! Dataset adapters: scan config `[datasets.*]` tables and the CSV / JSON
//! readers that turn their files into engine records.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use log::{debug, warn};
use ringscan_engine::model::{Record, RecordKind};
use ringscan_engine::EngineConfig;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// A scan file: engine settings plus the datasets to feed it.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub engine: EngineConfig,
    pub datasets: BTreeMap<String, DatasetConfig>,
}

#[derive(Deserialize)]
struct DatasetSections {
    #[serde(default)]
    datasets: BTreeMap<String, DatasetConfig>,
}

impl ScanConfig {
    /// Parse both halves of a scan file. Engine keys and `[datasets]` share
    /// one document, so each half reads it and ignores the other's keys.
    pub fn from_toml(input: &str) -> Result<Self, ScanError> {
        let engine = EngineConfig::from_toml(input).map_err(|e| ScanError::Config(e.to_string()))?;
        let sections: DatasetSections =
            toml::from_str(input).map_err(|e| ScanError::Config(format!("datasets: {e}")))?;

        if sections.datasets.is_empty() {
            return Err(ScanError::Config("no [datasets] configured".into()));
        }
        for (name, ds) in &sections.datasets {
            if ds.columns.id.trim().is_empty() {
                return Err(ScanError::Config(format!("datasets.{name}: columns.id must not be empty")));
            }
            if let Some(filter) = &ds.filter {
                if filter.values.is_empty() {
                    return Err(ScanError::Config(format!("datasets.{name}: filter.values must not be empty")));
                }
            }
        }

        Ok(Self {
            engine,
            datasets: sections.datasets,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub kind: RecordKind,
    /// Relative to the scan file's directory.
    pub file: String,
    #[serde(default)]
    pub format: DataFormat,
    pub columns: ColumnMapping,
    #[serde(default)]
    pub filter: Option<RowFilter>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Csv,
    Json,
}

/// Source column for each record field. Unmapped fields stay empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub phone: Option<String>,
    pub owner: Option<String>,
    pub party_type: Option<String>,
    pub identifier: Option<String>,
    pub timestamp: Option<String>,
    pub amount: Option<String>,
    pub status: Option<String>,
    pub facility_type: Option<String>,
    pub capacity: Option<String>,
    /// Copied verbatim into `Record::extra`.
    pub extra: Vec<String>,
}

/// Keep only rows whose `column` holds one of `values`.
#[derive(Debug, Clone, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub values: Vec<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ScanError {
    /// Scan file malformed or invalid.
    Config(String),
    /// Dataset file missing or unreadable.
    Io(String),
    /// Mapped column absent from the dataset header.
    MissingColumn { dataset: String, column: String },
    /// Malformed CSV / JSON content.
    Parse(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "{msg}"),
            Self::Io(msg) => write!(f, "{msg}"),
            Self::MissingColumn { dataset, column } => {
                write!(f, "dataset '{dataset}': column '{column}' not found")
            }
            Self::Parse(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ScanError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read every dataset, resolving files against `base_dir`.
pub fn load_datasets(scan: &ScanConfig, base_dir: &Path) -> Result<Vec<Record>, ScanError> {
    let mut records = Vec::new();
    for (name, ds) in &scan.datasets {
        let path = base_dir.join(&ds.file);
        let data = std::fs::read_to_string(&path)
            .map_err(|e| ScanError::Io(format!("cannot read {}: {e}", path.display())))?;
        let loaded = match ds.format {
            DataFormat::Csv => load_csv_records(name, &data, ds)?,
            DataFormat::Json => load_json_records(name, &data, ds)?,
        };
        debug!("dataset '{name}': {} {} records", loaded.len(), ds.kind);
        records.extend(loaded);
    }
    Ok(records)
}

pub fn load_csv_records(name: &str, data: &str, ds: &DatasetConfig) -> Result<Vec<Record>, ScanError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ScanError::Parse(format!("dataset '{name}': {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let idx = |column: &str| -> Result<usize, ScanError> {
        headers.iter().position(|h| h == column).ok_or_else(|| ScanError::MissingColumn {
            dataset: name.into(),
            column: column.into(),
        })
    };

    // Resolve every mapped column up front so a typo fails before any row is read.
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
    for column in ds.columns.mapped() {
        positions.insert(column, idx(column)?);
    }
    if let Some(filter) = &ds.filter {
        positions.insert(filter.column.as_str(), idx(&filter.column)?);
    }

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| ScanError::Parse(format!("dataset '{name}': {e}")))?;
        let get = |column: &str| -> &str {
            positions
                .get(column)
                .and_then(|&i| row.get(i))
                .unwrap_or("")
        };
        if let Some(record) = build_record(name, line + 2, ds, get) {
            records.push(record);
        }
    }
    Ok(records)
}

/// JSON datasets are one array of flat objects. Scalars are stringified.
pub fn load_json_records(name: &str, data: &str, ds: &DatasetConfig) -> Result<Vec<Record>, ScanError> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(data)
        .map_err(|e| ScanError::Parse(format!("dataset '{name}': expected an array of objects: {e}")))?;

    let mut records = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let values: BTreeMap<&str, String> = row
            .iter()
            .filter_map(|(k, v)| scalar_text(v).map(|s| (k.as_str(), s)))
            .collect();
        let get = |column: &str| -> &str { values.get(column).map(String::as_str).unwrap_or("") };
        if let Some(record) = build_record(name, i + 1, ds, get) {
            records.push(record);
        }
    }
    Ok(records)
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn build_record<'r>(
    name: &str,
    row: usize,
    ds: &DatasetConfig,
    get: impl Fn(&str) -> &'r str,
) -> Option<Record> {
    if let Some(filter) = &ds.filter {
        let value = get(filter.column.as_str()).trim();
        if !filter.values.iter().any(|v| v == value) {
            return None;
        }
    }

    let id = get(ds.columns.id.as_str()).trim();
    if id.is_empty() {
        warn!("dataset '{name}' row {row}: empty id, skipped");
        return None;
    }

    let c = &ds.columns;
    let field = |column: &Option<String>| -> String {
        column.as_deref().map(|col| get(col).trim().to_string()).unwrap_or_default()
    };

    let mut record = Record::new(ds.kind, id);
    record.name = field(&c.name);
    record.address = field(&c.address);
    record.city = field(&c.city);
    record.state = field(&c.state);
    record.phone = field(&c.phone);
    record.owner = field(&c.owner);
    record.party_type = field(&c.party_type);
    record.identifier = field(&c.identifier);
    record.timestamp = field(&c.timestamp);
    record.status = field(&c.status);
    record.facility_type = field(&c.facility_type);
    record.amount = parse_amount(&field(&c.amount));
    record.capacity = field(&c.capacity).parse().ok();
    for column in &c.extra {
        let value = get(column.as_str()).trim();
        if !value.is_empty() {
            record.extra.insert(column.clone(), value.to_string());
        }
    }
    Some(record)
}

/// `$1,234.50` style amounts. Unparseable text is absent, not zero.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

impl ColumnMapping {
    /// Every source column the mapping names.
    pub fn mapped(&self) -> Vec<&str> {
        let optional = [
            &self.name,
            &self.address,
            &self.city,
            &self.state,
            &self.phone,
            &self.owner,
            &self.party_type,
            &self.identifier,
            &self.timestamp,
            &self.amount,
            &self.status,
            &self.facility_type,
            &self.capacity,
        ];
        std::iter::once(self.id.as_str())
            .chain(optional.into_iter().filter_map(|c| c.as_deref()))
            .chain(self.extra.iter().map(String::as_str))
            .collect()
    }
}
