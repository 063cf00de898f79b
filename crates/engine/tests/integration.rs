use std::path::PathBuf;

use ringscan_engine::model::{FlagKind, KeyKind, Record, RecordKind, RiskLevel};
use ringscan_engine::{Engine, EngineConfig, Report};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_records(name: &str) -> Vec<Record> {
    let path = fixtures_dir().join(name);
    let data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    serde_json::from_str(&data).unwrap()
}

fn load_config(name: &str) -> EngineConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join(name)).unwrap();
    EngineConfig::from_toml(&toml).unwrap()
}

fn analyze(config: EngineConfig, records: &[Record]) -> Report<'_> {
    Engine::new(config).unwrap().analyze(records)
}

fn flag_kinds(report: &Report<'_>, kind: RecordKind, id: &str) -> Vec<FlagKind> {
    report
        .assessment(kind, id)
        .unwrap_or_else(|| panic!("no assessment for {id}"))
        .flags
        .iter()
        .map(|f| f.kind.clone())
        .collect()
}

fn agent_filing(id: &str, name: &str, date: &str) -> Record {
    let mut r = Record::new(RecordKind::Business, id);
    r.name = name.into();
    r.owner = "Pat Agent".into();
    r.party_type = "Registered Agent".into();
    r.timestamp = date.into();
    r
}

// -------------------------------------------------------------------------
// Rapid formation
// -------------------------------------------------------------------------

#[test]
fn three_agent_filings_form_one_burst() {
    let records = vec![
        agent_filing("B-1", "Lakeview Ventures", "2024-01-01"),
        agent_filing("B-2", "Riverside Partners", "2024-02-01"),
        agent_filing("B-3", "Hilltop Partners", "2024-02-20"),
    ];
    let report = analyze(EngineConfig::default(), &records);

    assert_eq!(report.bursts.len(), 1);
    let burst = &report.bursts[0];
    assert_eq!(burst.key_kind, KeyKind::Owner);
    assert_eq!(burst.key, "pat agent");
    assert_eq!(burst.count, 3);
    assert_eq!(burst.span_days, 50);
    assert_eq!(burst.start.to_string(), "2024-01-01");
    assert_eq!(burst.end.to_string(), "2024-02-20");

    for a in &report.assessments {
        assert!(a.flags.iter().any(|f| f.kind == FlagKind::RapidFormation), "{a:?}");
        // shared owner (5) + rapid formation (15)
        assert_eq!(a.score, 20);
        assert_eq!(a.level, RiskLevel::Moderate);
    }
}

#[test]
fn filing_outside_window_is_left_out() {
    let records = vec![
        agent_filing("B-1", "Lakeview Ventures", "2024-01-01"),
        agent_filing("B-2", "Riverside Partners", "2024-01-11"),
        agent_filing("B-3", "Hilltop Partners", "2024-02-10"),
        agent_filing("B-4", "Oakridge Capital", "2024-04-05"),
    ];
    let report = analyze(EngineConfig::default(), &records);

    assert_eq!(report.bursts.len(), 1);
    let ids: Vec<&str> = report.bursts[0].members.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["B-1", "B-2", "B-3"]);
    assert!(!flag_kinds(&report, RecordKind::Business, "B-4").contains(&FlagKind::RapidFormation));
}

// -------------------------------------------------------------------------
// Shared addresses
// -------------------------------------------------------------------------

#[test]
fn multi_owner_address_requires_two_owners() {
    let mut a = Record::new(RecordKind::Facility, "F-1");
    a.address = "100 Main St".into();
    a.owner = "Ann Lee".into();
    let mut b = Record::new(RecordKind::Facility, "F-2");
    b.address = "100 Main Street".into();
    b.owner = "Bob Roe".into();
    let mut c = Record::new(RecordKind::Facility, "F-3");
    c.address = "9 Pine Rd".into();
    c.owner = "Cy Dee".into();
    let mut d = Record::new(RecordKind::Facility, "F-4");
    d.address = "9 Pine Road".into();
    d.owner = "Cy Dee".into();

    let records = vec![a, b, c, d];
    let report = analyze(EngineConfig::default(), &records);

    assert!(flag_kinds(&report, RecordKind::Facility, "F-1").contains(&FlagKind::MultiOwnerAddress));
    assert!(flag_kinds(&report, RecordKind::Facility, "F-2").contains(&FlagKind::MultiOwnerAddress));
    // One owner holding two licenses at one address.
    assert!(!flag_kinds(&report, RecordKind::Facility, "F-3").contains(&FlagKind::MultiOwnerAddress));
    assert!(!flag_kinds(&report, RecordKind::Facility, "F-4").contains(&FlagKind::MultiOwnerAddress));
}

// -------------------------------------------------------------------------
// Statewide fixture
// -------------------------------------------------------------------------

#[test]
fn statewide_ranking() {
    let records = load_records("statewide.json");
    let report = analyze(load_config("statewide.toml"), &records);

    let ranked = report.ranked();
    assert_eq!(ranked[0].record_id, "F-100");
    assert_eq!(ranked[0].score, 85);
    assert_eq!(ranked[0].level, RiskLevel::Critical);
    assert_eq!(ranked[1].record_id, "F-102");
    assert_eq!(ranked[1].score, 50);
    assert_eq!(report.highest_level(), Some(RiskLevel::Critical));

    let top = flag_kinds(&report, RecordKind::Facility, "F-100");
    for expected in [
        FlagKind::SharedAttribute,
        FlagKind::MultiOwnerAddress,
        FlagKind::SharedPhone,
        FlagKind::OwnerMultiAddress,
        FlagKind::MultiStateOwner,
        FlagKind::CrossProgramLink,
        FlagKind::PostCutoffFormation,
        FlagKind::OverCapacity,
    ] {
        assert!(top.contains(&expected), "missing {expected}");
    }

    // Revoked license, formed before the cutoff.
    let f102 = flag_kinds(&report, RecordKind::Facility, "F-102");
    assert!(f102.contains(&FlagKind::InactiveStatus));
    assert!(!f102.contains(&FlagKind::PostCutoffFormation));

    assert_eq!(report.summary.records_scored, 8);
    assert_eq!(report.summary.bursts, 1);
    assert_eq!(report.summary.cross_matches, 1);
    assert_eq!(report.summary.cross_links["vehicle->facility"], 1);
    assert_eq!(report.summary.level_counts[&RiskLevel::Critical], 1);
}

#[test]
fn statewide_cross_match_links_owner_network() {
    let records = load_records("statewide.json");
    let report = analyze(load_config("statewide.toml"), &records);

    let m = &report.cross_matches[0];
    assert_eq!(m.source.id, "V-1");
    let targets: Vec<&str> = m.hits.iter().map(|h| h.target.id.as_str()).collect();
    assert_eq!(targets, vec!["F-100", "F-102", "F-103"]);
    assert!(!flag_kinds(&report, RecordKind::Facility, "F-101").contains(&FlagKind::CrossProgramLink));
}

#[test]
fn statewide_json_is_deterministic() {
    let records = load_records("statewide.json");
    let config = load_config("statewide.toml");
    let a = serde_json::to_string(&analyze(config.clone(), &records)).unwrap();
    let b = serde_json::to_string(&analyze(config, &records)).unwrap();
    assert_eq!(a, b);

    let value: serde_json::Value = serde_json::from_str(&a).unwrap();
    assert_eq!(value["cross_matches"][0]["source_id"], "V-1");
    assert_eq!(value["cross_matches"][0]["hits"][0]["kinds"][0], "OWNER");
    assert_eq!(value["meta"]["config_name"], "Statewide sweep");
}

#[test]
fn statewide_input_order_does_not_matter() {
    let records = load_records("statewide.json");
    let mut shuffled = records.clone();
    shuffled.reverse();
    shuffled.rotate_left(3);

    let config = load_config("statewide.toml");
    let a = serde_json::to_string(&analyze(config.clone(), &records)).unwrap();
    let b = serde_json::to_string(&analyze(config, &shuffled)).unwrap();
    assert_eq!(a, b);
}
