//! Rapid-formation burst detection.
//!
//! A single greedy left-to-right sweep over one group's dated events. A
//! window is anchored at the first unconsumed event and takes every later
//! event within `window_days` of the anchor. Qualifying windows consume
//! their events; otherwise the anchor moves forward by one. The sweep does
//! not search for the largest window at every offset, and must not: reported
//! burst counts depend on this exact behavior.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};

use crate::model::{BurstWindow, Group, Record};

/// Date formats seen across registration and licensing extracts.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%Y%m%d", "%m-%d-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"];

/// Parse a raw timestamp to a calendar date. `None` when unrecognized.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// One dated event belonging to a group.
#[derive(Debug, Clone, Copy)]
pub struct TimedEvent<'a> {
    pub at: NaiveDate,
    pub record: &'a Record,
}

/// Events for records with a parseable timestamp. Others are dropped.
pub fn events_for<'a>(records: &[&'a Record]) -> Vec<TimedEvent<'a>> {
    records
        .iter()
        .copied()
        .filter_map(|r| parse_timestamp(&r.timestamp).map(|at| TimedEvent { at, record: r }))
        .collect()
}

/// A qualifying run of events, before it is attached to a group key.
#[derive(Debug, Clone)]
pub struct BurstSpan<'a> {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub events: Vec<TimedEvent<'a>>,
}

impl BurstSpan<'_> {
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Greedy non-overlapping sweep. See module docs.
pub fn detect_bursts<'a>(
    mut events: Vec<TimedEvent<'a>>,
    window_days: u32,
    min_count: usize,
) -> Vec<BurstSpan<'a>> {
    let min_count = min_count.max(1);
    if events.len() < min_count {
        return Vec::new();
    }

    events.sort_by(|a, b| {
        a.at.cmp(&b.at)
            .then_with(|| a.record.total_cmp(b.record))
    });

    let window = Days::new(u64::from(window_days));
    let mut spans = Vec::new();
    let mut i = 0;
    // Anchors only move forward, so the right edge never does either.
    let mut j = 0;

    while i < events.len() {
        // Past the calendar's end the window is open-ended.
        let window_end = events[i].at.checked_add_days(window).unwrap_or(NaiveDate::MAX);
        if j < i {
            j = i;
        }
        while j < events.len() && events[j].at <= window_end {
            j += 1;
        }

        if j - i >= min_count {
            spans.push(BurstSpan {
                start: events[i].at,
                end: events[j - 1].at,
                events: events[i..j].to_vec(),
            });
            i = j;
        } else {
            i += 1;
        }
    }

    spans
}

/// Bursts among one group's members, keyed by the group.
pub fn detect_group_bursts<'a>(
    group: &Group<'a>,
    window_days: u32,
    min_count: usize,
) -> Vec<BurstWindow<'a>> {
    if group.members.len() < min_count {
        return Vec::new();
    }
    detect_bursts(events_for(&group.members), window_days, min_count)
        .into_iter()
        .map(|span| BurstWindow {
            record_kind: group.record_kind,
            key_kind: group.key_kind,
            key: group.key.clone(),
            start: span.start,
            end: span.end,
            span_days: span.span_days(),
            count: span.events.len(),
            members: span.events.iter().map(|e| e.record).collect(),
        })
        .collect()
}
