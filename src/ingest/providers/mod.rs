// src/ingest/providers/mod.rs
//! Wire-format parsers. Each turns one raw payload into events plus per-record
//! errors and never fails as a whole.

pub mod city_xml;
pub mod cultural_csv;
pub mod cultural_json;
pub mod cultural_xml;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::ingest::types::{EventKind, ParseOutcome};

/// Upstream payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFormat {
    CulturalJson,
    CulturalXml,
    CulturalCsv,
    CityXml,
}

impl FeedFormat {
    /// Provenance tag stamped on records parsed from this format.
    pub const fn tag(self) -> &'static str {
        match self {
            FeedFormat::CulturalJson => "JSON",
            FeedFormat::CulturalXml => "XML",
            FeedFormat::CulturalCsv => "CSV",
            FeedFormat::CityXml => "CITY",
        }
    }

    pub const fn kind(self) -> EventKind {
        match self {
            FeedFormat::CityXml => EventKind::City,
            _ => EventKind::Cultural,
        }
    }
}

/// Parse one payload with the parser for `format`.
pub fn parse(format: FeedFormat, body: &[u8]) -> ParseOutcome {
    let t0 = std::time::Instant::now();
    let out = match format {
        FeedFormat::CulturalJson => cultural_json::parse(body),
        FeedFormat::CulturalXml => cultural_xml::parse(body),
        FeedFormat::CulturalCsv => cultural_csv::parse(body),
        FeedFormat::CityXml => city_xml::parse(body),
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_events_total").increment(out.events.len() as u64);
    counter!("ingest_parse_errors_total").increment(out.errors.len() as u64);
    tracing::debug!(
        target: "ingest",
        format = format.tag(),
        events = out.events.len(),
        errors = out.errors.len(),
        parse_ms = ms,
        "payload parsed"
    );
    out
}

/// Parse `YYYY-MM-DD HH:MM:SS(.f)` (or a bare date), optionally replacing the
/// clock with a separate `HH:MM` field when the timestamp carries midnight.
pub(crate) fn parse_datetime(raw: &str, time_of_day: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let dt = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    match time_of_day.and_then(parse_clock) {
        Some(t) if dt.time() == NaiveTime::MIN => Some(dt.date().and_time(t)),
        _ => Some(dt),
    }
}

/// `DD/MM/YYYY` with an optional `HH:MM` clock.
pub(crate) fn parse_dmy(raw: &str, time_of_day: Option<&str>) -> Option<NaiveDateTime> {
    let d = NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()?;
    let t = time_of_day.and_then(parse_clock).unwrap_or(NaiveTime::MIN);
    Some(d.and_time(t))
}

/// Accepts `HH:MM` or `HH.MM`, possibly followed by text ("19:00 h").
pub(crate) fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let head: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ':' || *c == '.')
        .collect();
    let head = head.replace('.', ":");
    NaiveTime::parse_from_str(&head, "%H:%M").ok()
}

/// Lenient coordinate parse: empty → 0.0, decimal comma accepted.
pub(crate) fn parse_coord(raw: &str) -> Result<f64, String> {
    let t = raw.trim();
    if t.is_empty() {
        return Ok(0.0);
    }
    t.replace(',', ".")
        .parse::<f64>()
        .map_err(|e| format!("bad coordinate {t:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_with_separate_clock() {
        let dt = parse_datetime("2024-11-06 00:00:00.0", Some("19:30")).unwrap();
        assert_eq!(dt.to_string(), "2024-11-06 19:30:00");
    }

    #[test]
    fn explicit_clock_in_timestamp_wins() {
        let dt = parse_datetime("2024-11-06 18:00:00", Some("19:30")).unwrap();
        assert_eq!(dt.to_string(), "2024-11-06 18:00:00");
    }

    #[test]
    fn dmy_dates() {
        let dt = parse_dmy("01/12/2024", Some("20.00 h")).unwrap();
        assert_eq!(dt.to_string(), "2024-12-01 20:00:00");
        assert!(parse_dmy("2024-12-01", None).is_none());
    }

    #[test]
    fn coordinates_accept_decimal_comma() {
        assert_eq!(parse_coord("40,4233").unwrap(), 40.4233);
        assert_eq!(parse_coord("").unwrap(), 0.0);
        assert!(parse_coord("north").is_err());
    }
}
