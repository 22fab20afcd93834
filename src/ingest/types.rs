// src/ingest/types.rs
use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::filter::InclusionDecision;

/// Which upstream family a record came from. Drives the classifier's priority chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Cultural,
    City,
}

/// Canonical event record shared by every feed format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String, // stable cross-format join key
    pub title: String,
    pub description: String,
    pub start: NaiveDateTime, // wall clock, Europe/Madrid
    pub end: Option<NaiveDateTime>,
    pub latitude: f64,  // 0.0 together with longitude == "no coordinates"
    pub longitude: f64,
    pub venue: String,
    pub address: String,
    pub district: String,
    pub details_url: String,
    pub sources: Vec<String>, // e.g. ["JSON", "CSV"]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<InclusionDecision>,
}

impl Event {
    /// Minimal record; parsers fill in the optional fields.
    pub fn new(kind: EventKind, source: &str, id: &str, title: &str, start: NaiveDateTime) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            start,
            end: None,
            latitude: 0.0,
            longitude: 0.0,
            venue: String::new(),
            address: String::new(),
            district: String::new(),
            details_url: String::new(),
            sources: vec![source.to_string()],
            kind,
            decision: None,
        }
    }

    pub fn has_coordinates(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Field-level checks every parser applies before emitting a record.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("missing id".into());
        }
        if self.title.trim().is_empty() {
            return Err("missing title".into());
        }
        if self.has_coordinates() {
            let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
            let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
            if !(lat_ok && lon_ok) {
                return Err(format!(
                    "coordinates out of range: lat={} lon={}",
                    self.latitude, self.longitude
                ));
            }
        }
        Ok(())
    }

    /// Set the end time, dropping values that precede the start.
    pub fn set_end(&mut self, end: Option<NaiveDateTime>) {
        self.end = end.filter(|e| *e >= self.start);
    }

    /// End time used for duration and overlap checks: explicit end, else start + 2h.
    pub fn effective_end(&self) -> NaiveDateTime {
        self.end
            .unwrap_or_else(|| self.start + chrono::Duration::hours(2))
    }
}

/// How the pipeline recovered from a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// One record was dropped; the rest of the payload was parsed.
    Skipped,
    /// The whole source produced nothing this run.
    SourceSkipped,
}

/// A record (or a whole source) that could not be normalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseError {
    pub source: String,
    pub index: Option<usize>,
    pub context: String, // short raw snippet for diagnostics
    pub error: String,
    pub recovery: Recovery,
}

impl ParseError {
    pub fn record(source: &str, index: usize, context: &str, error: impl ToString) -> Self {
        Self {
            source: source.to_string(),
            index: Some(index),
            context: snippet(context),
            error: error.to_string(),
            recovery: Recovery::Skipped,
        }
    }

    pub fn source_level(source: &str, error: impl ToString) -> Self {
        Self {
            source: source.to_string(),
            index: None,
            context: String::new(),
            error: error.to_string(),
            recovery: Recovery::SourceSkipped,
        }
    }
}

fn snippet(raw: &str) -> String {
    const MAX: usize = 160;
    let flat = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX {
        let mut out: String = flat.chars().take(MAX).collect();
        out.push('…');
        out
    } else {
        flat
    }
}

/// Output of parsing one payload: never fails as a whole.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub events: Vec<Event>,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    /// Validate and route a converted record into events or errors.
    pub(crate) fn push_checked(
        &mut self,
        source: &str,
        index: usize,
        context: &str,
        converted: std::result::Result<Event, String>,
    ) {
        match converted.and_then(|ev| ev.validate().map(|_| ev)) {
            Ok(ev) => self.events.push(ev),
            Err(e) => self.errors.push(ParseError::record(source, index, context, e)),
        }
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<ParseOutcome>;
    /// Provenance tag stamped on every record, e.g. "JSON".
    fn tag(&self) -> &str;
    fn kind(&self) -> EventKind;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, 6)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap()
    }

    #[test]
    fn coordinates_both_zero_are_valid() {
        let ev = Event::new(EventKind::Cultural, "JSON", "1", "Concierto", start());
        assert!(!ev.has_coordinates());
        assert!(ev.validate().is_ok());
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let mut ev = Event::new(EventKind::Cultural, "JSON", "1", "Concierto", start());
        ev.latitude = 140.0;
        ev.longitude = -3.7;
        assert!(ev.validate().unwrap_err().contains("out of range"));
    }

    #[test]
    fn blank_title_is_rejected() {
        let ev = Event::new(EventKind::City, "CITY", "1", "  ", start());
        assert_eq!(ev.validate().unwrap_err(), "missing title");
    }

    #[test]
    fn effective_end_defaults_to_two_hours() {
        let ev = Event::new(EventKind::City, "CITY", "1", "x", start());
        assert_eq!(ev.effective_end() - ev.start, chrono::Duration::hours(2));
    }

    #[test]
    fn snippet_is_flattened_and_capped() {
        let raw = format!("a\n   b {}", "x".repeat(400));
        let e = ParseError::record("CSV", 3, &raw, "bad");
        assert!(e.context.starts_with("a b "));
        assert!(e.context.chars().count() <= 161);
        assert_eq!(e.recovery, Recovery::Skipped);
    }
}
