// src/filter/mod.rs
//! Inclusion rules around the reference point. Every record gets a decision;
//! rejected records stay in the set so they can be audited later.

pub mod geo;
pub mod text;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::filter::geo::GeoPoint;
use crate::ingest::types::{Event, EventKind};

/// Why a record was kept or rejected. Exactly one per decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "kept")]
    Kept,
    #[serde(rename = "kept (multi-venue)")]
    KeptMultiVenue,
    #[serde(rename = "outside target distrito")]
    OutsideDistrito,
    #[serde(rename = "outside GPS radius")]
    OutsideRadius,
    #[serde(rename = "missing location data")]
    MissingLocation,
    #[serde(rename = "event too old")]
    TooOld,
}

impl Reason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Reason::Kept => "kept",
            Reason::KeptMultiVenue => "kept (multi-venue)",
            Reason::OutsideDistrito => "outside target distrito",
            Reason::OutsideRadius => "outside GPS radius",
            Reason::MissingLocation => "missing location data",
            Reason::TooOld => "event too old",
        }
    }

    pub const fn is_kept(self) -> bool {
        matches!(self, Reason::Kept | Reason::KeptMultiVenue)
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionDecision {
    pub has_district: bool,
    pub district_matched: bool,
    pub has_coordinates: bool,
    /// Distance to the reference point; `None` without coordinates.
    pub distance_km: Option<f64>,
    pub within_radius: bool,
    pub text_matched: bool,
    pub multi_venue_kept: bool,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub age_days: i64,
    pub too_old: bool,
    pub kept: bool,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub reference: GeoPoint,
    pub radius_km: f64,
    /// Allowed cultural districts, compared accent- and case-insensitively.
    pub allowed_districts: Vec<String>,
    pub past_events_weeks: u32,
}

impl FilterConfig {
    /// Records ending (city) or starting (cultural) before this are too old.
    /// Saturates at the earliest representable instant, so nothing is too old.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        Duration::try_days(i64::from(self.past_events_weeks) * 7)
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(NaiveDateTime::MIN)
    }

    fn district_allowed(&self, district: &str) -> bool {
        let key = text::district_key(district);
        self.allowed_districts
            .iter()
            .any(|d| text::district_key(d) == key)
    }
}

fn base_decision(ev: &Event, cfg: &FilterConfig, now: NaiveDateTime) -> InclusionDecision {
    let has_coordinates = ev.has_coordinates();
    let distance_km = has_coordinates
        .then(|| cfg.reference.distance_km(&GeoPoint::new(ev.latitude, ev.longitude)));
    InclusionDecision {
        has_district: !ev.district.trim().is_empty(),
        district_matched: false,
        has_coordinates,
        distance_km,
        within_radius: distance_km.is_some_and(|d| d <= cfg.radius_km),
        text_matched: mentions_landmark(ev),
        multi_venue_kept: false,
        start: ev.start,
        end: ev.end,
        age_days: (now - ev.start).num_days(),
        too_old: false,
        kept: false,
        reason: Reason::Kept,
    }
}

/// Landmark mention anywhere across title, venue, address or description.
pub fn mentions_landmark(ev: &Event) -> bool {
    text::mentions_landmark([
        ev.title.as_str(),
        ev.venue.as_str(),
        ev.address.as_str(),
        ev.description.as_str(),
    ])
}

fn finish(mut d: InclusionDecision, reason: Reason) -> InclusionDecision {
    d.kept = reason.is_kept();
    d.multi_venue_kept = reason == Reason::KeptMultiVenue;
    d.reason = reason;
    d
}

/// District first, then GPS, then keep by default; age is checked last and
/// overrides any location outcome.
pub fn classify_cultural(ev: &Event, cfg: &FilterConfig, now: NaiveDateTime) -> InclusionDecision {
    let mut d = base_decision(ev, cfg, now);

    let located = if d.has_district {
        d.district_matched = cfg.district_allowed(&ev.district);
        if d.district_matched {
            Reason::Kept
        } else {
            Reason::OutsideDistrito
        }
    } else if d.has_coordinates && !d.within_radius {
        Reason::OutsideRadius
    } else {
        // no location data at all is not a reason to drop a real event
        Reason::Kept
    };

    d.too_old = ev.start < cfg.cutoff(now);
    let reason = if d.too_old { Reason::TooOld } else { located };
    finish(d, reason)
}

/// GPS wins over text when coordinates place the record inside the radius;
/// text only rescues records without coordinates or outside the radius.
pub fn classify_city(ev: &Event, cfg: &FilterConfig, now: NaiveDateTime) -> InclusionDecision {
    let mut d = base_decision(ev, cfg, now);

    let candidate = if !d.has_coordinates {
        if d.text_matched {
            Reason::KeptMultiVenue
        } else {
            Reason::MissingLocation
        }
    } else if d.within_radius {
        Reason::Kept
    } else if d.text_matched {
        Reason::KeptMultiVenue
    } else {
        Reason::OutsideRadius
    };

    d.too_old = ev.end.unwrap_or(ev.start) < cfg.cutoff(now);
    let reason = if candidate.is_kept() && d.too_old {
        Reason::TooOld
    } else {
        candidate
    };
    finish(d, reason)
}

pub fn classify(ev: &Event, cfg: &FilterConfig, now: NaiveDateTime) -> InclusionDecision {
    match ev.kind {
        EventKind::Cultural => classify_cultural(ev, cfg, now),
        EventKind::City => classify_city(ev, cfg, now),
    }
}

/// Attach a decision to every record. Returns how many were kept.
pub fn classify_all(events: &mut [Event], cfg: &FilterConfig, now: NaiveDateTime) -> usize {
    let mut kept = 0;
    for ev in events.iter_mut() {
        let d = classify(ev, cfg, now);
        if d.kept {
            kept += 1;
        } else {
            tracing::trace!(target: "filter", id = %ev.id, reason = %d.reason, "rejected");
        }
        ev.decision = Some(d);
    }
    tracing::debug!(target: "filter", total = events.len(), kept, "classified");
    kept
}
