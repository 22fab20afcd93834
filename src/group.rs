// src/group.rs
//! Time windows relative to "now" for display: past weekend, today, this
//! weekend, this week, later this month, plus a separate ongoing list.
//!
//! A record may land in several windows. Nothing is cached between calls.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::filter::geo::GeoPoint;
use crate::filter::mentions_landmark;
use crate::ingest::types::{Event, EventKind};

const FUTURE_HORIZON_DAYS: i64 = 30;
const PAST_HORIZON_DAYS: i64 = 60;
const ONGOING_MIN_DAYS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    PastWeekend,
    Today,
    ThisWeekend,
    ThisWeek,
    LaterThisMonth,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::PastWeekend,
        Bucket::Today,
        Bucket::ThisWeekend,
        Bucket::ThisWeek,
        Bucket::LaterThisMonth,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Bucket::PastWeekend => "past weekend",
            Bucket::Today => "today",
            Bucket::ThisWeekend => "this weekend",
            Bucket::ThisWeek => "this week",
            Bucket::LaterThisMonth => "later this month",
        }
    }
}

/// Daily forecast as produced by the weather collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub temp_max_c: Option<f64>,
    #[serde(default)]
    pub temp_min_c: Option<f64>,
    #[serde(default)]
    pub precipitation_probability: Option<u8>,
}

/// `YYYY-MM-DD` → forecast. A missing date is not an error.
pub trait ForecastLookup {
    fn forecast_for(&self, date: &str) -> Option<Forecast>;
}

impl ForecastLookup for HashMap<String, Forecast> {
    fn forecast_for(&self, date: &str) -> Option<Forecast> {
        self.get(date).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub reference: GeoPoint,
    /// At or below this distance a record counts as "at the landmark".
    pub landmark_threshold_km: f64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            reference: GeoPoint::PLAZA_DE_ESPANA,
            landmark_threshold_km: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedEvent {
    pub event: Event,
    pub distance_km: Option<f64>,
    pub at_landmark: bool,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupCounts {
    pub at_landmark: usize,
    pub nearby: usize,
    pub total: usize,
}

impl GroupCounts {
    fn of(events: &[GroupedEvent]) -> Self {
        let at_landmark = events.iter().filter(|g| g.at_landmark).count();
        Self {
            at_landmark,
            nearby: events.len() - at_landmark,
            total: events.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeGroup {
    pub bucket: Bucket,
    pub events: Vec<GroupedEvent>,
    pub counts: GroupCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grouping {
    /// One group per bucket, in [`Bucket::ALL`] order, possibly empty.
    pub groups: Vec<TimeGroup>,
    pub ongoing: Vec<GroupedEvent>,
    pub ongoing_counts: GroupCounts,
}

impl Grouping {
    pub fn group(&self, bucket: Bucket) -> Option<&TimeGroup> {
        self.groups.iter().find(|g| g.bucket == bucket)
    }
}

/// Half-open `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Window {
    fn days(from: NaiveDate, days: i64) -> Self {
        let start = from.and_time(NaiveTime::MIN);
        Self {
            start,
            end: start + Duration::days(days),
        }
    }

    fn overlaps(&self, ev: &Event) -> bool {
        let end = ev.effective_end();
        ev.start < self.end && (end > self.start || ev.start >= self.start)
    }
}

struct Windows {
    past_weekend: Window,
    today: Window,
    this_weekend: Window,
    this_week: Window,
    later_this_month: Window,
}

impl Windows {
    fn at(now: NaiveDateTime) -> Self {
        let today = now.date();
        let wd = i64::from(today.weekday().num_days_from_monday()); // Mon=0 .. Sun=6

        // Saturday of the current weekend if we are in one, else the last one.
        let days_since_sat = (wd + 2) % 7;
        let mut past_sat = today - Duration::days(days_since_sat);
        if days_since_sat <= 1 {
            past_sat -= Duration::days(7);
        }

        let friday = if wd >= 4 {
            today - Duration::days(wd - 4)
        } else {
            today + Duration::days(4 - wd)
        };
        let this_weekend = Window::days(friday, 3);

        let first_of_next_month = if today.month() == 12 {
            NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
        }
        .unwrap_or(today + Duration::days(31));

        let today_w = Window::days(today, 1);
        Self {
            past_weekend: Window::days(past_sat, 2),
            today: today_w,
            this_weekend,
            this_week: Window::days(today, 7),
            later_this_month: Window {
                start: today_w.start,
                end: first_of_next_month.and_time(NaiveTime::MIN),
            },
        }
    }

    fn buckets_for(&self, ev: &Event) -> Vec<Bucket> {
        let mut out = Vec::new();
        if self.past_weekend.overlaps(ev) {
            out.push(Bucket::PastWeekend);
        }
        if self.today.overlaps(ev) {
            out.push(Bucket::Today);
        }
        if self.this_weekend.overlaps(ev) {
            out.push(Bucket::ThisWeekend);
        }
        if out.is_empty() {
            if self.this_week.overlaps(ev) {
                out.push(Bucket::ThisWeek);
            } else if self.later_this_month.overlaps(ev) {
                out.push(Bucket::LaterThisMonth);
            }
        }
        out
    }
}

fn kind_rank(kind: EventKind) -> u8 {
    match kind {
        EventKind::City => 0,
        EventKind::Cultural => 1,
    }
}

fn sort_events(events: &mut [GroupedEvent]) {
    events.sort_by(|a, b| {
        a.event
            .start
            .cmp(&b.event.start)
            .then_with(|| kind_rank(a.event.kind).cmp(&kind_rank(b.event.kind)))
            .then_with(|| a.event.id.cmp(&b.event.id))
    });
}

fn annotate(ev: &Event, cfg: &GroupConfig, weather: &dyn ForecastLookup) -> GroupedEvent {
    let distance_km = ev
        .has_coordinates()
        .then(|| cfg.reference.distance_km(&GeoPoint::new(ev.latitude, ev.longitude)));
    let at_landmark =
        distance_km.is_some_and(|d| d <= cfg.landmark_threshold_km) || mentions_landmark(ev);
    let date = ev.start.date().format("%Y-%m-%d").to_string();
    GroupedEvent {
        event: ev.clone(),
        distance_km,
        at_landmark,
        forecast: weather.forecast_for(&date),
    }
}

/// Bucket kept records around `now`. Records carrying a rejecting decision are skipped.
pub fn group_events(
    events: &[Event],
    now: NaiveDateTime,
    cfg: &GroupConfig,
    weather: &dyn ForecastLookup,
) -> Grouping {
    let windows = Windows::at(now);
    let day_start = now.date().and_time(NaiveTime::MIN);
    let horizon_end = now + Duration::days(FUTURE_HORIZON_DAYS);
    let horizon_start = now - Duration::days(PAST_HORIZON_DAYS);

    let mut per_bucket: HashMap<Bucket, Vec<GroupedEvent>> = HashMap::new();
    let mut ongoing = Vec::new();

    for ev in events {
        if ev.decision.as_ref().is_some_and(|d| !d.kept) {
            continue;
        }
        let end = ev.effective_end();
        if ev.start > horizon_end || end < horizon_start {
            continue;
        }

        if end - ev.start >= Duration::days(ONGOING_MIN_DAYS) {
            if end >= day_start {
                ongoing.push(annotate(ev, cfg, weather));
            }
            continue;
        }

        let buckets = windows.buckets_for(ev);
        if buckets.is_empty() {
            continue;
        }
        let g = annotate(ev, cfg, weather);
        for b in buckets {
            per_bucket.entry(b).or_default().push(g.clone());
        }
    }

    let groups = Bucket::ALL
        .iter()
        .map(|&bucket| {
            let mut events = per_bucket.remove(&bucket).unwrap_or_default();
            sort_events(&mut events);
            TimeGroup {
                bucket,
                counts: GroupCounts::of(&events),
                events,
            }
        })
        .collect::<Vec<_>>();
    sort_events(&mut ongoing);

    tracing::debug!(
        target: "group",
        ongoing = ongoing.len(),
        today = groups[1].counts.total,
        this_weekend = groups[2].counts.total,
        "grouped"
    );

    Grouping {
        groups,
        ongoing_counts: GroupCounts::of(&ongoing),
        ongoing,
    }
}
