// src/config/mod.rs
//! Application configuration: TOML file plus a few env overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::fetch::cache::TtlOverride;
use crate::fetch::FetcherConfig;
use crate::filter::geo::GeoPoint;
use crate::filter::FilterConfig;
use crate::group::GroupConfig;
use crate::ingest::config::SourcesConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/events.toml";
pub const ENV_CONFIG_PATH: &str = "EVENTS_CONFIG_PATH";
pub const ENV_FETCH_MODE: &str = "EVENTS_FETCH_MODE";

/// Ten years; anything longer is a typo.
pub const MAX_PAST_EVENTS_WEEKS: u32 = 520;

/// Fetch profile; selects default cache TTL and per-host delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Production,
    Development,
}

impl FetchMode {
    pub fn default_ttl(self) -> Duration {
        match self {
            FetchMode::Production => Duration::from_secs(3600),
            FetchMode::Development => Duration::from_secs(24 * 3600),
        }
    }

    pub fn min_delay(self) -> Duration {
        match self {
            FetchMode::Production => Duration::from_secs(2),
            FetchMode::Development => Duration::from_millis(500),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(FetchMode::Production),
            "development" | "dev" => Some(FetchMode::Development),
            _ => None,
        }
    }
}

fn default_latitude() -> f64 {
    GeoPoint::PLAZA_DE_ESPANA.latitude
}
fn default_longitude() -> f64 {
    GeoPoint::PLAZA_DE_ESPANA.longitude
}
fn default_radius_km() -> f64 {
    1.0
}
fn default_timezone() -> String {
    "Europe/Madrid".into()
}
fn default_distritos() -> Vec<String> {
    vec!["CENTRO".into(), "MONCLOA-ARAVACA".into()]
}
fn default_past_weeks() -> u32 {
    2
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}
fn default_audit_path() -> PathBuf {
    PathBuf::from("data/fetch_audit.json")
}

#[derive(Debug, Clone, Deserialize)]
struct Root {
    #[serde(default)]
    sources: SourcesConfig,
    #[serde(default)]
    location: LocationSection,
    #[serde(default)]
    filter: FilterSection,
    #[serde(default)]
    fetch: FetchSection,
}

#[derive(Debug, Clone, Deserialize)]
struct LocationSection {
    #[serde(default = "default_latitude")]
    latitude: f64,
    #[serde(default = "default_longitude")]
    longitude: f64,
    #[serde(default = "default_radius_km")]
    radius_km: f64,
    /// IANA zone the feeds write their wall-clock times in.
    #[serde(default = "default_timezone")]
    timezone: String,
}

impl Default for LocationSection {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            radius_km: default_radius_km(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FilterSection {
    #[serde(default = "default_distritos")]
    distritos: Vec<String>,
    #[serde(default = "default_past_weeks")]
    past_events_weeks: u32,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            distritos: default_distritos(),
            past_events_weeks: default_past_weeks(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TtlOverrideEntry {
    pattern: String,
    ttl_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FetchSection {
    #[serde(default)]
    mode: FetchMode,
    cache_dir: Option<PathBuf>,
    audit_path: Option<PathBuf>,
    inter_source_delay_ms: Option<u64>,
    min_delay_ms: Option<u64>,
    default_ttl_secs: Option<u64>,
    #[serde(default)]
    ttl_overrides: Vec<TtlOverrideEntry>,
}

/// Resolved fetch settings (mode defaults applied).
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub mode: FetchMode,
    pub cache_dir: PathBuf,
    pub audit_path: PathBuf,
    pub inter_source_delay: Duration,
    pub min_delay: Duration,
    pub default_ttl: Duration,
    pub ttl_overrides: Vec<TtlOverride>,
}

impl FetchSettings {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            default_ttl: self.default_ttl,
            ttl_overrides: self.ttl_overrides.clone(),
            min_delay: self.min_delay,
            ..FetcherConfig::new(self.cache_dir.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub filter: FilterConfig,
    pub fetch: FetchSettings,
    pub timezone: Tz,
}

impl AppConfig {
    /// `$EVENTS_CONFIG_PATH`, else `config/events.toml`; `$EVENTS_FETCH_MODE`
    /// replaces the file's fetch mode.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mode = match std::env::var(ENV_FETCH_MODE) {
            Ok(v) => Some(
                FetchMode::parse(&v)
                    .with_context(|| format!("{ENV_FETCH_MODE}={v:?} is not a fetch mode"))?,
            ),
            Err(_) => None,
        };
        Self::build(&content, mode).with_context(|| format!("in {}", path.display()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Self::build(s, None)
    }

    fn build(s: &str, mode_override: Option<FetchMode>) -> Result<Self> {
        let root: Root = toml::from_str(s).context("parsing events config")?;

        let loc = &root.location;
        if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude)
        {
            bail!(
                "location out of range: lat={} lon={}",
                loc.latitude,
                loc.longitude
            );
        }
        if !loc.radius_km.is_finite() || loc.radius_km <= 0.0 {
            bail!("location.radius_km must be a positive number, got {}", loc.radius_km);
        }
        let timezone: Tz = loc
            .timezone
            .parse()
            .map_err(|e| anyhow!("location.timezone {:?}: {e}", loc.timezone))?;
        if !(1..=MAX_PAST_EVENTS_WEEKS).contains(&root.filter.past_events_weeks) {
            bail!(
                "filter.past_events_weeks must be between 1 and {MAX_PAST_EVENTS_WEEKS}, got {}",
                root.filter.past_events_weeks
            );
        }

        let f = root.fetch;
        let mode = mode_override.unwrap_or(f.mode);
        let min_delay = f
            .min_delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| mode.min_delay());
        let fetch = FetchSettings {
            mode,
            cache_dir: f.cache_dir.unwrap_or_else(default_cache_dir),
            audit_path: f.audit_path.unwrap_or_else(default_audit_path),
            inter_source_delay: f
                .inter_source_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(min_delay),
            min_delay,
            default_ttl: f
                .default_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| mode.default_ttl()),
            ttl_overrides: f
                .ttl_overrides
                .into_iter()
                .map(|o| TtlOverride {
                    pattern: o.pattern,
                    ttl: Duration::from_secs(o.ttl_secs),
                })
                .collect(),
        };

        Ok(Self {
            sources: root.sources,
            filter: FilterConfig {
                reference: GeoPoint::new(loc.latitude, loc.longitude),
                radius_km: loc.radius_km,
                allowed_districts: root.filter.distritos,
                past_events_weeks: root.filter.past_events_weeks,
            },
            fetch,
            timezone,
        })
    }

    /// Wall-clock time in the feeds' zone, comparable with event start/end.
    pub fn local_time(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.timezone).naive_local()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.local_time(Utc::now())
    }

    pub fn group_config(&self) -> GroupConfig {
        GroupConfig {
            reference: self.filter.reference,
            ..GroupConfig::default()
        }
    }
}
