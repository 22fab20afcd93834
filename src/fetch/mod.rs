// src/fetch/mod.rs
//! Caching, throttled, audited fetch of one URL.
//!
//! - `file://` reads local disk (fixtures), no cache, no throttle.
//! - `http(s)://` goes through cache → throttle → conditional GET.
//! - any other scheme, or a bare key without `scheme://`, is a synthetic key
//!   served from the cache only.
//!
//! Nothing here retries: rate limiting and failures are classified and handed back.

pub mod audit;
pub mod cache;
pub mod throttle;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::Url;
use thiserror::Error;

use crate::fetch::audit::{AuditLog, AuditRecord};
use crate::fetch::cache::{CacheEntry, DiskCache, TtlOverride};
use crate::fetch::throttle::Throttle;

/// When truthy, every non-loopback http(s) fetch fails with `NetworkBlocked`.
pub const ENV_NO_NETWORK: &str = "EVENTS_NO_NETWORK";

const USER_AGENT: &str = concat!("plaza-events/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("external call to {url} blocked (EVENTS_NO_NETWORK is set)")]
    NetworkBlocked { url: String },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("reading {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no cached entry for {url}")]
    CacheMiss { url: String },

    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("rate limited by {url} (HTTP {status})")]
    RateLimited { url: String, status: u16 },

    #[error("unexpected HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("reading response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

pub fn is_rate_limit_status(status: u16) -> bool {
    matches!(status, 429 | 403 | 503)
}

/// Truthy env flag: `1`, `true`, `yes`, `on` (case-insensitive).
pub fn network_blocked_by_env() -> bool {
    std::env::var(ENV_NO_NETWORK)
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

fn is_loopback(url: &Url) -> bool {
    let host = url.host_str().unwrap_or_default();
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.eq_ignore_ascii_case("localhost")
        || bare
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub cache_dir: PathBuf,
    pub default_ttl: Duration,
    pub ttl_overrides: Vec<TtlOverride>,
    pub min_delay: Duration,
    pub timeout: Duration,
    /// Block external calls regardless of the environment.
    pub strict_offline: bool,
}

impl FetcherConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            default_ttl: Duration::from_secs(3600),
            ttl_overrides: Vec::new(),
            min_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            strict_offline: false,
        }
    }
}

/// Shared by every caller of a build (sources, weather sub-fetch); hold it in an `Arc`.
#[derive(Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    cache: DiskCache,
    throttle: Throttle,
    audit: AuditLog,
    strict_offline: bool,
}

impl Fetcher {
    pub fn new(cfg: FetcherConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(cfg.timeout)
            .build()?;
        let cache = cfg
            .ttl_overrides
            .iter()
            .fold(DiskCache::new(cfg.cache_dir, cfg.default_ttl), |c, o| {
                c.with_override(&o.pattern, o.ttl)
            });
        Ok(Self {
            client,
            cache,
            throttle: Throttle::new(cfg.min_delay),
            audit: AuditLog::new(),
            strict_offline: cfg.strict_offline,
        })
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn network_blocked(&self) -> bool {
        self.strict_offline || network_blocked_by_env()
    }

    /// Fetch `url`, returning the body bytes.
    ///
    /// `headers` are sent verbatim on network requests; `skip_cache` forces a
    /// full network round trip (no fresh-hit shortcut, no conditional headers).
    pub async fn fetch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        skip_cache: bool,
    ) -> Result<Vec<u8>, FetchError> {
        if !url.contains("://") {
            return self.fetch_synthetic(url);
        }
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                self.audit
                    .push(AuditRecord::failed(url, None, Duration::ZERO, false, &e));
                return Err(FetchError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        match parsed.scheme() {
            "file" => self.fetch_file(url, &parsed).await,
            "http" | "https" => self.fetch_http(url, &parsed, headers, skip_cache).await,
            _ => self.fetch_synthetic(url),
        }
    }

    /// Persist derived bytes under a synthetic key such as `cache://weather/forecast.json`.
    pub fn store_synthetic(&self, url: &str, body: Vec<u8>) -> std::io::Result<()> {
        self.cache.put(&CacheEntry::new(url, body, Utc::now()))
    }

    async fn fetch_file(&self, url: &str, parsed: &Url) -> Result<Vec<u8>, FetchError> {
        let path = match parsed.to_file_path() {
            Ok(p) => p,
            Err(()) => {
                self.audit.push(AuditRecord::failed(
                    url,
                    None,
                    Duration::ZERO,
                    false,
                    "not a local file path",
                ));
                return Err(FetchError::InvalidUrl {
                    url: url.to_string(),
                    reason: "not a local file path".into(),
                });
            }
        };
        match tokio::fs::read(&path).await {
            Ok(body) => {
                self.audit
                    .push(AuditRecord::fetched(url, None, Duration::ZERO));
                Ok(body)
            }
            Err(e) => {
                self.audit
                    .push(AuditRecord::failed(url, None, Duration::ZERO, false, &e));
                Err(FetchError::File { path, source: e })
            }
        }
    }

    fn fetch_synthetic(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match self.cache.get_fresh(url, Utc::now()) {
            Ok(Some(entry)) => {
                counter!("fetch_cache_hits_total").increment(1);
                self.audit
                    .push(AuditRecord::cache_hit(url, Some(entry.status), Duration::ZERO));
                Ok(entry.body)
            }
            Ok(None) => {
                self.audit.push(AuditRecord::failed(
                    url,
                    None,
                    Duration::ZERO,
                    false,
                    "synthetic cache miss",
                ));
                Err(FetchError::CacheMiss {
                    url: url.to_string(),
                })
            }
            Err(e) => {
                tracing::warn!(target: "fetch", url, error = %e, "cache read failed");
                self.audit
                    .push(AuditRecord::failed(url, None, Duration::ZERO, false, &e));
                Err(FetchError::CacheMiss {
                    url: url.to_string(),
                })
            }
        }
    }

    async fn fetch_http(
        &self,
        url: &str,
        parsed: &Url,
        headers: &[(&str, &str)],
        skip_cache: bool,
    ) -> Result<Vec<u8>, FetchError> {
        if self.network_blocked() && !is_loopback(parsed) {
            self.audit.push(AuditRecord::failed(
                url,
                None,
                Duration::ZERO,
                false,
                "network blocked",
            ));
            return Err(FetchError::NetworkBlocked {
                url: url.to_string(),
            });
        }

        let cached = if skip_cache {
            None
        } else {
            self.cache.get(url).unwrap_or_else(|e| {
                tracing::warn!(target: "fetch", url, error = %e, "ignoring unreadable cache entry");
                None
            })
        };

        if let Some(entry) = cached.as_ref().filter(|e| self.cache.is_fresh(e, Utc::now())) {
            tracing::debug!(target: "fetch", url, "cache hit");
            counter!("fetch_cache_hits_total").increment(1);
            self.audit
                .push(AuditRecord::cache_hit(url, Some(entry.status), Duration::ZERO));
            return Ok(entry.body.clone());
        }

        let host = parsed.host_str().unwrap_or_default().to_string();
        let delay = self.throttle.wait(&host).await;

        let mut req = self.client.get(parsed.clone());
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        if let Some(entry) = &cached {
            if let Some(lm) = &entry.last_modified {
                req = req.header(IF_MODIFIED_SINCE, lm);
            }
            if let Some(tag) = &entry.etag {
                req = req.header(IF_NONE_MATCH, tag);
            }
        }

        counter!("fetch_requests_total").increment(1);
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "fetch", url, error = %e, "transport failure");
                self.audit
                    .push(AuditRecord::failed(url, None, delay, false, &e));
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    source: e,
                });
            }
        };

        let status = resp.status().as_u16();
        if status == 304 {
            if let Some(entry) = cached {
                return Ok(self.revalidated(entry, delay));
            }
        }
        if is_rate_limit_status(status) {
            tracing::warn!(target: "fetch", url, status, "rate limited");
            counter!("fetch_rate_limited_total").increment(1);
            self.audit.push(AuditRecord::failed(
                url,
                Some(status),
                delay,
                true,
                format!("rate limited (HTTP {status})"),
            ));
            return Err(FetchError::RateLimited {
                url: url.to_string(),
                status,
            });
        }
        if status != 200 {
            self.audit.push(AuditRecord::failed(
                url,
                Some(status),
                delay,
                false,
                format!("HTTP {status}"),
            ));
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let header = |name: reqwest::header::HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let last_modified = header(LAST_MODIFIED);
        let etag = header(ETAG);

        let body = match resp.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) => {
                self.audit
                    .push(AuditRecord::failed(url, Some(status), delay, false, &e));
                return Err(FetchError::Body {
                    url: url.to_string(),
                    source: e,
                });
            }
        };

        let entry = CacheEntry {
            last_modified,
            etag,
            status,
            ..CacheEntry::new(url, body, Utc::now())
        };
        if let Err(e) = self.cache.put(&entry) {
            tracing::warn!(target: "fetch", url, error = %e, "cache write failed");
        }
        tracing::debug!(target: "fetch", url, status, bytes = entry.body.len(), delay_ms = delay.as_millis() as u64, "fetched");
        self.audit
            .push(AuditRecord::fetched(url, Some(status), delay));
        Ok(entry.body)
    }

    /// 304: keep the cached body, restart its TTL.
    fn revalidated(&self, entry: CacheEntry, delay: Duration) -> Vec<u8> {
        let refreshed = CacheEntry {
            fetched_at: Utc::now(),
            ..entry
        };
        if let Err(e) = self.cache.put(&refreshed) {
            tracing::warn!(target: "fetch", url = %refreshed.url, error = %e, "cache write failed");
        }
        counter!("fetch_cache_hits_total").increment(1);
        self.audit
            .push(AuditRecord::cache_hit(&refreshed.url, Some(304), delay));
        refreshed.body
    }
}
