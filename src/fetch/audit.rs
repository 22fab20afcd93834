//! Append-only log of every fetch attempt, exported at the end of a run.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub cache_hit: bool,
    pub status: Option<u16>,
    pub delay_ms: u64,
    pub rate_limited: bool,
    pub error: Option<String>,
}

impl AuditRecord {
    fn base(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timestamp: Utc::now(),
            cache_hit: false,
            status: None,
            delay_ms: 0,
            rate_limited: false,
            error: None,
        }
    }

    /// Served from cache (fresh entry, synthetic key or 304 revalidation).
    pub fn cache_hit(url: &str, status: Option<u16>, delay: Duration) -> Self {
        Self {
            cache_hit: true,
            status,
            delay_ms: delay.as_millis() as u64,
            ..Self::base(url)
        }
    }

    /// Body came from the network or from local disk.
    pub fn fetched(url: &str, status: Option<u16>, delay: Duration) -> Self {
        Self {
            status,
            delay_ms: delay.as_millis() as u64,
            ..Self::base(url)
        }
    }

    pub fn failed(
        url: &str,
        status: Option<u16>,
        delay: Duration,
        rate_limited: bool,
        error: impl ToString,
    ) -> Self {
        Self {
            status,
            delay_ms: delay.as_millis() as u64,
            rate_limited,
            error: Some(error.to_string()),
            ..Self::base(url)
        }
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, rec: AuditRecord) {
        let mut v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.push(rec);
    }

    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write all records as a JSON array (tmp file + rename).
    pub fn export_json(&self, path: &Path) -> io::Result<()> {
        let records = self.snapshot();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&json)?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}
