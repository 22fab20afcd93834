// src/fetch/cache.rs
//! On-disk HTTP cache: one JSON document per URL, named by the URL's SHA-256.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One cached response. Replaced wholesale on every write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub url: String,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub status: u16,
}

impl CacheEntry {
    pub fn new(url: &str, body: Vec<u8>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            url: url.to_string(),
            body,
            last_modified: None,
            etag: None,
            fetched_at,
            status: 200,
        }
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        STANDARD.decode(raw).map_err(serde::de::Error::custom)
    }
}

/// TTL applied to every URL containing `pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlOverride {
    pub pattern: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    default_ttl: Duration,
    overrides: Vec<TtlOverride>,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, default_ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            default_ttl,
            overrides: Vec::new(),
        }
    }

    /// Register a TTL override. Earlier registrations win over later ones.
    pub fn with_override(mut self, pattern: &str, ttl: Duration) -> Self {
        self.overrides.push(TtlOverride {
            pattern: pattern.to_string(),
            ttl,
        });
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        let mut out = String::with_capacity(64);
        for b in digest.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::key(url)))
    }

    pub fn ttl_for(&self, url: &str) -> Duration {
        self.overrides
            .iter()
            .find(|o| url.contains(&o.pattern))
            .map(|o| o.ttl)
            .unwrap_or(self.default_ttl)
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl_for(&entry.url))
            .unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(entry.fetched_at) <= ttl
    }

    /// Read the entry for `url`, fresh or stale. `Ok(None)` when absent.
    pub fn get(&self, url: &str) -> io::Result<Option<CacheEntry>> {
        let raw = match fs::read(self.path_for(url)) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let entry: CacheEntry = serde_json::from_slice(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // A digest collision would hand back another URL's body.
        if entry.url != url {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub fn get_fresh(&self, url: &str, now: DateTime<Utc>) -> io::Result<Option<CacheEntry>> {
        Ok(self.get(url)?.filter(|e| self.is_fresh(e, now)))
    }

    /// Atomic write: temp file in the cache dir, then rename over the target.
    pub fn put(&self, entry: &CacheEntry) -> io::Result<()> {
        static SEQ: AtomicU64 = AtomicU64::new(0);

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&entry.url);
        let tmp = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let json = serde_json::to_vec(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let write = || -> io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://datos.madrid.es/egob/catalogo/206974-0-agenda-eventos-culturales-100.json";

    #[test]
    fn key_is_stable_sha256_hex() {
        let k = DiskCache::key("https://example.test/a");
        assert_eq!(k.len(), 64);
        assert_eq!(k, DiskCache::key("https://example.test/a"));
        assert_ne!(k, DiskCache::key("https://example.test/b"));
    }

    #[test]
    fn roundtrip_preserves_binary_body_and_validators() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(3600));
        let mut entry = CacheEntry::new(URL, vec![0, 159, 255, b'{'], Utc::now());
        entry.last_modified = Some("Wed, 06 Nov 2024 10:00:00 GMT".into());
        entry.etag = Some("\"abc\"".into());
        cache.put(&entry).unwrap();

        assert_eq!(cache.get(URL).unwrap(), Some(entry));
        assert_eq!(cache.get("https://other.test/").unwrap(), None);
        // no temp files left behind
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[test]
    fn ttl_override_turns_stale_entry_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let entry = CacheEntry::new(URL, b"{}".to_vec(), now - chrono::Duration::hours(2));

        let plain = DiskCache::new(dir.path(), Duration::from_secs(3600));
        plain.put(&entry).unwrap();
        assert!(plain.get_fresh(URL, now).unwrap().is_none());

        let with_override = DiskCache::new(dir.path(), Duration::from_secs(3600))
            .with_override("agenda-eventos-culturales", Duration::from_secs(6 * 3600));
        assert!(with_override.get_fresh(URL, now).unwrap().is_some());
    }

    #[test]
    fn first_registered_override_wins() {
        let cache = DiskCache::new("unused", Duration::from_secs(60))
            .with_override("madrid.es", Duration::from_secs(10))
            .with_override("datos.madrid.es", Duration::from_secs(20));
        assert_eq!(cache.ttl_for(URL), Duration::from_secs(10));
        assert_eq!(cache.ttl_for("https://esmadrid.com/x"), Duration::from_secs(60));
    }

    #[test]
    fn corrupt_entry_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60));
        fs::write(cache.path_for(URL), b"not json").unwrap();
        assert_eq!(
            cache.get(URL).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }
}
