// src/ingest/feed.rs
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::fetch::Fetcher;
use crate::ingest::config::Endpoint;
use crate::ingest::providers;
use crate::ingest::types::{EventKind, ParseOutcome, SourceProvider};

/// A configured endpoint fetched through the shared [`Fetcher`] and parsed by format.
pub struct FeedProvider {
    endpoint: Endpoint,
    fetcher: Arc<Fetcher>,
}

impl FeedProvider {
    pub fn new(endpoint: Endpoint, fetcher: Arc<Fetcher>) -> Self {
        Self { endpoint, fetcher }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl SourceProvider for FeedProvider {
    async fn fetch_latest(&self) -> Result<ParseOutcome> {
        let body = self
            .fetcher
            .fetch(&self.endpoint.url, &[], false)
            .await
            .with_context(|| format!("fetching {} feed", self.tag()))?;
        Ok(providers::parse(self.endpoint.format, &body))
    }

    fn tag(&self) -> &str {
        self.endpoint.format.tag()
    }

    fn kind(&self) -> EventKind {
        self.endpoint.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetcherConfig;
    use crate::ingest::providers::FeedFormat;

    #[tokio::test]
    async fn parses_local_payload_by_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenda.json");
        std::fs::write(
            &path,
            r#"{"@graph":[{"id":"E1","title":"Concierto","dtstart":"2024-11-06 19:00:00.0"}]}"#,
        )
        .unwrap();

        let mut cfg = FetcherConfig::new(dir.path().join("cache"));
        cfg.strict_offline = true;
        let fetcher = Arc::new(Fetcher::new(cfg).unwrap());
        let url = reqwest::Url::from_file_path(&path).unwrap().to_string();
        let p = FeedProvider::new(Endpoint::new(FeedFormat::CulturalJson, url), fetcher);

        let out = p.fetch_latest().await.unwrap();
        assert_eq!(p.tag(), "JSON");
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].sources, vec!["JSON".to_string()]);
    }

    #[tokio::test]
    async fn fetch_failure_is_an_error_naming_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = FetcherConfig::new(dir.path());
        cfg.strict_offline = true;
        let fetcher = Arc::new(Fetcher::new(cfg).unwrap());
        let p = FeedProvider::new(
            Endpoint::new(FeedFormat::CityXml, "https://www.esmadrid.com/agenda.xml"),
            fetcher,
        );
        let err = p.fetch_latest().await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("CITY"), "{msg}");
        assert!(msg.contains("blocked"), "{msg}");
    }
}
