// src/ingest/mod.rs
pub mod config;
pub mod feed;
pub mod providers;
pub mod types;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::ingest::types::{Event, EventKind, ParseError, SourceProvider};

/// One-time metrics registration (so series show up once a recorder is installed).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Records parsed from feeds.");
        describe_counter!(
            "ingest_parse_errors_total",
            "Records (or whole sources) skipped during parsing."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Sources that failed to fetch or faulted."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("fetch_requests_total", "Network requests issued.");
        describe_counter!("fetch_cache_hits_total", "Fetches served from the disk cache.");
        describe_counter!("fetch_rate_limited_total", "Responses classified as rate limiting.");
    });
}

/// Normalize feed text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp left over from entity decoding)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 4000 chars
    if out.chars().count() > 4000 {
        out = out.chars().take(4000).collect();
    }

    out
}

/// Events and errors of one source, kept apart from every other source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceResult {
    pub tag: String,
    pub kind: EventKind,
    pub events: Vec<Event>,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestResults {
    pub sources: Vec<SourceResult>,
}

impl IngestResults {
    pub fn source(&self, tag: &str) -> Option<&SourceResult> {
        self.sources.iter().find(|s| s.tag == tag)
    }

    /// Per-source results of one category, in fetch order.
    pub fn of_kind(&self, kind: EventKind) -> Vec<SourceResult> {
        self.sources
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }

    pub fn total_events(&self) -> usize {
        self.sources.iter().map(|s| s.events.len()).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.sources.iter().map(|s| s.errors.len()).sum()
    }
}

/// Drives one fetch+parse per source, sequentially, with a pause between sources.
pub struct Orchestrator {
    providers: Vec<Arc<dyn SourceProvider>>,
    inter_source_delay: Duration,
}

impl Orchestrator {
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>, inter_source_delay: Duration) -> Self {
        Self {
            providers,
            inter_source_delay,
        }
    }

    pub async fn fetch_all(&self) -> IngestResults {
        ensure_metrics_described();

        let mut results = IngestResults::default();
        for (i, p) in self.providers.iter().enumerate() {
            if i > 0 && !self.inter_source_delay.is_zero() {
                tokio::time::sleep(self.inter_source_delay).await;
            }
            results.sources.push(run_isolated(Arc::clone(p)).await);
        }

        tracing::info!(
            target: "ingest",
            sources = results.sources.len(),
            events = results.total_events(),
            errors = results.total_errors(),
            "ingest pass finished"
        );
        results
    }
}

/// Fault boundary for one source: errors and panics both become a single
/// source-level `ParseError`.
async fn run_isolated(p: Arc<dyn SourceProvider>) -> SourceResult {
    let tag = p.tag().to_string();
    let kind = p.kind();

    let task = {
        let p = Arc::clone(&p);
        tokio::spawn(async move { p.fetch_latest().await })
    };

    let (events, errors) = match task.await {
        Ok(Ok(out)) => (out.events, out.errors),
        Ok(Err(e)) => {
            tracing::warn!(target: "ingest", error = %format!("{e:#}"), source = %tag, "source failed");
            counter!("ingest_provider_errors_total").increment(1);
            (Vec::new(), vec![ParseError::source_level(&tag, format!("{e:#}"))])
        }
        Err(join) => {
            let msg = if join.is_panic() {
                panic_message(join.into_panic())
            } else {
                "task cancelled".to_string()
            };
            tracing::error!(target: "ingest", source = %tag, fault = %msg, "source faulted");
            counter!("ingest_provider_errors_total").increment(1);
            (
                Vec::new(),
                vec![ParseError::source_level(&tag, format!("internal fault: {msg}"))],
            )
        }
    };

    SourceResult {
        tag,
        kind,
        events,
        errors,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::ParseOutcome;
    use chrono::NaiveDate;

    #[test]
    fn normalize_text_collapses_ws_and_tags() {
        let s = "  <b>Hola,</b>&nbsp;&nbsp; “mundo”.  ";
        let out = normalize_text(s);
        assert_eq!(out, "Hola, \"mundo\".");
    }

    struct Fixed(&'static str);
    struct Broken;
    struct Panicky;

    #[async_trait::async_trait]
    impl SourceProvider for Fixed {
        async fn fetch_latest(&self) -> anyhow::Result<ParseOutcome> {
            let start = NaiveDate::from_ymd_opt(2024, 11, 6)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap();
            Ok(ParseOutcome {
                events: vec![Event::new(EventKind::Cultural, self.0, "E1", "t", start)],
                errors: Vec::new(),
            })
        }
        fn tag(&self) -> &str {
            self.0
        }
        fn kind(&self) -> EventKind {
            EventKind::Cultural
        }
    }

    #[async_trait::async_trait]
    impl SourceProvider for Broken {
        async fn fetch_latest(&self) -> anyhow::Result<ParseOutcome> {
            anyhow::bail!("connection refused")
        }
        fn tag(&self) -> &str {
            "XML"
        }
        fn kind(&self) -> EventKind {
            EventKind::Cultural
        }
    }

    #[async_trait::async_trait]
    impl SourceProvider for Panicky {
        async fn fetch_latest(&self) -> anyhow::Result<ParseOutcome> {
            panic!("index out of bounds in parser")
        }
        fn tag(&self) -> &str {
            "CITY"
        }
        fn kind(&self) -> EventKind {
            EventKind::City
        }
    }

    #[tokio::test]
    async fn failing_sources_do_not_block_siblings() {
        let orch = Orchestrator::new(
            vec![
                Arc::new(Broken),
                Arc::new(Panicky),
                Arc::new(Fixed("CSV")),
            ],
            Duration::ZERO,
        );
        let res = orch.fetch_all().await;
        assert_eq!(res.sources.len(), 3);

        let xml = res.source("XML").unwrap();
        assert!(xml.events.is_empty());
        assert_eq!(xml.errors.len(), 1);
        assert!(xml.errors[0].error.contains("connection refused"));

        let city = res.source("CITY").unwrap();
        assert_eq!(city.errors.len(), 1);
        assert!(city.errors[0].error.contains("internal fault"));
        assert!(city.errors[0].error.contains("index out of bounds"));

        assert_eq!(res.source("CSV").unwrap().events.len(), 1);
        assert_eq!(res.total_events(), 1);
        assert_eq!(res.total_errors(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_are_spaced_by_the_inter_source_delay() {
        let orch = Orchestrator::new(
            vec![Arc::new(Fixed("JSON")), Arc::new(Fixed("XML")), Arc::new(Fixed("CSV"))],
            Duration::from_millis(500),
        );
        let t0 = tokio::time::Instant::now();
        let res = orch.fetch_all().await;
        assert_eq!(res.sources.len(), 3);
        let waited = t0.elapsed();
        assert!(waited >= Duration::from_millis(1000), "waited {waited:?}");
        assert!(waited < Duration::from_millis(1010), "waited {waited:?}");
    }
}
