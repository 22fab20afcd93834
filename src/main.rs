//! Binary entry point for one build pass: fetch feeds, merge, classify, group.
//! Configuration comes from `config/events.toml` (or `$EVENTS_CONFIG_PATH`).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plaza_events::config::AppConfig;
use plaza_events::fetch::Fetcher;
use plaza_events::group::{group_events, Forecast};
use plaza_events::ingest::feed::FeedProvider;
use plaza_events::ingest::types::{EventKind, SourceProvider};
use plaza_events::ingest::Orchestrator;
use plaza_events::{filter, merge, report};

const FORECAST_KEY: &str = "cache://weather/forecast.json";

/// Compact human logs by default; `EVENTS_LOG_JSON=1` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("plaza_events=info,warn"));
    let json = std::env::var("EVENTS_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

/// Forecast map written earlier by the weather job; empty when absent or stale.
async fn load_forecast(fetcher: &Fetcher) -> HashMap<String, Forecast> {
    match fetcher.fetch(FORECAST_KEY, &[], false).await {
        Ok(body) => serde_json::from_slice(&body).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring undecodable forecast");
            HashMap::new()
        }),
        Err(e) => {
            tracing::info!(reason = %e, "no forecast available");
            HashMap::new()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    let fetcher = Arc::new(Fetcher::new(cfg.fetch.fetcher_config())?);

    let providers: Vec<Arc<dyn SourceProvider>> = cfg
        .sources
        .endpoints()
        .into_iter()
        .map(|ep| Arc::new(FeedProvider::new(ep, Arc::clone(&fetcher))) as Arc<dyn SourceProvider>)
        .collect();
    if providers.is_empty() {
        tracing::warn!("no sources configured");
    }

    let results = Orchestrator::new(providers, cfg.fetch.inter_source_delay)
        .fetch_all()
        .await;
    for src in &results.sources {
        tracing::info!(source = %src.tag, events = src.events.len(), errors = src.errors.len(), "source done");
    }

    let now = cfg.now();
    let mut events = merge(&results.of_kind(EventKind::Cultural));
    events.extend(merge(&results.of_kind(EventKind::City)));
    filter::classify_all(&mut events, &cfg.filter, now);

    let summary = report::summarize(&events);
    tracing::info!(
        total = summary.total,
        kept = summary.kept,
        rejected = summary.rejected,
        by_reason = ?summary.by_reason,
        "classification summary"
    );

    let forecast = load_forecast(&fetcher).await;
    let grouping = group_events(&events, now, &cfg.group_config(), &forecast);
    for g in &grouping.groups {
        tracing::info!(
            bucket = g.bucket.label(),
            total = g.counts.total,
            at_landmark = g.counts.at_landmark,
            "group"
        );
    }
    tracing::info!(ongoing = grouping.ongoing.len(), "ongoing events");

    fetcher
        .audit()
        .export_json(&cfg.fetch.audit_path)
        .with_context(|| format!("writing fetch audit to {}", cfg.fetch.audit_path.display()))?;
    tracing::info!(requests = fetcher.audit().len(), path = %cfg.fetch.audit_path.display(), "audit exported");
    Ok(())
}
