// tests/pipeline_e2e.rs
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use plaza_events::config::AppConfig;
use plaza_events::fetch::{Fetcher, FetcherConfig};
use plaza_events::group::{group_events, Bucket, Forecast};
use plaza_events::ingest::config::Endpoint;
use plaza_events::ingest::feed::FeedProvider;
use plaza_events::ingest::providers::FeedFormat;
use plaza_events::ingest::types::{EventKind, Recovery, SourceProvider};
use plaza_events::ingest::Orchestrator;
use plaza_events::{filter, merge, report, Reason};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn file_url(name: &str) -> String {
    reqwest::Url::from_file_path(fixture(name))
        .expect("absolute fixture path")
        .to_string()
}

// Wednesday morning
fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 6)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn offline_fetcher(cache: &std::path::Path) -> Arc<Fetcher> {
    let mut cfg = FetcherConfig::new(cache);
    cfg.min_delay = Duration::ZERO;
    cfg.strict_offline = true;
    Arc::new(Fetcher::new(cfg).unwrap())
}

fn providers(fetcher: &Arc<Fetcher>) -> Vec<Arc<dyn SourceProvider>> {
    [
        (FeedFormat::CulturalJson, "cultural.json"),
        (FeedFormat::CulturalXml, "cultural.xml"),
        (FeedFormat::CulturalCsv, "cultural.csv"),
        (FeedFormat::CityXml, "city.xml"),
    ]
    .into_iter()
    .map(|(format, name)| {
        Arc::new(FeedProvider::new(
            Endpoint::new(format, file_url(name)),
            Arc::clone(fetcher),
        )) as Arc<dyn SourceProvider>
    })
    .collect()
}

#[tokio::test]
async fn fixtures_flow_through_the_whole_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = offline_fetcher(tmp.path());
    let cfg = AppConfig::load_from(&fixture("events.toml")).unwrap();

    let results = Orchestrator::new(providers(&fetcher), Duration::ZERO)
        .fetch_all()
        .await;

    // per-source results stay separate
    let counts: Vec<_> = results
        .sources
        .iter()
        .map(|s| (s.tag.as_str(), s.events.len(), s.errors.len()))
        .collect();
    assert_eq!(
        counts,
        vec![("JSON", 2, 1), ("XML", 2, 0), ("CSV", 2, 1), ("CITY", 4, 0)]
    );
    assert!(results
        .sources
        .iter()
        .flat_map(|s| &s.errors)
        .all(|e| e.recovery == Recovery::Skipped && e.index.is_some()));

    // E1: coordinates only in XML, district only in CSV
    let cultural = merge(&results.of_kind(EventKind::Cultural));
    assert_eq!(cultural.len(), 4);
    let e1 = cultural.iter().find(|e| e.id == "E1").unwrap();
    assert_eq!(e1.sources, vec!["JSON", "XML", "CSV"]);
    assert_eq!(e1.district, "MONCLOA-ARAVACA");
    assert!((e1.latitude - 40.4240).abs() < 1e-9);
    assert_eq!(e1.venue, "Templo de Debod");
    assert_eq!(e1.title, "Cine de verano: \"Amanece que no es poco\"");

    let mut events = cultural;
    events.extend(merge(&results.of_kind(EventKind::City)));
    let kept = filter::classify_all(&mut events, &cfg.filter, now());
    assert_eq!(kept, 5);

    let reason = |id: &str| {
        events
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.decision.as_ref())
            .map(|d| d.reason)
    };
    assert_eq!(reason("E1"), Some(Reason::Kept));
    assert_eq!(reason("E3"), Some(Reason::TooOld));
    assert_eq!(reason("E4"), Some(Reason::OutsideDistrito));
    assert_eq!(reason("C2"), Some(Reason::KeptMultiVenue));
    assert_eq!(reason("C3"), Some(Reason::OutsideRadius));

    let summary = report::summarize(&events);
    assert_eq!((summary.total, summary.kept, summary.rejected), (8, 5, 3));

    let no_weather: HashMap<String, Forecast> = HashMap::new();
    let g = group_events(&events, now(), &cfg.group_config(), &no_weather);
    let ids = |b: Bucket| -> Vec<String> {
        g.group(b)
            .unwrap()
            .events
            .iter()
            .map(|e| e.event.id.clone())
            .collect()
    };
    assert_eq!(ids(Bucket::Today), vec!["C1", "E1"]);
    assert_eq!(ids(Bucket::ThisWeekend), vec!["E2"]);
    assert_eq!(ids(Bucket::ThisWeek), vec!["C2"]);
    assert!(ids(Bucket::PastWeekend).is_empty());
    assert!(ids(Bucket::LaterThisMonth).is_empty());
    let ongoing: Vec<_> = g.ongoing.iter().map(|e| e.event.id.as_str()).collect();
    assert_eq!(ongoing, vec!["C4"]);

    let today = g.group(Bucket::Today).unwrap();
    assert_eq!(today.counts.at_landmark, 1); // C1 sits on the plaza
    assert!(g.group(Bucket::ThisWeek).unwrap().events[0].at_landmark); // text match

    // one audit record per source fetch, none served from the network
    let audit = fetcher.audit().snapshot();
    assert_eq!(audit.len(), 4);
    assert!(audit.iter().all(|r| r.error.is_none() && !r.cache_hit));
}

#[tokio::test]
async fn a_missing_source_does_not_block_the_rest() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = offline_fetcher(tmp.path());
    let mut ps = providers(&fetcher);
    ps.insert(
        1,
        Arc::new(FeedProvider::new(
            Endpoint::new(FeedFormat::CulturalXml, file_url("does-not-exist.xml")),
            Arc::clone(&fetcher),
        )),
    );
    ps.push(Arc::new(FeedProvider::new(
        Endpoint::new(
            FeedFormat::CityXml,
            "https://www.esmadrid.com/opendata/agenda_v1_es.xml",
        ),
        Arc::clone(&fetcher),
    )));

    let results = Orchestrator::new(ps, Duration::ZERO).fetch_all().await;
    assert_eq!(results.sources.len(), 6);

    let failed: Vec<_> = results
        .sources
        .iter()
        .filter(|s| s.errors.iter().any(|e| e.recovery == Recovery::SourceSkipped))
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|s| s.events.is_empty() && s.errors.len() == 1));
    assert!(failed[1].errors[0].error.contains("blocked"));

    assert_eq!(results.total_events(), 10);
}
