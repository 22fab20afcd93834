// tests/strict_offline.rs
use std::env;
use std::time::Duration;

use plaza_events::fetch::{FetchError, Fetcher, FetcherConfig, ENV_NO_NETWORK};

fn fetcher(dir: &std::path::Path) -> Fetcher {
    let mut cfg = FetcherConfig::new(dir);
    cfg.min_delay = Duration::ZERO;
    cfg.timeout = Duration::from_secs(2);
    Fetcher::new(cfg).unwrap()
}

#[serial_test::serial]
#[tokio::test]
async fn env_flag_blocks_external_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(dir.path());

    for v in ["1", "true", "YES", "on"] {
        env::set_var(ENV_NO_NETWORK, v);
        let err = f
            .fetch("https://datos.madrid.es/egob/catalogo/agenda.json", &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NetworkBlocked { .. }), "{v}: {err}");
    }
    env::remove_var(ENV_NO_NETWORK);
    assert_eq!(f.audit().len(), 4);
}

#[serial_test::serial]
#[tokio::test]
async fn loopback_is_exempt_from_the_env_flag() {
    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(dir.path());
    // a closed loopback port: the request is attempted and fails in transport
    let closed = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };

    env::set_var(ENV_NO_NETWORK, "1");
    let err = f
        .fetch(&format!("http://{closed}/feed.xml"), &[], false)
        .await
        .unwrap_err();
    env::remove_var(ENV_NO_NETWORK);
    assert!(matches!(err, FetchError::Transport { .. }), "{err}");
}

#[serial_test::serial]
#[tokio::test]
async fn unset_or_falsy_flag_does_not_block() {
    let dir = tempfile::tempdir().unwrap();
    let f = fetcher(dir.path());
    f.cache()
        .put(&plaza_events::fetch::cache::CacheEntry::new(
            "https://datos.madrid.es/x.json",
            b"{}".to_vec(),
            chrono::Utc::now(),
        ))
        .unwrap();

    env::set_var(ENV_NO_NETWORK, "0");
    // served from the fresh cache entry; no network involved
    let body = f
        .fetch("https://datos.madrid.es/x.json", &[], false)
        .await
        .unwrap();
    env::remove_var(ENV_NO_NETWORK);
    assert_eq!(body, b"{}");
}
