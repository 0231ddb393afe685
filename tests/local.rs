//! Local registry and poller tests.

mod common;

use common::Backends;
use fleetcache::core::config::PollerConfig;
use fleetcache::election::refresh::RefreshLoop;
use fleetcache::local::body::{KeyedBody, SnapshotBody};
use fleetcache::local::poller::LocalCachePoller;
use fleetcache::local::registry::LocalCacheRegistry;
use fleetcache::store::entry::SnapshotEntry;
use fleetcache::store::key::CacheKey;
use serde_json::{json, Value};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const TICK: Duration = Duration::from_secs(600);

struct Harness {
    backends: Backends,
    registry: Arc<LocalCacheRegistry>,
    poller: LocalCachePoller,
    _shutdown_tx: watch::Sender<bool>,
}

fn harness(reload_queue: usize) -> Harness {
    let backends = Backends::new();
    let registry = Arc::new(LocalCacheRegistry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = PollerConfig {
        interval_ms: TICK.as_millis() as u64,
        reload_queue,
    };
    let poller = LocalCachePoller::spawn(registry.clone(), backends.gateway(), &config, shutdown_rx);
    Harness {
        backends,
        registry,
        poller,
        _shutdown_tx: shutdown_tx,
    }
}

async fn publish(backends: &Backends, key: &str, data: Value) {
    let entry = SnapshotEntry::from_map(&common::object(data)).unwrap();
    backends
        .gateway()
        .put(&CacheKey::logical(key), &entry, Duration::from_secs(6000))
        .await
        .unwrap();
}

/// Let woken tasks run without moving the clock meaningfully.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// Read path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn weather_appears_after_publish_and_signal() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));

    h.poller.reload();
    settle().await;
    assert_eq!(h.registry.get("weather", &[json!("ru")]), None);

    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;
    assert!(h.poller.reload());
    settle().await;

    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
}

#[tokio::test(start_paused = true)]
async fn projecting_body_serves_renamed_fields() {
    let h = harness(100);
    h.registry.register(
        "languages",
        Arc::new(KeyedBody::renaming([("1", "ru"), ("2", "vi"), ("3", "en")])),
    );

    publish(&h.backends, "languages", json!({"1": "Russian", "2": "Vietnamese", "3": "English"})).await;
    h.poller.reload();
    settle().await;

    assert_eq!(h.registry.get("languages", &[json!("vi")]), Some(json!("Vietnamese")));
    assert_eq!(h.registry.get("languages", &[json!("en")]), Some(json!("English")));
    assert_eq!(h.registry.get("languages", &[json!("2")]), None);
    // Non-string lookup keys collapse to not found.
    assert_eq!(h.registry.get("languages", &[json!(2)]), None);
}

#[tokio::test(start_paused = true)]
async fn default_body_returns_whole_snapshot() {
    let h = harness(100);
    h.registry.register_default("weather");

    publish(&h.backends, "weather", json!({"ru": "Moscow", "vi": "Hanoi"})).await;
    h.poller.reload();
    settle().await;

    assert_eq!(
        h.registry.get("weather", &[]),
        Some(json!({"ru": "Moscow", "vi": "Hanoi"}))
    );
}

#[tokio::test(start_paused = true)]
async fn registering_twice_keeps_first_body() {
    let h = harness(100);
    assert!(h.registry.register("weather", Arc::new(KeyedBody::new())));
    assert!(!h.registry.register("weather", Arc::new(SnapshotBody::new())));

    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;
    h.poller.reload();
    settle().await;

    // A keyed body answers per key; a snapshot body would return the map.
    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
}

// ============================================================================
// Staleness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn tick_refreshes_within_one_interval() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;

    tokio::time::sleep(TICK / 2).await;
    assert_eq!(h.registry.get("weather", &[json!("ru")]), None);

    tokio::time::sleep(TICK / 2 + Duration::from_secs(1)).await;
    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
    assert_eq!(h.poller.stats().reloads, 0);
}

#[tokio::test(start_paused = true)]
async fn signal_beats_the_tick() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;

    publish(&h.backends, "weather", json!({"ru": "Saint Petersburg"})).await;
    h.poller.reload();
    settle().await;

    assert_eq!(
        h.registry.get("weather", &[json!("ru")]),
        Some(json!("Saint Petersburg"))
    );
    let stats = h.poller.stats();
    assert_eq!(stats.reloads, 1);
    assert_eq!(stats.cycles, 2);
}

#[tokio::test(start_paused = true)]
async fn missing_entry_keeps_stale_value() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));

    let entry = SnapshotEntry::from_map(&common::object(json!({"ru": "Moscow"}))).unwrap();
    h.backends
        .gateway()
        .put(&CacheKey::logical("weather"), &entry, Duration::from_secs(10))
        .await
        .unwrap();
    h.poller.reload();
    settle().await;
    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));

    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
    assert!(h.poller.stats().misses >= 1);
}

#[tokio::test(start_paused = true)]
async fn undecodable_snapshot_keeps_previous_value() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;
    h.poller.reload();
    settle().await;

    let garbage = SnapshotEntry::from_bytes(&b"not json"[..]);
    h.backends
        .gateway()
        .put(&CacheKey::logical("weather"), &garbage, Duration::from_secs(6000))
        .await
        .unwrap();
    h.poller.reload();
    settle().await;

    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
    assert_eq!(h.poller.stats().renew_failures, 1);
}

// ============================================================================
// Signals, interval and stop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn burst_of_signals_loads_once() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;

    for _ in 0..3 {
        assert!(h.poller.reload());
    }
    settle().await;

    let stats = h.poller.stats();
    assert_eq!(stats.reloads, 1);
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.loads, 1);
}

#[tokio::test(start_paused = true)]
async fn full_queue_drops_signals() {
    let h = harness(1);
    assert!(h.poller.reload());
    assert!(!h.poller.reload());
    assert_eq!(h.poller.stats().dropped_signals, 1);
}

#[tokio::test(start_paused = true)]
async fn interval_change_keeps_registrations() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    h.registry.register_default("traffic");

    assert!(h.poller.set_interval(Duration::from_secs(5)));
    assert_eq!(h.poller.interval(), Duration::from_secs(5));
    settle().await;

    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(!h.poller.is_finished());
    assert_eq!(h.registry.len(), 2);
    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
    assert_eq!(h.poller.stats().reloads, 0);
}

#[tokio::test(start_paused = true)]
async fn frequent_interval_changes_keep_ticking() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;

    // Re-apply the same interval at half its period for a minute.
    assert!(h.poller.set_interval(Duration::from_secs(10)));
    for _ in 0..12 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.poller.set_interval(Duration::from_secs(10)));
    }

    let stats = h.poller.stats();
    assert!(stats.cycles >= 5, "only {} cycles in 60s", stats.cycles);
    assert_eq!(stats.reloads, 0);
    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
}

#[tokio::test(start_paused = true)]
async fn shorter_interval_applies_from_last_load() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;

    // 30 s into a 600 s wait, a 20 s interval is already overdue.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.poller.set_interval(Duration::from_secs(20)));
    settle().await;

    assert_eq!(h.poller.stats().cycles, 1);
    assert_eq!(h.registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
}

#[tokio::test(start_paused = true)]
async fn zero_interval_is_rejected() {
    let h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));

    assert!(!h.poller.set_interval(Duration::ZERO));
    assert_eq!(h.poller.interval(), TICK);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.poller.stats().cycles, 0);
    assert_eq!(h.backends.store.get_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_pending_signals() {
    let mut h = harness(100);
    h.registry.register("weather", Arc::new(KeyedBody::new()));
    publish(&h.backends, "weather", json!({"ru": "Moscow"})).await;

    // Queued before the task gets to run; stop wins.
    h.poller.reload();
    h.poller.stop();
    assert!(h.poller.join(Duration::from_secs(5)).await);

    assert_eq!(h.poller.stats().cycles, 0);
    assert_eq!(h.registry.get("weather", &[json!("ru")]), None);
    assert!(!h.poller.reload());
}

#[tokio::test(start_paused = true)]
async fn process_shutdown_stops_poller() {
    let backends = Backends::new();
    let registry = Arc::new(LocalCacheRegistry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller = LocalCachePoller::spawn(registry, backends.gateway(), &PollerConfig::default(), shutdown_rx);

    shutdown_tx.send_replace(true);
    assert!(poller.join(Duration::from_secs(5)).await);
    assert!(poller.is_finished());
}

// ============================================================================
// Refresh loop to mirror
// ============================================================================

#[tokio::test(start_paused = true)]
async fn leader_publish_signals_local_poller() {
    let h = harness(100);
    h.registry.register_default("weather");

    let (_loop_shutdown_tx, loop_shutdown_rx) = watch::channel(false);
    let calls = Arc::new(AtomicU64::new(0));
    let handle = RefreshLoop::new(
        "weather",
        "node-a:4001",
        h.backends.locks(),
        h.backends.gateway(),
        common::counting_producer(calls),
    )
    .with_reload(h.poller.reload_signal())
    .spawn(common::test_timings("node-a:4001"), loop_shutdown_rx);

    // Far sooner than the 600 s tick.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(handle.is_leader());
    assert_eq!(h.registry.get("weather", &[]), Some(json!({"count": 1})));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.registry.get("weather", &[]), Some(json!({"count": 2})));
    assert_eq!(h.poller.stats().reloads, 2);
}
