//! Shutdown behaviour of the scheduler with real scrape and notify tasks.
//!
//! Run with: cargo test --test scheduler_shutdown

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use common::{RecordingSink, user};
use storage_watch_bot::notifier::{CooldownPolicy, Notifier, OperatorChannel};
use storage_watch_bot::scheduler::{PeriodicTask, Scheduler, TaskState};
use storage_watch_bot::scraper::{ListingLayout, ListingParser, PageFetcher, ScrapeError, Scraper};
use storage_watch_bot::store::{MemoryStore, SubscriptionStore, UnitKey};

/// Fetcher that blocks until released, counting calls.
struct GatedPage {
    calls: AtomicUsize,
    release: Notify,
}

#[async_trait]
impl PageFetcher for GatedPage {
    async fn fetch(&self, _url: &str) -> Result<String, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(r#"<section class="storage" data-city="Moscow">
                <h2 class="storage-name">StorageA</h2>
                <div class="unit"><span class="unit-size">Medium</span></div>
              </section>"#
            .to_owned())
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_fetch_aborts_promptly() {
    let store = Arc::new(MemoryStore::new());
    let page = Arc::new(GatedPage {
        calls: AtomicUsize::new(0),
        release: Notify::new(),
    });
    let scraper = Scraper::new(
        "https://storage.example/units".to_owned(),
        page.clone(),
        ListingParser::new(ListingLayout::default()).unwrap(),
        store.clone(),
    );

    let mut scheduler = Scheduler::new(CancellationToken::new());
    let status = scheduler.spawn(Arc::new(scraper), Duration::from_secs(60));

    // Let the first cycle start and hang inside the fetch.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(page.calls.load(Ordering::SeqCst), 1);
    assert_eq!(status.read().await.state, TaskState::Running);

    scheduler.shutdown();
    scheduler.wait().await;

    let status = status.read().await;
    assert_eq!(status.state, TaskState::Stopped);
    assert_eq!(status.failures, 0);
    assert_eq!(status.runs, 1);
    assert_eq!(store.unit_count().await, 0);

    // No new cycle starts after shutdown.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(page.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn both_loops_stop_on_one_signal() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::new());
    let alice = user(&store, 1001, None).await;
    store
        .subscribe(alice.id, UnitKey::new("Moscow", "StorageA", "Medium"))
        .await
        .unwrap();

    let page = Arc::new(GatedPage {
        calls: AtomicUsize::new(0),
        release: Notify::new(),
    });
    let scraper = Scraper::new(
        "https://storage.example/units".to_owned(),
        page.clone(),
        ListingParser::new(ListingLayout::default()).unwrap(),
        store.clone(),
    );
    let notifier = Notifier::new(
        store.clone(),
        store.clone(),
        sink.clone(),
        CooldownPolicy::default(),
    );

    let cancel = CancellationToken::new();
    let mut scheduler = Scheduler::new(cancel.clone());
    scheduler.spawn(Arc::new(scraper), Duration::from_secs(10));
    let notify_status = scheduler.spawn(Arc::new(notifier), Duration::from_secs(15));

    // Scrape at t=10 finishes once released; notify at t=15 sees the unit.
    tokio::time::sleep(Duration::from_secs(11)).await;
    page.release.notify_one();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(sink.sent_to(1001).await.len(), 1);
    assert_eq!(notify_status.read().await.runs, 1);

    cancel.cancel();
    scheduler.wait().await;

    assert_eq!(notify_status.read().await.state, TaskState::Stopped);
    assert!(store.get_user(alice.id).await.unwrap().last_notified.is_some());
}

struct AlwaysFails;

#[async_trait]
impl PeriodicTask for AlwaysFails {
    fn name(&self) -> &'static str {
        "always_fails"
    }

    async fn run_cycle(&self, _cancel: &CancellationToken) -> anyhow::Result<()> {
        anyhow::bail!("listing unreachable")
    }
}

#[tokio::test(start_paused = true)]
async fn failed_cycles_alert_the_operator() {
    let sink = Arc::new(RecordingSink::new());
    let mut scheduler = Scheduler::new(CancellationToken::new())
        .with_alerts(OperatorChannel::new(sink.clone(), -500));
    scheduler.spawn(Arc::new(AlwaysFails), Duration::from_secs(5));

    tokio::time::sleep(Duration::from_secs(11)).await;
    scheduler.shutdown();
    scheduler.wait().await;

    let alerts = sink.sent_to(-500).await;
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].contains("always_fails"));
    assert!(alerts[0].contains("listing unreachable"));
    assert!(alerts[1].contains("2 in a row"));
}
