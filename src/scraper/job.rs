//! One scrape pass: fetch, parse, upsert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ListingParser, PageFetcher, ScrapeError};
use crate::scheduler::PeriodicTask;
use crate::store::{UnitCatalog, UnitKey, UnitRecord};

/// Outcome of a scrape cycle that got as far as parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    /// Rows turned into unit records.
    pub parsed: usize,
    /// Rows or blocks the parser could not use.
    pub skipped: usize,
    /// Rows folded into an earlier row with the same unit key.
    pub merged: usize,
    pub upserted: usize,
    /// Records the catalog rejected.
    pub failed: usize,
    /// Set when shutdown stopped the upsert loop early.
    pub interrupted: bool,
}

/// Refreshes the unit catalog from the listing page.
pub struct Scraper {
    url: String,
    fetcher: Arc<dyn PageFetcher>,
    parser: ListingParser,
    catalog: Arc<dyn UnitCatalog>,
}

impl Scraper {
    #[must_use]
    pub fn new(
        url: String,
        fetcher: Arc<dyn PageFetcher>,
        parser: ListingParser,
        catalog: Arc<dyn UnitCatalog>,
    ) -> Self {
        Self {
            url,
            fetcher,
            parser,
            catalog,
        }
    }

    /// Runs one scrape cycle.
    ///
    /// Fetch and document-level parse failures abort the cycle. A record the
    /// catalog rejects is logged and the remaining records are still stored.
    pub async fn scrape(&self, cancel: &CancellationToken) -> Result<ScrapeReport, ScrapeError> {
        let html = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            html = self.fetcher.fetch(&self.url) => html?,
        };

        let listing = self.parser.parse(&html)?;
        for skipped in &listing.skipped {
            warn!(location = %skipped.location, "Skipping listing row: {}", skipped.reason);
        }

        let parsed = listing.records.len();
        let records = merge_duplicates(listing.records);
        let mut report = ScrapeReport {
            parsed,
            skipped: listing.skipped.len(),
            merged: parsed - records.len(),
            ..ScrapeReport::default()
        };

        for record in records {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let key = record.key.clone();
            match self.catalog.upsert_unit(record).await {
                Ok(unit) => {
                    debug!(unit_id = unit.id, unit = %key, available = unit.available, "Unit upserted");
                    report.upserted += 1;
                }
                Err(e) => {
                    warn!(unit = %key, "Failed to upsert unit: {}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Folds rows that share a unit key into one record, keeping page order.
///
/// A key is available when any of its rows is. The details come from the
/// first available row, or from the first row when none is available.
fn merge_duplicates(records: Vec<UnitRecord>) -> Vec<UnitRecord> {
    let mut merged: Vec<UnitRecord> = Vec::with_capacity(records.len());
    let mut positions: HashMap<UnitKey, usize> = HashMap::new();

    for record in records {
        match positions.get(&record.key) {
            Some(&at) => {
                if record.available && !merged[at].available {
                    merged[at] = record;
                }
            }
            None => {
                positions.insert(record.key.clone(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}

#[async_trait]
impl PeriodicTask for Scraper {
    fn name(&self) -> &'static str {
        "scraper"
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let report = match self.scrape(cancel).await {
            Ok(report) => report,
            Err(ScrapeError::Cancelled) => {
                info!("Scrape cycle cancelled by shutdown");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            parsed = report.parsed,
            skipped = report.skipped,
            merged = report.merged,
            upserted = report.upserted,
            failed = report.failed,
            interrupted = report.interrupted,
            "Scrape cycle finished"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::ListingLayout;
    use crate::store::MemoryStore;

    struct StaticPage(&'static str);

    #[async_trait]
    impl PageFetcher for StaticPage {
        async fn fetch(&self, _url: &str) -> Result<String, ScrapeError> {
            Ok(self.0.to_owned())
        }
    }

    struct FailingPage;

    #[async_trait]
    impl PageFetcher for FailingPage {
        async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
            Err(ScrapeError::Status {
                url: url.to_owned(),
                status: 503,
            })
        }
    }

    const PAGE: &str = r#"
        <section class="storage" data-city="Moscow">
          <h2 class="storage-name">StorageA</h2>
          <div class="unit" data-available="true"><span class="unit-size">Medium</span></div>
          <div class="unit" data-available="false"><span class="unit-size">Large</span></div>
        </section>
    "#;

    fn scraper(fetcher: Arc<dyn PageFetcher>, store: &Arc<MemoryStore>) -> Scraper {
        Scraper::new(
            "https://example.test/units".to_owned(),
            fetcher,
            ListingParser::new(ListingLayout::default()).unwrap(),
            store.clone(),
        )
    }

    #[tokio::test]
    async fn test_scrape_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let scraper = scraper(Arc::new(StaticPage(PAGE)), &store);
        let cancel = CancellationToken::new();

        let first = scraper.scrape(&cancel).await.unwrap();
        let before = store.all_units().await.unwrap();
        let second = scraper.scrape(&cancel).await.unwrap();
        let after = store.all_units().await.unwrap();

        assert_eq!(first.upserted, 2);
        assert_eq!(second.upserted, 2);
        assert_eq!(store.unit_count().await, 2);
        let ids = |units: &[crate::store::Unit]| units.iter().map(|u| u.id).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));

        let large = store
            .find_unit(&UnitKey::new("Moscow", "StorageA", "Large"))
            .await
            .unwrap()
            .unwrap();
        assert!(!large.available);
    }

    #[tokio::test]
    async fn test_duplicate_rows_keep_availability() {
        const DUPLICATES: &str = r#"
            <section class="storage" data-city="Moscow">
              <h2 class="storage-name">StorageA</h2>
              <div class="unit" data-available="true">
                <span class="unit-size">Medium</span><span class="unit-price">4 500 ₽</span>
              </div>
              <div class="unit" data-available="false">
                <span class="unit-size">Medium</span><span class="unit-price">5 000 ₽</span>
              </div>
              <div class="unit" data-available="false"><span class="unit-size">Large</span></div>
              <div class="unit" data-available="true"><span class="unit-size">Large</span></div>
            </section>
        "#;
        let store = Arc::new(MemoryStore::new());
        let scraper = scraper(Arc::new(StaticPage(DUPLICATES)), &store);

        let report = scraper.scrape(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.parsed, 4);
        assert_eq!(report.merged, 2);
        assert_eq!(report.upserted, 2);

        let medium = store
            .find_unit(&UnitKey::new("Moscow", "StorageA", "Medium"))
            .await
            .unwrap()
            .unwrap();
        assert!(medium.available);
        assert_eq!(medium.price, Some(4500.0));

        let large = store
            .find_unit(&UnitKey::new("Moscow", "StorageA", "Large"))
            .await
            .unwrap()
            .unwrap();
        assert!(large.available);
    }

    #[test]
    fn test_merge_keeps_first_row_when_none_available() {
        let row = |price: f64| UnitRecord {
            key: UnitKey::new("Kazan", "StorageC", "Small"),
            dimension: String::new(),
            price: Some(price),
            available: false,
            description: String::new(),
        };

        let merged = merge_duplicates(vec![row(900.0), row(1200.0)]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].price, Some(900.0));
        assert!(!merged[0].available);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_cycle() {
        let store = Arc::new(MemoryStore::new());
        let scraper = scraper(Arc::new(FailingPage), &store);

        let err = scraper.scrape(&CancellationToken::new()).await;
        assert!(matches!(err, Err(ScrapeError::Status { status: 503, .. })));
        assert_eq!(store.unit_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let store = Arc::new(MemoryStore::new());
        let scraper = scraper(Arc::new(StaticPage(PAGE)), &store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scraper.scrape(&cancel).await;
        assert!(matches!(err, Err(ScrapeError::Cancelled)));
        assert_eq!(store.unit_count().await, 0);
    }
}
