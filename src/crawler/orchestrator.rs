//! Crawl loop: fetch, extract, store, merge, upsert

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::aggregate::{DomainAggregate, DomainAggregator};
use crate::crawler::CrawlerConfig;
use crate::crawler::fetch::{FetchedPage, Fetcher};
use crate::extract::{Extractor, SignalBundle};
use crate::graph::{EntityGraphStore, GraphStore};
use crate::store::{DbError, PageStore, PageTransaction, RawCrawl, UrlFrame};

/// Where a page failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    /// The page could not be fetched; nothing was written
    Fetch,
    /// Writing the page failed; its transaction was rolled back
    Store,
}

/// A URL that was not processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub url: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of one URL, sent on the progress channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutcome {
    pub url: String,
    pub succeeded: bool,
}

/// Summary of a crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    /// URLs taken from the input list
    pub attempted: usize,

    /// URLs fetched, extracted, stored and merged
    pub succeeded: usize,

    pub failures: Vec<CrawlFailure>,
}

/// Drives the per-URL pipeline over a list of URLs
///
/// Fetches may overlap (up to `concurrency`), but pages are written one at a
/// time in input order, so merges into the same domain never interleave.
pub struct CrawlOrchestrator<F, S> {
    fetcher: F,
    store: S,
    graph: EntityGraphStore,
    extractor: Extractor,
    aggregator: DomainAggregator,
    config: CrawlerConfig,
}

impl<F, S> CrawlOrchestrator<F, S>
where
    F: Fetcher,
    S: PageStore,
{
    /// Create an orchestrator from its collaborators
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Retrieves raw pages
    /// * `store` - Crawl storage for raw pages, URL frames and domain aggregates
    /// * `graph` - Entity graph backend
    /// * `config` - Crawl configuration
    pub fn new(fetcher: F, store: S, graph: Arc<dyn GraphStore>, config: CrawlerConfig) -> Self {
        Self {
            fetcher,
            store,
            graph: EntityGraphStore::new(graph),
            extractor: Extractor::with_config(config.extractor.clone()),
            aggregator: DomainAggregator::with_config(config.aggregator.clone()),
            config,
        }
    }

    /// Replace the extractor, e.g. to plug in another entity strategy
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Process every URL and report how many succeeded
    pub async fn run(&self, urls: &[String]) -> CrawlReport {
        self.run_with_progress(urls, None).await
    }

    /// Process every URL, sending each outcome on `progress` if given
    ///
    /// No single URL can abort the run: fetch failures skip the URL, and
    /// storage failures roll back that URL's writes before moving on.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn run_with_progress(
        &self,
        urls: &[String],
        progress: Option<mpsc::Sender<PageOutcome>>,
    ) -> CrawlReport {
        let mut report = CrawlReport::default();

        let mut fetches = stream::iter(urls)
            .map(|url| async move { (url, self.fetcher.fetch(url).await) })
            .buffered(self.config.concurrency.max(1));

        while let Some((url, fetched)) = fetches.next().await {
            report.attempted += 1;

            let result = match fetched {
                Ok(page) => self
                    .process_page(page)
                    .instrument(info_span!("process_page", url = %url))
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        error!(url = %url, error = %e, "Failed to store page, rolled back");
                        CrawlFailure {
                            url: url.clone(),
                            stage: FailureStage::Store,
                            error: e.to_string(),
                        }
                    }),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to fetch page, skipping");
                    Err(CrawlFailure {
                        url: url.clone(),
                        stage: FailureStage::Fetch,
                        error: e.to_string(),
                    })
                }
            };

            let succeeded = result.is_ok();
            match result {
                Ok(()) => {
                    report.succeeded += 1;
                    info!(url = %url, "Crawled page");
                }
                Err(failure) => report.failures.push(failure),
            }

            if let Some(sender) = &progress {
                // Ignore errors from sending (e.g., if receiver is dropped)
                let _ = sender
                    .send(PageOutcome {
                        url: url.clone(),
                        succeeded,
                    })
                    .await;
            }
        }

        info!(
            "Crawl finished: {}/{} pages processed",
            report.succeeded, report.attempted
        );
        report
    }

    /// Extract and persist one fetched page
    ///
    /// Raw page, URL frame and domain aggregate are written in one
    /// transaction. Entities go to the graph only after that commit.
    pub async fn process_page(&self, page: FetchedPage) -> Result<DomainAggregate, DbError> {
        let bundle = self.extractor.extract(&page.body);
        let crawled_at = Utc::now();

        let mut tx = self.store.begin().await?;
        let aggregate = match self.write_page(&mut tx, &page, &bundle, crawled_at).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(url = %page.url, error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        for entity in bundle
            .candidate_entities
            .iter()
            .take(self.config.entity_upsert_limit)
        {
            self.graph
                .upsert(&entity.text, entity.label.as_str(), &page.url)
                .await;
        }

        Ok(aggregate)
    }

    async fn write_page(
        &self,
        tx: &mut S::Tx,
        page: &FetchedPage,
        bundle: &SignalBundle,
        crawled_at: DateTime<Utc>,
    ) -> Result<DomainAggregate, DbError> {
        tx.save_raw(&RawCrawl {
            url: page.url.clone(),
            domain: page.domain.clone(),
            raw_html: page.body.clone(),
            headers: page.headers.clone(),
            status_code: page.status_code,
            content_hash: page.content_hash.clone(),
            crawled_at: page.fetched_at,
        })
        .await?;

        tx.save_url_frame(&UrlFrame {
            url: page.url.clone(),
            domain: page.domain.clone(),
            metadata: bundle.metadata.clone(),
            entities: bundle.candidate_entities.clone(),
            contacts: bundle.contacts.clone(),
            confidence_score: self.aggregator.config().confidence_score,
            last_updated: crawled_at,
        })
        .await?;

        let existing = tx.load_domain(&page.domain).await?;
        let aggregate = self
            .aggregator
            .merge(existing, &page.domain, bundle, crawled_at);
        tx.save_domain(&aggregate).await?;

        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{BTreeMap, HashMap};

    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::crawler::CrawlError;
    use crate::extract::{CandidateEntity, EntityStrategy};
    use crate::graph::{EntityObservation, GraphStats, LibsqlGraph};
    use crate::store::{Database, DbTransaction};

    /// Serves fixed bodies; unknown URLs fail like a 404
    struct StaticFetcher {
        pages: HashMap<String, String>,
    }

    impl StaticFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, CrawlError> {
            match self.pages.get(url) {
                Some(body) => FetchedPage::new(url, 200, BTreeMap::new(), body.clone()),
                None => Err(CrawlError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    /// Delegates to the database but fails the domain write for one URL
    struct FailingStore {
        db: Database,
        fail_url: String,
    }

    struct FailingTx {
        inner: DbTransaction,
        fail_url: String,
        current_url: Option<String>,
    }

    #[async_trait]
    impl PageStore for FailingStore {
        type Tx = FailingTx;

        async fn begin(&self) -> Result<FailingTx, DbError> {
            Ok(FailingTx {
                inner: self.db.begin().await?,
                fail_url: self.fail_url.clone(),
                current_url: None,
            })
        }
    }

    #[async_trait]
    impl PageTransaction for FailingTx {
        async fn save_raw(&mut self, raw: &RawCrawl) -> Result<(), DbError> {
            self.current_url = Some(raw.url.clone());
            self.inner.save_raw(raw).await
        }

        async fn save_url_frame(&mut self, frame: &UrlFrame) -> Result<(), DbError> {
            self.inner.save_url_frame(frame).await
        }

        async fn load_domain(&mut self, domain: &str) -> Result<Option<DomainAggregate>, DbError> {
            self.inner.load_domain(domain).await
        }

        async fn save_domain(&mut self, aggregate: &DomainAggregate) -> Result<(), DbError> {
            if self.current_url.as_deref() == Some(self.fail_url.as_str()) {
                return Err(DbError::Query("disk full".to_string()));
            }
            self.inner.save_domain(aggregate).await
        }

        async fn commit(self) -> Result<(), DbError> {
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<(), DbError> {
            self.inner.rollback().await
        }
    }

    /// Graph backend whose every call fails
    struct UnreachableGraph;

    #[async_trait]
    impl GraphStore for UnreachableGraph {
        async fn upsert_entity(&self, _entity: &EntityObservation) -> Result<String, DbError> {
            Err(DbError::Connection("graph store unreachable".to_string()))
        }

        async fn stats(&self) -> Result<GraphStats, DbError> {
            Err(DbError::Connection("graph store unreachable".to_string()))
        }
    }

    /// Reports every token that starts with `#` as an entity
    #[derive(Debug)]
    struct HashtagStrategy;

    impl EntityStrategy for HashtagStrategy {
        fn candidates(&self, text: &str, limit: usize) -> Vec<CandidateEntity> {
            text.split_whitespace()
                .filter_map(|token| token.strip_prefix('#'))
                .take(limit)
                .map(CandidateEntity::org)
                .collect()
        }
    }

    struct Fixture {
        db: Database,
        graph: LibsqlGraph,
        _temp_dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("crawl.db").to_string_lossy().to_string();
        let graph_path = temp_dir.path().join("graph.db").to_string_lossy().to_string();

        Fixture {
            db: Database::new_from_path(&db_path).await.unwrap(),
            graph: LibsqlGraph::new_from_path(&graph_path).await.unwrap(),
            _temp_dir: temp_dir,
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_two_pages_of_one_domain() {
        let fixture = setup().await;
        let fetcher = StaticFetcher::new(&[
            ("https://example.com/", "<p>Mail a@x.com</p>"),
            ("https://example.com/about", "<p>Mail a@x.com or b@x.com</p>"),
        ]);
        let orchestrator = CrawlOrchestrator::new(
            fetcher,
            fixture.db.clone(),
            Arc::new(fixture.graph.clone()),
            CrawlerConfig::default(),
        );

        let report = orchestrator
            .run(&urls(&["https://example.com/", "https://example.com/about"]))
            .await;
        assert_eq!(report.succeeded, 2);
        assert!(report.failures.is_empty());

        let aggregate = fixture.db.load_domain("example.com").await.unwrap().unwrap();
        assert_eq!(
            aggregate.aggregated_contacts.emails.iter().collect::<Vec<_>>(),
            vec!["a@x.com", "b@x.com"]
        );
        assert_eq!(aggregate.url_count, 2);
        assert_eq!(fixture.db.stats().await.unwrap().urls_crawled, 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_skipped() {
        let fixture = setup().await;
        let fetcher = StaticFetcher::new(&[("https://ok.example/", "<p>Hello</p>")]);
        let orchestrator = CrawlOrchestrator::new(
            fetcher,
            fixture.db.clone(),
            Arc::new(fixture.graph.clone()),
            CrawlerConfig::default(),
        );

        let report = orchestrator
            .run(&urls(&["https://down.example/", "https://ok.example/"]))
            .await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, FailureStage::Fetch);
        assert_eq!(report.failures[0].url, "https://down.example/");

        assert!(fixture.db.get_raw_crawl("https://down.example/").await.unwrap().is_none());
        assert!(fixture.db.load_domain("down.example").await.unwrap().is_none());
        assert!(fixture.db.load_domain("ok.example").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_and_continues() {
        let fixture = setup().await;
        let fetcher = StaticFetcher::new(&[
            ("https://example.com/", "<p>a@x.com</p>"),
            ("https://example.com/broken", "<p>b@x.com</p>"),
            ("https://other.com/", "<p>c@x.com</p>"),
        ]);
        let store = FailingStore {
            db: fixture.db.clone(),
            fail_url: "https://example.com/broken".to_string(),
        };
        let orchestrator = CrawlOrchestrator::new(
            fetcher,
            store,
            Arc::new(fixture.graph.clone()),
            CrawlerConfig::default(),
        );

        let report = orchestrator
            .run(&urls(&[
                "https://example.com/",
                "https://example.com/broken",
                "https://other.com/",
            ]))
            .await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, FailureStage::Store);

        let example = fixture.db.load_domain("example.com").await.unwrap().unwrap();
        assert_eq!(example.url_count, 1);
        assert!(!example.aggregated_contacts.emails.contains("b@x.com"));

        // the raw write happened before the failure and must be gone too
        assert!(
            fixture
                .db
                .get_raw_crawl("https://example.com/broken")
                .await
                .unwrap()
                .is_none()
        );
        assert!(fixture.db.load_domain("other.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_graph_upserts_are_capped_per_page() {
        let fixture = setup().await;
        let body = "<p>Alpha Bravo Charlie Delta Echo Foxtrot Golf Hotel</p>";
        let fetcher = StaticFetcher::new(&[
            ("https://example.com/", body),
            ("https://example.com/again", body),
        ]);
        let orchestrator = CrawlOrchestrator::new(
            fetcher,
            fixture.db.clone(),
            Arc::new(fixture.graph.clone()),
            CrawlerConfig::default(),
        );

        orchestrator
            .run(&urls(&["https://example.com/", "https://example.com/again"]))
            .await;

        assert_eq!(fixture.graph.stats().await.unwrap().entities, 5);

        let alpha = fixture.graph.get_entity("Alpha", "ORG").await.unwrap().unwrap();
        assert_eq!(alpha.evidence_count, 2);
        assert_eq!(alpha.source_url, "https://example.com/again");
        assert!(fixture.graph.get_entity("Foxtrot", "ORG").await.unwrap().is_none());

        let frame = fixture.db.get_url_frame("https://example.com/").await.unwrap().unwrap();
        assert_eq!(frame.entities.len(), 8);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_keep_counts() {
        let fixture = setup().await;
        let pages: Vec<(String, String)> = (0..12)
            .map(|i| {
                (
                    format!("https://example.com/page{}", i),
                    format!("<p>user{}@x.com</p>", i),
                )
            })
            .collect();
        let page_refs: Vec<(&str, &str)> = pages
            .iter()
            .map(|(url, body)| (url.as_str(), body.as_str()))
            .collect();
        let list: Vec<String> = pages.iter().map(|(url, _)| url.clone()).collect();

        let orchestrator = CrawlOrchestrator::new(
            StaticFetcher::new(&page_refs),
            fixture.db.clone(),
            Arc::new(fixture.graph.clone()),
            CrawlerConfig::builder().concurrency(4).build(),
        );

        let report = orchestrator.run(&list).await;
        assert_eq!(report.succeeded, 12);

        let aggregate = fixture.db.load_domain("example.com").await.unwrap().unwrap();
        assert_eq!(aggregate.url_count, 12);
        assert_eq!(aggregate.aggregated_contacts.emails.len(), 10);
        assert_eq!(
            aggregate.aggregated_contacts.emails.first().map(String::as_str),
            Some("user0@x.com")
        );
    }

    #[tokio::test]
    async fn test_progress_channel() {
        let fixture = setup().await;
        let orchestrator = CrawlOrchestrator::new(
            StaticFetcher::new(&[("https://a.example/", "<p>hi</p>")]),
            fixture.db.clone(),
            Arc::new(fixture.graph.clone()),
            CrawlerConfig::default(),
        );

        let (sender, mut receiver) = mpsc::channel(10);
        let report = orchestrator
            .run_with_progress(&urls(&["https://a.example/", "https://b.example/"]), Some(sender))
            .await;
        assert_eq!(report.succeeded, 1);

        let mut outcomes = Vec::new();
        while let Some(outcome) = receiver.recv().await {
            outcomes.push(outcome);
        }
        assert_eq!(
            outcomes,
            vec![
                PageOutcome {
                    url: "https://a.example/".to_string(),
                    succeeded: true
                },
                PageOutcome {
                    url: "https://b.example/".to_string(),
                    succeeded: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_graph_does_not_fail_page() {
        let fixture = setup().await;
        let orchestrator = CrawlOrchestrator::new(
            StaticFetcher::new(&[("https://www.infosys.com/", "<p>Infosys hr@infosys.com</p>")]),
            fixture.db.clone(),
            Arc::new(UnreachableGraph),
            CrawlerConfig::default(),
        );

        let report = orchestrator.run(&urls(&["https://www.infosys.com/"])).await;
        assert_eq!(report.succeeded, 1);
        assert!(report.failures.is_empty());

        let aggregate = fixture
            .db
            .load_domain("www.infosys.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.url_count, 1);
        assert!(aggregate.aggregated_contacts.emails.contains("hr@infosys.com"));
        assert!(
            fixture
                .db
                .get_raw_crawl("https://www.infosys.com/")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_custom_extractor_drives_graph_keys() {
        let fixture = setup().await;
        let orchestrator = CrawlOrchestrator::new(
            StaticFetcher::new(&[("https://www.jsw.in/", "<p>Steel #JSW Paints #Cement</p>")]),
            fixture.db.clone(),
            Arc::new(fixture.graph.clone()),
            CrawlerConfig::default(),
        )
        .with_extractor(Extractor::new().with_strategy(HashtagStrategy));

        let report = orchestrator.run(&urls(&["https://www.jsw.in/"])).await;
        assert_eq!(report.succeeded, 1);

        assert_eq!(fixture.graph.stats().await.unwrap().entities, 2);
        assert!(fixture.graph.get_entity("JSW", "ORG").await.unwrap().is_some());
        assert!(fixture.graph.get_entity("Cement", "ORG").await.unwrap().is_some());
        assert!(fixture.graph.get_entity("Steel", "ORG").await.unwrap().is_none());
        assert!(fixture.graph.get_entity("Paints", "ORG").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_url_list() {
        let fixture = setup().await;
        let orchestrator = CrawlOrchestrator::new(
            StaticFetcher::new(&[]),
            fixture.db.clone(),
            Arc::new(crate::graph::DisabledGraph),
            CrawlerConfig::default(),
        );

        assert_eq!(orchestrator.run(&[]).await, CrawlReport::default());
    }
}
