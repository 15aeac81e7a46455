// src/pipeline.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dedup::DedupEngine;
use crate::discovery::{Admitted, DiscoveryAggregator, SourcePlugin};
use crate::error::{Result, ScrapeError};
use crate::storage::{DataStorage, OutputFiles};

/// How long in-flight enrichment tasks may run on after cancellation before
/// they are abandoned.
const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Cooperative cancellation shared by the whole run. Cloning is cheap; all
/// clones observe the same flag. `cancel` is idempotent.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Completes once `cancel` has been called, however long ago.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                break;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub locations: Vec<String>,
    pub roles: Vec<String>,
    pub companies_discovered: usize,
    pub companies_with_emails: usize,
    pub total_emails: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub output: OutputFiles,
}

/// End-to-end orchestration: discovery across all sources, bounded parallel
/// enrichment routed back through each company's originating source, then a
/// single persistence step. Partial results are flushed even when the run is
/// cancelled midway.
pub struct ContactPipeline {
    config: Arc<Config>,
    registry: Arc<Vec<Arc<dyn SourcePlugin>>>,
    dedup: Arc<DedupEngine>,
    storage: DataStorage,
    cancel: CancelToken,
}

impl ContactPipeline {
    pub fn new(
        config: Arc<Config>,
        registry: Vec<Arc<dyn SourcePlugin>>,
        max_companies: usize,
        cancel: CancelToken,
    ) -> Self {
        let storage = DataStorage::new(&config.storage.output_dir, config.storage.pretty_json);
        Self {
            config,
            registry: Arc::new(registry),
            dedup: Arc::new(DedupEngine::new(max_companies)),
            storage,
            cancel,
        }
    }

    pub async fn run(
        &self,
        locations: &[String],
        roles: &[String],
        max_companies: usize,
    ) -> Result<RunSummary> {
        if locations.is_empty() {
            return Err(ScrapeError::Validation("at least one location is required".into()));
        }
        if roles.is_empty() {
            return Err(ScrapeError::Validation("at least one role is required".into()));
        }
        let started = Instant::now();
        info!(?locations, ?roles, max_companies, "pipeline starting");

        let aggregator = DiscoveryAggregator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.dedup),
            self.cancel.clone(),
        );
        let admitted = aggregator.discover(locations, roles, max_companies).await;
        info!(companies = admitted.len(), "discovery phase complete");

        self.enrich_all(&admitted).await;

        let companies = self.dedup.snapshot().await;
        let output = self.storage.persist(&companies, &locations.join(", ")).await?;

        let companies_with_emails = companies.iter().filter(|c| !c.emails.is_empty()).count();
        let total_emails = companies.iter().map(|c| c.emails.len()).sum();
        Ok(RunSummary {
            locations: locations.to_vec(),
            roles: roles.to_vec(),
            companies_discovered: companies.len(),
            companies_with_emails,
            total_emails,
            cancelled: self.cancel.is_cancelled(),
            elapsed: started.elapsed(),
            output,
        })
    }

    /// Enrich every admitted company through the source that discovered it.
    /// Task parallelism is bounded by the request concurrency ceiling; the
    /// enrichment results flow back into the dedup map, never into local
    /// copies.
    async fn enrich_all(&self, admitted: &[Admitted]) {
        let permits = Arc::new(Semaphore::new(self.config.rate_limit.max_concurrent_requests));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for entry in admitted {
            if self.cancel.is_cancelled() {
                info!("cancellation requested, not scheduling further enrichment");
                break;
            }
            let Some(source) = self.source_by_name(&entry.source) else {
                warn!(source = %entry.source, "admitted company has unknown source, skipping enrichment");
                continue;
            };
            let permits = Arc::clone(&permits);
            let dedup = Arc::clone(&self.dedup);
            let key = entry.key.clone();

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire().await else {
                    return;
                };
                let Some(company) = dedup.get(&key).await else {
                    return;
                };
                let name = company.name.clone();
                match source.get_company_details(company).await {
                    Ok(enriched) => {
                        debug!(company = %name, emails = enriched.emails.len(), "enrichment done");
                        dedup.apply_enrichment(&key, enriched).await;
                    }
                    Err(ScrapeError::Cancelled) => {
                        debug!(company = %name, "enrichment cancelled");
                    }
                    Err(err) => {
                        warn!(company = %name, error = %err, "enrichment failed");
                    }
                }
            });
        }

        // Drain normally; on cancellation let in-flight tasks run out a grace
        // window, then abandon them.
        {
            let drain = async {
                while tasks.join_next().await.is_some() {}
            };
            tokio::pin!(drain);
            tokio::select! {
                _ = &mut drain => {}
                _ = self.cancel.cancelled() => {
                    info!(grace = ?CANCEL_GRACE, "cancellation requested, draining in-flight enrichment");
                    let _ = timeout(CANCEL_GRACE, &mut drain).await;
                }
            }
        }
        if !tasks.is_empty() {
            warn!(abandoned = tasks.len(), "abandoning enrichment tasks after grace period");
            tasks.shutdown().await;
        }
    }

    fn source_by_name(&self, name: &str) -> Option<Arc<dyn SourcePlugin>> {
        self.registry.iter().find(|s| s.name() == name).cloned()
    }
}
