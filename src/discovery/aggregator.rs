// src/discovery/aggregator.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::dedup::{Admission, DedupEngine};
use crate::discovery::SourcePlugin;
use crate::models::{Company, SearchTask};
use crate::pipeline::CancelToken;

const CANDIDATE_CHANNEL_CAPACITY: usize = 64;
const PRODUCER_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// One admitted company and the source that produced it, so enrichment can
/// be routed back through the same source.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub key: String,
    pub source: String,
}

/// Fans (location, role) search tasks out across every enabled source,
/// funnels the streamed candidates through validation and the dedup engine,
/// and stops the moment the distinct-company cap is hit. Closing the channel
/// receiver is what ends still-running producers: their next send fails and
/// they return.
pub struct DiscoveryAggregator {
    registry: Arc<Vec<Arc<dyn SourcePlugin>>>,
    dedup: Arc<DedupEngine>,
    cancel: CancelToken,
}

impl DiscoveryAggregator {
    pub fn new(
        registry: Arc<Vec<Arc<dyn SourcePlugin>>>,
        dedup: Arc<DedupEngine>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            registry,
            dedup,
            cancel,
        }
    }

    pub async fn discover(
        &self,
        locations: &[String],
        roles: &[String],
        max_companies: usize,
    ) -> Vec<Admitted> {
        let (tx, rx) = mpsc::channel::<Company>(CANDIDATE_CHANNEL_CAPACITY);
        let mut producers = JoinSet::new();

        'spawn: for location in locations {
            for role in roles {
                for source in self.registry.iter() {
                    if self.cancel.is_cancelled() {
                        break 'spawn;
                    }
                    let task = SearchTask {
                        location: location.clone(),
                        role: role.clone(),
                        source: source.name().to_string(),
                    };
                    let source = Arc::clone(source);
                    let tx = tx.clone();
                    producers.spawn(async move {
                        if let Err(err) = source.search(&task, max_companies, &tx).await {
                            warn!(%task, error = %err, "search task failed");
                        }
                    });
                }
            }
        }
        drop(tx);

        let admitted = self.consume(rx, max_companies).await;

        // Producers see the closed channel and finish on their own; abort
        // any that are still mid-fetch after the grace window.
        let drain = async {
            while producers.join_next().await.is_some() {}
        };
        if timeout(PRODUCER_DRAIN_GRACE, drain).await.is_err() {
            debug!("aborting slow search producers");
            producers.shutdown().await;
        }

        info!(admitted = admitted.len(), "discovery finished");
        admitted
    }

    async fn consume(&self, mut rx: mpsc::Receiver<Company>, max_companies: usize) -> Vec<Admitted> {
        let mut admitted = Vec::new();
        loop {
            let candidate = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("cancellation requested, stopping discovery");
                    break;
                }
                candidate = rx.recv() => match candidate {
                    Some(candidate) => candidate,
                    None => break,
                },
            };

            if !candidate.has_identity() {
                debug!(source_url = %candidate.source_url, "dropping candidate without identity");
                continue;
            }
            let source = candidate.sources.first().cloned().unwrap_or_default();

            match self.dedup.admit(candidate).await {
                Admission::Admitted(key) => {
                    admitted.push(Admitted { key, source });
                    if admitted.len() % 10 == 0 {
                        info!(count = admitted.len(), "companies admitted so far");
                    }
                    if admitted.len() >= max_companies {
                        info!(cap = max_companies, "distinct-company cap reached");
                        break;
                    }
                }
                Admission::Merged(key) => {
                    debug!(%key, "candidate merged into existing company");
                }
                Admission::CapReached => {
                    info!(cap = max_companies, "distinct-company cap reached");
                    break;
                }
            }
        }
        admitted
    }
}
