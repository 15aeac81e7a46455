// src/discovery/mod.rs
pub mod aggregator;
pub mod company_crawler;
pub mod directory_source;
pub mod google_source;
pub mod job_board_source;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::Result;
use crate::extractors::EmailExtractor;
use crate::fetcher::PageFetcher;
use crate::models::{Company, SearchTask};
use crate::pipeline::CancelToken;

pub use aggregator::{Admitted, DiscoveryAggregator};
pub use company_crawler::{CompanyCrawler, CrawlBudget};

/// The closed set of discovery sources. New sources are added by extending
/// this enumeration, not by registering at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GoogleSearch,
    JobBoard,
    CompanyDirectory,
}

/// Discovery capability. Implementations hold only immutable configuration
/// plus shared collaborators and are safe to call concurrently for
/// different companies.
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stream partial Company records for one (location, role) search into
    /// `out`, up to `max_results`. A closed receiver ends the stream early
    /// and is not an error.
    async fn search(
        &self,
        task: &SearchTask,
        max_results: usize,
        out: &mpsc::Sender<Company>,
    ) -> Result<()>;

    /// Enrich a discovered company by crawling its web presence.
    async fn get_company_details(&self, company: Company) -> Result<Company>;
}

/// Build the source registry once at startup; the orchestrator holds it by
/// reference for the rest of the run.
pub fn build_registry(
    config: &Config,
    fetcher: &Arc<PageFetcher>,
    cancel: &CancelToken,
) -> Vec<Arc<dyn SourcePlugin>> {
    let extractor = Arc::new(EmailExtractor::new(&config.hr_keywords));
    let crawler = |budget: CrawlBudget| {
        CompanyCrawler::new(
            Arc::clone(fetcher),
            Arc::clone(&extractor),
            budget,
            cancel.clone(),
        )
    };

    let shallow = CrawlBudget {
        max_depth: 1,
        max_pages: 4,
    };
    let deep = CrawlBudget {
        max_depth: config.scraping.max_crawl_depth,
        max_pages: config.scraping.max_pages_per_company,
    };

    config
        .enabled_sources
        .iter()
        .map(|kind| -> Arc<dyn SourcePlugin> {
            match kind {
                SourceKind::GoogleSearch => Arc::new(google_source::GoogleSearchSource::new(
                    Arc::clone(fetcher),
                    crawler(shallow.clone()),
                )),
                SourceKind::JobBoard => Arc::new(job_board_source::JobBoardSource::new(
                    Arc::clone(fetcher),
                    crawler(shallow.clone()),
                )),
                SourceKind::CompanyDirectory => {
                    Arc::new(directory_source::DirectorySource::new(
                        Arc::clone(fetcher),
                        crawler(deep.clone()),
                    ))
                }
            }
        })
        .collect()
}

/// Derive a readable company name from a website URL: first registrable
/// label, capitalized. "https://www.acme-labs.io/jobs" becomes "Acme Labs".
pub fn company_name_from_url(url: &str) -> String {
    let Some(domain) = crate::dedup::normalized_domain(url) else {
        return String::new();
    };
    let label = domain.split('.').next().unwrap_or(&domain);
    label
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
