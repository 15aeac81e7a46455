// src/discovery/directory_source.rs
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dedup::normalized_domain;
use crate::discovery::company_crawler::CompanyCrawler;
use crate::discovery::{company_name_from_url, SourcePlugin};
use crate::error::Result;
use crate::fetcher::PageFetcher;
use crate::models::{Company, SearchTask};
use crate::parsers::{PageParser, ParsedPage};

/// Startup/company directory index pages, filtered by location client-side.
const DIRECTORY_SEEDS: &[&str] = &[
    "https://www.ycombinator.com/companies",
    "https://wellfound.com/startups",
    "https://www.f6s.com/companies",
];

/// Directory discovery: walk curated company indexes and emit companies whose
/// directory entry mentions the search location. Directory entries carry the
/// least role signal of the three sources, so candidates lean on the deep
/// enrichment crawl to confirm hiring pages.
pub struct DirectorySource {
    fetcher: Arc<PageFetcher>,
    parser: PageParser,
    crawler: CompanyCrawler,
}

impl DirectorySource {
    pub fn new(fetcher: Arc<PageFetcher>, crawler: CompanyCrawler) -> Self {
        Self {
            fetcher,
            parser: PageParser::new(),
            crawler,
        }
    }

    /// External links from a directory index page become candidates when the
    /// page text mentions the location (directories list companies globally).
    fn candidates_from_index(
        &self,
        page: &ParsedPage,
        seed_domain: &str,
        task: &SearchTask,
        seen_domains: &mut HashSet<String>,
        budget: usize,
    ) -> Vec<Company> {
        let location_mentioned = page
            .text
            .to_lowercase()
            .contains(&task.location.to_lowercase());
        if !location_mentioned {
            debug!(%task, seed = seed_domain, "directory page does not mention location");
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for link in &page.links {
            if candidates.len() >= budget {
                break;
            }
            let Some(domain) = normalized_domain(link) else {
                continue;
            };
            if crate::dedup::domain_matches(&domain, seed_domain) {
                continue;
            }
            if !seen_domains.insert(domain.clone()) {
                continue;
            }

            let mut company = Company::new(company_name_from_url(link), &task.location, link.clone());
            company.website = Some(format!("https://{domain}"));
            company.hiring_roles.push(task.role.clone());
            company.sources.push(self.name().to_string());
            candidates.push(company);
        }
        candidates
    }
}

#[async_trait]
impl SourcePlugin for DirectorySource {
    fn name(&self) -> &'static str {
        "company_directory"
    }

    async fn search(
        &self,
        task: &SearchTask,
        max_results: usize,
        out: &mpsc::Sender<Company>,
    ) -> Result<()> {
        let mut seen_domains: HashSet<String> = HashSet::new();
        let mut sent = 0usize;

        for seed in DIRECTORY_SEEDS {
            if sent >= max_results {
                break;
            }
            info!(%task, %seed, "scanning company directory");

            let result = match self.fetcher.fetch(seed, true).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(%seed, error = %err, "directory fetch failed, skipping");
                    continue;
                }
            };
            let page = self.parser.parse(&result.final_url, &result.body);
            let seed_domain = normalized_domain(&result.final_url).unwrap_or_default();

            let candidates = self.candidates_from_index(
                &page,
                &seed_domain,
                task,
                &mut seen_domains,
                max_results - sent,
            );
            for company in candidates {
                if out.send(company).await.is_err() {
                    debug!(%task, "receiver closed, ending search early");
                    return Ok(());
                }
                sent += 1;
            }
        }
        Ok(())
    }

    async fn get_company_details(&self, company: Company) -> Result<Company> {
        self.crawler.enrich(company).await
    }
}
