// src/discovery/google_source.rs
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::dedup::normalized_domain;
use crate::discovery::company_crawler::CompanyCrawler;
use crate::discovery::{company_name_from_url, SourcePlugin};
use crate::error::Result;
use crate::fetcher::PageFetcher;
use crate::models::{Company, SearchTask};
use crate::parsers::{PageParser, ParsedPage};

/// Result-page domains and ad/infrastructure hosts that never identify a
/// hiring company.
const NOISE_DOMAINS: &[&str] = &[
    "google.com", "google.de", "googleusercontent.com", "gstatic.com",
    "youtube.com", "facebook.com", "twitter.com", "x.com", "instagram.com",
    "wikipedia.org", "linkedin.com", "xing.com",
    "indeed.com", "glassdoor.com", "stepstone.de", "monster.com",
];

/// Web-search discovery: one results page per (location, role) query; each
/// distinct external result domain becomes a company candidate.
pub struct GoogleSearchSource {
    fetcher: Arc<PageFetcher>,
    parser: PageParser,
    crawler: CompanyCrawler,
}

impl GoogleSearchSource {
    pub fn new(fetcher: Arc<PageFetcher>, crawler: CompanyCrawler) -> Self {
        Self {
            fetcher,
            parser: PageParser::new(),
            crawler,
        }
    }

    fn query_url(task: &SearchTask) -> Result<String> {
        let query = format!("{} jobs hiring {}", task.role, task.location);
        let url = Url::parse_with_params(
            "https://www.google.com/search",
            &[("q", query.as_str()), ("num", "50")],
        )
        .map_err(|e| crate::error::ScrapeError::Validation(format!("search url: {e}")))?;
        Ok(url.to_string())
    }

    /// Turn result links into candidates: unwrap redirect wrappers, drop
    /// noise domains, keep the first link per domain.
    fn candidates(&self, page: &ParsedPage, task: &SearchTask, max_results: usize) -> Vec<Company> {
        let mut seen_domains: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        for link in &page.links {
            if candidates.len() >= max_results {
                break;
            }
            let target = unwrap_redirect(link);
            let Some(domain) = normalized_domain(&target) else {
                continue;
            };
            if NOISE_DOMAINS
                .iter()
                .any(|noise| crate::dedup::domain_matches(&domain, noise))
            {
                continue;
            }
            if !seen_domains.insert(domain.clone()) {
                continue;
            }

            let mut company = Company::new(
                company_name_from_url(&target),
                &task.location,
                target.clone(),
            );
            company.website = Some(format!("https://{domain}"));
            company.hiring_roles.push(task.role.clone());
            company.sources.push(self.name().to_string());
            candidates.push(company);
        }

        candidates
    }
}

#[async_trait]
impl SourcePlugin for GoogleSearchSource {
    fn name(&self) -> &'static str {
        "google_search"
    }

    async fn search(
        &self,
        task: &SearchTask,
        max_results: usize,
        out: &mpsc::Sender<Company>,
    ) -> Result<()> {
        let url = Self::query_url(task)?;
        info!(%task, "searching the web");

        // Search pages are script-heavy; ask for the rendered path when one
        // is available.
        let result = self.fetcher.fetch(&url, true).await?;
        let page = self.parser.parse(&result.final_url, &result.body);

        let candidates = self.candidates(&page, task, max_results);
        if candidates.is_empty() {
            warn!(%task, "search produced no company candidates");
        }
        for company in candidates {
            if out.send(company).await.is_err() {
                debug!(%task, "receiver closed, ending search early");
                return Ok(());
            }
        }
        Ok(())
    }

    async fn get_company_details(&self, company: Company) -> Result<Company> {
        self.crawler.enrich(company).await
    }
}

/// Result links are often wrapped as /url?q=<target>; pull the target out.
fn unwrap_redirect(link: &str) -> String {
    let Ok(parsed) = Url::parse(link) else {
        return link.to_string();
    };
    if parsed.path() == "/url" {
        for (key, value) in parsed.query_pairs() {
            if key == "q" && value.starts_with("http") {
                return value.into_owned();
            }
        }
    }
    link.to_string()
}
