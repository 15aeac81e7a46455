// src/discovery/job_board_source.rs
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

struct Board {
    name: &'static str,
    /// Search URL template with `{role}` and `{location}` placeholders.
    template: &'static str,
}

const BOARDS: &[Board] = &[
    Board {
        name: "indeed",
        template: "https://www.indeed.com/jobs?q={role}&l={location}",
    },
    Board {
        name: "stepstone",
        template: "https://www.stepstone.de/jobs/{role}/in-{location}",
    },
    Board {
        name: "monster",
        template: "https://www.monster.com/jobs/search?q={role}&where={location}",
    },
];

/// Job-board discovery: scrape the listing page of each configured board and
/// treat outbound links (company sites behind the postings) as candidates.
/// The board's own pages never become companies.
pub struct JobBoardSource {
    fetcher: Arc<PageFetcher>,
    parser: PageParser,
    crawler: CompanyCrawler,
}

impl JobBoardSource {
    pub fn new(fetcher: Arc<PageFetcher>, crawler: CompanyCrawler) -> Self {
        Self {
            fetcher,
            parser: PageParser::new(),
            crawler,
        }
    }

    fn board_url(board: &Board, task: &SearchTask) -> String {
        board
            .template
            .replace("{role}", &encode_segment(&task.role))
            .replace("{location}", &encode_segment(&task.location))
    }

    /// Outbound links from a board listing page, one candidate per external
    /// domain. The posting link doubles as the careers URL hint.
    fn candidates_from_listing(
        &self,
        page: &ParsedPage,
        board_domain: &str,
        task: &SearchTask,
        seen_domains: &mut HashSet<String>,
        budget: usize,
    ) -> Vec<Company> {
        let mut candidates = Vec::new();
        for link in &page.links {
            if candidates.len() >= budget {
                break;
            }
            let Some(domain) = normalized_domain(link) else {
                continue;
            };
            if crate::dedup::domain_matches(&domain, board_domain) {
                continue;
            }
            if is_infrastructure_domain(&domain) {
                continue;
            }
            if !seen_domains.insert(domain.clone()) {
                continue;
            }

            let mut company = Company::new(company_name_from_url(link), &task.location, link.clone());
            company.website = Some(format!("https://{domain}"));
            if crate::parsers::is_careers_path(link) {
                company.careers_url = Some(link.to_string());
            }
            company.hiring_roles.push(task.role.clone());
            company.sources.push(self.name().to_string());
            candidates.push(company);
        }
        candidates
    }
}

#[async_trait]
impl SourcePlugin for JobBoardSource {
    fn name(&self) -> &'static str {
        "job_board"
    }

    async fn search(
        &self,
        task: &SearchTask,
        max_results: usize,
        out: &mpsc::Sender<Company>,
    ) -> Result<()> {
        let mut seen_domains: HashSet<String> = HashSet::new();
        let mut sent = 0usize;

        for board in BOARDS {
            if sent >= max_results {
                break;
            }
            let url = Self::board_url(board, task);
            info!(%task, board = board.name, "scraping job board listing");

            let result = match self.fetcher.fetch(&url, true).await {
                Ok(result) => result,
                Err(err) => {
                    // One unreachable board must not sink the whole task.
                    warn!(board = board.name, error = %err, "board listing failed, skipping");
                    continue;
                }
            };
            let page = self.parser.parse(&result.final_url, &result.body);
            let board_domain = normalized_domain(&result.final_url).unwrap_or_default();

            let candidates = self.candidates_from_listing(
                &page,
                &board_domain,
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

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// CDNs, trackers and share widgets that show up on every board page.
fn is_infrastructure_domain(domain: &str) -> bool {
    const INFRA: &[&str] = &[
        "google.com", "googleapis.com", "gstatic.com", "doubleclick.net",
        "facebook.com", "twitter.com", "x.com", "linkedin.com",
        "cloudflare.com", "cloudfront.net", "apple.com", "microsoft.com",
    ];
    INFRA
        .iter()
        .any(|infra| crate::dedup::domain_matches(domain, infra))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::discovery::CrawlBudget;
    use crate::extractors::EmailExtractor;
    use crate::pipeline::CancelToken;

    fn source() -> JobBoardSource {
        let config = Config::default();
        let fetcher = Arc::new(PageFetcher::new(&config).unwrap());
        let crawler = CompanyCrawler::new(
            Arc::clone(&fetcher),
            Arc::new(EmailExtractor::new(&[])),
            CrawlBudget { max_depth: 1, max_pages: 2 },
            CancelToken::new(),
        );
        JobBoardSource::new(fetcher, crawler)
    }

    fn task() -> SearchTask {
        SearchTask {
            location: "Berlin".into(),
            role: "data engineer".into(),
            source: "job_board".into(),
        }
    }

    #[test]
    fn board_urls_substitute_role_and_location() {
        let url = JobBoardSource::board_url(&BOARDS[0], &task());
        assert_eq!(url, "https://www.indeed.com/jobs?q=data+engineer&l=Berlin");
    }

    #[test]
    fn listing_links_off_the_board_become_candidates() {
        let html = r#"<html><body>
            <a href="https://www.indeed.com/viewjob?jk=123">posting</a>
            <a href="https://acme.com/careers/backend">Acme site</a>
            <a href="https://beta.io/about">Beta</a>
            <a href="https://www.doubleclick.net/ad">ad</a>
        </body></html>"#;
        let source = source();
        let page = source.parser.parse("https://www.indeed.com/jobs", html);

        let mut seen = HashSet::new();
        let candidates = source.candidates_from_listing(&page, "indeed.com", &task(), &mut seen, 10);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].website.as_deref(), Some("https://acme.com"));
        assert_eq!(
            candidates[0].careers_url.as_deref(),
            Some("https://acme.com/careers/backend")
        );
        assert_eq!(candidates[1].website.as_deref(), Some("https://beta.io"));
        assert!(candidates[1].careers_url.is_none());
    }

    #[test]
    fn seen_domains_span_boards() {
        let html = r#"<html><body><a href="https://acme.com/jobs">Acme</a></body></html>"#;
        let source = source();
        let page = source.parser.parse("https://www.indeed.com/jobs", html);

        let mut seen = HashSet::new();
        assert_eq!(
            source.candidates_from_listing(&page, "indeed.com", &task(), &mut seen, 10).len(),
            1
        );
        // Same company on a second board is not emitted again.
        let page2 = source.parser.parse("https://www.monster.com/jobs", html);
        assert_eq!(
            source.candidates_from_listing(&page2, "monster.com", &task(), &mut seen, 10).len(),
            0
        );
    }
}
