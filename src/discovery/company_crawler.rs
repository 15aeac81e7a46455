// src/discovery/company_crawler.rs
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dedup::normalized_domain;
use crate::error::{Result, ScrapeError};
use crate::extractors::EmailExtractor;
use crate::fetcher::PageFetcher;
use crate::models::Company;
use crate::parsers::{is_careers_path, is_contact_or_about_path, PageParser};
use crate::pipeline::CancelToken;

const JOB_DESCRIPTION_SNIPPET_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct CrawlBudget {
    pub max_depth: u32,
    pub max_pages: usize,
}

/// Breadth-first crawl of one company's site, bounded by depth and page
/// count. Shared by every discovery source's enrichment path; only the
/// budget differs per source.
///
/// Starts from the website (and careers URL when known), follows same-domain
/// careers/contact/about links, and feeds every fetched page through the
/// email extractor.
pub struct CompanyCrawler {
    fetcher: Arc<PageFetcher>,
    parser: PageParser,
    extractor: Arc<EmailExtractor>,
    budget: CrawlBudget,
    cancel: CancelToken,
}

impl CompanyCrawler {
    pub fn new(
        fetcher: Arc<PageFetcher>,
        extractor: Arc<EmailExtractor>,
        budget: CrawlBudget,
        cancel: CancelToken,
    ) -> Self {
        Self {
            fetcher,
            parser: PageParser::new(),
            extractor,
            budget,
            cancel,
        }
    }

    pub async fn enrich(&self, mut company: Company) -> Result<Company> {
        let Some(seed) = self.seed_url(&company) else {
            debug!(name = %company.name, "no website to crawl, skipping enrichment");
            return Ok(company);
        };
        let Some(base_domain) = normalized_domain(&seed) else {
            return Ok(company);
        };

        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        queue.push_back((seed, 0));
        if let Some(careers) = company.careers_url.clone() {
            queue.push_back((careers, 0));
        }

        let mut pages_fetched = 0usize;
        while let Some((url, depth)) = queue.pop_front() {
            if pages_fetched >= self.budget.max_pages {
                break;
            }
            if self.cancel.is_cancelled() {
                debug!(name = %company.name, "cancellation requested, keeping partial crawl");
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }

            let result = match self.fetcher.fetch(&url, false).await {
                Ok(result) => result,
                Err(ScrapeError::RobotsDisallowed(url)) => {
                    debug!(%url, "page disallowed by robots.txt");
                    continue;
                }
                Err(err) => {
                    warn!(%url, error = %err, "page fetch failed during crawl");
                    continue;
                }
            };
            pages_fetched += 1;

            let page = self.parser.parse(&result.final_url, &result.body);
            for email in self.extractor.extract(&page, &result.final_url) {
                company.add_email(email);
            }
            self.absorb_page_facts(&mut company, &url, &page);

            if depth >= self.budget.max_depth {
                continue;
            }
            for link in &page.links {
                let same_domain = normalized_domain(link)
                    .is_some_and(|d| crate::dedup::domain_matches(&d, &base_domain));
                if same_domain
                    && (is_careers_path(link) || is_contact_or_about_path(link))
                    && !visited.contains(link)
                {
                    queue.push_back((link.to_string(), depth + 1));
                }
            }
        }

        debug!(
            name = %company.name,
            pages = pages_fetched,
            emails = company.emails.len(),
            "crawl finished"
        );
        Ok(company)
    }

    fn seed_url(&self, company: &Company) -> Option<String> {
        company
            .website
            .clone()
            .filter(|w| !w.trim().is_empty())
            .or_else(|| company.careers_url.clone())
    }

    /// Pull structural facts out of a fetched page: careers link, LinkedIn
    /// profile, and a job-description snippet from the careers page.
    fn absorb_page_facts(&self, company: &mut Company, url: &str, page: &crate::parsers::ParsedPage) {
        if company.careers_url.is_none() {
            if is_careers_path(url) {
                company.careers_url = Some(url.to_string());
            } else if let Some(link) = page.careers_links.first() {
                company.careers_url = Some(link.clone());
            }
        }

        if company.linkedin_url.is_none() {
            company.linkedin_url = page
                .links
                .iter()
                .find(|link| link.contains("linkedin.com/company/"))
                .cloned();
        }

        if company.job_description.is_empty() && is_careers_path(url) {
            company.job_description = page.text.chars().take(JOB_DESCRIPTION_SNIPPET_LEN).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn crawler(budget: CrawlBudget) -> CompanyCrawler {
        let mut config = Config::default();
        config.rate_limit.max_requests_per_minute = 6000;
        config.rate_limit.min_delay_seconds = 0.0;
        config.rate_limit.max_delay_seconds = 0.0;
        config.scraping.max_retries = 0;
        let fetcher = Arc::new(PageFetcher::new(&config).unwrap());
        let extractor = Arc::new(EmailExtractor::new(&["jobs".to_string(), "hr".to_string()]));
        CompanyCrawler::new(fetcher, extractor, budget, CancelToken::new())
    }

    async fn mount_robots(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn follows_careers_link_and_collects_emails() {
        let server = MockServer::start().await;
        mount_robots(&server).await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><a href="/careers">Careers</a><p>Welcome to Acme.</p></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/careers"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><p>We are hiring a backend developer.</p>
                <a href="mailto:jobs@acme.com">Apply</a>
                <a href="https://www.linkedin.com/company/acme">LinkedIn</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        let mut company = Company::new("Acme", "Berlin", "https://search.example/acme");
        company.website = Some(format!("{}/", server.uri()));

        let crawler = crawler(CrawlBudget { max_depth: 2, max_pages: 5 });
        let enriched = crawler.enrich(company).await.unwrap();

        assert_eq!(enriched.emails.len(), 1);
        assert_eq!(enriched.emails[0].email, "jobs@acme.com");
        assert!(enriched.emails[0].is_hr_contact);
        assert!(enriched.careers_url.as_deref().unwrap().contains("/careers"));
        assert_eq!(
            enriched.linkedin_url.as_deref(),
            Some("https://www.linkedin.com/company/acme")
        );
        assert!(enriched.job_description.contains("backend developer"));
    }

    #[tokio::test]
    async fn page_budget_bounds_the_crawl() {
        let server = MockServer::start().await;
        mount_robots(&server).await;
        // Root links to many crawlable pages; only max_pages requests go out.
        let links: String = (0..10)
            .map(|i| format!(r#"<a href="/careers/team-{i}">team {i}</a>"#))
            .collect();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("<html><body>{links}</body></html>")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>page</body></html>"))
            .expect(2) // budget is 3, root takes one
            .mount(&server)
            .await;

        let mut company = Company::new("Acme", "Berlin", "https://src.example");
        company.website = Some(format!("{}/", server.uri()));

        let crawler = crawler(CrawlBudget { max_depth: 2, max_pages: 3 });
        crawler.enrich(company).await.unwrap();
    }

    #[tokio::test]
    async fn company_without_website_is_returned_unchanged() {
        let crawler = crawler(CrawlBudget { max_depth: 1, max_pages: 1 });
        let company = Company::new("Acme", "Berlin", "https://src.example");
        let enriched = crawler.enrich(company).await.unwrap();
        assert!(enriched.emails.is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_crawl_fetches_nothing() {
        let crawler = crawler(CrawlBudget { max_depth: 1, max_pages: 5 });
        crawler.cancel.cancel();
        let mut company = Company::new("Acme", "Berlin", "https://src.example");
        company.website = Some("https://acme.invalid".to_string());
        // No network: the unresolvable host would error if fetched.
        let enriched = crawler.enrich(company).await.unwrap();
        assert!(enriched.emails.is_empty());
    }

    #[tokio::test]
    async fn mid_crawl_cancellation_keeps_pages_already_harvested() {
        let server = MockServer::start().await;
        mount_robots(&server).await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(100))
                    .set_body_string(
                        r#"<html><body><a href="mailto:jobs@acme.com">apply</a>
                        <a href="/careers">Careers</a></body></html>"#,
                    ),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/careers"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let crawler = crawler(CrawlBudget { max_depth: 2, max_pages: 5 });
        let canceller = {
            let cancel = crawler.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };

        let mut company = Company::new("Acme", "Berlin", "https://src.example");
        company.website = Some(format!("{}/", server.uri()));

        // Cancel lands while the first page is in flight: that page's email
        // survives, the careers link is never followed.
        let enriched = crawler.enrich(company).await.unwrap();
        canceller.await.unwrap();
        assert_eq!(enriched.emails.len(), 1);
        assert_eq!(enriched.emails[0].email, "jobs@acme.com");
    }
}
