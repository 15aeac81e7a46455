// src/fetcher/page_fetcher.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::fetcher::rate_limiter::HostRateLimiter;
use crate::fetcher::renderer::Renderer;
use crate::fetcher::robots::RobotsChecker;
use crate::parsers::PageParser;

/// Browser-like user agents rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// A plain fetch whose visible text comes in under this many characters is
/// assumed to be script-rendered and retried through the renderer.
const RENDER_TEXT_THRESHOLD: usize = 120;

const BACKOFF_BASE_MS: f64 = 500.0;

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub body: String,
    pub final_url: String,
    pub headers: HeaderMap,
}

impl FetchResult {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Rate-limited, retrying, robots-aware page fetcher shared by every source
/// and enrichment task. Holds the only pieces of shared mutable state in the
/// fetch path: per-host pacing slots and the robots cache, each behind its
/// own lock, plus the global concurrency semaphore.
pub struct PageFetcher {
    client: Client,
    limiter: HostRateLimiter,
    robots: RobotsChecker,
    concurrency: Arc<Semaphore>,
    richness: PageParser,
    renderer: Option<Arc<dyn Renderer>>,
    render_enabled: bool,
    render_timeout: Duration,
    max_retries: u32,
    backoff_factor: f64,
    renderer_missing_logged: AtomicBool,
}

impl PageFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.scraping.request_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(proxy) = &config.proxy.http_proxy {
            builder = builder.proxy(
                reqwest::Proxy::http(proxy)
                    .map_err(|e| ScrapeError::Config(format!("http proxy: {e}")))?,
            );
        }
        if let Some(proxy) = &config.proxy.https_proxy {
            builder = builder.proxy(
                reqwest::Proxy::https(proxy)
                    .map_err(|e| ScrapeError::Config(format!("https proxy: {e}")))?,
            );
        }

        let client = builder
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            robots: RobotsChecker::new(config.scraping.respect_robots_txt, client.clone()),
            limiter: HostRateLimiter::new(
                config.rate_limit.max_requests_per_minute,
                config.rate_limit.min_delay_seconds,
                config.rate_limit.max_delay_seconds,
            ),
            concurrency: Arc::new(Semaphore::new(config.rate_limit.max_concurrent_requests)),
            richness: PageParser::new(),
            renderer: None,
            render_enabled: config.browser.use_headless,
            render_timeout: Duration::from_millis(config.browser.browser_timeout_ms),
            max_retries: config.scraping.max_retries,
            backoff_factor: config.scraping.retry_backoff_factor,
            renderer_missing_logged: AtomicBool::new(false),
            client,
        })
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Fetch a URL. Robots is consulted before any request to the host;
    /// a disallow fails immediately without touching the retry budget.
    /// Retryable failures (timeouts, connection errors, 429/5xx) back off
    /// exponentially with jitter up to the retry ceiling, after which the
    /// URL fails permanently for this run.
    pub async fn fetch(&self, url: &str, render: bool) -> Result<FetchResult> {
        let parsed = Url::parse(url).map_err(|e| ScrapeError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !self.robots.can_fetch(&parsed).await {
            return Err(ScrapeError::RobotsDisallowed(url.to_string()));
        }

        let host = parsed.host_str().unwrap_or("default").to_string();
        let mut attempt: u32 = 0;
        let result = loop {
            self.limiter.acquire(&host).await;
            match self.request_once(url).await {
                Ok(result) => break result,
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.backoff_delay(attempt);
                    debug!(%url, attempt, ?backoff, error = %err, "retrying after backoff");
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    warn!(%url, error = %err, "retries exhausted");
                    return Err(ScrapeError::RetriesExhausted(url.to_string()));
                }
                Err(err) => return Err(err),
            }
        };

        self.maybe_render(url, result, render).await
    }

    async fn request_once(&self, url: &str) -> Result<FetchResult> {
        let _permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| ScrapeError::Cancelled)?;

        let agent = USER_AGENTS[fastrand::usize(0..USER_AGENTS.len())];
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, agent)
            .send()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url, e))?;

        debug!(%url, status = status.as_u16(), bytes = body.len(), "fetched");
        Ok(FetchResult {
            status: status.as_u16(),
            body,
            final_url,
            headers,
        })
    }

    /// Hand the URL to the renderer when rendering was requested explicitly
    /// or the plain body looks script-generated. Falls back to the plain
    /// result when no renderer is wired in or rendering fails.
    async fn maybe_render(&self, url: &str, plain: FetchResult, render: bool) -> Result<FetchResult> {
        let wants_render = render
            || (self.render_enabled
                && self.richness.visible_text_len(&plain.body) < RENDER_TEXT_THRESHOLD);
        if !wants_render {
            return Ok(plain);
        }

        let Some(renderer) = &self.renderer else {
            if !self.renderer_missing_logged.swap(true, Ordering::Relaxed) {
                warn!("rendering requested but no renderer is wired in; serving plain fetches");
            }
            return Ok(plain);
        };

        match timeout(self.render_timeout, renderer.render(url)).await {
            Ok(Ok(rendered)) => Ok(rendered),
            Ok(Err(err)) => {
                warn!(%url, error = %err, "render failed, using plain fetch");
                Ok(plain)
            }
            Err(_) => {
                warn!(%url, "render timed out, using plain fetch");
                Ok(plain)
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = BACKOFF_BASE_MS * self.backoff_factor.powi(attempt as i32);
        Duration::from_millis(base as u64 + fastrand::u64(0..250))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_retries: u32) -> Config {
        let mut config = Config::default();
        config.rate_limit.max_requests_per_minute = 6000;
        config.rate_limit.min_delay_seconds = 0.0;
        config.rate_limit.max_delay_seconds = 0.0;
        config.scraping.max_retries = server_retries;
        config.scraping.retry_backoff_factor = 0.0;
        config.scraping.respect_robots_txt = true;
        config
    }

    #[tokio::test]
    async fn retries_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&test_config(3)).unwrap();
        let result = fetcher.fetch(&format!("{}/page", server.uri()), false).await.unwrap();
        assert_eq!(result.status, 200);
        assert!(result.body.contains("ok"));
    }

    #[tokio::test]
    async fn gives_up_after_retry_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // initial attempt + 2 retries
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&test_config(2)).unwrap();
        let err = fetcher.fetch(&format!("{}/down", server.uri()), false).await.unwrap_err();
        assert!(matches!(err, ScrapeError::RetriesExhausted(_)));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&test_config(3)).unwrap();
        let err = fetcher.fetch(&format!("{}/missing", server.uri()), false).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn robots_disallow_blocks_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private/contacts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&test_config(3)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/private/contacts", server.uri()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::RobotsDisallowed(_)));
    }

    #[tokio::test]
    async fn render_request_without_renderer_serves_plain_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/app"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body><div id=app></div></body></html>"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&test_config(0)).unwrap();
        let result = fetcher.fetch(&format!("{}/app", server.uri()), true).await.unwrap();
        assert_eq!(result.status, 200);
    }
}
