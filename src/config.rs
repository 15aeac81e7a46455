// src/config.rs
use serde::{Deserialize, Serialize};

use crate::discovery::SourceKind;
use crate::error::{Result, ScrapeError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub rate_limit: RateLimitConfig,
    pub scraping: ScrapingConfig,
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default = "default_sources")]
    pub enabled_sources: Vec<SourceKind>,

    #[serde(default = "default_target_roles")]
    pub target_roles: Vec<String>,

    #[serde(default = "default_hr_keywords")]
    pub hr_keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: u32,
    pub max_concurrent_requests: usize,
    pub min_delay_seconds: f64,
    pub max_delay_seconds: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapingConfig {
    pub respect_robots_txt: bool,
    pub max_retries: u32,
    pub retry_backoff_factor: f64,
    pub request_timeout_seconds: u64,
    pub max_crawl_depth: u32,
    pub max_pages_per_company: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub use_headless: bool,
    pub browser_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub output_dir: String,
    pub pretty_json: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
}

fn default_sources() -> Vec<SourceKind> {
    vec![
        SourceKind::GoogleSearch,
        SourceKind::JobBoard,
        SourceKind::CompanyDirectory,
    ]
}

fn default_target_roles() -> Vec<String> {
    [
        "software developer",
        "backend developer",
        "full stack developer",
        "software engineer",
        "web developer",
        "frontend developer",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_hr_keywords() -> Vec<String> {
    [
        "hr", "jobs", "careers", "career", "talent", "recruiting", "recruitment",
        "hiring", "people", "apply", "join", "opportunities",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                max_requests_per_minute: 30,
                max_concurrent_requests: 5,
                min_delay_seconds: 1.0,
                max_delay_seconds: 3.0,
            },
            scraping: ScrapingConfig {
                respect_robots_txt: true,
                max_retries: 3,
                retry_backoff_factor: 2.0,
                request_timeout_seconds: 30,
                max_crawl_depth: 2,
                max_pages_per_company: 10,
            },
            browser: BrowserConfig {
                use_headless: false,
                browser_timeout_ms: 30_000,
            },
            storage: StorageConfig {
                output_dir: "data/company_contacts".to_string(),
                pretty_json: true,
            },
            proxy: ProxyConfig::default(),
            enabled_sources: default_sources(),
            target_roles: default_target_roles(),
            hr_keywords: default_hr_keywords(),
        }
    }
}

pub async fn load_config(path: &str) -> Result<Config> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut config: Config = serde_yaml::from_str(&content)
        .map_err(|e| ScrapeError::Config(format!("{path}: {e}")))?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_requests_per_minute == 0 {
            return Err(ScrapeError::Config(
                "max_requests_per_minute must be positive".into(),
            ));
        }
        if self.rate_limit.max_concurrent_requests == 0 {
            return Err(ScrapeError::Config(
                "max_concurrent_requests must be positive".into(),
            ));
        }
        if self.rate_limit.min_delay_seconds > self.rate_limit.max_delay_seconds {
            return Err(ScrapeError::Config(
                "min_delay_seconds exceeds max_delay_seconds".into(),
            ));
        }
        if self.enabled_sources.is_empty() {
            return Err(ScrapeError::Config("no discovery sources enabled".into()));
        }
        Ok(())
    }
}

/// Environment variables win over config.yml.
fn apply_env_overrides(config: &mut Config) {
    if let Some(v) = env_parse::<u32>("MAX_REQUESTS_PER_MINUTE") {
        config.rate_limit.max_requests_per_minute = v;
    }
    if let Some(v) = env_parse::<usize>("MAX_CONCURRENT_REQUESTS") {
        config.rate_limit.max_concurrent_requests = v;
    }
    if let Some(v) = env_parse::<f64>("MIN_DELAY_SECONDS") {
        config.rate_limit.min_delay_seconds = v;
    }
    if let Some(v) = env_parse::<f64>("MAX_DELAY_SECONDS") {
        config.rate_limit.max_delay_seconds = v;
    }
    if let Some(v) = env_parse::<bool>("RESPECT_ROBOTS_TXT") {
        config.scraping.respect_robots_txt = v;
    }
    if let Some(v) = env_parse::<u32>("MAX_RETRIES") {
        config.scraping.max_retries = v;
    }
    if let Some(v) = env_parse::<bool>("USE_HEADLESS") {
        config.browser.use_headless = v;
    }
    if let Some(v) = env_parse::<u64>("BROWSER_TIMEOUT") {
        config.browser.browser_timeout_ms = v;
    }
    if let Ok(v) = std::env::var("HTTP_PROXY") {
        if !v.is_empty() {
            config.proxy.http_proxy = Some(v);
        }
    }
    if let Ok(v) = std::env::var("HTTPS_PROXY") {
        if !v.is_empty() {
            config.proxy.https_proxy = Some(v);
        }
    }
    if let Ok(v) = std::env::var("OUTPUT_DIR") {
        if !v.is_empty() {
            config.storage.output_dir = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.max_requests_per_minute, 30);
        assert_eq!(config.enabled_sources.len(), 3);
        assert!(!config.target_roles.is_empty());
    }

    #[test]
    fn rejects_zero_concurrency() {
        // Semaphore::new(0) would make every fetch wait forever.
        let mut config = Config::default();
        config.rate_limit.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_delay_window() {
        let mut config = Config::default();
        config.rate_limit.min_delay_seconds = 5.0;
        config.rate_limit.max_delay_seconds = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_round_trip_keeps_sources() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.enabled_sources, config.enabled_sources);
    }
}
