// src/fetcher/robots.rs
use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Hosts where robots.txt is skipped and pacing is relied on instead: search
/// engines and job portals whose robots files forbid everything useful.
const SKIP_ROBOTS_HOSTS: &[&str] = &[
    "google.com", "bing.com", "duckduckgo.com",
    "indeed.com", "glassdoor.com", "linkedin.com", "monster.com",
    "stepstone.de", "ziprecruiter.com", "simplyhired.com",
    "ycombinator.com", "wellfound.com", "f6s.com",
];

/// `Disallow` prefixes from the `User-agent: *` groups of one robots.txt.
#[derive(Debug, Default)]
pub struct RobotsRules {
    disallow: Vec<String>,
}

impl RobotsRules {
    pub fn parse(body: &str) -> Self {
        let mut disallow = Vec::new();
        let mut group_applies = false;
        let mut group_has_rules = false;

        for raw_line in body.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match field.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if group_has_rules {
                        group_applies = false;
                        group_has_rules = false;
                    }
                    if value == "*" {
                        group_applies = true;
                    }
                }
                "disallow" => {
                    group_has_rules = true;
                    if group_applies && !value.is_empty() {
                        disallow.push(value.to_string());
                    }
                }
                "allow" | "crawl-delay" | "sitemap" => {
                    group_has_rules = true;
                }
                _ => {}
            }
        }

        Self { disallow }
    }

    pub fn allows(&self, path: &str) -> bool {
        !self.disallow.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Per-host robots.txt cache consulted before the first request to a host.
/// A robots.txt that cannot be fetched or parsed means "allowed".
pub struct RobotsChecker {
    respect_robots: bool,
    client: Client,
    cache: Mutex<HashMap<String, Arc<RobotsRules>>>,
}

impl RobotsChecker {
    pub fn new(respect_robots: bool, client: Client) -> Self {
        Self {
            respect_robots,
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn can_fetch(&self, url: &Url) -> bool {
        if !self.respect_robots {
            return true;
        }
        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.to_lowercase();
        if SKIP_ROBOTS_HOSTS
            .iter()
            .any(|skip| crate::dedup::domain_matches(&host, skip))
        {
            return true;
        }

        let rules = self.rules_for(url, &host).await;
        let allowed = rules.allows(url.path());
        if !allowed {
            debug!(%url, "disallowed by robots.txt");
        }
        allowed
    }

    async fn rules_for(&self, url: &Url, host: &str) -> Arc<RobotsRules> {
        {
            let cache = self.cache.lock().await;
            if let Some(rules) = cache.get(host) {
                return Arc::clone(rules);
            }
        }

        let robots_url = format!("{}://{}/robots.txt", url.scheme(), host_with_port(url));
        let rules = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => Arc::new(RobotsRules::parse(&body)),
                Err(_) => Arc::new(RobotsRules::default()),
            },
            _ => Arc::new(RobotsRules::default()),
        };

        let mut cache = self.cache.lock().await;
        cache.insert(host.to_string(), Arc::clone(&rules));
        rules
    }
}

fn host_with_port(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}
