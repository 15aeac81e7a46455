// src/fetcher/renderer.rs
use async_trait::async_trait;

use crate::error::Result;
use crate::fetcher::page_fetcher::FetchResult;

/// Alternate rendering path behind the same fetch contract: execute page
/// scripts and return the settled markup. Selected per call by the fetcher
/// (explicit request or content-richness fallback); callers cannot tell
/// which path served them.
///
/// The stock binary ships without an implementation wired in (there is no
/// headless browser in the dependency tree); deployments that need one
/// plug it in through `PageFetcher::with_renderer`.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<FetchResult>;
}
