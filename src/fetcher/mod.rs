pub mod page_fetcher;
pub mod rate_limiter;
pub mod renderer;
pub mod robots;

pub use page_fetcher::{FetchResult, PageFetcher};
pub use rate_limiter::HostRateLimiter;
pub use renderer::Renderer;
pub use robots::RobotsChecker;
