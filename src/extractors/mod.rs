pub mod email_extractor;

pub use email_extractor::EmailExtractor;
