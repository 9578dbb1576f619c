pub mod classifier;
pub mod crawler;
pub mod element_model;

pub use classifier::{Classification, classify_page};
pub use crawler::{DiscoveryConfig, crawl_page};
pub use element_model::{CrawlResult, CrawlStats, ElementType, TestableElement};
