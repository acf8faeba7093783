mod aggregate;
mod config;
mod crawler;
mod detail;
mod dom;
mod error;
mod fetch;
mod listing;
mod message;
mod metrics;
mod partition;
mod record;
mod worker;
mod writer;

pub use aggregate::Aggregator;
pub use config::{CrawlerConfig, FetcherKind, OnError, Target};
pub use crawler::{crawl_site, crawl_site_until};
pub use detail::{parse_details, DetailValue, Details};
pub use error::CrawlError;
#[cfg(feature = "browser")]
pub use fetch::{BrowserFetcher, BrowserSession};
pub use fetch::{FetchSession, Fetcher, HttpFetcher, HttpSession, ResourcePolicy};
pub use listing::{member_rows, parse_entries_count, ListingPage, ListingSelectors, MemberRow};
pub use message::{TimingSamples, WorkAssignment, WorkerMetrics, WorkerReport};
pub use metrics::{RunMetrics, Timing, UnitMetrics};
pub use partition::partition;
pub use record::{sort_by_name, MemberRecord, NAME_FIELD};
pub use worker::{run_worker, WorkerSettings};
pub use writer::{output_path, JsonArrayWriter, StreamingWriter};

pub use anyhow;
