use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Couldn't fetch {url} got: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Row {index} has no member link")]
    MissingMemberLink { index: usize },

    #[error("Worker (ID={worker_id}) failed: {reason}")]
    WorkerFailed { worker_id: usize, reason: String },

    #[error("Worker crashed: {reason}")]
    WorkerCrashed { reason: String },

    #[error("Page {url} stalled with {collected} of {expected} members after {waited_secs}s")]
    AggregationStall {
        url: String,
        collected: usize,
        expected: usize,
        waited_secs: u64,
    },

    #[error("Worker (ID={worker_id}) reported {count} members but only {remaining} were expected")]
    AggregateOverflow {
        worker_id: usize,
        count: usize,
        remaining: usize,
    },

    #[error("Worker (ID={worker_id}) reported twice")]
    DuplicateReport { worker_id: usize },

    #[error("Unknown worker (ID={worker_id}) for a pool of {workers_count}")]
    UnknownWorker {
        worker_id: usize,
        workers_count: usize,
    },

    #[error("Couldn't write {path:?} got: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Array in {path:?} is already closed")]
    ArrayClosed { path: PathBuf },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Interrupted")]
    Interrupted,
}
