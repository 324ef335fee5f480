//! Batch install pipeline: fetch, extract, name and report progress

pub mod extraction;
pub mod fetcher;
pub mod progress;
pub mod scheduler;
pub mod worker;

pub use fetcher::{Fetcher, HttpFetcher, ProgressFn};
pub use progress::{LogProgressSink, ProgressSink, ProgressUpdate};
pub use scheduler::{BatchOptions, BatchScheduler};
pub use worker::InstallWorker;
