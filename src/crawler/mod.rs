//! Crawler module for paginated timeline collection
//!
//! This module contains the core crawling logic, including:
//! - HTTP transport and query signing seams
//! - Page fetching with failure classification
//! - Per-page retry scheduling with backoff and penalties
//! - Date window filtering and incremental dedup
//! - The crawl engine state machine tying them together

mod dedup;
mod engine;
mod fetcher;
mod filter;
mod scheduler;
mod signer;
mod transport;

pub use dedup::{DedupSync, Observation};
pub use engine::{CrawlEngine, CrawlOutcome, CrawlRequest, DEFAULT_DEGRADED_CURSOR_STEP};
pub use fetcher::{
    classify_body, ApiErrorClass, DiagnosticSink, FailureKind, FetchFailure, FetchOutcome, Page,
    PageFetcher, PageRequest, SignalRules, DEFAULT_DIAGNOSTIC_LIMIT,
};
pub use filter::{CrawlWindow, DayBoundary, RecordFilter};
pub use scheduler::{pause, AttemptReport, DelayRange, PageAttempt, RetryPolicy, RetryScheduler};
pub use signer::{CommandSigner, PassthroughSigner, Signer, SignerError};
pub use transport::{build_http_client, HttpTransport, RawResponse, ReqwestTransport, TransportError};
