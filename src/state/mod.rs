//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Cursor`: continuation token of a paginated listing
//! - `CrawlSession`: per-call mutable state owned by the engine
//! - `CrawlLimits`: item, page and failure-streak bounds
//! - `TerminationReason`: why a session stopped

mod cursor;
mod session;
mod termination;

// Re-export main types
pub use cursor::Cursor;
pub use session::{CrawlLimits, CrawlSession};
pub use termination::TerminationReason;
