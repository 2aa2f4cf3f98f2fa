use crate::endpoint::EndpointDescriptor;
use crate::record::{DedupScope, Record};
use crate::state::Cursor;

/// Bounds on a single crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlLimits {
    /// Maximum number of records to return (0 = unbounded)
    pub max_items: usize,

    /// Maximum number of pages to request
    pub max_pages: u32,

    /// Consecutive exhausted pages tolerated before giving up
    pub max_failure_streak: u32,
}

impl CrawlLimits {
    /// Returns true once `count` records satisfy the item limit
    pub fn quantity_reached(&self, count: usize) -> bool {
        self.max_items > 0 && count >= self.max_items
    }
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_items: 0,
            max_pages: 15,
            max_failure_streak: 3,
        }
    }
}

/// Mutable state of one crawl session
///
/// Created when a crawl starts, owned and mutated only by the engine, and dropped
/// when the crawl returns. Nothing here is persisted.
#[derive(Debug)]
pub struct CrawlSession {
    pub target: String,
    pub descriptor: EndpointDescriptor,
    pub scope: DedupScope,
    pub limits: CrawlLimits,
    pub increase: bool,

    /// Cursor of the page about to be fetched
    pub cursor: Cursor,

    /// Records that survived filtering and dedup
    pub records: Vec<Record>,

    /// 1-based number of the page being worked on
    pub page_counter: u32,

    /// Pages in a row whose retries were exhausted
    pub failure_streak: u32,

    /// Total HTTP attempts made across all pages
    pub fetch_calls: u32,

    /// Items dropped by the date window
    pub filtered: u32,

    /// Items that could not be turned into records
    pub malformed: u32,

    /// Pages skipped through degraded continuation
    pub degraded: u32,
}

impl CrawlSession {
    pub fn new(
        target: impl Into<String>,
        descriptor: EndpointDescriptor,
        limits: CrawlLimits,
        increase: bool,
    ) -> Self {
        let target = target.into();
        let scope = DedupScope::new(descriptor.scope_prefix.clone(), target.clone());

        Self {
            target,
            descriptor,
            scope,
            limits,
            increase,
            cursor: Cursor::start(),
            records: Vec::new(),
            page_counter: 1,
            failure_streak: 0,
            fetch_calls: 0,
            filtered: 0,
            malformed: 0,
            degraded: 0,
        }
    }

    /// True while the first page has not produced anything
    pub fn is_empty_first_page(&self) -> bool {
        self.page_counter == 1 && self.records.is_empty()
    }

    /// Moves on to the next page at `cursor`
    pub fn advance(&mut self, cursor: Cursor) {
        self.cursor = cursor;
        self.page_counter += 1;
    }

    /// Label used for diagnostic artifacts of the current page
    pub fn diagnostic_label(&self) -> String {
        format!("{}_cursor_{}", self.scope, self.cursor)
    }

    /// The degraded forward step for numeric cursors
    pub fn degraded_step(&self, per_item: i64) -> i64 {
        i64::from(self.descriptor.page_size).saturating_mul(per_item)
    }
}
