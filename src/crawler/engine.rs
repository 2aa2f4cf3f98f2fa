//! Crawl engine
//!
//! Orchestrates one session as a state machine:
//!
//! - `Fetching`: run the retry loop for the current cursor
//! - `Processing`: turn items into records, filter them and observe them for dedup
//! - `Advancing`: decide whether to stop or move on to the next cursor
//! - `Terminated`: return the records together with the reason
//!
//! The engine is written once against `EndpointDescriptor`; the mode never shows
//! up as a branch here.

use crate::crawler::dedup::{DedupSync, Observation};
use crate::crawler::fetcher::{FetchOutcome, Page, PageFetcher, PageRequest};
use crate::crawler::filter::{CrawlWindow, DayBoundary, RecordFilter};
use crate::crawler::scheduler::{pause, AttemptReport, DelayRange, PageAttempt, RetryScheduler};
use crate::crawler::signer::Signer;
use crate::endpoint::{EndpointDescriptor, EndpointKind, RequestVariantCatalog};
use crate::record::Record;
use crate::state::{CrawlLimits, CrawlSession, Cursor, TerminationReason};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default per-item multiplier of the degraded cursor step
pub const DEFAULT_DEGRADED_CURSOR_STEP: i64 = 10_000;

/// What to crawl and within which bounds
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub target: String,
    pub descriptor: EndpointDescriptor,
    pub window: CrawlWindow,
    pub zone: DayBoundary,
    pub limits: CrawlLimits,
    pub increase: bool,
}

impl CrawlRequest {
    pub fn new(target: impl Into<String>, descriptor: EndpointDescriptor) -> Self {
        Self {
            target: target.into(),
            descriptor,
            window: CrawlWindow::default(),
            zone: DayBoundary::default(),
            limits: CrawlLimits::default(),
            increase: false,
        }
    }

    pub fn with_window(mut self, window: CrawlWindow, zone: DayBoundary) -> Self {
        self.window = window;
        self.zone = zone;
        self
    }

    pub fn with_limits(mut self, limits: CrawlLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_increase(mut self, increase: bool) -> Self {
        self.increase = increase;
        self
    }
}

/// Final result of a session: always the records and the reason together
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub target: String,
    pub kind: EndpointKind,
    pub reason: TerminationReason,
    pub pages: u32,
    pub fetch_calls: u32,
    pub filtered: u32,
    pub malformed: u32,
    pub degraded: u32,
    pub records: Vec<Record>,
}

impl CrawlOutcome {
    fn from_session(session: CrawlSession, reason: TerminationReason) -> Self {
        Self {
            target: session.target,
            kind: session.descriptor.kind,
            reason,
            pages: session.page_counter,
            fetch_calls: session.fetch_calls,
            filtered: session.filtered,
            malformed: session.malformed,
            degraded: session.degraded,
            records: session.records,
        }
    }

    pub fn record_ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Where to go after a page
#[derive(Debug)]
struct Advance {
    has_more: bool,

    /// None asks for the degraded forward estimate
    next: Option<Cursor>,
}

#[derive(Debug)]
enum Step {
    Fetching,
    Processing(Page),
    Advancing(Advance),
    Terminated(TerminationReason),
}

/// Drives crawl sessions
///
/// Holds only shared, read-only collaborators; every call to `run` builds its own
/// session state and request catalog, so one engine can serve parallel sessions.
pub struct CrawlEngine {
    fetcher: PageFetcher,
    scheduler: RetryScheduler,
    signer: Arc<dyn Signer>,
    dedup: Option<DedupSync>,
    base_url: String,
    page_delay: DelayRange,
    degraded_step: i64,
}

impl CrawlEngine {
    /// Creates an engine without dedup
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Issues and classifies requests
    /// * `scheduler` - Drives the attempt loop of every page
    /// * `signer` - Signs each query before it is sent
    /// * `base_url` - Upstream origin, e.g. `https://www.douyin.com`
    pub fn new(
        fetcher: PageFetcher,
        scheduler: RetryScheduler,
        signer: Arc<dyn Signer>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            scheduler,
            signer,
            dedup: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_delay: DelayRange::from_secs_f64(1.0, 2.0),
            degraded_step: DEFAULT_DEGRADED_CURSOR_STEP,
        }
    }

    /// Enables dedup and incremental stop against a store
    pub fn with_dedup(mut self, dedup: DedupSync) -> Self {
        self.dedup = Some(dedup);
        self
    }

    /// Sets the delay drawn before each page after the first
    pub fn with_page_delay(mut self, page_delay: DelayRange) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Sets the per-item multiplier of the degraded cursor step
    pub fn with_degraded_step(mut self, degraded_step: i64) -> Self {
        self.degraded_step = degraded_step;
        self
    }

    /// Runs one session with a freshly generated request identity
    pub async fn run(&self, request: CrawlRequest, cancel: &CancellationToken) -> Result<CrawlOutcome> {
        let catalog = RequestVariantCatalog::generate(self.base_url.clone());
        self.run_with_catalog(request, &catalog, cancel).await
    }

    /// Runs one session with a caller-supplied catalog
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - The session terminated; see `reason`
    /// * `Err(TrawlError)` - The signer or the dedup store failed
    pub async fn run_with_catalog(
        &self,
        request: CrawlRequest,
        catalog: &RequestVariantCatalog,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome> {
        let CrawlRequest {
            target,
            descriptor,
            window,
            zone,
            limits,
            increase,
        } = request;

        let filter = RecordFilter::new(window, zone);
        let mut session = CrawlSession::new(target, descriptor, limits, increase);

        tracing::info!(
            "Starting {} crawl of {} (max_items={}, max_pages={}, increase={})",
            session.descriptor.kind,
            session.target,
            limits.max_items,
            limits.max_pages,
            increase
        );

        let mut step = Step::Fetching;
        let reason = loop {
            step = match step {
                Step::Fetching => self.fetch(&mut session, catalog, cancel).await?,
                Step::Processing(page) => self.process(&mut session, &filter, page)?,
                Step::Advancing(advance) => self.advance(&mut session, advance),
                Step::Terminated(reason) => break reason,
            };
        };

        tracing::info!(
            "Finished {} crawl of {}: {} records, reason={}, pages={}, fetch_calls={}",
            session.descriptor.kind,
            session.target,
            session.records.len(),
            reason,
            session.page_counter,
            session.fetch_calls
        );

        Ok(CrawlOutcome::from_session(session, reason))
    }

    // ===== States =====

    async fn fetch(
        &self,
        session: &mut CrawlSession,
        catalog: &RequestVariantCatalog,
        cancel: &CancellationToken,
    ) -> Result<Step> {
        if session.page_counter > 1 && pause(self.page_delay.sample(), cancel).await.is_err() {
            return Ok(Step::Terminated(TerminationReason::Cancelled));
        }

        tracing::debug!(
            "Fetching page {} of {} at cursor {}",
            session.page_counter,
            session.scope,
            session.cursor
        );

        let report = {
            let call = PageCall {
                fetcher: &self.fetcher,
                signer: self.signer.as_ref(),
                catalog,
                descriptor: &session.descriptor,
                target: &session.target,
                cursor: &session.cursor,
                base_url: &self.base_url,
                label: session.diagnostic_label(),
            };
            self.scheduler.run(&call, cancel).await?
        };
        session.fetch_calls += report.attempts();

        match report {
            AttemptReport::Success { page, .. } => {
                session.failure_streak = 0;
                Ok(Step::Processing(page))
            }
            AttemptReport::Cancelled { .. } => Ok(Step::Terminated(TerminationReason::Cancelled)),
            AttemptReport::Exhausted {
                last_failure,
                cursor_hint,
                ..
            } => {
                session.failure_streak += 1;
                let last = last_failure
                    .map(|f| f.kind.to_string())
                    .unwrap_or_else(|| "unknown".to_string());

                if session.is_empty_first_page() {
                    tracing::error!(
                        "First page of {} failed after all retries ({}); no data",
                        session.scope,
                        last
                    );
                    return Ok(Step::Terminated(TerminationReason::NoData));
                }

                tracing::warn!(
                    "Page {} of {} failed after all retries ({}); continuing degraded, streak {}",
                    session.page_counter,
                    session.scope,
                    last,
                    session.failure_streak
                );
                session.degraded += 1;

                let next = cursor_hint.filter(|hint| *hint != session.cursor);
                Ok(Step::Advancing(Advance {
                    has_more: true,
                    next,
                }))
            }
        }
    }

    fn process(
        &self,
        session: &mut CrawlSession,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Step> {
        tracing::debug!(
            "Page {} of {} returned {} items",
            session.page_counter,
            session.scope,
            page.items.len()
        );

        for item in page.items {
            let record = match Record::from_item(item, &session.descriptor) {
                Ok(record) => record,
                Err(e) => {
                    session.malformed += 1;
                    tracing::debug!("Skipping malformed item in {}: {}", session.scope, e);
                    continue;
                }
            };

            if !filter.include(&record) {
                session.filtered += 1;
                continue;
            }

            if let Some(dedup) = &self.dedup {
                if dedup.observe(&session.scope, &record, session.increase)?
                    == Observation::StopSignal
                {
                    tracing::info!(
                        "Reached previously synced item {} in {}",
                        record.id,
                        session.scope
                    );
                    return Ok(Step::Terminated(TerminationReason::SyncBoundary));
                }
            }

            session.records.push(record);
            if session.limits.quantity_reached(session.records.len()) {
                return Ok(Step::Terminated(TerminationReason::QuantityReached));
            }
        }

        Ok(Step::Advancing(Advance {
            has_more: page.has_more,
            next: page.cursor,
        }))
    }

    fn advance(&self, session: &mut CrawlSession, advance: Advance) -> Step {
        if !advance.has_more {
            return Step::Terminated(TerminationReason::Complete);
        }
        if session.failure_streak >= session.limits.max_failure_streak {
            tracing::warn!(
                "{} consecutive pages of {} failed; giving up",
                session.failure_streak,
                session.scope
            );
            return Step::Terminated(TerminationReason::FailureStreak);
        }
        if session.page_counter >= session.limits.max_pages {
            return Step::Terminated(TerminationReason::PageLimit);
        }

        let next = match advance.next {
            Some(cursor) => cursor,
            None => {
                let step = session.degraded_step(self.degraded_step);
                match session.cursor.estimate_forward(step) {
                    Some(estimate) => {
                        tracing::warn!(
                            "No cursor for {} after page {}; estimating {}",
                            session.scope,
                            session.page_counter,
                            estimate
                        );
                        estimate
                    }
                    None => session.cursor.clone(),
                }
            }
        };

        session.advance(next);
        Step::Fetching
    }
}

/// One page's request factory, handed to the retry loop
struct PageCall<'a> {
    fetcher: &'a PageFetcher,
    signer: &'a dyn Signer,
    catalog: &'a RequestVariantCatalog,
    descriptor: &'a EndpointDescriptor,
    target: &'a str,
    cursor: &'a Cursor,
    base_url: &'a str,
    label: String,
}

#[async_trait]
impl<'a> PageAttempt for PageCall<'a> {
    async fn attempt(&self, index: u32, timeout: Duration) -> Result<FetchOutcome> {
        let variant = self.catalog.variant(self.descriptor.kind, index);
        let query = build_query(self.descriptor, self.target, self.cursor, &variant.query);
        let signed = self.signer.sign(&query).await?;

        let request = PageRequest {
            url: format!("{}{}?{}", self.base_url, self.descriptor.path, signed),
            headers: variant.headers,
            label: self.label.clone(),
        };
        tracing::debug!("Attempt {} -> {}", index + 1, request.url);

        Ok(self.fetcher.fetch(&request, timeout, self.descriptor).await)
    }
}

/// Encodes target, page size, cursor and variant parameters, in that order
fn build_query(
    descriptor: &EndpointDescriptor,
    target: &str,
    cursor: &Cursor,
    extra: &[(String, String)],
) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query
        .append_pair(&descriptor.target_param, target)
        .append_pair("count", &descriptor.page_size.to_string())
        .append_pair(&descriptor.cursor_param, &cursor.query_value());
    for (name, value) in extra {
        query.append_pair(name, value);
    }
    query.finish()
}
