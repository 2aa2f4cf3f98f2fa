use crate::crawler::{CrawlWindow, DayBoundary, DelayRange, RetryPolicy, SignalRules};
use crate::endpoint::{EndpointDescriptor, EndpointKind, DEFAULT_BASE_URL};
use crate::state::CrawlLimits;
use crate::{ConfigError, ConfigResult};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Feed-Trawl
///
/// Every section and key has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub window: WindowConfig,
    pub client: ClientConfig,
    pub signer: SignerConfig,
    pub output: OutputConfig,
    pub signals: SignalsConfig,
}

/// Retry, pacing and limit configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Attempts per page before it counts as failed
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Timeout of the first attempt (seconds)
    #[serde(rename = "base-timeout")]
    pub base_timeout: f64,

    /// Timeout added per further attempt (seconds)
    #[serde(rename = "timeout-step")]
    pub timeout_step: f64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: f64,

    /// Retry jitter bounds, multiplied by the attempt index (seconds)
    #[serde(rename = "jitter-min")]
    pub jitter_min: f64,
    #[serde(rename = "jitter-max")]
    pub jitter_max: f64,

    /// Extra delay after a rate-limit or auth-required signal (seconds)
    #[serde(rename = "penalty-min")]
    pub penalty_min: f64,
    #[serde(rename = "penalty-max")]
    pub penalty_max: f64,

    /// Delay before each page after the first (seconds)
    #[serde(rename = "page-delay-min")]
    pub page_delay_min: f64,
    #[serde(rename = "page-delay-max")]
    pub page_delay_max: f64,

    /// Items requested per page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Maximum pages per session
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Consecutive failed pages before a session gives up
    #[serde(rename = "max-failure-streak")]
    pub max_failure_streak: u32,

    /// Maximum records per session (0 = unbounded)
    #[serde(rename = "max-items")]
    pub max_items: usize,

    /// Per-item cursor step used when a page's cursor is unknown
    #[serde(rename = "degraded-cursor-step")]
    pub degraded_cursor_step: i64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_timeout: 20.0,
            timeout_step: 5.0,
            connect_timeout: 10.0,
            jitter_min: 1.5,
            jitter_max: 3.0,
            penalty_min: 10.0,
            penalty_max: 20.0,
            page_delay_min: 1.0,
            page_delay_max: 2.0,
            page_size: crate::endpoint::DEFAULT_PAGE_SIZE,
            max_pages: 15,
            max_failure_streak: 3,
            max_items: 0,
            degraded_cursor_step: crate::crawler::DEFAULT_DEGRADED_CURSOR_STEP,
        }
    }
}

/// Date window configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// First included day, `YYYY-MM-DD` or `now`
    #[serde(rename = "start-date")]
    pub start_date: Option<String>,

    /// Last included day, `YYYY-MM-DD` or `now`
    #[serde(rename = "end-date")]
    pub end_date: Option<String>,

    /// `local`, `utc` or a fixed `±HH:MM` offset
    #[serde(rename = "time-zone")]
    pub time_zone: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            time_zone: "local".to_string(),
        }
    }
}

/// Upstream client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// External signer configuration
///
/// Without a command, queries are sent unsigned.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Enables the dedup store and incremental sync
    pub database: bool,

    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory for diagnostic body captures
    #[serde(rename = "diagnostics-dir")]
    pub diagnostics_dir: String,

    /// Bytes of body kept per diagnostic capture
    #[serde(rename = "diagnostic-limit")]
    pub diagnostic_limit: usize,

    /// Directory for per-session JSON results
    #[serde(rename = "records-dir")]
    pub records_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database: true,
            database_path: "feed-trawl.db".to_string(),
            diagnostics_dir: "diagnostics".to_string(),
            diagnostic_limit: crate::crawler::DEFAULT_DIAGNOSTIC_LIMIT,
            records_dir: "records".to_string(),
        }
    }
}

/// Substrings that classify API error messages
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    #[serde(rename = "rate-limited")]
    pub rate_limited: Vec<String>,

    #[serde(rename = "auth-required")]
    pub auth_required: Vec<String>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        let rules = SignalRules::default();
        Self {
            rate_limited: rules.rate_limited,
            auth_required: rules.auth_required,
        }
    }
}

// ===== Conversions =====

/// Converts validated seconds to a duration
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        let c = &self.crawler;
        RetryPolicy {
            max_attempts: c.max_attempts,
            base_timeout: secs(c.base_timeout),
            timeout_step: secs(c.timeout_step),
            jitter: DelayRange::new(secs(c.jitter_min), secs(c.jitter_max)),
            penalty: DelayRange::new(secs(c.penalty_min), secs(c.penalty_max)),
        }
    }

    pub fn page_delay(&self) -> DelayRange {
        DelayRange::new(
            secs(self.crawler.page_delay_min),
            secs(self.crawler.page_delay_max),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        secs(self.crawler.connect_timeout)
    }

    pub fn limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_items: self.crawler.max_items,
            max_pages: self.crawler.max_pages,
            max_failure_streak: self.crawler.max_failure_streak,
        }
    }

    pub fn signal_rules(&self) -> SignalRules {
        SignalRules {
            rate_limited: self.signals.rate_limited.clone(),
            auth_required: self.signals.auth_required.clone(),
        }
    }

    /// Built-in descriptor for a mode, with the configured page size
    pub fn descriptor(&self, kind: EndpointKind) -> EndpointDescriptor {
        EndpointDescriptor::for_kind(kind).with_page_size(self.crawler.page_size)
    }

    pub fn day_boundary(&self) -> ConfigResult<DayBoundary> {
        self.window
            .time_zone
            .parse()
            .map_err(ConfigError::Validation)
    }

    /// Resolves the date window, with `now` meaning today in the configured zone
    pub fn crawl_window(&self) -> ConfigResult<CrawlWindow> {
        let zone = self.day_boundary()?;
        let start = resolve_date(self.window.start_date.as_deref(), zone, NaiveDate::MIN)?;
        let end = resolve_date(self.window.end_date.as_deref(), zone, NaiveDate::MAX)?;
        Ok(CrawlWindow::new(start, end))
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.output
            .database
            .then(|| PathBuf::from(&self.output.database_path))
    }
}

/// Parses a configured date; empty or absent yields `fallback`
pub fn resolve_date(
    value: Option<&str>,
    zone: DayBoundary,
    fallback: NaiveDate,
) -> ConfigResult<NaiveDate> {
    match value.map(str::trim) {
        None | Some("") => Ok(fallback),
        Some(v) if v.eq_ignore_ascii_case("now") => Ok(zone.today()),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map_err(|e| ConfigError::InvalidDate(format!("'{}': {}", v, e))),
    }
}
