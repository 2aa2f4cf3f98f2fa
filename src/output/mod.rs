//! Output module for session results
//!
//! This module handles:
//! - Writing each session's outcome and records as a JSON report
//! - Printing a short per-session summary
//! - Draining parallel sessions into a run summary
//! - Store statistics for `--stats`

pub mod stats;

pub use stats::{load_statistics, print_statistics, StoreStatistics};

use crate::crawler::CrawlOutcome;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;

/// JSON document written for one session
#[derive(Debug, Serialize)]
pub struct SessionReport<'a> {
    /// Hash of the config file the session ran with
    pub config_hash: &'a str,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: &'a CrawlOutcome,
}

/// Writes a session report into `dir`
///
/// The file is named after the mode, the target and the finish time, so
/// repeated runs never overwrite each other.
///
/// # Arguments
///
/// * `dir` - Records directory, created if missing
/// * `outcome` - The finished session
/// * `config_hash` - Hash of the config used
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the written report
/// * `Err(TrawlError)` - Failed to serialize or write the report
pub fn write_report(dir: &Path, outcome: &CrawlOutcome, config_hash: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let finished_at = Utc::now();
    let report = SessionReport {
        config_hash,
        finished_at,
        outcome,
    };

    let path = dir.join(report_file_name(outcome, finished_at));
    let json = serde_json::to_vec_pretty(&report)?;
    std::fs::write(&path, json)?;

    tracing::debug!("Wrote session report to {}", path.display());
    Ok(path)
}

/// Replaces everything but ASCII alphanumerics, `-` and `_` with `_`
pub(crate) fn sanitize_file_stem(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn report_file_name(outcome: &CrawlOutcome, finished_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.json",
        outcome.kind,
        sanitize_file_stem(&outcome.target),
        finished_at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

/// Prints a one-line summary of a session to stdout
pub fn print_outcome(outcome: &CrawlOutcome) {
    println!(
        "{} {}: {} records ({}) - pages {}, fetch calls {}, filtered {}, malformed {}, degraded {}",
        outcome.kind,
        outcome.target,
        outcome.records.len(),
        outcome.reason,
        outcome.pages,
        outcome.fetch_calls,
        outcome.filtered,
        outcome.malformed,
        outcome.degraded
    );
}

/// Tally of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sessions collected from the set
    pub sessions: usize,

    /// Sessions that errored, ended in an upstream failure or lost their report
    pub failed: usize,

    /// Reports written
    pub reports: Vec<PathBuf>,
}

/// Waits for every session in `sessions`, reporting each as it finishes
///
/// A session error or a failed report write is logged and counted; the
/// remaining sessions are always drained.
pub async fn collect_sessions(
    sessions: &mut JoinSet<Result<CrawlOutcome>>,
    records_dir: &Path,
    config_hash: &str,
) -> RunSummary {
    let mut summary = RunSummary::default();

    while let Some(joined) = sessions.join_next().await {
        summary.sessions += 1;

        let outcome = match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                summary.failed += 1;
                tracing::error!("Session aborted: {}", e);
                continue;
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!("Session task failed: {}", e);
                continue;
            }
        };

        print_outcome(&outcome);
        let mut ok = !outcome.reason.is_failure();
        if !ok {
            tracing::warn!(
                "{} session for {} ended with {}",
                outcome.kind,
                outcome.target,
                outcome.reason
            );
        }

        match write_report(records_dir, &outcome, config_hash) {
            Ok(path) => {
                tracing::info!("Report written to {}", path.display());
                summary.reports.push(path);
            }
            Err(e) => {
                ok = false;
                tracing::error!("Failed to write report for {}: {}", outcome.target, e);
            }
        }

        if !ok {
            summary.failed += 1;
        }
    }

    summary
}
