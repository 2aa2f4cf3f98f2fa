//! Statistics generation from the dedup database
//!
//! This module provides functionality for extracting and displaying
//! store statistics from the storage layer.

use crate::storage::DedupStore;
use crate::Result;

/// Dedup store statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Total number of stored items
    pub total_items: u64,

    /// Stored items per scope, sorted by scope
    pub scopes: Vec<(String, u64)>,
}

impl StoreStatistics {
    /// Item counts grouped by scope prefix (`post`, `like`, ...)
    pub fn by_prefix(&self) -> Vec<(String, u64)> {
        let mut grouped: Vec<(String, u64)> = Vec::new();
        for (scope, count) in &self.scopes {
            let prefix = scope.split_once(':').map_or(scope.as_str(), |(p, _)| p);
            match grouped.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, total)) => *total += count,
                None => grouped.push((prefix.to_string(), *count)),
            }
        }
        grouped.sort();
        grouped
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(TrawlError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn DedupStore) -> Result<StoreStatistics> {
    let total_items = storage.count_total()?;
    let scopes = storage.scope_counts()?;

    Ok(StoreStatistics {
        total_items,
        scopes,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("Overview:");
    println!("  Total stored items: {}", stats.total_items);
    println!("  Scopes: {}", stats.scopes.len());
    println!();

    if stats.scopes.is_empty() {
        return;
    }

    println!("Items by Mode:");
    for (prefix, count) in stats.by_prefix() {
        println!("  {}: {}", prefix, count);
    }
    println!();

    println!("Items by Scope:");
    // Largest scopes first
    let mut scopes: Vec<_> = stats.scopes.iter().collect();
    scopes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    for (scope, count) in scopes {
        println!("  {}: {}", scope, count);
    }
}
