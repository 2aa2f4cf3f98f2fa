use crate::config::types::{
    resolve_date, ClientConfig, Config, CrawlerConfig, OutputConfig, SignalsConfig, SignerConfig,
    WindowConfig,
};
use crate::crawler::DayBoundary;
use crate::ConfigError;
use chrono::NaiveDate;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_window_config(&config.window)?;
    validate_client_config(&config.client)?;
    validate_signer_config(&config.signer)?;
    validate_output_config(&config.output)?;
    validate_signals_config(&config.signals)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page-size must be >= 1, got {}",
            config.page_size
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_failure_streak < 1 {
        return Err(ConfigError::Validation(format!(
            "max-failure-streak must be >= 1, got {}",
            config.max_failure_streak
        )));
    }

    if config.degraded_cursor_step < 0 {
        return Err(ConfigError::Validation(format!(
            "degraded-cursor-step must be >= 0, got {}",
            config.degraded_cursor_step
        )));
    }

    validate_seconds("base-timeout", config.base_timeout)?;
    validate_seconds("timeout-step", config.timeout_step)?;
    validate_seconds("connect-timeout", config.connect_timeout)?;

    if config.base_timeout == 0.0 {
        return Err(ConfigError::Validation(
            "base-timeout must be greater than 0".to_string(),
        ));
    }

    validate_range("jitter", config.jitter_min, config.jitter_max)?;
    validate_range("penalty", config.penalty_min, config.penalty_max)?;
    validate_range("page-delay", config.page_delay_min, config.page_delay_max)?;

    Ok(())
}

/// Validates a duration given in seconds
fn validate_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validates a `<name>-min` / `<name>-max` pair
fn validate_range(name: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    validate_seconds(&format!("{}-min", name), min)?;
    validate_seconds(&format!("{}-max", name), max)?;

    if min > max {
        return Err(ConfigError::Validation(format!(
            "{}-min ({}) must not exceed {}-max ({})",
            name, min, name, max
        )));
    }
    Ok(())
}

/// Validates the date window
fn validate_window_config(config: &WindowConfig) -> Result<(), ConfigError> {
    let zone: DayBoundary = config
        .time_zone
        .parse()
        .map_err(ConfigError::Validation)?;

    let start = resolve_date(config.start_date.as_deref(), zone, NaiveDate::MIN)?;
    let end = resolve_date(config.end_date.as_deref(), zone, NaiveDate::MAX)?;

    if start > end {
        return Err(ConfigError::Validation(format!(
            "start-date ({}) must not be after end-date ({})",
            start, end
        )));
    }

    Ok(())
}

/// Validates client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.query().is_some() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must not carry a query string",
            config.base_url
        )));
    }

    Ok(())
}

/// Validates signer configuration
fn validate_signer_config(config: &SignerConfig) -> Result<(), ConfigError> {
    if let Some(command) = &config.command {
        if command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "signer command cannot be empty".to_string(),
            ));
        }
    } else if !config.args.is_empty() {
        return Err(ConfigError::Validation(
            "signer args given without a command".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database && config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty when the database is enabled".to_string(),
        ));
    }

    if config.diagnostics_dir.is_empty() {
        return Err(ConfigError::Validation(
            "diagnostics-dir cannot be empty".to_string(),
        ));
    }

    if config.records_dir.is_empty() {
        return Err(ConfigError::Validation(
            "records-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates signal substrings
fn validate_signals_config(config: &SignalsConfig) -> Result<(), ConfigError> {
    let all = config.rate_limited.iter().chain(config.auth_required.iter());
    for signal in all {
        if signal.trim().is_empty() {
            return Err(ConfigError::Validation(
                "signal substrings cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}
