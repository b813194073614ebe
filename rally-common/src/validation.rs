//! Configuration validation.
//!
//! Checks that thresholds and windows are inside usable ranges before a run
//! starts, so a typo in `screener.json` fails loudly instead of silently
//! screening everything in or out.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, OutputConfig, ScreenerConfig, SourceConfig, SourceKind};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Longest liquidity or lookback window accepted, in trading days.
pub const MAX_WINDOW_DAYS: usize = 5_000;

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn check_fraction(errors: &mut Vec<ValidationError>, field: &str, value: f64) {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        errors.push(invalid(field, format!("must be a fraction in [0, 1], got {}", value)));
    }
}

fn check_window(errors: &mut Vec<ValidationError>, field: &str, days: usize) {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        errors.push(invalid(
            field,
            format!("must be between 1 and {} trading days, got {}", MAX_WINDOW_DAYS, days),
        ));
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.source.validate() {
            errors.push(e);
        }
        if let Err(e) = self.screener.validate() {
            errors.push(e);
        }
        if let Err(e) = self.output.validate() {
            errors.push(e);
        }

        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validate for SourceConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        match self.kind {
            SourceKind::Snapshot if self.snapshot_path.is_none() => {
                errors.push(ValidationError::MissingField {
                    field: "source.snapshot_path".into(),
                });
            }
            SourceKind::Http => match self.base_url.as_deref() {
                None => errors.push(ValidationError::MissingField {
                    field: "source.base_url".into(),
                }),
                Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                    errors.push(invalid("source.base_url", "must start with http:// or https://"));
                }
                Some(_) => {}
            },
            SourceKind::Snapshot => {}
        }

        if self.fetch_timeout_secs == 0 {
            errors.push(invalid("source.fetch_timeout_secs", "must be positive"));
        }
        if self.requests_per_minute == Some(0) {
            errors.push(invalid("source.requests_per_minute", "must be positive when set"));
        }
        if matches!(self.cache_ttl_secs, Some(ttl) if ttl <= 0) {
            errors.push(invalid("source.cache_ttl_secs", "must be positive when set"));
        }

        collect(errors)
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.market.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "screener.market".into(),
            });
        }
        if !self.max_price.is_finite() || self.max_price <= 0.0 {
            errors.push(invalid("screener.max_price", "must be a positive price"));
        }
        if !self.liquidity_ratio.is_finite() || self.liquidity_ratio < 0.0 {
            errors.push(invalid("screener.liquidity_ratio", "must be non-negative"));
        }
        check_window(&mut errors, "screener.liquidity_days", self.liquidity_days);
        check_window(&mut errors, "screener.lookback_days", self.lookback_days);
        if !self.rise_from_low_pct.is_finite() || self.rise_from_low_pct < 0.0 {
            errors.push(invalid("screener.rise_from_low_pct", "must be non-negative"));
        }
        check_fraction(&mut errors, "screener.drop_from_high_pct", self.drop_from_high_pct);
        check_fraction(&mut errors, "screener.max_drawdown_pct", self.max_drawdown_pct);
        if self.max_output_count == 0 {
            errors.push(invalid("screener.max_output_count", "must be at least 1"));
        }
        if self.concurrency == 0 {
            errors.push(invalid("screener.concurrency", "must be at least 1"));
        }

        collect(errors)
    }
}

impl Validate for OutputConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_formats = ["table", "markdown", "md", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(invalid(
                "output.format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }
        Ok(())
    }
}
