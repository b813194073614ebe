//! Rally Common - Shared configuration, logging, and error handling for the rally screener.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.rally/*.json` plus env overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and fetch metrics
//! - Small formatting helpers shared by reports

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, ObservabilityConfig, OutputConfig, ScreenerConfig, SortKey, SourceConfig, SourceKind,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
