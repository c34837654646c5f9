//! # Jewel Common Library
//!
//! Shared code for the jewelry search workspace:
//! - Error type used by configuration and startup code
//! - TOML configuration loading, defaults and validation
//! - Facet vocabulary table definitions (data-driven conflict checks)
//! - Logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
