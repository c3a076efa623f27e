//! StripeTrace Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, configuration types and
//! identifier newtypes used by the record runtime and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use config::{RuntimeConfig, SortOrder};
pub use error::{Error, Result};
pub use types::*;
