//! Error types for StripeTrace
//!
//! This module defines the error taxonomy shared by the record runtime
//! and the command-line driver.

use thiserror::Error;

/// Common result type for StripeTrace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for StripeTrace
#[derive(Debug, Error)]
pub enum Error {
    // Stripe query errors
    #[error("stripe query failed: {reason}")]
    StripeQueryFailed { reason: String },

    #[error("invalid stripe layout: {0}")]
    InvalidLayout(String),

    // Budget errors
    #[error("record arena out of space: required {required} bytes, available {available} bytes")]
    OutOfSpace { required: usize, available: usize },

    #[error("runtime index array is full ({capacity} entries)")]
    IndexFull { capacity: usize },

    // Reorder errors
    #[error("failed to allocate {required} bytes of reorder scratch space")]
    ScratchAllocationFailed { required: usize },

    #[error("index desynchronized: {0}")]
    IndexDesync(String),

    // Setup errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("initialization failed: {0}")]
    Initialization(String),
}

impl Error {
    /// Create a stripe query error
    pub fn stripe_query(reason: impl Into<String>) -> Self {
        Self::StripeQueryFailed {
            reason: reason.into(),
        }
    }

    /// Create an index desync error
    pub fn desync(msg: impl Into<String>) -> Self {
        Self::IndexDesync(msg.into())
    }

    /// Check if the current file should be skipped and the batch kept alive
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::StripeQueryFailed { .. }
                | Self::InvalidLayout(_)
                | Self::OutOfSpace { .. }
                | Self::IndexFull { .. }
        )
    }

    /// Check if the memory budget will not accept further records
    #[must_use]
    pub const fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::OutOfSpace { .. } | Self::IndexFull { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_skippable() {
        assert!(Error::stripe_query("not on lustre").is_skippable());
        assert!(
            Error::OutOfSpace {
                required: 64,
                available: 8
            }
            .is_skippable()
        );
        assert!(!Error::ScratchAllocationFailed { required: 10 }.is_skippable());
        assert!(!Error::desync("bad").is_skippable());
    }

    #[test]
    fn test_error_budget_exhausted() {
        assert!(
            Error::OutOfSpace {
                required: 64,
                available: 8
            }
            .is_budget_exhausted()
        );
        assert!(Error::IndexFull { capacity: 3 }.is_budget_exhausted());
        assert!(!Error::stripe_query("enotty").is_budget_exhausted());
    }

    #[test]
    fn test_error_display() {
        let err = Error::OutOfSpace {
            required: 72,
            available: 16,
        };
        assert_eq!(
            err.to_string(),
            "record arena out of space: required 72 bytes, available 16 bytes"
        );
    }
}
