//! Configuration types for StripeTrace
//!
//! The memory budget fixed here sizes both the record arena and the
//! runtime index array for the lifetime of a runtime.

use crate::error::{Error, Result};
use crate::types::MIN_RECORD_SIZE;
use serde::{Deserialize, Serialize};

/// Default memory budget for the record arena (2 MB)
pub const DEFAULT_MEMORY_BUDGET: usize = 2 * 1024 * 1024;

/// Direction of the rank reorder
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Lowest rank first
    #[default]
    Ascending,
    /// Highest rank first
    Descending,
}

/// Record runtime configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Arena capacity in bytes
    pub memory_budget: usize,
    /// Rank order produced by a reorder
    pub sort_order: SortOrder,
    /// Upper bound on the reorder scratch buffer (None = allocator limit only)
    pub scratch_limit: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            sort_order: SortOrder::Ascending,
            scratch_limit: None,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with the given memory budget
    #[must_use]
    pub fn with_budget(memory_budget: usize) -> Self {
        Self {
            memory_budget,
            ..Self::default()
        }
    }

    /// Set the reorder direction
    #[must_use]
    pub const fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    /// Cap the reorder scratch buffer
    #[must_use]
    pub const fn scratch_limit(mut self, limit: usize) -> Self {
        self.scratch_limit = Some(limit);
        self
    }

    /// Maximum number of records the budget can ever hold
    #[must_use]
    pub const fn max_records(&self) -> usize {
        self.memory_budget / MIN_RECORD_SIZE
    }

    /// Reject budgets that cannot hold a single record
    pub fn validate(&self) -> Result<()> {
        if self.memory_budget < MIN_RECORD_SIZE {
            return Err(Error::Configuration(format!(
                "memory budget {} is below the minimum record size {}",
                self.memory_budget, MIN_RECORD_SIZE
            )));
        }
        Ok(())
    }
}
