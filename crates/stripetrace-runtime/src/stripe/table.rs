//! In-memory stripe source
//!
//! Serves layouts from a path-keyed table, for replaying layouts captured
//! elsewhere and for exercising the runtime away from a Lustre mount.

use super::{StripeLayout, StripeQuery};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stripetrace_common::{Error, Result};

/// Path-keyed table of stripe layouts
#[derive(Clone, Debug, Default)]
pub struct StripeTable {
    layouts: HashMap<PathBuf, StripeLayout>,
}

impl StripeTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the layout of `path`
    pub fn insert(&mut self, path: impl Into<PathBuf>, layout: StripeLayout) {
        self.layouts.insert(path.into(), layout);
    }

    /// Number of known paths
    #[must_use]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Check if the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl StripeQuery for StripeTable {
    type Handle = PathBuf;

    fn open(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn query(&self, handle: &PathBuf) -> Result<StripeLayout> {
        self.layouts.get(handle).cloned().ok_or_else(|| {
            Error::stripe_query(format!("{} has no stripe layout", handle.display()))
        })
    }
}
