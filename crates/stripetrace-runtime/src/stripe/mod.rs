//! Stripe-query collaborator
//!
//! The runtime never talks to the file system directly. It asks a
//! [`StripeQuery`] for the layout of a handle and records whatever comes
//! back. A failed query means the file is not striped (or not on the
//! target file system) and the file is skipped.

pub mod lustre;
pub mod table;

use serde::{Deserialize, Serialize};
use std::path::Path;
use stripetrace_common::{Error, MAX_STRIPE_WIDTH, Result};

pub use lustre::{FileHandle, LustreIoctl};
pub use table::StripeTable;

/// Striping of one file plus the file system totals it lives on
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeLayout {
    /// Bytes per stripe
    pub stripe_size: u64,
    /// Index of the first OST (-1 when the file system picked it)
    pub stripe_offset: i64,
    /// OST index of every stripe, in stripe order
    pub ost_ids: Vec<u32>,
    /// Number of OSTs in the file system
    pub ost_count: u32,
    /// Number of MDTs in the file system
    pub mdt_count: u32,
}

impl StripeLayout {
    /// Create a layout over the given OSTs
    pub fn new(stripe_size: u64, stripe_offset: i64, ost_ids: Vec<u32>) -> Result<Self> {
        if ost_ids.len() > MAX_STRIPE_WIDTH {
            return Err(Error::InvalidLayout(format!(
                "stripe width {} exceeds maximum {MAX_STRIPE_WIDTH}",
                ost_ids.len()
            )));
        }
        Ok(Self {
            stripe_size,
            stripe_offset,
            ost_ids,
            ost_count: 0,
            mdt_count: 0,
        })
    }

    /// Attach file system totals
    #[must_use]
    pub const fn with_totals(mut self, ost_count: u32, mdt_count: u32) -> Self {
        self.ost_count = ost_count;
        self.mdt_count = mdt_count;
        self
    }

    /// Number of OSTs the file is striped over
    #[must_use]
    pub fn stripe_width(&self) -> usize {
        self.ost_ids.len()
    }
}

/// Source of stripe layouts for open files
pub trait StripeQuery {
    /// What identifies a file to this source
    type Handle;

    /// Obtain a handle for `path`
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Query the layout of an open handle
    ///
    /// Returns [`Error::StripeQueryFailed`] when the handle has no
    /// layout; callers skip such files.
    fn query(&self, handle: &Self::Handle) -> Result<StripeLayout>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_width() {
        let layout = StripeLayout::new(1 << 20, 3, vec![3, 4, 5, 6])
            .unwrap()
            .with_totals(8, 1);
        assert_eq!(layout.stripe_width(), 4);
        assert_eq!(layout.ost_count, 8);
        assert_eq!(layout.mdt_count, 1);
    }

    #[test]
    fn test_layout_too_wide() {
        let err = StripeLayout::new(1 << 20, 0, vec![0; MAX_STRIPE_WIDTH + 1]).unwrap_err();
        assert!(matches!(err, Error::InvalidLayout(_)));
    }
}
