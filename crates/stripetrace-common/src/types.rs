//! Core type definitions for StripeTrace
//!
//! Identifiers, the counter enumeration and the fixed sizes of the
//! record format shared by the runtime and its consumers.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the fixed record header: `rec_id`, `rank` and the counters
pub const HEADER_SIZE: usize = 8 + 8 + Counter::COUNT * 8;

/// Size of one storage-target identifier in a record
pub const OST_ID_SIZE: usize = 8;

/// Smallest possible record (stripe width of zero)
pub const MIN_RECORD_SIZE: usize = HEADER_SIZE;

/// Largest stripe width a Lustre layout can report
pub const MAX_STRIPE_WIDTH: usize = 2000;

/// Exact size in bytes of a record striped over `stripe_width` targets
#[inline]
#[must_use]
pub const fn record_size(stripe_width: usize) -> usize {
    HEADER_SIZE + stripe_width * OST_ID_SIZE
}

/// Stable identifier of a record, assigned at creation
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into, Display,
)]
#[display("{_0}")]
pub struct RecordId(u64);

impl RecordId {
    /// Create from a raw value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

/// Process rank owning a record; the secondary sort key
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    From,
    Into,
    Display,
)]
#[display("{_0}")]
pub struct Rank(i64);

impl Rank {
    /// Create a rank
    #[must_use]
    pub const fn new(rank: i64) -> Self {
        Self(rank)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Integer counters stored in every record, in on-record order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counter {
    /// Number of OSTs in the file system
    Osts,
    /// Number of MDTs in the file system
    Mdts,
    /// Index of the first OST the file is striped over
    StripeOffset,
    /// Bytes per stripe
    StripeSize,
    /// Number of OSTs the file is striped over
    StripeWidth,
}

impl Counter {
    /// Number of counters in a record
    pub const COUNT: usize = 5;

    /// All counters in on-record order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Osts,
        Self::Mdts,
        Self::StripeOffset,
        Self::StripeSize,
        Self::StripeWidth,
    ];

    /// Position of the counter in the record's counter array
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name used in dumps
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Osts => "LUSTRE_OSTS",
            Self::Mdts => "LUSTRE_MDTS",
            Self::StripeOffset => "LUSTRE_STRIPE_OFFSET",
            Self::StripeSize => "LUSTRE_STRIPE_SIZE",
            Self::StripeWidth => "LUSTRE_STRIPE_WIDTH",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_size() {
        assert_eq!(HEADER_SIZE, 56);
        assert_eq!(record_size(0), MIN_RECORD_SIZE);
        assert_eq!(record_size(2), 72);
        assert_eq!(record_size(4), 88);
    }

    #[test]
    fn test_counter_order() {
        for (i, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(counter.index(), i);
        }
        assert_eq!(Counter::StripeWidth.to_string(), "LUSTRE_STRIPE_WIDTH");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(RecordId::new(7).to_string(), "7");
        assert_eq!(format!("{:?}", RecordId::new(7)), "RecordId(7)");
        assert_eq!(Rank::new(-1).to_string(), "-1");
    }
}
