//! Record format
//!
//! Record layout (little-endian):
//! ```text
//! +----------------+  0
//! | rec_id    u64  |
//! | rank      i64  |
//! | counters  i64 x 5 (OSTS, MDTS, STRIPE_OFFSET, STRIPE_SIZE, STRIPE_WIDTH)
//! +----------------+  HEADER_SIZE (56)
//! | ost_ids   i64 x STRIPE_WIDTH
//! +----------------+  HEADER_SIZE + 8 * STRIPE_WIDTH
//! ```
//!
//! Records are not self-delimiting without reading the width counter, so
//! the runtime keeps each record's exact length beside its offset.

use crate::stripe::StripeLayout;
use bytes::{Buf, BufMut};
use serde::Serialize;
use stripetrace_common::{Counter, Error, HEADER_SIZE, OST_ID_SIZE, Rank, RecordId, Result};

/// Offset of the rank field
const RANK_OFFSET: usize = 8;

/// Offset of the first counter
const COUNTERS_OFFSET: usize = 16;

/// Counter values a record for `layout` will carry
pub fn counters(layout: &StripeLayout) -> Result<[i64; Counter::COUNT]> {
    let stripe_size = i64::try_from(layout.stripe_size).map_err(|_| {
        Error::InvalidLayout(format!("stripe size {} out of range", layout.stripe_size))
    })?;

    let mut counters = [0i64; Counter::COUNT];
    counters[Counter::Osts.index()] = i64::from(layout.ost_count);
    counters[Counter::Mdts.index()] = i64::from(layout.mdt_count);
    counters[Counter::StripeOffset.index()] = layout.stripe_offset;
    counters[Counter::StripeSize.index()] = stripe_size;
    counters[Counter::StripeWidth.index()] = layout.stripe_width() as i64;
    Ok(counters)
}

/// Write a record into `dst`
///
/// # Panics
///
/// Panics if `dst` is not exactly `record_size(ost_ids.len())` bytes.
pub fn write(
    dst: &mut [u8],
    id: RecordId,
    rank: Rank,
    counters: &[i64; Counter::COUNT],
    ost_ids: &[u32],
) {
    assert_eq!(
        dst.len(),
        stripetrace_common::record_size(ost_ids.len()),
        "record span does not match stripe width"
    );

    let mut buf = dst;
    buf.put_u64_le(id.get());
    buf.put_i64_le(rank.get());
    for &counter in counters {
        buf.put_i64_le(counter);
    }
    for &ost in ost_ids {
        buf.put_i64_le(i64::from(ost));
    }
}

/// Encode a record for `layout` into `dst`, checking everything first
#[cfg(test)]
fn encode(dst: &mut [u8], id: RecordId, rank: Rank, layout: &StripeLayout) -> Result<()> {
    let expected = stripetrace_common::record_size(layout.stripe_width());
    if dst.len() != expected {
        return Err(Error::InvalidLayout(format!(
            "record span is {} bytes, layout needs {expected}",
            dst.len()
        )));
    }
    let counters = counters(layout)?;
    write(dst, id, rank, &counters, &layout.ost_ids);
    Ok(())
}

/// Read only the rank of an encoded record
#[must_use]
pub fn read_rank(record: &[u8]) -> Rank {
    Rank::new((&record[RANK_OFFSET..]).get_i64_le())
}

/// Read only the identifier of an encoded record
#[must_use]
pub fn read_id(record: &[u8]) -> RecordId {
    RecordId::new((&record[..]).get_u64_le())
}

/// Borrowed view over one encoded record
#[derive(Clone, Copy, Debug)]
pub struct RecordView<'a> {
    bytes: &'a [u8],
}

impl<'a> RecordView<'a> {
    /// Wrap and validate the bytes of one record
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE || (bytes.len() - HEADER_SIZE) % OST_ID_SIZE != 0 {
            return Err(Error::desync(format!(
                "{} bytes is not a valid record length",
                bytes.len()
            )));
        }
        let view = Self { bytes };
        let width = view.counter(Counter::StripeWidth);
        if usize::try_from(width).ok() != Some(view.ost_count()) {
            return Err(Error::desync(format!(
                "record {} claims stripe width {width} but carries {} OST ids",
                view.id(),
                view.ost_count()
            )));
        }
        Ok(view)
    }

    /// Wrap bytes the runtime itself wrote
    pub(crate) const fn new_unchecked(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Record identifier
    #[must_use]
    pub fn id(&self) -> RecordId {
        read_id(self.bytes)
    }

    /// Owning rank
    #[must_use]
    pub fn rank(&self) -> Rank {
        read_rank(self.bytes)
    }

    /// Value of one counter
    #[must_use]
    pub fn counter(&self, counter: Counter) -> i64 {
        (&self.bytes[COUNTERS_OFFSET + counter.index() * 8..]).get_i64_le()
    }

    /// All counters in on-record order
    #[must_use]
    pub fn counters(&self) -> [i64; Counter::COUNT] {
        Counter::ALL.map(|c| self.counter(c))
    }

    /// Number of storage-target identifiers carried
    #[must_use]
    pub const fn ost_count(&self) -> usize {
        (self.bytes.len() - HEADER_SIZE) / OST_ID_SIZE
    }

    /// Storage-target identifiers in stripe order
    pub fn ost_ids(&self) -> impl Iterator<Item = i64> + 'a {
        let bytes: &'a [u8] = self.bytes;
        bytes[HEADER_SIZE..]
            .chunks_exact(OST_ID_SIZE)
            .map(|mut chunk| chunk.get_i64_le())
    }

    /// Encoded length in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a record carries at least its header
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw encoded bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Owned, serializable copy of the record
    #[must_use]
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id().get(),
            rank: self.rank().get(),
            osts: self.counter(Counter::Osts),
            mdts: self.counter(Counter::Mdts),
            stripe_offset: self.counter(Counter::StripeOffset),
            stripe_size: self.counter(Counter::StripeSize),
            stripe_width: self.counter(Counter::StripeWidth),
            ost_ids: self.ost_ids().collect(),
        }
    }
}

/// Serializable form of a record for consumers
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub id: u64,
    pub rank: i64,
    pub osts: i64,
    pub mdts: i64,
    pub stripe_offset: i64,
    pub stripe_size: i64,
    pub stripe_width: i64,
    pub ost_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripetrace_common::record_size;

    fn layout() -> StripeLayout {
        StripeLayout::new(1 << 20, 5, vec![5, 6, 7])
            .unwrap()
            .with_totals(16, 2)
    }

    #[test]
    fn test_encode_and_view() {
        let layout = layout();
        let mut buf = vec![0u8; record_size(3)];
        encode(&mut buf, RecordId::new(9), Rank::new(4), &layout).unwrap();

        let view = RecordView::parse(&buf).unwrap();
        assert_eq!(view.id(), RecordId::new(9));
        assert_eq!(view.rank(), Rank::new(4));
        assert_eq!(view.counters(), [16, 2, 5, 1 << 20, 3]);
        assert_eq!(view.ost_ids().collect::<Vec<_>>(), vec![5, 6, 7]);
        assert_eq!(view.len(), 80);
    }

    #[test]
    fn test_encode_wrong_span() {
        let mut buf = vec![0u8; record_size(2)];
        let err = encode(&mut buf, RecordId::new(0), Rank::new(0), &layout()).unwrap_err();
        assert!(matches!(err, Error::InvalidLayout(_)));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_matches_encode() {
        let layout = layout();
        let mut checked = vec![0u8; record_size(3)];
        encode(&mut checked, RecordId::new(5), Rank::new(1), &layout).unwrap();

        let mut direct = vec![0u8; record_size(3)];
        let counters = counters(&layout).unwrap();
        write(&mut direct, RecordId::new(5), Rank::new(1), &counters, &layout.ost_ids);
        assert_eq!(direct, checked);
    }

    #[test]
    fn test_counters_reject_huge_stripe() {
        let mut layout = layout();
        layout.stripe_size = u64::MAX;
        assert!(matches!(counters(&layout), Err(Error::InvalidLayout(_))));
    }

    #[test]
    fn test_header_readers() {
        let mut buf = vec![0u8; record_size(3)];
        encode(&mut buf, RecordId::new(42), Rank::new(-3), &layout()).unwrap();
        assert_eq!(read_id(&buf), RecordId::new(42));
        assert_eq!(read_rank(&buf), Rank::new(-3));
    }

    #[test]
    fn test_parse_rejects_width_mismatch() {
        let mut buf = vec![0u8; record_size(3)];
        encode(&mut buf, RecordId::new(1), Rank::new(0), &layout()).unwrap();
        assert!(RecordView::parse(&buf[..record_size(2)]).is_err());
        assert!(RecordView::parse(&buf[..HEADER_SIZE - 1]).is_err());
    }

    #[test]
    fn test_summary() {
        let mut buf = vec![0u8; record_size(3)];
        encode(&mut buf, RecordId::new(1), Rank::new(2), &layout()).unwrap();
        let summary = RecordView::parse(&buf).unwrap().summary();
        assert_eq!(summary.stripe_width, 3);
        assert_eq!(summary.ost_ids, vec![5, 6, 7]);
    }
}
