//! Rank reorder
//!
//! Rewrites the arena so records sit in rank order and the runtime index
//! array lists them in that same order. The reorder runs in two phases:
//!
//! 1. Stage: read every sort key from the current layout, sort the slots,
//!    copy each record into a scratch image at its new offset and build
//!    a fresh key index from the image. Nothing live is touched.
//! 2. Commit: install the image as the arena, rewrite entry offsets,
//!    install the new array order and the new key index.
//!
//! Every failure happens in phase 1, so a failed reorder leaves the
//! arena and both indexes exactly as they were.

use crate::index::{KeyIndex, SlotId};
use crate::record;
use crate::runtime::StripeRuntime;
use std::cmp::Ordering;
use stripetrace_common::{Error, Rank, Result, SortOrder};
use tracing::{debug, info};

/// Summary of a completed reorder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReorderStats {
    /// Records relocated
    pub records: usize,
    /// Bytes in the rebuilt arena
    pub bytes: usize,
    /// Records whose array position changed
    pub moved: usize,
}

/// Staged layout produced by phase 1
struct Staged {
    image: Vec<u8>,
    order: Vec<SlotId>,
    offsets: Vec<usize>,
    keys: KeyIndex,
}

/// Compare two (rank, slot) keys; ties fall back to arrival order
fn compare(order: SortOrder, a: &(Rank, SlotId), b: &(Rank, SlotId)) -> Ordering {
    let by_rank = match order {
        SortOrder::Ascending => a.0.cmp(&b.0),
        SortOrder::Descending => b.0.cmp(&a.0),
    };
    by_rank.then_with(|| a.1.cmp(&b.1))
}

impl StripeRuntime {
    /// Sort records by rank in the configured direction
    pub fn reorder_by_rank(&mut self) -> Result<ReorderStats> {
        self.reorder_by(self.config.sort_order)
    }

    /// Sort records by rank in an explicit direction
    pub fn reorder_by(&mut self, order: SortOrder) -> Result<ReorderStats> {
        let staged = self.stage(order)?;
        self.commit(staged)
    }

    fn stage(&self, order: SortOrder) -> Result<Staged> {
        let live = self.index.live_bytes();
        if let Some(limit) = self.config.scratch_limit
            && live > limit
        {
            return Err(Error::ScratchAllocationFailed { required: live });
        }

        let mut image = Vec::new();
        image
            .try_reserve_exact(live)
            .map_err(|_| Error::ScratchAllocationFailed { required: live })?;

        // Keys come from the current layout, before anything moves
        let mut sorted: Vec<(Rank, SlotId)> = self
            .index
            .iter()
            .map(|(slot, entry)| (record::read_rank(self.arena.bytes(entry.span())), slot))
            .collect();
        sorted.sort_by(|a, b| compare(order, a, b));

        let mut offsets = Vec::with_capacity(sorted.len());
        let mut keys = KeyIndex::with_capacity(sorted.len());
        for &(_, slot) in &sorted {
            let entry = self.index.entry(slot);
            let new_offset = image.len();
            let bytes = self.arena.bytes(entry.span());
            image.extend_from_slice(bytes);

            if keys.insert(record::read_id(bytes), slot).is_some() {
                return Err(Error::desync(format!(
                    "record {} stored twice",
                    record::read_id(bytes)
                )));
            }
            offsets.push(new_offset);
        }

        Ok(Staged {
            image,
            order: sorted.into_iter().map(|(_, slot)| slot).collect(),
            offsets,
            keys,
        })
    }

    fn commit(&mut self, staged: Staged) -> Result<ReorderStats> {
        let Staged {
            image,
            order,
            offsets,
            keys,
        } = staged;

        // First mutation; an error here still leaves everything intact
        debug_assert!(image.len() <= self.arena.used());
        self.arena.rebuild_from(&image)?;

        for (&slot, &offset) in order.iter().zip(&offsets) {
            self.index.entry_mut(slot).relocate(offset);
        }

        let moved = order
            .iter()
            .zip(self.index.order())
            .filter(|(new, old)| new != old)
            .count();
        self.index.set_order(order);
        self.keys = keys;

        let stats = ReorderStats {
            records: self.index.len(),
            bytes: image.len(),
            moved,
        };
        debug!(
            "Relocated {} records, {} changed position",
            stats.records, stats.moved
        );
        info!(
            "Reordered {} records ({} bytes) by rank",
            stats.records, stats.bytes
        );
        Ok(stats)
    }
}
