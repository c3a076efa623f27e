//! Runtime index array and key index
//!
//! Metadata entries live in a pool that is only ever appended to, so a
//! [`SlotId`] names the same entry for the lifetime of the runtime. The
//! runtime index array is a list of slots in logical order (arrival order
//! until a reorder, rank order after one), and the key index maps a
//! record identifier to its slot. Both are views over the one pool:
//! reordering permutes slots, never entries, and a key index lookup always
//! resolves to the entry the array holds.

use crate::arena::Span;
use std::collections::HashMap;
use stripetrace_common::{Error, RecordId, Result};

/// Stable handle to a metadata entry in the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u32);

impl SlotId {
    /// Position in the pool (equals arrival order)
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where one record lives in the arena
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    offset: usize,
    len: usize,
}

impl MetadataEntry {
    /// Create an entry for an allocated span
    #[must_use]
    pub const fn new(span: Span) -> Self {
        Self {
            offset: span.offset,
            len: span.len,
        }
    }

    /// Current byte offset of the record in the arena
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Exact record length in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the record is zero length
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The record's span in the arena
    #[must_use]
    pub const fn span(&self) -> Span {
        Span::new(self.offset, self.len)
    }

    pub(crate) const fn relocate(&mut self, offset: usize) {
        self.offset = offset;
    }
}

/// Fixed-capacity array of metadata entries plus their logical order
pub struct RuntimeIndex {
    /// Entries in arrival order; never reordered or shrunk
    entries: Vec<MetadataEntry>,
    /// Logical order of the array, as slots into `entries`
    order: Vec<SlotId>,
    /// Maximum number of entries
    capacity: usize,
}

impl RuntimeIndex {
    /// Allocate room for `capacity` entries up front
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Initialization(
                "runtime index array has no slots".into(),
            ));
        }
        if u32::try_from(capacity).is_err() {
            return Err(Error::Initialization(format!(
                "runtime index array capacity {capacity} exceeds slot range"
            )));
        }
        let mut entries = Vec::new();
        let mut order = Vec::new();
        entries
            .try_reserve_exact(capacity)
            .and_then(|()| order.try_reserve_exact(capacity))
            .map_err(|e| {
                Error::Initialization(format!("cannot allocate {capacity} index entries: {e}"))
            })?;
        Ok(Self {
            entries,
            order,
            capacity,
        })
    }

    /// Append an entry at the end of the logical order
    pub fn push(&mut self, entry: MetadataEntry) -> Result<SlotId> {
        if self.is_full() {
            return Err(Error::IndexFull {
                capacity: self.capacity,
            });
        }
        #[allow(clippy::cast_possible_truncation)]
        let slot = SlotId(self.entries.len() as u32);
        self.entries.push(entry);
        self.order.push(slot);
        Ok(slot)
    }

    /// Number of populated entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the array is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if no more entries fit
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Entry held in a slot
    ///
    /// # Panics
    ///
    /// Panics if the slot was not handed out by this index.
    #[must_use]
    pub fn entry(&self, slot: SlotId) -> &MetadataEntry {
        &self.entries[slot.index()]
    }

    pub(crate) fn entry_mut(&mut self, slot: SlotId) -> &mut MetadataEntry {
        &mut self.entries[slot.index()]
    }

    /// Entry at a logical array position
    #[must_use]
    pub fn at(&self, position: usize) -> Option<&MetadataEntry> {
        self.order.get(position).map(|&slot| self.entry(slot))
    }

    /// Slots in logical order
    #[must_use]
    pub fn order(&self) -> &[SlotId] {
        &self.order
    }

    /// Entries in logical order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &MetadataEntry)> {
        self.order.iter().map(|&slot| (slot, self.entry(slot)))
    }

    /// Sum of all record lengths
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.entries.iter().map(MetadataEntry::len).sum()
    }

    /// Replace the logical order with a permutation of the same slots
    pub(crate) fn set_order(&mut self, order: Vec<SlotId>) {
        debug_assert_eq!(order.len(), self.order.len());
        self.order = order;
    }
}

/// Hash index from record identifier to slot
#[derive(Debug, Default)]
pub struct KeyIndex {
    map: HashMap<RecordId, SlotId>,
}

impl KeyIndex {
    /// Create an index sized for `capacity` records
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }

    /// Map `id` to `slot`, returning any slot it replaced
    pub fn insert(&mut self, id: RecordId, slot: SlotId) -> Option<SlotId> {
        self.map.insert(id, slot)
    }

    /// Slot holding `id`; `None` is an ordinary miss
    #[must_use]
    pub fn lookup(&self, id: RecordId) -> Option<SlotId> {
        self.map.get(&id).copied()
    }

    /// Drop the mapping for `id`
    pub fn remove(&mut self, id: RecordId) -> Option<SlotId> {
        self.map.remove(&id)
    }

    /// Number of mapped identifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All mappings, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, SlotId)> + '_ {
        self.map.iter().map(|(&id, &slot)| (id, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_order() {
        let mut index = RuntimeIndex::new(4).unwrap();
        let a = index.push(MetadataEntry::new(Span::new(0, 56))).unwrap();
        let b = index.push(MetadataEntry::new(Span::new(56, 64))).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.order(), &[a, b]);
        assert_eq!(index.at(1).unwrap().offset(), 56);
        assert!(index.at(2).is_none());
        assert_eq!(index.live_bytes(), 120);
    }

    #[test]
    fn test_index_full() {
        let mut index = RuntimeIndex::new(1).unwrap();
        index.push(MetadataEntry::new(Span::new(0, 56))).unwrap();
        assert!(index.is_full());
        let err = index.push(MetadataEntry::new(Span::new(56, 56))).unwrap_err();
        assert!(matches!(err, Error::IndexFull { capacity: 1 }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_zero_capacity() {
        assert!(matches!(
            RuntimeIndex::new(0),
            Err(Error::Initialization(_))
        ));
    }

    #[test]
    fn test_reorder_keeps_slots() {
        let mut index = RuntimeIndex::new(3).unwrap();
        let a = index.push(MetadataEntry::new(Span::new(0, 56))).unwrap();
        let b = index.push(MetadataEntry::new(Span::new(56, 56))).unwrap();

        let before = std::ptr::from_ref(index.entry(a));
        index.set_order(vec![b, a]);
        assert_eq!(index.order(), &[b, a]);
        assert!(std::ptr::eq(index.at(1).unwrap(), before));
    }

    #[test]
    fn test_key_index_contract() {
        let mut index = RuntimeIndex::new(2).unwrap();
        let slot = index.push(MetadataEntry::new(Span::new(0, 56))).unwrap();

        let mut keys = KeyIndex::with_capacity(2);
        assert!(keys.insert(RecordId::new(0), slot).is_none());
        assert_eq!(keys.lookup(RecordId::new(0)), Some(slot));
        assert_eq!(keys.lookup(RecordId::new(1)), None);

        // Lookup and array resolve to one entry, not copies
        index.entry_mut(slot).relocate(8);
        let via_key = index.entry(keys.lookup(RecordId::new(0)).unwrap());
        assert_eq!(via_key.offset(), 8);
        assert!(std::ptr::eq(via_key, index.at(0).unwrap()));

        assert_eq!(keys.remove(RecordId::new(0)), Some(slot));
        assert!(keys.is_empty());
        assert_eq!(keys.remove(RecordId::new(0)), None);
    }
}
