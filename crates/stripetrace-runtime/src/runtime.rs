//! Record runtime and ingestion engine
//!
//! [`StripeRuntime`] owns the arena, the runtime index array and the key
//! index for one batch. It is an explicit context object: callers create
//! it from a [`RuntimeConfig`], pass it by reference to every operation
//! and drop it to release everything at once.

use crate::arena::{RecordArena, Span};
use crate::index::{KeyIndex, MetadataEntry, RuntimeIndex, SlotId};
use crate::record::{self, RecordView};
use crate::stripe::{StripeLayout, StripeQuery};
use std::collections::HashMap;
use std::path::Path;
use stripetrace_common::{Error, Rank, RecordId, Result, RuntimeConfig, record_size};
use tracing::{debug, trace, warn};
use xxhash_rust::xxh64::xxh64;

/// Result of a lookup-or-create ingestion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ingested {
    /// A new record was written
    Created(RecordId),
    /// The path already had a record
    Existing(RecordId),
}

impl Ingested {
    /// Identifier of the record, new or not
    #[must_use]
    pub const fn id(self) -> RecordId {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }
}

/// Outcome of ingesting a batch of files
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records created, in ingestion order
    pub created: Vec<RecordId>,
    /// Files skipped because they had no layout
    pub skipped: usize,
    /// Set when the memory budget ran out; later files were not tried
    pub exhausted: bool,
}

/// Arena, runtime index array and key index for one batch of records
pub struct StripeRuntime {
    pub(crate) config: RuntimeConfig,
    pub(crate) arena: RecordArena,
    pub(crate) index: RuntimeIndex,
    pub(crate) keys: KeyIndex,
    /// Path hash to record, for lookup-or-create
    paths: HashMap<u64, RecordId>,
    /// Next identifier to hand out
    next_id: u64,
}

impl StripeRuntime {
    /// Allocate all structures for the configured memory budget
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let arena = RecordArena::new(config.memory_budget)?;
        let max_records = config.max_records();
        let index = RuntimeIndex::new(max_records)?;

        debug!(
            "Record runtime: {} byte budget, up to {} records",
            config.memory_budget, max_records
        );

        Ok(Self {
            config,
            arena,
            index,
            keys: KeyIndex::with_capacity(max_records),
            paths: HashMap::new(),
            next_id: 0,
        })
    }

    /// Runtime configuration
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if no record was ingested yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Arena bytes in use
    #[must_use]
    pub const fn bytes_used(&self) -> usize {
        self.arena.used()
    }

    /// Arena capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Runtime index array
    #[must_use]
    pub const fn index(&self) -> &RuntimeIndex {
        &self.index
    }

    /// Key index
    #[must_use]
    pub const fn keys(&self) -> &KeyIndex {
        &self.keys
    }

    /// The arena's live bytes
    #[must_use]
    pub fn arena_bytes(&self) -> &[u8] {
        self.arena.live()
    }

    /// Query `handle` and store a record for it
    ///
    /// A failed query returns [`Error::StripeQueryFailed`] and a full
    /// budget returns [`Error::OutOfSpace`] or [`Error::IndexFull`]; both
    /// are [skippable](Error::is_skippable) and leave the runtime
    /// unchanged.
    pub fn ingest<Q: StripeQuery>(
        &mut self,
        query: &Q,
        handle: &Q::Handle,
        rank: Rank,
    ) -> Result<RecordId> {
        let layout = query.query(handle)?;
        self.ingest_layout(&layout, rank)
    }

    /// Store a record for an already queried layout
    pub fn ingest_layout(&mut self, layout: &StripeLayout, rank: Rank) -> Result<RecordId> {
        let size = record_size(layout.stripe_width());
        let counters = record::counters(layout)?;

        // Check the array first so a reserved span never lacks an entry
        if self.index.is_full() {
            return Err(Error::IndexFull {
                capacity: self.index.capacity(),
            });
        }
        let span = self.arena.allocate(size)?;

        let id = RecordId::new(self.next_id);
        record::write(self.arena.bytes_mut(span), id, rank, &counters, &layout.ost_ids);

        let slot = self.index.push(MetadataEntry::new(span))?;
        let replaced = self.keys.insert(id, slot);
        debug_assert!(replaced.is_none(), "record id {id} issued twice");
        self.next_id += 1;

        trace!(
            "Record {} (rank {}, {} stripes) at [{}, {})",
            id,
            rank,
            layout.stripe_width(),
            span.offset,
            span.end()
        );
        Ok(id)
    }

    /// Ingest `path` unless a record for it already exists
    ///
    /// Records are matched by an xxh64 hash of the path.
    pub fn ingest_path<Q: StripeQuery>(
        &mut self,
        query: &Q,
        path: &Path,
        rank: Rank,
    ) -> Result<Ingested> {
        let key = path_key(path);
        if let Some(&id) = self.paths.get(&key) {
            return Ok(Ingested::Existing(id));
        }

        let handle = query.open(path)?;
        let id = self.ingest(query, &handle, rank)?;
        self.paths.insert(key, id);
        Ok(Ingested::Created(id))
    }

    /// Ingest a batch of paths, skipping files without a layout
    ///
    /// Stops at the first budget exhaustion since the budget does not
    /// recover. Errors that are not skippable abort the batch.
    pub fn ingest_batch<Q, P>(
        &mut self,
        query: &Q,
        files: impl IntoIterator<Item = (P, Rank)>,
    ) -> Result<BatchReport>
    where
        Q: StripeQuery,
        P: AsRef<Path>,
    {
        let mut report = BatchReport::default();

        for (path, rank) in files {
            let path = path.as_ref();
            match self.ingest_path(query, path, rank) {
                Ok(Ingested::Created(id)) => report.created.push(id),
                Ok(Ingested::Existing(id)) => {
                    debug!("{} already recorded as {}", path.display(), id);
                }
                Err(e) if e.is_budget_exhausted() => {
                    warn!(
                        "Memory budget exhausted at {} ({} records, {} of {} bytes)",
                        path.display(),
                        self.len(),
                        self.bytes_used(),
                        self.capacity()
                    );
                    report.exhausted = true;
                    break;
                }
                Err(e) if e.is_skippable() => {
                    debug!("Skipping {}: {}", path.display(), e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Slot of a record
    #[must_use]
    pub fn lookup(&self, id: RecordId) -> Option<SlotId> {
        self.keys.lookup(id)
    }

    /// Metadata entry of a record, through the key index
    #[must_use]
    pub fn entry(&self, id: RecordId) -> Option<&MetadataEntry> {
        self.keys.lookup(id).map(|slot| self.index.entry(slot))
    }

    /// View a record by identifier
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<RecordView<'_>> {
        self.entry(id).map(|entry| self.view(entry))
    }

    /// View the record at a logical array position
    #[must_use]
    pub fn record_at(&self, position: usize) -> Option<RecordView<'_>> {
        self.index.at(position).map(|entry| self.view(entry))
    }

    /// Records in array order
    pub fn records(&self) -> impl Iterator<Item = RecordView<'_>> {
        self.index.iter().map(|(_, entry)| self.view(entry))
    }

    fn view(&self, entry: &MetadataEntry) -> RecordView<'_> {
        RecordView::new_unchecked(self.arena.bytes(entry.span()))
    }

    /// Check every structural invariant of the arena and both indexes
    pub fn verify(&self) -> Result<()> {
        let slots = self.index.order();
        if slots.len() != self.index.len() {
            return Err(Error::desync(format!(
                "array order has {} slots for {} entries",
                slots.len(),
                self.index.len()
            )));
        }
        let mut seen = vec![false; self.index.len()];
        for slot in slots {
            match seen.get_mut(slot.index()) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(Error::desync(format!("slot {slot:?} repeated or unknown")));
                }
            }
        }

        if self.keys.len() != self.index.len() {
            return Err(Error::desync(format!(
                "key index has {} entries, array has {}",
                self.keys.len(),
                self.index.len()
            )));
        }

        let mut spans: Vec<Span> = Vec::with_capacity(slots.len());
        for (slot, entry) in self.index.iter() {
            let span = entry.span();
            if span.end() > self.arena.used() {
                return Err(Error::desync(format!(
                    "slot {slot:?} span {span:?} past used {}",
                    self.arena.used()
                )));
            }
            let view = RecordView::parse(self.arena.bytes(span))?;
            if self.keys.lookup(view.id()) != Some(slot) {
                return Err(Error::desync(format!(
                    "record {} in slot {slot:?} not resolvable by key",
                    view.id()
                )));
            }
            spans.push(span);
        }

        spans.sort_by_key(|s| s.offset);
        if let Some(pair) = spans.windows(2).find(|w| w[0].overlaps(&w[1])) {
            return Err(Error::desync(format!(
                "spans {:?} and {:?} overlap",
                pair[0], pair[1]
            )));
        }
        Ok(())
    }
}

/// Hash key used to match a path to an existing record
#[must_use]
pub fn path_key(path: &Path) -> u64 {
    xxh64(path.as_os_str().as_encoded_bytes(), 0)
}
