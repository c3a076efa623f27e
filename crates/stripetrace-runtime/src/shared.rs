//! Thread-safe runtime handle
//!
//! A [`StripeRuntime`] holds no locks of its own. Callers that ingest from
//! several threads share one through [`SharedRuntime`], which serializes
//! every operation behind a single mutex. [`SharedRuntime::ingest`] runs
//! the stripe query before taking the lock; [`SharedRuntime::ingest_path`]
//! holds it across the query so a path is never recorded twice.

use crate::reorder::ReorderStats;
use crate::runtime::{Ingested, StripeRuntime};
use crate::stripe::{StripeLayout, StripeQuery};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use stripetrace_common::{Rank, RecordId, Result, RuntimeConfig};

/// Cloneable handle to a runtime shared between threads
#[derive(Clone)]
pub struct SharedRuntime {
    inner: Arc<Mutex<StripeRuntime>>,
}

impl SharedRuntime {
    /// Create a runtime and wrap it
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Ok(Self::from_runtime(StripeRuntime::new(config)?))
    }

    /// Wrap an existing runtime
    #[must_use]
    pub fn from_runtime(runtime: StripeRuntime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(runtime)),
        }
    }

    /// Query `handle` and store a record for it
    pub fn ingest<Q: StripeQuery>(
        &self,
        query: &Q,
        handle: &Q::Handle,
        rank: Rank,
    ) -> Result<RecordId> {
        let layout = query.query(handle)?;
        self.ingest_layout(&layout, rank)
    }

    /// Store a record for an already queried layout
    pub fn ingest_layout(&self, layout: &StripeLayout, rank: Rank) -> Result<RecordId> {
        self.inner.lock().ingest_layout(layout, rank)
    }

    /// Ingest `path` unless a record for it already exists
    pub fn ingest_path<Q: StripeQuery>(
        &self,
        query: &Q,
        path: &Path,
        rank: Rank,
    ) -> Result<Ingested> {
        self.inner.lock().ingest_path(query, path, rank)
    }

    /// Sort records by rank in the configured direction
    pub fn reorder_by_rank(&self) -> Result<ReorderStats> {
        self.inner.lock().reorder_by_rank()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if no record was ingested yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Run `f` with the runtime locked
    pub fn with<R>(&self, f: impl FnOnce(&mut StripeRuntime) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Take the runtime back if this is the last handle
    pub fn try_unwrap(self) -> std::result::Result<StripeRuntime, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::StripeTable;
    use std::thread;

    #[test]
    fn test_concurrent_ingest() {
        let shared = SharedRuntime::new(RuntimeConfig::with_budget(64 * 1024)).unwrap();
        let mut table = StripeTable::new();
        for i in 0..64u32 {
            let layout = StripeLayout::new(1 << 20, 0, vec![i % 8; (i % 5) as usize]).unwrap();
            table.insert(format!("/lus/f{i}"), layout);
        }
        let table = Arc::new(table);

        let workers: Vec<_> = (0..4i64)
            .map(|rank| {
                let shared = shared.clone();
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..64 {
                        let path = format!("/lus/f{i}");
                        shared
                            .ingest_path(table.as_ref(), Path::new(&path), Rank::new(rank))
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        // Every path is recorded exactly once
        assert_eq!(shared.len(), 64);
        shared.reorder_by_rank().unwrap();
        let runtime = shared.try_unwrap().ok().unwrap();
        runtime.verify().unwrap();
        let ranks: Vec<_> = runtime.records().map(|r| r.rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_with_gives_runtime_access() {
        let shared = SharedRuntime::new(RuntimeConfig::with_budget(1000)).unwrap();
        let layout = StripeLayout::new(4096, 1, vec![1, 2]).unwrap();
        let id = shared.ingest_layout(&layout, Rank::new(2)).unwrap();

        let rank = shared.with(|rt| rt.record(id).map(|r| r.rank()));
        assert_eq!(rank, Some(Rank::new(2)));
        assert!(!shared.is_empty());
    }

    #[test]
    fn test_try_unwrap_with_clones() {
        let shared = SharedRuntime::new(RuntimeConfig::with_budget(1000)).unwrap();
        let other = shared.clone();
        let shared = shared.try_unwrap().err().unwrap();
        drop(other);
        assert!(shared.try_unwrap().is_ok());
    }
}
