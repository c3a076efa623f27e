//! StripeTrace record runtime
//!
//! This crate captures Lustre striping layouts as compact per-file records
//! inside a fixed memory budget:
//! - Record arena (bump-allocated, budget-bounded byte region)
//! - Runtime index array and key index over the stored records
//! - Ingestion engine (query, allocate, encode, index)
//! - Reorder engine (rewrite the arena in rank order)
//! - Stripe queries against a Lustre mount or an in-memory table

pub mod arena;
pub mod index;
pub mod record;
pub mod reorder;
pub mod runtime;
pub mod shared;
pub mod stripe;

// Re-exports
pub use arena::{RecordArena, Span};
pub use index::{KeyIndex, MetadataEntry, RuntimeIndex, SlotId};
pub use record::{RecordSummary, RecordView};
pub use reorder::ReorderStats;
pub use runtime::{BatchReport, Ingested, StripeRuntime, path_key};
pub use shared::SharedRuntime;
pub use stripe::{FileHandle, LustreIoctl, StripeLayout, StripeQuery, StripeTable};
