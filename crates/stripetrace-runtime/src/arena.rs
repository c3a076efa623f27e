//! Record arena
//!
//! A fixed-capacity, zero-initialized byte buffer with a bump pointer.
//! Records are placed back to back and referenced by arena-relative
//! [`Span`]s, never by address:
//!
//! ```text
//! +--------+------------+------+---------------------------+
//! | rec 0  |   rec 1    | rec 2|        free (zeroed)      |
//! +--------+------------+------+---------------------------+
//! 0        56           128    184 = used          capacity
//! ```
//!
//! There is no per-record free. The only way to reclaim or move bytes is
//! [`RecordArena::rebuild_from`], which replaces the whole live region.

use stripetrace_common::{Error, Result};

/// A byte range inside the arena
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    /// Starting byte offset
    pub offset: usize,
    /// Length in bytes
    pub len: usize,
}

impl Span {
    /// Create a new span
    #[must_use]
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Get the ending offset (exclusive)
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Check if two spans share any byte
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Bump-allocated record storage with a fixed byte budget
pub struct RecordArena {
    /// Backing buffer, always `capacity` bytes long
    buf: Vec<u8>,
    /// Bytes handed out so far; also the next free offset
    used: usize,
}

impl RecordArena {
    /// Allocate a zeroed arena of `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).map_err(|e| {
            Error::Initialization(format!("cannot allocate {capacity} byte arena: {e}"))
        })?;
        buf.resize(capacity, 0);
        Ok(Self { buf, used: 0 })
    }

    /// Total capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes allocated so far
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity() - self.used
    }

    /// Reserve `size` bytes at the bump pointer
    ///
    /// Fails with [`Error::OutOfSpace`] and leaves the arena untouched when
    /// the request does not fit.
    pub fn allocate(&mut self, size: usize) -> Result<Span> {
        let available = self.available();
        if size > available {
            return Err(Error::OutOfSpace {
                required: size,
                available,
            });
        }
        let span = Span::new(self.used, size);
        self.used += size;
        Ok(span)
    }

    /// Borrow the bytes of an allocated span
    ///
    /// # Panics
    ///
    /// Panics if the span reaches past the allocated region.
    #[must_use]
    pub fn bytes(&self, span: Span) -> &[u8] {
        assert!(span.end() <= self.used, "span {span:?} outside live region");
        &self.buf[span.offset..span.end()]
    }

    /// Mutably borrow the bytes of an allocated span
    ///
    /// # Panics
    ///
    /// Panics if the span reaches past the allocated region.
    pub fn bytes_mut(&mut self, span: Span) -> &mut [u8] {
        assert!(span.end() <= self.used, "span {span:?} outside live region");
        &mut self.buf[span.offset..span.end()]
    }

    /// The allocated region `[0, used)`
    #[must_use]
    pub fn live(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    /// Replace the live region with `image`
    ///
    /// Bytes between the new and the old end are zeroed again so the free
    /// tail stays deterministic.
    pub fn rebuild_from(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.capacity() {
            return Err(Error::OutOfSpace {
                required: image.len(),
                available: self.capacity(),
            });
        }
        self.buf[..image.len()].copy_from_slice(image);
        if image.len() < self.used {
            self.buf[image.len()..self.used].fill(0);
        }
        self.used = image.len();
        Ok(())
    }
}
