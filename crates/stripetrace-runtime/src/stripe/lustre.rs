//! Lustre stripe queries via ioctl
//!
//! Two query forms are supported:
//! - `LL_IOC_LOV_GETSTRIPE` on an open file
//! - `IOC_MDC_GETFILESTRIPE` on an open directory plus a file name
//!
//! Both fill a `lov_user_md` reply:
//!
//! ```text
//! off  size  field
//!   0     4  lmm_magic
//!   4     4  lmm_pattern
//!   8    16  lmm_oi
//!  24     4  lmm_stripe_size
//!  28     2  lmm_stripe_count
//!  30     2  lmm_stripe_offset
//!  32    16  lmm_pool_name        (v3 only)
//!  32/48     lmm_objects[count], 24 bytes each, l_ost_idx at +20
//! ```
//!
//! File system totals come from `LL_IOC_GETOBDCOUNT`, issued on the
//! file's directory and cached per device. Failing to read them leaves the
//! totals at zero rather than skipping the file.

use super::{StripeLayout, StripeQuery};
use bytes::{Buf, BufMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use stripetrace_common::{Error, MAX_STRIPE_WIDTH, Result};
use tracing::debug;

/// `lov_user_md` v1 magic
pub const LOV_USER_MAGIC_V1: u32 = 0x0BD1_0BD0;

/// `lov_user_md` v3 magic (adds a pool name)
pub const LOV_USER_MAGIC_V3: u32 = 0x0BD3_0BD0;

/// Size of the v1 header
const LOV_HEADER_V1: usize = 32;

/// Size of the v3 header
const LOV_HEADER_V3: usize = 48;

/// Offset of `lmm_stripe_count` in the header
const LOV_STRIPE_COUNT_OFFSET: usize = 28;

/// Size of one `lov_user_ost_data` entry
const LOV_OST_DATA_SIZE: usize = 24;

/// Offset of `l_ost_idx` inside an OST entry
const LOV_OST_IDX_OFFSET: usize = 20;

/// Reply buffer large enough for the widest layout
pub const LOV_REPLY_SIZE: usize = LOV_HEADER_V3 + MAX_STRIPE_WIDTH * LOV_OST_DATA_SIZE;

/// Stripe offset value meaning "chosen by the file system"
const STRIPE_OFFSET_DEFAULT: u16 = 0xFFFF;

#[cfg(target_os = "linux")]
mod request {
    // _IOW('f', 155, long)
    pub const LL_IOC_LOV_GETSTRIPE: libc::c_ulong = 0x4008_669B;
    // _IOWR('i', 21, struct lov_user_md *)
    pub const IOC_MDC_GETFILESTRIPE: libc::c_ulong = 0xC008_6915;
    // _IOR('f', 168, long)
    pub const LL_IOC_GETOBDCOUNT: libc::c_ulong = 0x8008_66A8;
}

/// A file to query: either opened directly or named inside an open directory
#[derive(Debug)]
pub enum FileHandle {
    /// An open file and the directory holding it
    Open { file: File, parent: PathBuf },
    /// A directory handle and the name of a file inside it
    InDirectory { dir: File, name: CString },
}

impl FileHandle {
    /// Open `path` read-only
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::stripe_query(format!("failed to open {}: {}", path.display(), e))
        })?;
        Ok(Self::Open {
            file,
            parent: parent_dir(path).to_path_buf(),
        })
    }

    /// Open `dir` and remember `name` for a by-name query
    pub fn in_directory(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        if name.len() >= LOV_REPLY_SIZE {
            return Err(Error::stripe_query(format!("file name too long: {name}")));
        }
        let name = CString::new(name)
            .map_err(|e| Error::stripe_query(format!("invalid file name {name:?}: {e}")))?;
        let dir = File::open(dir).map_err(|e| {
            Error::stripe_query(format!("failed to open directory {}: {}", dir.display(), e))
        })?;
        Ok(Self::InDirectory { dir, name })
    }

    /// Device of the file system holding the file
    #[cfg(unix)]
    #[must_use]
    pub fn device(&self) -> Option<u64> {
        use std::os::unix::fs::MetadataExt;

        let file = match self {
            Self::Open { file, .. } => file,
            Self::InDirectory { dir, .. } => dir,
        };
        file.metadata().ok().map(|m| m.dev())
    }

    #[cfg(not(unix))]
    #[must_use]
    pub const fn device(&self) -> Option<u64> {
        None
    }

    /// Run `f` on a directory handle inside the file's file system
    ///
    /// Lustre only answers target-count ioctls on directories, so a
    /// directly opened file goes through its parent.
    pub fn with_directory<R>(&self, f: impl FnOnce(&File) -> R) -> Result<R> {
        match self {
            Self::Open { parent, .. } => {
                let dir = File::open(parent).map_err(|e| {
                    Error::stripe_query(format!(
                        "failed to open directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
                Ok(f(&dir))
            }
            Self::InDirectory { dir, .. } => Ok(f(dir)),
        }
    }
}

/// Directory containing `path`, `.` for a bare file name
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Stripe source backed by Lustre ioctls
#[derive(Debug, Default)]
pub struct LustreIoctl {
    /// Query through the parent directory instead of opening each file
    by_name: bool,
    /// OST/MDT totals per file system device; `None` once a lookup failed
    totals: Mutex<HashMap<u64, Option<(u32, u32)>>>,
}

impl LustreIoctl {
    /// Create a source that opens each file
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that queries files by name through their directory
    #[must_use]
    pub fn by_name() -> Self {
        Self {
            by_name: true,
            ..Self::default()
        }
    }

    /// Issue the stripe ioctl and return the raw reply
    #[cfg(target_os = "linux")]
    fn get_stripe(handle: &FileHandle) -> Result<Vec<u8>> {
        use std::os::unix::io::AsRawFd;

        let mut reply = vec![0u8; LOV_REPLY_SIZE];
        let (fd, req) = match handle {
            FileHandle::Open { file, .. } => {
                // The kernel only fills objects when told how many fit
                let mut header = &mut reply[..];
                header.put_u32_le(LOV_USER_MAGIC_V1);
                let mut count = &mut reply[LOV_STRIPE_COUNT_OFFSET..];
                count.put_u16_le(MAX_STRIPE_WIDTH as u16);
                (file.as_raw_fd(), request::LL_IOC_LOV_GETSTRIPE)
            }
            FileHandle::InDirectory { dir, name } => {
                let name = name.as_bytes_with_nul();
                reply[..name.len()].copy_from_slice(name);
                (dir.as_raw_fd(), request::IOC_MDC_GETFILESTRIPE)
            }
        };

        #[allow(unsafe_code)]
        let ret = unsafe { libc::ioctl(fd, req as _, reply.as_mut_ptr()) };
        if ret == -1 {
            return Err(Error::stripe_query(format!(
                "stripe ioctl failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(reply)
    }

    #[cfg(not(target_os = "linux"))]
    fn get_stripe(_handle: &FileHandle) -> Result<Vec<u8>> {
        Err(Error::stripe_query("Lustre ioctls are only available on Linux"))
    }

    /// Read the OST and MDT counts through a directory on the file system
    #[cfg(target_os = "linux")]
    fn target_counts(dir: &File) -> Option<(u32, u32)> {
        use std::os::unix::io::AsRawFd;

        let fd = dir.as_raw_fd();

        // The argument selects the target type on input (0 = OST, 1 = MDT)
        // and carries the count on output.
        let count = |selector: libc::c_int| {
            let mut value = selector;
            #[allow(unsafe_code)]
            let ret = unsafe {
                libc::ioctl(fd, request::LL_IOC_GETOBDCOUNT as _, &raw mut value)
            };
            (ret >= 0).then_some(value)
        };

        let osts = u32::try_from(count(0)?).ok()?;
        let mdts = u32::try_from(count(1)?).ok()?;
        Some((osts, mdts))
    }

    #[cfg(not(target_os = "linux"))]
    fn target_counts(_dir: &File) -> Option<(u32, u32)> {
        None
    }

    /// File system totals for `handle`, queried once per device
    fn totals(&self, handle: &FileHandle) -> Option<(u32, u32)> {
        let device = handle.device();
        if let Some(dev) = device
            && let Some(&cached) = self.totals.lock().get(&dev)
        {
            return cached;
        }

        let counts = match handle.with_directory(Self::target_counts) {
            Ok(counts) => counts,
            Err(e) => {
                debug!("No directory for target counts: {}", e);
                None
            }
        };
        if let Some(dev) = device {
            self.totals.lock().insert(dev, counts);
        }
        counts
    }
}

impl StripeQuery for LustreIoctl {
    type Handle = FileHandle;

    fn open(&self, path: &Path) -> Result<FileHandle> {
        if !self.by_name {
            return FileHandle::open(path);
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::stripe_query(format!("{} has no file name", path.display())))?;
        FileHandle::in_directory(parent_dir(path), name)
    }

    fn query(&self, handle: &FileHandle) -> Result<StripeLayout> {
        let reply = Self::get_stripe(handle)?;
        let layout = parse_lov_user_md(&reply)?;

        match self.totals(handle) {
            Some((osts, mdts)) => Ok(layout.with_totals(osts, mdts)),
            None => {
                debug!("OST/MDT counts unavailable, recording zero totals");
                Ok(layout)
            }
        }
    }
}

/// Decode a `lov_user_md` v1/v3 reply
pub fn parse_lov_user_md(reply: &[u8]) -> Result<StripeLayout> {
    if reply.len() < LOV_HEADER_V1 {
        return Err(Error::InvalidLayout(format!(
            "reply of {} bytes is shorter than the layout header",
            reply.len()
        )));
    }

    let mut buf = reply;
    let magic = buf.get_u32_le();
    let objects_offset = match magic {
        LOV_USER_MAGIC_V1 => LOV_HEADER_V1,
        LOV_USER_MAGIC_V3 => LOV_HEADER_V3,
        other => {
            return Err(Error::InvalidLayout(format!(
                "unsupported layout magic {other:#010x}"
            )));
        }
    };
    buf.advance(4 + 16); // lmm_pattern, lmm_oi
    let stripe_size = buf.get_u32_le();
    debug_assert_eq!(reply.len() - buf.remaining(), LOV_STRIPE_COUNT_OFFSET);
    let stripe_count = usize::from(buf.get_u16_le());
    let stripe_offset = buf.get_u16_le();

    let objects_end = objects_offset + stripe_count * LOV_OST_DATA_SIZE;
    if stripe_count > MAX_STRIPE_WIDTH || objects_end > reply.len() {
        return Err(Error::InvalidLayout(format!(
            "stripe count {stripe_count} does not fit a {} byte reply",
            reply.len()
        )));
    }

    let ost_ids = reply[objects_offset..objects_end]
        .chunks_exact(LOV_OST_DATA_SIZE)
        .map(|entry| (&entry[LOV_OST_IDX_OFFSET..]).get_u32_le())
        .collect();

    let stripe_offset = if stripe_offset == STRIPE_OFFSET_DEFAULT {
        -1
    } else {
        i64::from(stripe_offset)
    };

    StripeLayout::new(u64::from(stripe_size), stripe_offset, ost_ids)
}
