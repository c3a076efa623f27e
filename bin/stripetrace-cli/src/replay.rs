//! Layout replay files
//!
//! A replay file lists captured layouts so records can be rebuilt away
//! from a Lustre mount:
//!
//! ```toml
//! [[file]]
//! path = "/lus/scratch/run1/out.h5"
//! stripe_size = 1048576
//! stripe_offset = 3
//! ost_ids = [3, 4, 5, 6]
//! ost_count = 16
//! mdt_count = 1
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use stripetrace_runtime::{StripeLayout, StripeTable};

#[derive(Debug, Deserialize)]
struct ReplayFile {
    #[serde(default, rename = "file")]
    files: Vec<ReplayEntry>,
}

#[derive(Debug, Deserialize)]
struct ReplayEntry {
    path: PathBuf,
    stripe_size: u64,
    #[serde(default = "default_stripe_offset")]
    stripe_offset: i64,
    #[serde(default)]
    ost_ids: Vec<u32>,
    #[serde(default)]
    ost_count: u32,
    #[serde(default)]
    mdt_count: u32,
}

const fn default_stripe_offset() -> i64 {
    -1
}

/// Layouts read from a replay file, in file order
pub struct Replay {
    pub table: StripeTable,
    pub paths: Vec<PathBuf>,
}

/// Parse replay file contents
pub fn parse(text: &str) -> Result<Replay> {
    let file: ReplayFile = toml::from_str(text).context("invalid replay file")?;

    let mut table = StripeTable::new();
    let mut paths = Vec::with_capacity(file.files.len());
    for entry in file.files {
        let layout = StripeLayout::new(entry.stripe_size, entry.stripe_offset, entry.ost_ids)
            .with_context(|| format!("bad layout for {}", entry.path.display()))?
            .with_totals(entry.ost_count, entry.mdt_count);
        table.insert(entry.path.clone(), layout);
        paths.push(entry.path);
    }
    Ok(Replay { table, paths })
}

/// Read and parse a replay file
pub fn load(path: &Path) -> Result<Replay> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay file {}", path.display()))?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripetrace_runtime::StripeQuery;

    #[test]
    fn test_parse_replay() {
        let replay = parse(
            r#"
            [[file]]
            path = "/lus/a"
            stripe_size = 1048576
            stripe_offset = 2
            ost_ids = [2, 3]
            ost_count = 8
            mdt_count = 1

            [[file]]
            path = "/lus/b"
            stripe_size = 65536
            "#,
        )
        .unwrap();

        assert_eq!(replay.paths, vec![PathBuf::from("/lus/a"), PathBuf::from("/lus/b")]);
        let a = replay.table.query(&PathBuf::from("/lus/a")).unwrap();
        assert_eq!(a.ost_ids, vec![2, 3]);
        assert_eq!(a.ost_count, 8);
        let b = replay.table.query(&PathBuf::from("/lus/b")).unwrap();
        assert_eq!(b.stripe_offset, -1);
        assert_eq!(b.stripe_width(), 0);
    }

    #[test]
    fn test_parse_empty() {
        let replay = parse("").unwrap();
        assert!(replay.paths.is_empty());
        assert!(replay.table.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_size() {
        assert!(parse("[[file]]\npath = \"/lus/a\"\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load(Path::new("/nonexistent/replay.toml")).is_err());
    }
}
