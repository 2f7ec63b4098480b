//! Batch types and data structures
//!
//! A Batch is an ordered group of filesystem entries destined for one
//! rsync invocation, bounded by a file-count cap and a byte-size cap.
//! On disk a finalized batch becomes a job descriptor: the entries'
//! relative paths, one per line, newline-terminated — the exact format
//! rsync's `--files-from` consumes.

use std::io::{self, Write};

/// Default maximum number of files per batch
pub const DEFAULT_MAX_FILES: usize = 10_000;

/// Default maximum total size per batch, in megabytes (1 GiB)
pub const DEFAULT_MAX_BYTES_MB: u64 = 1024;

/// Nominal size charged for a synthesized empty-directory entry, so
/// empty directories still contribute to batch accounting
pub const DIR_NOMINAL_SIZE: u64 = 10;

/// A single filesystem entry discovered during the scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path relative to the configured base directory
    pub rel_path: String,
    /// Size in bytes (lstat size, or the nominal constant for a
    /// synthesized empty directory)
    pub size: u64,
    /// Whether this entry is a synthesized directory
    pub is_directory: bool,
}

impl Entry {
    /// Create a new file entry
    pub fn file(rel_path: String, size: u64) -> Self {
        Self {
            rel_path,
            size,
            is_directory: false,
        }
    }

    /// Create a synthesized entry for an empty directory
    pub fn directory(rel_path: String) -> Self {
        Self {
            rel_path,
            size: DIR_NOMINAL_SIZE,
            is_directory: true,
        }
    }
}

/// An ordered group of entries destined for one rsync invocation
#[derive(Debug, Clone, Default)]
pub struct Batch {
    entries: Vec<Entry>,
    total_bytes: u64,
}

impl Batch {
    /// Number of entries in the batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cumulative byte size of the batch
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// The entries in discovery order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Append an entry without cap checks
    pub fn push(&mut self, entry: Entry) {
        self.total_bytes += entry.size;
        self.entries.push(entry);
    }

    /// Create a one-entry batch for an entry whose own size exceeds
    /// the size cap (the oversized escape valve)
    pub fn singleton(entry: Entry) -> Self {
        let mut batch = Self::default();
        batch.push(entry);
        batch
    }

    /// Write the batch in job-descriptor form: one relative path per
    /// line, newline-terminated, no escaping
    pub fn write_descriptor<W: Write>(&self, mut w: W) -> io::Result<()> {
        for entry in &self.entries {
            w.write_all(entry.rel_path.as_bytes())?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Accumulates entries into batches bounded by count and byte caps.
///
/// Caps are checked before admission: an entry that would push the
/// open batch past either cap is refused, so a finalized batch never
/// exceeds its limits. Oversized entries are handled by the caller
/// via [`Batch::singleton`] and never pass through the builder.
pub struct BatchBuilder {
    batch: Batch,
    max_files: usize,
    max_bytes: u64,
}

impl BatchBuilder {
    /// Create a builder with the given caps
    pub fn new(max_files: usize, max_bytes: u64) -> Self {
        Self {
            batch: Batch::default(),
            max_files,
            max_bytes,
        }
    }

    /// Check whether the open batch can admit this entry without
    /// exceeding either cap
    pub fn fits(&self, entry: &Entry) -> bool {
        if self.batch.len() + 1 > self.max_files {
            return false;
        }
        if self.batch.total_bytes() + entry.size > self.max_bytes {
            return false;
        }
        true
    }

    /// Add an entry to the open batch. The caller must flush first if
    /// [`fits`](Self::fits) refused the entry.
    pub fn push(&mut self, entry: Entry) {
        debug_assert!(self.fits(&entry) || self.batch.is_empty());
        self.batch.push(entry);
    }

    /// Check if the open batch is empty
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Current entry count of the open batch
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Current byte total of the open batch
    pub fn total_bytes(&self) -> u64 {
        self.batch.total_bytes()
    }

    /// Finalize the open batch and start a fresh empty one
    pub fn take(&mut self) -> Batch {
        std::mem::take(&mut self.batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_count_cap_precheck() {
        let mut builder = BatchBuilder::new(2, 1024 * 1024 * 1024);

        assert!(builder.fits(&Entry::file("a".into(), 1)));
        builder.push(Entry::file("a".into(), 1));
        assert!(builder.fits(&Entry::file("b".into(), 1)));
        builder.push(Entry::file("b".into(), 1));

        // The third entry must be refused before admission, so the
        // finalized batch holds exactly the cap.
        assert!(!builder.fits(&Entry::file("c".into(), 1)));
        let batch = builder.take();
        assert_eq!(batch.len(), 2);

        builder.push(Entry::file("c".into(), 1));
        assert_eq!(builder.take().len(), 1);
    }

    #[test]
    fn test_builder_size_cap_precheck() {
        let mb = 1024 * 1024;
        let mut builder = BatchBuilder::new(1000, 25 * mb);

        builder.push(Entry::file("f1".into(), 10 * mb));
        assert!(builder.fits(&Entry::file("f2".into(), 10 * mb)));
        builder.push(Entry::file("f2".into(), 10 * mb));

        // 20 MB + 10 MB would exceed the 25 MB cap.
        assert!(!builder.fits(&Entry::file("f3".into(), 10 * mb)));
        let batch = builder.take();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.total_bytes(), 20 * mb);
    }

    #[test]
    fn test_singleton_oversized() {
        let batch = Batch::singleton(Entry::file("huge.bin".into(), 500 * 1024 * 1024));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.total_bytes(), 500 * 1024 * 1024);
    }

    #[test]
    fn test_directory_entry_nominal_size() {
        let entry = Entry::directory("empty/dir".into());
        assert!(entry.is_directory);
        assert_eq!(entry.size, DIR_NOMINAL_SIZE);
    }

    #[test]
    fn test_descriptor_format() {
        let mut batch = Batch::default();
        batch.push(Entry::file("a/b.txt".into(), 1));
        batch.push(Entry::file("c d/e.bin".into(), 2));
        batch.push(Entry::directory("f/empty".into()));

        let mut out = Vec::new();
        batch.write_descriptor(&mut out).unwrap();
        assert_eq!(out, b"a/b.txt\nc d/e.bin\nf/empty\n");
    }

    #[test]
    fn test_take_resets_builder() {
        let mut builder = BatchBuilder::new(10, 100);
        builder.push(Entry::file("a".into(), 5));
        let batch = builder.take();
        assert_eq!(batch.len(), 1);
        assert!(builder.is_empty());
        assert_eq!(builder.total_bytes(), 0);
    }
}
