//! Spill file backing the disk tier of a [`SpillBuffer`](super::SpillBuffer).
//!
//! # Responsibilities
//! - Create a named temporary file on the first overflow
//! - Append spilled bytes sequentially
//! - Rewind and read back from the start
//! - Remove the file on release, logging (never raising) removal failures

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::observability::metrics;

/// File name prefix for spill files.
pub const SPILL_FILE_PREFIX: &str = "proxy-buffer-";

/// A temporary file exclusively owned by one buffer.
#[derive(Debug)]
pub struct SpillFile {
    file: NamedTempFile,
    written: u64,
}

impl SpillFile {
    /// Create a spill file in `dir`, or in the OS temp directory when `None`.
    pub fn create(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SPILL_FILE_PREFIX);

        let created = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };

        let file = created.inspect_err(|e| {
            tracing::error!(error = %e, "Buffer: failed to create spill file");
        })?;

        tracing::debug!(file = %file.path().display(), "Buffer: spilling to disk");
        metrics::record_spill();

        Ok(Self { file, written: 0 })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Bytes appended so far.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Append the whole slice or fail.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Move the cursor back to the first spilled byte.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    /// Close and delete the file. Failures are logged and swallowed.
    pub fn remove(self) {
        let path = self.file.path().to_path_buf();
        tracing::debug!(file = %path.display(), "Buffer: removing spill");

        if let Err(e) = self.file.close() {
            tracing::error!(file = %path.display(), error = %e, "Buffer: failed to remove spill");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_rewind_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut spill = SpillFile::create(Some(dir.path())).unwrap();
        assert!(spill.is_empty());

        spill.append(b"hello ").unwrap();
        spill.append(b"world").unwrap();
        assert_eq!(spill.len(), 11);

        spill.rewind().unwrap();
        let mut out = Vec::new();
        let mut chunk = [0u8; 4];
        loop {
            let n = spill.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillFile::create(Some(dir.path())).unwrap();
        let path = spill.path().to_path_buf();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(SPILL_FILE_PREFIX));
        assert!(path.exists());

        spill.remove();
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_after_external_delete_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillFile::create(Some(dir.path())).unwrap();
        std::fs::remove_file(spill.path()).unwrap();

        spill.remove();
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(SpillFile::create(Some(&missing)).is_err());
    }
}
