//! # Database File Access
//!
//! Read-only positional I/O over one database file. The pool reads whole
//! extents (64KB, eight pages); only the file's last extent may be shorter,
//! when the file is not a whole number of extents long.
//!
//! The file size is validated at open: at least one extent and a whole
//! number of pages. Nothing here interprets page contents.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};

use crate::config::{EXTENT_SIZE, PAGE_SIZE};
use crate::error::EngineError;

#[derive(Debug)]
pub struct DataFile {
    file: File,
    path: PathBuf,
    size: u64,
    page_count: u32,
    extent_count: u32,
}

impl DataFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path).map_err(|e| {
            EngineError::bad_open(format!("cannot open '{}': {}", path.display(), e))
        })?;

        let size = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        if size < EXTENT_SIZE as u64 {
            eyre::bail!(EngineError::bad_open(format!(
                "'{}' is {} bytes, smaller than one extent ({})",
                path.display(),
                size,
                EXTENT_SIZE
            )));
        }
        if size % PAGE_SIZE as u64 != 0 {
            eyre::bail!(EngineError::bad_open(format!(
                "'{}' size {} is not a multiple of the page size {}",
                path.display(),
                size,
                PAGE_SIZE
            )));
        }

        let page_count = (size / PAGE_SIZE as u64) as u32;
        let extent_count = ((size + EXTENT_SIZE as u64 - 1) / EXTENT_SIZE as u64) as u32;

        Ok(Self {
            file,
            path,
            size,
            page_count,
            extent_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn extent_count(&self) -> u32 {
        self.extent_count
    }

    /// Bytes occupied by `extent` on disk; only the last extent may be
    /// short.
    pub fn extent_len(&self, extent: u32) -> usize {
        debug_assert!(extent < self.extent_count);
        let start = extent as u64 * EXTENT_SIZE as u64;
        (self.size - start).min(EXTENT_SIZE as u64) as usize
    }

    /// Reads `extent` into the front of `buf`. `buf` must hold a whole
    /// extent; the tail past `extent_len` is left untouched.
    pub fn read_extent(&self, extent: u32, buf: &mut [u8]) -> Result<usize> {
        debug_assert!(buf.len() >= EXTENT_SIZE);
        let offset = extent as u64 * EXTENT_SIZE as u64;
        let len = self.extent_len(extent);
        self.file
            .read_exact_at(&mut buf[..len], offset)
            .map_err(|e| {
                eyre::Report::new(EngineError::Io {
                    offset,
                    reason: e.to_string(),
                })
            })?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_of_size(len: usize) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mdf");
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![0u8; len]).unwrap();
        (dir, path)
    }

    #[test]
    fn open_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DataFile::open(dir.path().join("absent.mdf")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::BadOpen { .. })
        ));
    }

    #[test]
    fn open_rejects_short_file() {
        let (_dir, path) = file_of_size(PAGE_SIZE);
        assert!(DataFile::open(&path).is_err());
    }

    #[test]
    fn open_rejects_ragged_file() {
        let (_dir, path) = file_of_size(EXTENT_SIZE + 100);
        assert!(DataFile::open(&path).is_err());
    }

    #[test]
    fn last_extent_may_be_short() {
        let (_dir, path) = file_of_size(EXTENT_SIZE + 2 * PAGE_SIZE);
        let file = DataFile::open(&path).unwrap();
        assert_eq!(file.page_count(), 10);
        assert_eq!(file.extent_count(), 2);
        assert_eq!(file.extent_len(0), EXTENT_SIZE);
        assert_eq!(file.extent_len(1), 2 * PAGE_SIZE);
    }

    #[test]
    fn read_extent_returns_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mdf");
        let mut bytes = vec![0u8; EXTENT_SIZE];
        bytes[PAGE_SIZE] = 0xCD;
        File::create(&path).unwrap().write_all(&bytes).unwrap();

        let file = DataFile::open(&path).unwrap();
        let mut buf = vec![0u8; EXTENT_SIZE];
        let n = file.read_extent(0, &mut buf).unwrap();
        assert_eq!(n, EXTENT_SIZE);
        assert_eq!(buf[PAGE_SIZE], 0xCD);
    }
}
