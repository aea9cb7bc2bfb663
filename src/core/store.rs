//! File-backed vote arrays
//!
//! An [`ArrayFile`] is a raw row-major array of little-endian `u32`
//! values. Files are allocated sparse and rows are read or written
//! through short-lived memory maps covering only the addressed range.
//! [`LruCache`] keeps a bounded number of decoded arrays resident and
//! flushes an entry to its [`Backing`] before evicting it.

use crate::core::error::{PersistError, PersistResult};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapOptions;
use ndarray::{Array2, ArrayView2};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const CELL_BYTES: u64 = 4;

/// Dense `rows x cols` array of `u32` stored in a file
#[derive(Debug)]
pub struct ArrayFile {
    path: PathBuf,
    file: File,
    rows: u64,
    cols: usize,
}

impl ArrayFile {
    /// Create a zero-filled array file, replacing any existing one
    pub fn create<P: AsRef<Path>>(path: P, rows: u64, cols: usize) -> PersistResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(rows * cols as u64 * CELL_BYTES)?;
        Ok(Self {
            path,
            file,
            rows,
            cols,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn byte_range(&self, start: u64, end: u64) -> PersistResult<(u64, usize)> {
        if start > end || end > self.rows {
            return Err(PersistError::ArraySize {
                path: self.path.clone(),
                expected: end * self.cols as u64 * CELL_BYTES,
                found: self.rows * self.cols as u64 * CELL_BYTES,
            });
        }
        let row_bytes = self.cols as u64 * CELL_BYTES;
        Ok((start * row_bytes, ((end - start) * row_bytes) as usize))
    }

    /// Rows `[start, end)`
    pub fn read_rows(&self, start: u64, end: u64) -> PersistResult<Array2<u32>> {
        let (offset, len) = self.byte_range(start, end)?;
        let n = (end - start) as usize;
        let mut values = vec![0u32; n * self.cols];
        if len > 0 {
            // SAFETY: the file is private to this process and only written through `write_rows`
            let map = unsafe { MmapOptions::new().offset(offset).len(len).map(&self.file)? };
            LittleEndian::read_u32_into(&map, &mut values);
        }
        Array2::from_shape_vec((n, self.cols), values)
            .map_err(|e| PersistError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Overwrite rows starting at `start` with `values`
    pub fn write_rows(&self, start: u64, values: ArrayView2<u32>) -> PersistResult<()> {
        if values.ncols() != self.cols {
            return Err(PersistError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} columns written to {:?} with {}", values.ncols(), self.path, self.cols),
            )));
        }
        let end = start + values.nrows() as u64;
        let (offset, len) = self.byte_range(start, end)?;
        if len == 0 {
            return Ok(());
        }
        let flat: Vec<u32> = values.iter().copied().collect();
        // SAFETY: the file is private to this process and no other map of this range is alive
        let mut map = unsafe { MmapOptions::new().offset(offset).len(len).map_mut(&self.file)? };
        LittleEndian::write_u32_into(&flat, &mut map);
        map.flush_async()?;
        Ok(())
    }
}

/// Load and store hooks for [`LruCache`] entries
pub trait Backing<K, V> {
    type Error;

    fn load(&mut self, key: &K) -> Result<V, Self::Error>;

    fn flush(&mut self, key: &K, value: &V) -> Result<(), Self::Error>;
}

/// Least-recently-used cache with write-back eviction
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    // Most recently used first
    entries: VecDeque<(K, V)>,
}

impl<K: Clone + PartialEq, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys currently resident, most recent first
    pub fn resident(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Resident value for `key`, loading it and evicting the oldest entry if needed
    pub fn get_mut<B: Backing<K, V>>(&mut self, key: &K, backing: &mut B) -> Result<&mut V, B::Error> {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(0) => {}
            Some(pos) => {
                if let Some(entry) = self.entries.remove(pos) {
                    self.entries.push_front(entry);
                }
            }
            None => {
                while self.entries.len() >= self.capacity {
                    if let Some((old_key, old_value)) = self.entries.pop_back() {
                        backing.flush(&old_key, &old_value)?;
                    }
                }
                let value = backing.load(key)?;
                self.entries.push_front((key.clone(), value));
            }
        }
        Ok(&mut self.entries[0].1)
    }

    /// Write every resident entry back without evicting it
    pub fn flush_all<B: Backing<K, V>>(&self, backing: &mut B) -> Result<(), B::Error> {
        for (key, value) in &self.entries {
            backing.flush(key, value)?;
        }
        Ok(())
    }
}
