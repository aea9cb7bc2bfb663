//! Cross-shard synchronization
//!
//! Shards run as independent processes. A [`Barrier`] blocks until every
//! shard has reached the same named checkpoint. [`FileBarrier`] does this
//! with marker files in a shared directory.

use crate::core::coords::Shard;
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Blocks until every shard reaches the checkpoint `name`
pub trait Barrier {
    fn wait(&self, name: &str) -> io::Result<()>;
}

/// Barrier for single-process runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBarrier;

impl Barrier for NoopBarrier {
    fn wait(&self, _name: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Barrier built on marker files in a directory visible to every shard
///
/// Each call to [`Barrier::wait`] starts a new generation, so the same
/// checkpoint name can be reused.
#[derive(Debug)]
pub struct FileBarrier {
    dir: PathBuf,
    shard: Shard,
    poll: Duration,
    generation: AtomicU64,
}

impl FileBarrier {
    pub fn new<P: AsRef<Path>>(dir: P, shard: Shard) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            shard,
            poll: Duration::from_millis(20),
            generation: AtomicU64::new(0),
        })
    }

    /// Interval between directory scans
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn marker(&self, name: &str, generation: u64, rank: usize) -> PathBuf {
        self.dir
            .join(format!(".barrier.{}.{}.{}", name, generation, rank))
    }
}

impl Barrier for FileBarrier {
    fn wait(&self, name: &str) -> io::Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        fs::write(self.marker(name, generation, self.shard.rank), b"")?;
        debug!(
            "Rank {} waiting at {} ({})",
            self.shard.rank, name, generation
        );

        loop {
            let arrived = (0..self.shard.count)
                .filter(|&rank| self.marker(name, generation, rank).exists())
                .count();
            if arrived == self.shard.count {
                break;
            }
            thread::sleep(self.poll);
        }

        // Markers of the previous generation are no longer polled by anyone
        if generation > 0 {
            let stale = self.marker(name, generation - 1, self.shard.rank);
            if stale.exists() {
                fs::remove_file(stale)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_single_shard_passes() {
        let dir = TempDir::new().unwrap();
        let barrier = FileBarrier::new(dir.path(), Shard::single()).unwrap();
        barrier.wait("dump").unwrap();
        barrier.wait("dump").unwrap();
        NoopBarrier.wait("dump").unwrap();
    }

    #[test]
    fn test_shards_meet() {
        let dir = Arc::new(TempDir::new().unwrap());
        let handles: Vec<_> = (0..3)
            .map(|rank| {
                let dir = Arc::clone(&dir);
                thread::spawn(move || {
                    let barrier = FileBarrier::new(dir.path(), Shard::new(rank, 3).unwrap())
                        .unwrap()
                        .with_poll(Duration::from_millis(5));
                    thread::sleep(Duration::from_millis(10 * rank as u64));
                    barrier.wait("load").unwrap();
                    barrier.wait("load").unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
