//! I/O helpers shared by the format readers
//!
//! Provides compression-aware text opening, buffer-reusing line iteration
//! and read-only memory mapping.

use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Capacity of every reader returned by [`open_text`]
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Compression format of a text input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Plain,
    Gzip,
    Bzip2,
}

impl CompressionFormat {
    fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "gz" | "bgz" => Some(Self::Gzip),
            "bz2" => Some(Self::Bzip2),
            _ => None,
        }
    }

    fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else if head.starts_with(BZIP2_MAGIC) {
            Self::Bzip2
        } else {
            Self::Plain
        }
    }
}

/// Compression of `path`, by extension first and leading bytes otherwise
pub fn detect_compression(path: &Path) -> io::Result<CompressionFormat> {
    if let Some(format) = CompressionFormat::from_extension(path) {
        return Ok(format);
    }
    let mut head = Vec::with_capacity(BZIP2_MAGIC.len());
    File::open(path)?
        .take(BZIP2_MAGIC.len() as u64)
        .read_to_end(&mut head)?;
    Ok(CompressionFormat::from_magic(&head))
}

/// Open a text file, transparently decompressing gzip and bzip2 input
pub fn open_text(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let format = detect_compression(path)?;
    let file = File::open(path)?;
    let inner: Box<dyn Read> = match format {
        CompressionFormat::Gzip => Box::new(flate2::read::MultiGzDecoder::new(file)),
        CompressionFormat::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        CompressionFormat::Plain => Box::new(file),
    };
    Ok(Box::new(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, inner)))
}

/// Map a whole file read-only
pub fn map_file(path: &Path) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: inputs are not rewritten while a genowin process holds the map
    unsafe { Mmap::map(&file) }
}

/// Lines of a reader, yielded from one reused buffer without line endings
pub struct LineIterator<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> LineIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::with_capacity(1024),
        }
    }

    /// Next line with `\n` or `\r\n` removed, `None` at end of input
    pub fn next_line(&mut self) -> Option<io::Result<&str>> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => None,
            Ok(_) => {
                let kept = self.line.trim_end_matches('\n').trim_end_matches('\r').len();
                self.line.truncate(kept);
                Some(Ok(self.line.as_str()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
