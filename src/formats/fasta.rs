//! Indexed FASTA reader
//!
//! Reads `.fai` companion indexes (building one when it is missing) and
//! serves range fetches from a memory-mapped FASTA file.

use crate::core::error::{SequenceError, SequenceResult};
use crate::core::io::{map_file, LineIterator, DEFAULT_BUFFER_SIZE};
use crate::core::source::SequenceSource;
use log::{debug, info};
use memchr::{memchr, memrchr};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One line of a `.fai` index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaiRecord {
    pub name: String,
    pub length: u64,
    /// Byte offset of the first base
    pub offset: u64,
    pub line_bases: u64,
    /// Bytes per line including the terminator
    pub line_width: u64,
}

impl FaiRecord {
    /// Parse a 5-column `.fai` line
    pub fn parse(line: &str, line_number: usize) -> SequenceResult<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(SequenceError::InvalidIndex {
                line: line_number,
                message: format!("expected 5 fields, found {}", fields.len()),
            });
        }
        let number = |idx: usize, name: &str| -> SequenceResult<u64> {
            fields[idx].parse().map_err(|_| SequenceError::InvalidIndex {
                line: line_number,
                message: format!("invalid {} '{}'", name, fields[idx]),
            })
        };
        Ok(Self {
            name: fields[0].to_string(),
            length: number(1, "length")?,
            offset: number(2, "offset")?,
            line_bases: number(3, "line bases")?,
            line_width: number(4, "line width")?,
        })
    }

    /// Byte position of a 0-based base offset
    fn byte_position(&self, pos: u64) -> u64 {
        if self.line_bases == 0 {
            return self.offset;
        }
        self.offset + (pos / self.line_bases) * self.line_width + pos % self.line_bases
    }
}

/// Chromosome table of a FASTA file
#[derive(Debug, Clone, Default)]
pub struct FastaIndex {
    records: Vec<FaiRecord>,
    by_name: HashMap<String, usize>,
}

impl FastaIndex {
    fn from_records(records: Vec<FaiRecord>) -> Self {
        let by_name = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        Self { records, by_name }
    }

    /// Path of the companion index for a FASTA file
    pub fn path_for(fasta: &Path) -> PathBuf {
        let mut name = fasta.as_os_str().to_os_string();
        name.push(".fai");
        PathBuf::from(name)
    }

    /// Read an existing `.fai` file
    pub fn read(path: &Path) -> SequenceResult<Self> {
        let file = File::open(path)?;
        let mut lines = LineIterator::new(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file));
        let mut records = Vec::new();
        let mut line_number = 0;
        while let Some(line) = lines.next_line() {
            let line = line?;
            line_number += 1;
            if line.is_empty() {
                continue;
            }
            let record = FaiRecord::parse(line, line_number)?;
            records.push(record);
        }
        Ok(Self::from_records(records))
    }

    /// Scan a FASTA file, write its `.fai` next to it and return the index
    pub fn build(fasta: &Path) -> SequenceResult<Self> {
        // Mapping an empty file fails on some platforms
        let records = if fasta.metadata()?.len() == 0 {
            Vec::new()
        } else {
            scan_fasta(&map_file(fasta)?, fasta)?
        };

        let index_path = Self::path_for(fasta);
        let mut out = BufWriter::new(File::create(&index_path)?);
        for r in &records {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}",
                r.name, r.length, r.offset, r.line_bases, r.line_width
            )?;
        }
        out.flush()?;
        info!("Indexed {} sequences into {:?}", records.len(), index_path);
        Ok(Self::from_records(records))
    }

    /// Read the companion index, building it first when absent
    pub fn load_or_build(fasta: &Path) -> SequenceResult<Self> {
        let index_path = Self::path_for(fasta);
        if index_path.exists() {
            debug!("Reading FASTA index {:?}", index_path);
            Self::read(&index_path)
        } else {
            Self::build(fasta)
        }
    }

    pub fn get(&self, name: &str) -> Option<&FaiRecord> {
        self.by_name.get(name).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[FaiRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn scan_fasta(bytes: &[u8], path: &Path) -> SequenceResult<Vec<FaiRecord>> {
    let invalid = |message: String| SequenceError::InvalidFasta {
        path: path.to_path_buf(),
        message,
    };
    let mut records: Vec<FaiRecord> = Vec::new();
    let mut pos = 0usize;
    // Set once a line shorter than line_bases has been seen
    let mut short_line_seen = false;

    while pos < bytes.len() {
        let line_end = memchr(b'\n', &bytes[pos..]).map(|i| pos + i + 1).unwrap_or(bytes.len());
        let line = &bytes[pos..line_end];
        let content = trim_eol(line);

        if content.first() == Some(&b'>') {
            let header = String::from_utf8_lossy(&content[1..]);
            let name = header.split_whitespace().next().unwrap_or("").to_string();
            if name.is_empty() {
                return Err(invalid(format!("empty sequence name at byte {}", pos)));
            }
            records.push(FaiRecord {
                name,
                length: 0,
                offset: line_end as u64,
                line_bases: 0,
                line_width: 0,
            });
            short_line_seen = false;
        } else if !content.is_empty() {
            let record = records
                .last_mut()
                .ok_or_else(|| invalid("sequence data before first header".to_string()))?;
            let bases = content.len() as u64;
            if record.line_bases == 0 {
                record.line_bases = bases;
                record.line_width = line.len() as u64;
            } else if short_line_seen || bases > record.line_bases {
                return Err(invalid(format!("uneven line lengths in {}", record.name)));
            }
            if bases < record.line_bases {
                short_line_seen = true;
            }
            record.length += bases;
        }
        pos = line_end;
    }
    Ok(records)
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Memory-mapped FASTA file with its index
pub struct IndexedFasta {
    mmap: Mmap,
    index: FastaIndex,
}

impl IndexedFasta {
    /// Open a FASTA file, building the `.fai` index if needed
    pub fn open<P: AsRef<Path>>(path: P) -> SequenceResult<Self> {
        let path = path.as_ref();
        let index = FastaIndex::load_or_build(path)?;
        let mmap = map_file(path)?;
        Ok(Self { mmap, index })
    }

    pub fn index(&self) -> &FastaIndex {
        &self.index
    }
}

impl SequenceSource for IndexedFasta {
    fn chrom_names(&self) -> Vec<String> {
        self.index.records.iter().map(|r| r.name.clone()).collect()
    }

    fn chrom_len(&self, chrom: &str) -> Option<u64> {
        self.index.get(chrom).map(|r| r.length)
    }

    fn fetch(&self, chrom: &str, start: u64, end: u64) -> SequenceResult<Vec<u8>> {
        let record = self
            .index
            .get(chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(chrom.to_string()))?;
        if start > end || end > record.length {
            return Err(SequenceError::OutOfRange {
                chrom: chrom.to_string(),
                start,
                end,
                len: record.length,
            });
        }
        if start == end {
            return Ok(Vec::new());
        }
        let first = record.byte_position(start) as usize;
        let last = record.byte_position(end - 1) as usize + 1;
        let raw = self.mmap.get(first..last).ok_or_else(|| SequenceError::OutOfRange {
            chrom: chrom.to_string(),
            start,
            end,
            len: record.length,
        })?;
        let mut bases = Vec::with_capacity((end - start) as usize);
        bases.extend(
            raw.iter()
                .filter(|&&b| b != b'\n' && b != b'\r')
                .map(|b| b.to_ascii_uppercase()),
        );
        Ok(bases)
    }

    fn header(&self, chrom: &str) -> Option<String> {
        let record = self.index.get(chrom)?;
        let before = self.mmap.get(..record.offset as usize)?;
        let gt = memrchr(b'>', before)?;
        let text = trim_eol(&before[gt + 1..]);
        Some(String::from_utf8_lossy(text).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FASTA: &[u8] = b">Chr1 dna:chromosome chromosome:TEST:1\nAATTTTATAC\nCCCCATGCAA\n>Chr2 dna:scaffold\nGGGGAAAACC\nCCTTTT\n";

    fn write_fasta(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("genome.fa");
        std::fs::write(&path, FASTA).unwrap();
        path
    }

    #[test]
    fn test_build_index() {
        let dir = TempDir::new().unwrap();
        let path = write_fasta(&dir);
        let index = FastaIndex::build(&path).unwrap();

        assert_eq!(index.len(), 2);
        let chr1 = index.get("Chr1").unwrap();
        assert_eq!(chr1.length, 20);
        assert_eq!(chr1.offset, 39);
        assert_eq!(chr1.line_bases, 10);
        assert_eq!(chr1.line_width, 11);
        assert_eq!(index.get("Chr2").unwrap().length, 16);

        let reread = FastaIndex::read(&FastaIndex::path_for(&path)).unwrap();
        assert_eq!(reread.records(), index.records());
    }

    #[test]
    fn test_build_crlf_and_empty() {
        let dir = TempDir::new().unwrap();
        let crlf = dir.path().join("crlf.fa");
        std::fs::write(&crlf, b">Chr1\r\nACGTACGTAC\r\nACG\r\n").unwrap();
        let index = FastaIndex::build(&crlf).unwrap();
        let chr1 = index.get("Chr1").unwrap();
        assert_eq!((chr1.length, chr1.offset), (13, 7));
        assert_eq!((chr1.line_bases, chr1.line_width), (10, 12));

        let empty = dir.path().join("empty.fa");
        std::fs::write(&empty, b"").unwrap();
        assert!(FastaIndex::build(&empty).unwrap().is_empty());
        assert!(FastaIndex::path_for(&empty).exists());
    }

    #[test]
    fn test_fetch_across_lines() {
        let dir = TempDir::new().unwrap();
        let fasta = IndexedFasta::open(write_fasta(&dir)).unwrap();

        assert_eq!(fasta.chrom_names(), vec!["Chr1", "Chr2"]);
        assert_eq!(fasta.fetch("Chr1", 8, 12).unwrap(), b"ACCC");
        assert_eq!(fasta.fetch("Chr1", 0, 20).unwrap(), b"AATTTTATACCCCCATGCAA");
        assert_eq!(fasta.fetch("Chr2", 10, 16).unwrap(), b"CCTTTT");
        assert!(fasta.fetch("Chr2", 10, 17).is_err());
    }

    #[test]
    fn test_header_text() {
        let dir = TempDir::new().unwrap();
        let fasta = IndexedFasta::open(write_fasta(&dir)).unwrap();
        assert_eq!(
            fasta.header("Chr1").as_deref(),
            Some("Chr1 dna:chromosome chromosome:TEST:1")
        );
        assert_eq!(fasta.header("Chr2").as_deref(), Some("Chr2 dna:scaffold"));
    }

    #[test]
    fn test_invalid_index_line() {
        assert!(matches!(
            FaiRecord::parse("Chr1\t20\tx\t10\t11", 3),
            Err(SequenceError::InvalidIndex { line: 3, .. })
        ));
    }
}
