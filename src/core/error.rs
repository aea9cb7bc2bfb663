//! Error types for genowin
//!
//! Defines all error types used throughout the library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for genowin operations
#[derive(Debug, Error)]
pub enum GenowinError {
    /// Sequence source and cache errors
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Annotation parsing errors
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// Array shape and geometry errors
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// Index, vote store and dump persistence errors
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading sequence data
#[derive(Debug, Error)]
pub enum SequenceError {
    /// Chromosome is not present in the sequence source
    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    /// A forward lane was asked for a start before its high-water mark
    #[error("Backward seek on {chrom}: start {start} is before cached mark {mark}")]
    BackwardSeek { chrom: String, start: u64, mark: u64 },

    /// A reverse lane was asked for an end past its low-water mark
    #[error("Forward seek on reverse lane of {chrom}: end {end} is after cached mark {mark}")]
    ForwardSeek { chrom: String, end: u64, mark: u64 },

    /// Requested range does not fit in the chromosome
    #[error("Range {start}-{end} is outside {chrom} (length {len})")]
    OutOfRange {
        chrom: String,
        start: u64,
        end: u64,
        len: u64,
    },

    /// Malformed FASTA index line
    #[error("Invalid FASTA index at line {line}: {message}")]
    InvalidIndex { line: usize, message: String },

    /// Malformed FASTA content
    #[error("Invalid FASTA file {path}: {message}")]
    InvalidFasta { path: PathBuf, message: String },

    /// I/O error during reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading annotation or methylation tables
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// Malformed annotation record
    #[error("Invalid annotation line {line}: {message}")]
    InvalidLine { line: usize, message: String },

    /// Malformed methylation report record
    #[error("Invalid methylation report line {line}: {message}")]
    InvalidMethylation { line: usize, message: String },

    /// I/O error during parsing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when arrays or traversal parameters do not line up
#[derive(Debug, Error)]
pub enum ShapeError {
    /// Sequence and methylation fetches returned different lengths
    #[error("Sequence returned {sequence} rows but methylation returned {methylation}")]
    RowMismatch { sequence: usize, methylation: usize },

    /// Per-base array does not cover the addressed range
    #[error("Expected {expected} rows for {chrom}:{start}-{end}, found {found}")]
    Rows {
        chrom: String,
        start: u64,
        end: u64,
        expected: usize,
        found: usize,
    },

    /// Column count does not match the label vocabulary
    #[error("Expected {expected} columns, found {found}")]
    Columns { expected: usize, found: usize },

    /// Prediction and truth arrays differ in shape
    #[error("Shape mismatch: {left:?} vs {right:?}")]
    Mismatch { left: Vec<usize>, right: Vec<usize> },

    /// Window geometry is not usable
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Shard rank is outside the shard count
    #[error("Invalid shard: rank {rank} of {count}")]
    InvalidShard { rank: usize, count: usize },
}

/// Errors raised while saving or restoring on-disk state
#[derive(Debug, Error)]
pub enum PersistError {
    /// Binary encoding failure
    #[error("Binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Manifest encoding failure
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vote array file has an unexpected size
    #[error("Array file {path} holds {found} bytes, expected {expected}")]
    ArraySize {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// I/O error on backing storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for genowin operations
pub type Result<T> = std::result::Result<T, GenowinError>;

/// Result type alias for sequence operations
pub type SequenceResult<T> = std::result::Result<T, SequenceError>;

/// Result type alias for annotation parsing
pub type AnnotationResult<T> = std::result::Result<T, AnnotationError>;

/// Result type alias for shape checks
pub type ShapeResult<T> = std::result::Result<T, ShapeError>;

/// Result type alias for persistence operations
pub type PersistResult<T> = std::result::Result<T, PersistError>;
