//! Genowin - Genomic windowing for sequence annotation models
//!
//! Slices an indexed reference genome into fixed-length, overlapping or
//! stateful windows with per-base input features and feature labels, and
//! folds per-window predictions back into genome-wide GFF3 annotations and
//! reconstruction error tracks.
//!
//! # Features
//!
//! - Forward-only sequence cache over a FASTA index
//! - Persisted interval index over GFF3 annotations
//! - Shard-aware window plans for data-parallel training
//! - Disk-backed vote aggregation and per-base error tracking
//!
//! # Example
//!
//! ```ignore
//! use genowin::core::{NoMethylation, SlicerConfig};
//! use genowin::{FeatureIndex, Geometry, IndexOptions, IndexedFasta, Shard, Vocabulary, WindowSlicer};
//! use std::sync::Arc;
//!
//! let fasta = IndexedFasta::open("genome.fa")?;
//! let vocab = Arc::new(Vocabulary::full());
//! let index = FeatureIndex::open("genome.gff3", vocab, IndexOptions::default())?;
//! let mut slicer = WindowSlicer::new(fasta, NoMethylation, SlicerConfig::default()).with_index(index);
//!
//! let geometry = Geometry::new(1000, 500, 8)?;
//! for batch in slicer.chrom_regions("Chr1", geometry, Shard::single())?.batches() {
//!     let batch = batch?;
//!     println!("{} windows", batch.len());
//! }
//! ```

pub mod core;
pub mod formats;

// Re-export commonly used types
pub use core::{
    ErrorTracker, FeatureIndex, GenomeCoord, GenowinError, Geometry, IndexOptions, Result,
    SequenceCache, Shard, Strand, Vocabulary, VoteAggregator, WindowBatch, WindowSlicer,
};
pub use formats::{IndexedFasta, MethylationReport};
