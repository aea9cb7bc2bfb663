//! Core windowing functionality
//!
//! This module contains the sequence cache, the feature interval index,
//! the window slicer and the consumers of model output (vote aggregation
//! and error tracking).

pub mod batch;
pub mod cache;
pub mod coords;
pub mod dna;
pub mod error;
pub mod index;
pub mod io;
pub mod mask;
pub mod slicer;
pub mod source;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod vocab;
pub mod vote;

pub use batch::{Region, WindowBatch, INPUT_FEATURES};
pub use cache::{ScanDirection, SequenceCache, DEFAULT_CACHE_SIZE};
pub use coords::{GenomeCoord, Geometry, Shard, Strand};
pub use error::{
    AnnotationError, AnnotationResult, GenowinError, PersistError, PersistResult, Result,
    SequenceError, SequenceResult, ShapeError, ShapeResult,
};
pub use index::{FeatureIndex, FeatureInterval, FeatureTag, IndexOptions, IndexOrigin};
pub use io::{LineIterator, DEFAULT_BUFFER_SIZE};
pub use slicer::{SlicerConfig, WindowSlicer};
pub use source::{Context, MemoryGenome, MethylCall, MethylationSource, NoMethylation, SequenceSource};
pub use sync::{Barrier, FileBarrier, NoopBarrier};
pub use tracker::{Aggregator, CoordMode, ErrorTracker, TrackerMode};
pub use vocab::{Vocabulary, VocabularyKind};
pub use vote::{Accuracy, Confusion, FeatureAccuracy, VoteAggregator, VoteOptions};
