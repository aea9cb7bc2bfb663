//! File format adapters
//!
//! Adapters for indexed FASTA, GFF3 annotations and methylation reports.

pub mod fasta;
pub mod gff;
pub mod methylation;

pub use fasta::{FaiRecord, FastaIndex, IndexedFasta};
pub use gff::{GffCall, GffParseError, GffRecordView, GFF3_HEADER};
pub use methylation::MethylationReport;
