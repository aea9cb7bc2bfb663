//! Integration tests for the annotation round trip
//!
//! An annotation is encoded into label windows, voted back and written
//! as GFF3. With full coverage and a zero threshold the reconstructed
//! calls must match the input records exactly.

mod common;

use common::{fixture, triples, CHR1, GFF3};
use genowin::core::batch::{BASE_COLUMN, METHYLATION_COLUMN, QUALITY_COLUMN};
use genowin::core::dna::code_base;
use genowin::core::{
    FeatureIndex, Geometry, IndexOptions, IndexOrigin, NoMethylation, Shard, SlicerConfig,
    Vocabulary, VoteAggregator, VoteOptions, WindowSlicer,
};
use genowin::formats::{IndexedFasta, MethylationReport};
use std::sync::Arc;

fn open_slicer(fixture: &common::Fixture) -> WindowSlicer<IndexedFasta, NoMethylation> {
    let genome = IndexedFasta::open(&fixture.fasta).unwrap();
    let index = FeatureIndex::open(&fixture.gff, Arc::new(Vocabulary::full()), IndexOptions::default()).unwrap();
    WindowSlicer::new(genome, NoMethylation, SlicerConfig::default()).with_index(index)
}

fn reconstructed(lines: &[String]) -> Vec<(String, String, u64, u64, char)> {
    triples(&lines.join("\n"))
}

#[test]
fn test_genome_pass_reproduces_annotation() {
    let fixture = fixture();
    let mut slicer = open_slicer(&fixture);
    let vocab = slicer.vocabulary().unwrap().clone();
    let mut votes = VoteAggregator::new(slicer.chrom_lens().unwrap(), vocab, VoteOptions::default()).unwrap();

    let geometry = Geometry::new(5, 5, 2).unwrap();
    let mut regions = 0;
    for region in slicer.genome_regions(geometry, Shard::single()).unwrap() {
        let region = region.unwrap();
        let labels = region.labels.as_ref().unwrap();
        let c = &region.coord;
        votes.vote(&c.chrom, c.start, c.end, labels.view(), true, false).unwrap();
        regions += 1;
    }
    assert_eq!(regions, 4);

    let lines = votes.gff3_lines(0.0, 0, 0).unwrap();
    assert_eq!(lines[0], "##gff-version   3");
    assert_eq!(reconstructed(&lines), triples(GFF3));

    let te = lines
        .iter()
        .find(|l| l.contains("\ttransposable_element\t"))
        .unwrap();
    assert!(te.ends_with(";Order=LTR;Superfamily=Gypsy"));
}

#[test]
fn test_window_votes_reproduce_annotation() {
    let fixture = fixture();
    let mut slicer = open_slicer(&fixture);
    let vocab = slicer.vocabulary().unwrap().clone();
    let mut votes = VoteAggregator::new(slicer.chrom_lens().unwrap(), vocab, VoteOptions::default()).unwrap();

    // Offset-1 windows reach every base of both chromosomes
    for batch in slicer.flat_batches(4, 8).unwrap() {
        let batch = batch.unwrap();
        for (i, c) in batch.coords.iter().enumerate() {
            let labels = batch.label_window(i).unwrap();
            votes.vote(&c.chrom, c.start, c.end, labels, false, false).unwrap();
        }
    }
    let lines = votes.gff3_lines(0.5, 0, 0).unwrap();
    assert_eq!(reconstructed(&lines), triples(GFF3));
}

#[test]
fn test_stateful_stranded_pass_reproduces_annotation() {
    let fixture = fixture();
    let mut slicer = open_slicer(&fixture);
    let vocab = slicer.vocabulary().unwrap().clone();
    let options = VoteOptions {
        stranded: true,
        ..VoteOptions::default()
    };
    let mut votes = VoteAggregator::new(slicer.chrom_lens().unwrap(), vocab, options).unwrap();

    // Two runs of 10 bases, two steps of 5 each way
    let geometry = Geometry::new(5, 1, 2).unwrap();
    let mut reverse = 0;
    for batch in slicer.stateful_genome_batches(geometry, Shard::single(), true).unwrap() {
        let batch = batch.unwrap();
        if batch.reverse {
            reverse += 1;
        }
        for (i, c) in batch.coords.iter().enumerate() {
            let labels = batch.label_window(i).unwrap();
            votes.vote(&c.chrom, c.start, c.end, labels, true, batch.reverse).unwrap();
        }
    }
    assert_eq!(reverse, 4);

    let lines = votes.gff3_lines(0.0, 0, 0).unwrap();
    assert_eq!(reconstructed(&lines), triples(GFF3));
    assert!(lines.iter().any(|l| l.ends_with("Order=LTR;Superfamily=Gypsy")));
}

#[test]
fn test_index_reloads_until_annotation_changes() {
    let fixture = fixture();
    let vocab = Arc::new(Vocabulary::full());
    let first = FeatureIndex::open(&fixture.gff, vocab.clone(), IndexOptions::default()).unwrap();
    assert_eq!(first.origin(), IndexOrigin::Built);
    assert!(FeatureIndex::manifest_path(&fixture.gff).exists());

    let second = FeatureIndex::open(&fixture.gff, vocab.clone(), IndexOptions::default()).unwrap();
    assert_eq!(second.origin(), IndexOrigin::Reloaded);
    assert_eq!(second.fetch("Chr1", 0, 20), first.fetch("Chr1", 0, 20));

    std::fs::write(&fixture.gff, GFF3.replace("\t9\t14\t", "\t9\t13\t")).unwrap();
    let third = FeatureIndex::open(&fixture.gff, vocab, IndexOptions::default()).unwrap();
    assert_eq!(third.origin(), IndexOrigin::Built);
}

#[test]
fn test_fasta_and_methylation_rows() {
    let fixture = fixture();
    let genome = IndexedFasta::open(&fixture.fasta).unwrap();
    let report = MethylationReport::load(&fixture.methylation).unwrap();
    let mut slicer = WindowSlicer::new(genome, report, SlicerConfig::default());

    let region = slicer.get_region("Chr1", 0, 20).unwrap();
    let bases: Vec<u8> = region
        .inputs
        .column(BASE_COLUMN)
        .iter()
        .map(|&c| code_base(c as u8))
        .collect();
    assert_eq!(bases, CHR1.as_bytes());
    assert_eq!(region.inputs[[9, METHYLATION_COLUMN]], 0.75);
    assert_eq!(region.inputs[[9, METHYLATION_COLUMN + 1]], 4.0);
    assert_eq!(region.inputs[[10, METHYLATION_COLUMN + 2]], 0.0);
    assert_eq!(region.inputs[[10, METHYLATION_COLUMN + 3]], 2.0);
    assert_eq!(region.inputs[[0, QUALITY_COLUMN]], 3.0);

    let chr2 = slicer.get_region("Chr2", 0, 20).unwrap();
    assert_eq!(chr2.inputs[[0, QUALITY_COLUMN]], 2.0);
    assert_eq!(chr2.inputs[[8, METHYLATION_COLUMN + 4]], 0.5);
}
