//! Performance benchmarks for Genowin
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use genowin::core::dna::rev_comp;
use genowin::core::mask::bridge_array;
use genowin::core::{
    FeatureIndex, Geometry, MemoryGenome, NoMethylation, Shard, SlicerConfig, Strand, Vocabulary,
    VoteAggregator, VoteOptions, WindowSlicer,
};
use ndarray::{s, Array2};
use std::io::Cursor;
use std::sync::Arc;

const CHROM_LEN: usize = 200_000;

/// Deterministic pseudo-random genome
fn genome() -> MemoryGenome {
    let mut state = 0x2545_f491u32;
    let sequence: Vec<u8> = (0..CHROM_LEN)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            b"ACGT"[(state % 4) as usize]
        })
        .collect();
    let mut genome = MemoryGenome::new();
    genome.insert("Chr1", "Chr1 dna:chromosome", &sequence);
    genome
}

/// Genes every 2 kb with one exon each
fn annotation() -> String {
    let mut text = String::from("##gff-version 3\n");
    for i in 0..CHROM_LEN / 2000 {
        let start = i * 2000 + 100;
        let strand = if i % 2 == 0 { '+' } else { '-' };
        text.push_str(&format!("Chr1\tbench\tgene\t{}\t{}\t.\t{}\t.\tID=g{}\n", start, start + 1200, strand, i));
        text.push_str(&format!("Chr1\tbench\texon\t{}\t{}\t.\t{}\t.\tParent=g{}\n", start + 50, start + 400, strand, i));
    }
    text
}

/// Benchmark region assembly and window batching
fn bench_region_assembly(c: &mut Criterion) {
    let vocab = Arc::new(Vocabulary::full());
    let mut group = c.benchmark_group("region_assembly");

    for seq_len in [500usize, 2000].iter() {
        let geometry = Geometry::new(*seq_len, seq_len / 2, 16).unwrap();
        group.throughput(Throughput::Elements(CHROM_LEN as u64));
        group.bench_with_input(BenchmarkId::from_parameter(seq_len), &geometry, |b, &geometry| {
            b.iter(|| {
                let index = FeatureIndex::from_reader(Cursor::new(annotation()), vocab.clone(), false).unwrap();
                let mut slicer = WindowSlicer::new(genome(), NoMethylation, SlicerConfig::default()).with_index(index);
                let mut windows = 0;
                for batch in slicer.chrom_regions("Chr1", geometry, Shard::single()).unwrap().batches() {
                    windows += black_box(batch.unwrap()).len();
                }
                windows
            })
        });
    }

    group.finish();
}

/// Benchmark voting label windows
fn bench_voting(c: &mut Criterion) {
    let vocab = Arc::new(Vocabulary::full());
    let gene = vocab.feature_id(Strand::Plus, "gene").unwrap();
    let mut window = Array2::<u8>::zeros((1000, vocab.label_width()));
    window.slice_mut(s![200..800, gene]).fill(1);

    let mut group = c.benchmark_group("voting");
    for overwrite in [false, true].iter() {
        group.throughput(Throughput::Elements(CHROM_LEN as u64 / 500));
        group.bench_with_input(BenchmarkId::from_parameter(overwrite), overwrite, |b, &overwrite| {
            let mut votes = VoteAggregator::new(
                vec![("Chr1".to_string(), CHROM_LEN as u64)],
                vocab.clone(),
                VoteOptions::default(),
            )
            .unwrap();
            b.iter(|| {
                for start in (0..CHROM_LEN as u64 - 1000).step_by(500) {
                    votes
                        .vote("Chr1", start, start + 1000, black_box(window.view()), overwrite, false)
                        .unwrap();
                }
            })
        });
    }
    group.finish();
}

/// Benchmark gap bridging of call masks
fn bench_bridging(c: &mut Criterion) {
    let mask: Vec<bool> = (0..CHROM_LEN).map(|i| (i / 7) % 5 != 0 && i % 97 != 0).collect();

    let mut group = c.benchmark_group("bridging");
    for (min_size, max_gap) in [(0usize, 5usize), (20, 5), (100, 50)].iter() {
        group.throughput(Throughput::Elements(mask.len() as u64));
        let id = format!("{}_{}", min_size, max_gap);
        group.bench_with_input(BenchmarkId::from_parameter(id), &(*min_size, *max_gap), |b, &(m, g)| {
            b.iter(|| black_box(bridge_array(black_box(&mask), m, g)))
        });
    }
    group.finish();
}

/// Benchmark reverse complement of input windows
fn bench_rev_comp(c: &mut Criterion) {
    let mut slicer = WindowSlicer::new(genome(), NoMethylation, SlicerConfig::default());
    let mut group = c.benchmark_group("rev_comp");

    for len in [100u64, 1000, 10_000].iter() {
        let region = slicer.get_region("Chr1", 0, *len).unwrap();
        group.throughput(Throughput::Elements(*len));
        group.bench_with_input(BenchmarkId::from_parameter(len), &region.inputs, |b, inputs| {
            b.iter(|| black_box(rev_comp(black_box(inputs.view()))))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_region_assembly,
    bench_voting,
    bench_bridging,
    bench_rev_comp,
);

criterion_main!(benches);
