//! Genowin CLI entry point
//!
//! Index, slice and reconstruct genome annotations from the command line.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use genowin::core::{
    FeatureIndex, Geometry, IndexOptions, IndexOrigin, MethylationSource, NoMethylation, Shard,
    SlicerConfig, Vocabulary, VocabularyKind, VoteAggregator, VoteOptions, WindowBatch, WindowSlicer,
};
use genowin::formats::{FastaIndex, IndexedFasta, MethylationReport};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "genowin")]
#[command(about = "Genomic windowing for sequence annotation models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Vocabulary selection shared by subcommands that read annotations
#[derive(clap::Args, Clone, Copy)]
struct VocabArgs {
    /// Use the reduced feature vocabulary
    #[arg(long)]
    reduced: bool,
    /// Drop transposable-element order and superfamily columns
    #[arg(long = "no-te")]
    no_te: bool,
}

impl VocabArgs {
    fn vocabulary(&self) -> Arc<Vocabulary> {
        let kind = if self.reduced {
            VocabularyKind::Reduced
        } else {
            VocabularyKind::Full
        };
        Arc::new(Vocabulary::new(kind, !self.no_te))
    }
}

/// Window geometry flags
#[derive(clap::Args, Clone, Copy)]
struct GeometryArgs {
    /// Bases per window
    #[arg(long = "seq-len", default_value = "1000")]
    seq_len: usize,
    /// Stride between consecutive windows
    #[arg(long, default_value = "500")]
    offset: usize,
    /// Windows per batch
    #[arg(long = "batch-size", default_value = "32")]
    batch_size: usize,
}

impl GeometryArgs {
    fn geometry(&self) -> anyhow::Result<Geometry> {
        Ok(Geometry::new(self.seq_len, self.offset, self.batch_size)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the .fai index of a FASTA file
    Faidx {
        /// Input FASTA file
        fasta: PathBuf,
    },
    /// Build or reload the interval index of a GFF3 annotation
    Index {
        /// Input GFF3 file
        annotation: PathBuf,
        /// Rebuild even if a matching index exists
        #[arg(short = 'f', long)]
        force: bool,
        /// Keep chromosome, contig and supercontig records
        #[arg(long = "include-chrom")]
        include_chrom: bool,
        #[command(flatten)]
        vocab: VocabArgs,
    },
    /// Slice a genome into windows and report batch statistics
    Windows {
        /// Input FASTA file
        fasta: PathBuf,
        /// Bismark cytosine report
        methylation: PathBuf,
        /// GFF3 annotation used for labels
        #[arg(short = 'a', long)]
        annotation: Option<PathBuf>,
        #[command(flatten)]
        geometry: GeometryArgs,
        /// Rank of this shard
        #[arg(long, default_value = "0")]
        rank: usize,
        /// Number of shards
        #[arg(long, default_value = "1")]
        shards: usize,
        /// Contiguous runs for stateful models
        #[arg(long)]
        stateful: bool,
        /// Replay stateful steps on the reverse strand
        #[arg(long)]
        stranded: bool,
        /// Fixed quality class instead of the FASTA header
        #[arg(short = 'q', long)]
        quality: Option<u8>,
        #[arg(long, default_value = "2")]
        ploidy: u8,
        #[command(flatten)]
        vocab: VocabArgs,
    },
    /// Encode an annotation into windows, vote it back and write GFF3
    Reconstruct {
        /// Input FASTA file
        fasta: PathBuf,
        /// Input GFF3 file
        annotation: PathBuf,
        /// Output GFF3 file (stdout if "-")
        output: PathBuf,
        #[command(flatten)]
        geometry: GeometryArgs,
        /// Minimum fraction of evidence a feature needs
        #[arg(short = 't', long, default_value = "0.5")]
        threshold: f64,
        /// Drop features shorter than this
        #[arg(long = "min-size", default_value = "0")]
        min_size: usize,
        /// Bridge gaps up to this size
        #[arg(long = "max-fill", default_value = "0")]
        max_fill: usize,
        /// Vote strands separately through a stateful stranded pass
        #[arg(long)]
        stranded: bool,
        /// Directory for temporary vote arrays
        #[arg(long = "tmp-dir")]
        tmp_dir: Option<PathBuf>,
        #[command(flatten)]
        vocab: VocabArgs,
    },
}

fn load_index(annotation: &Path, vocab: Arc<Vocabulary>, options: IndexOptions) -> anyhow::Result<FeatureIndex> {
    let start = Instant::now();
    eprintln!("Loading annotation: {:?}", annotation);
    let index = FeatureIndex::open(annotation, vocab, options)
        .with_context(|| format!("Failed to index {:?}", annotation))?;
    let verb = match index.origin() {
        IndexOrigin::Built => "built",
        IndexOrigin::Reloaded => "reloaded",
    };
    eprintln!("Interval index {} in {:.2}s", verb, start.elapsed().as_secs_f64());
    Ok(index)
}

#[derive(Default)]
struct WindowStats {
    batches: usize,
    windows: usize,
    padding: usize,
    reverse: usize,
    labelled: usize,
}

impl WindowStats {
    fn print(&self, elapsed: f64) {
        eprintln!("\n=== Window Statistics ===");
        eprintln!("Batches:         {}", self.batches);
        eprintln!("Windows:         {}", self.windows);
        eprintln!("Padding:         {}", self.padding);
        eprintln!("Reverse:         {}", self.reverse);
        eprintln!("Labelled:        {}", self.labelled);
        eprintln!("Time elapsed:    {:.2}s", elapsed);
    }
}

fn count_windows<M: MethylationSource>(
    slicer: &mut WindowSlicer<IndexedFasta, M>,
    geometry: Geometry,
    shard: Shard,
    stateful: bool,
    stranded: bool,
) -> anyhow::Result<WindowStats> {
    let mut stats = WindowStats::default();
    let batches: Box<dyn Iterator<Item = genowin::Result<WindowBatch>> + '_> = if stateful {
        Box::new(slicer.stateful_genome_batches(geometry, shard, stranded)?)
    } else {
        Box::new(slicer.genome_regions(geometry, shard)?.batches())
    };
    for batch in batches {
        let batch = batch?;
        stats.batches += 1;
        stats.windows += batch.len();
        if batch.padding {
            stats.padding += batch.len();
        }
        if batch.reverse {
            stats.reverse += batch.len();
        }
        if batch.has_labels() {
            stats.labelled += batch.len();
        }
    }
    Ok(stats)
}

fn reconstruct(
    slicer: &mut WindowSlicer<IndexedFasta, NoMethylation>,
    votes: &mut VoteAggregator,
    geometry: Geometry,
    stranded: bool,
) -> anyhow::Result<usize> {
    let mut voted = 0;
    if stranded {
        for batch in slicer.stateful_genome_batches(geometry, Shard::single(), true)? {
            let batch = batch?;
            for (i, coord) in batch.coords.iter().enumerate() {
                if let Some(labels) = batch.label_window(i) {
                    votes.vote(&coord.chrom, coord.start, coord.end, labels, true, batch.reverse)?;
                    voted += 1;
                }
            }
        }
    } else {
        for region in slicer.genome_regions(geometry, Shard::single())? {
            let region = region?;
            if let Some(labels) = &region.labels {
                let coord = &region.coord;
                votes.vote(&coord.chrom, coord.start, coord.end, labels.view(), true, false)?;
                voted += 1;
            }
        }
    }
    Ok(voted)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Commands::Faidx { fasta } => {
            eprintln!("Indexing FASTA file: {:?}", fasta);
            let index = FastaIndex::build(&fasta)
                .with_context(|| format!("Failed to index {:?}", fasta))?;
            let path = FastaIndex::path_for(&fasta);

            eprintln!("\n=== Index Statistics ===");
            eprintln!("Sequences:       {}", index.len());
            eprintln!("Total bases:     {}", index.records().iter().map(|r| r.length).sum::<u64>());
            eprintln!("Index file:      {:?}", path);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Index { annotation, force, include_chrom, vocab } => {
            let options = IndexOptions { force, include_chrom };
            let index = load_index(&annotation, vocab.vocabulary(), options)?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for chrom in index.chroms() {
                writeln!(out, "{}\t{}", chrom, index.interval_count(chrom))?;
            }

            eprintln!("\n=== Index Statistics ===");
            eprintln!("Chromosomes:     {}", index.chroms().len());
            eprintln!("Intervals:       {}", index.total_intervals());
            eprintln!("Label width:     {}", index.vocabulary().label_width());
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Windows {
            fasta,
            methylation,
            annotation,
            geometry,
            rank,
            shards,
            stateful,
            stranded,
            quality,
            ploidy,
            vocab,
        } => {
            let geometry = geometry.geometry()?;
            let shard = Shard::new(rank, shards)?;
            let config = SlicerConfig {
                quality,
                ploidy,
                ..SlicerConfig::default()
            };
            let genome = IndexedFasta::open(&fasta)
                .with_context(|| format!("Failed to open {:?}", fasta))?;
            eprintln!("Loading methylation report: {:?}", methylation);
            let report = MethylationReport::load(&methylation)
                .with_context(|| format!("Failed to load {:?}", methylation))?;

            let mut slicer = WindowSlicer::new(genome, report, config);
            if let Some(annotation) = annotation {
                let index = load_index(&annotation, vocab.vocabulary(), IndexOptions::default())?;
                slicer = slicer.with_index(index);
            }

            eprintln!(
                "Slicing {:?} (seq_len={}, offset={}, batch_size={}, shard {}/{})",
                fasta, geometry.seq_len, geometry.offset, geometry.batch_size, shard.rank, shard.count
            );
            let stats = count_windows(&mut slicer, geometry, shard, stateful, stranded)?;
            stats.print(start.elapsed().as_secs_f64());
        }

        Commands::Reconstruct {
            fasta,
            annotation,
            output,
            geometry,
            threshold,
            min_size,
            max_fill,
            stranded,
            tmp_dir,
            vocab,
        } => {
            let geometry = geometry.geometry()?;
            let genome = IndexedFasta::open(&fasta)
                .with_context(|| format!("Failed to open {:?}", fasta))?;
            let index = load_index(&annotation, vocab.vocabulary(), IndexOptions::default())?;
            let vocab = index.vocabulary().clone();
            let mut slicer = WindowSlicer::new(genome, NoMethylation, SlicerConfig::default()).with_index(index);

            let options = VoteOptions {
                stranded,
                dir: tmp_dir,
                ..VoteOptions::default()
            };
            let mut votes = VoteAggregator::new(slicer.chrom_lens()?, vocab, options)?;

            eprintln!("Reconstructing {:?} -> {:?}", annotation, output);
            let voted = reconstruct(&mut slicer, &mut votes, geometry, stranded)?;

            let written = if output.as_os_str() == "-" {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                votes.write_gff3(&mut out, threshold, min_size, max_fill)?
            } else {
                let mut out = BufWriter::new(File::create(&output)?);
                votes.write_gff3(&mut out, threshold, min_size, max_fill)?
            };

            eprintln!("\n=== Reconstruction Statistics ===");
            eprintln!("Votes cast:      {}", voted);
            eprintln!("Features:        {}", written);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
