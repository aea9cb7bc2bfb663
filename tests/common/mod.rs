//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CHR1: &str = "AATTTTATACCCCCATGCAA";
pub const CHR2: &str = "GGGGAAAACCCCTTTTACGT";

/// Two-chromosome genome wrapped at 8 bases per line
pub const FASTA: &str = "\
>Chr1 dna:chromosome chromosome:TAIR10:1:1:20:1
AATTTTAT
ACCCCCAT
GCAA
>Chr2 dna:scaffold scaffold:TAIR10:2:1:20:1
GGGGAAAA
CCCCTTTT
ACGT
";

pub const GFF3: &str = "\
##gff-version 3
Chr1\tTAIR10\tchromosome\t1\t20\t.\t.\t.\tID=Chr1
Chr1\tTAIR10\tgene\t3\t10\t.\t+\t.\tID=AT1G01010
Chr1\tTAIR10\tCDS\t3\t10\t.\t+\t0\tParent=AT1G01010.1
Chr1\tTAIR10\texon\t4\t7\t.\t+\t.\tParent=AT1G01010.1
Chr1\tTAIR10\ttransposable_element\t10\t15\t.\t-\t.\tID=AT1TE00010;Order=LTR;Superfamily=Gypsy
Chr2\tTAIR10\tgene\t2\t15\t.\t-\t.\tID=AT2G01010
Chr2\tTAIR10\tCDS\t2\t15\t.\t-\t0\tParent=AT2G01010.1
Chr2\tTAIR10\texon\t3\t7\t.\t-\t.\tParent=AT2G01010.1
Chr2\tTAIR10\texon\t9\t14\t.\t-\t.\tParent=AT2G01010.1
";

/// Bismark cytosine report, 1-based positions
pub const METHYLATION: &str = "\
Chr1\t10\t+\t3\t1\tCG\tCGA
Chr1\t11\t+\t0\t2\tCHG\tCAG
Chr2\t9\t-\t1\t1\tCHH\tCTT
";

/// Fixture files in a temporary directory
pub struct Fixture {
    pub dir: TempDir,
    pub fasta: PathBuf,
    pub gff: PathBuf,
    pub methylation: PathBuf,
}

pub fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let fasta = dir.path().join("genome.fa");
    let gff = dir.path().join("genes.gff3");
    let methylation = dir.path().join("cx_report.txt");
    fs::write(&fasta, FASTA).unwrap();
    fs::write(&gff, GFF3).unwrap();
    fs::write(&methylation, METHYLATION).unwrap();
    Fixture {
        dir,
        fasta,
        gff,
        methylation,
    }
}

/// `(chrom, feature, start, end, strand)` of every stranded, non chromosome-level record
pub fn triples(gff: &str) -> Vec<(String, String, u64, u64, char)> {
    let mut out: Vec<_> = gff
        .lines()
        .filter(|l| !l.starts_with('#') && !l.is_empty())
        .filter_map(|l| {
            let f: Vec<&str> = l.split('\t').collect();
            let strand = f[6].chars().next()?;
            if strand == '.' {
                return None;
            }
            Some((
                f[0].to_string(),
                f[2].to_string(),
                f[3].parse().ok()?,
                f[4].parse().ok()?,
                strand,
            ))
        })
        .collect();
    out.sort();
    out
}
