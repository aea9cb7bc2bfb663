//! Label vocabulary shared by the encoder and the decoder
//!
//! A [`Vocabulary`] is built once and shared behind an `Arc`. Strand
//! qualified ids place every `+name` in `[0, half)` and the matching
//! `-name` at the same offset in `[half, 2 * half)`.

use crate::core::coords::Strand;
use std::collections::HashMap;

/// Full feature list, sorted by byte order
const FULL_FEATURES: &[&str] = &[
    "CDS",
    "RNase_MRP_RNA",
    "SRP_RNA",
    "antisense_RNA",
    "antisense_lncRNA",
    "chromosome",
    "contig",
    "exon",
    "five_prime_UTR",
    "gene",
    "lnc_RNA",
    "mRNA",
    "miRNA",
    "miRNA_primary_transcript",
    "ncRNA",
    "ncRNA_gene",
    "protein",
    "pseudogene",
    "pseudogenic_exon",
    "pseudogenic_tRNA",
    "pseudogenic_transcript",
    "rRNA",
    "scRNA",
    "snRNA",
    "snoRNA",
    "supercontig",
    "tRNA",
    "three_prime_UTR",
    "transcript",
    "transposable_element",
    "transposable_element_gene",
    "transposon_fragment",
    "uORF",
];

const REDUCED_FEATURES: &[&str] = &[
    "CDS",
    "exon",
    "five_prime_UTR",
    "gene",
    "mRNA",
    "ncRNA_gene",
    "pseudogene",
    "three_prime_UTR",
    "transposable_element",
    "transposable_element_gene",
];

const FULL_TE_FEATURES: &[&str] = &[
    "transposable_element",
    "transposable_element_gene",
    "transposon_fragment",
];

const REDUCED_TE_FEATURES: &[&str] = &["transposable_element", "transposable_element_gene"];

/// Sequence-level records that are skipped unless explicitly included
const CHROMOSOME_LEVEL: &[&str] = &["chromosome", "contig", "supercontig"];

/// Transposable-element orders, id 0 means none
const TE_ORDERS: &[&str] = &["None", "DNA", "LINE", "LTR", "RC", "SINE", "Unassigned"];

/// Transposable-element superfamilies, id 0 means none
const TE_SUPERFAMILIES: &[&str] = &[
    "None",
    "CACTA",
    "Copia",
    "En-Spm",
    "Harbinger",
    "hAT",
    "Helitron",
    "Gypsy",
    "L1",
    "Mariner",
    "MuDR",
    "Pogo",
    "RTE",
    "Unassigned",
];

/// Which feature list to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabularyKind {
    Full,
    Reduced,
}

/// Closed label vocabulary
#[derive(Debug, Clone)]
pub struct Vocabulary {
    kind: VocabularyKind,
    features: &'static [&'static str],
    te_features: &'static [&'static str],
    te_metadata: bool,
    ids: HashMap<&'static str, usize>,
    orders: HashMap<String, u8>,
    superfamilies: HashMap<String, u8>,
}

impl Vocabulary {
    pub fn new(kind: VocabularyKind, te_metadata: bool) -> Self {
        let (features, te_features) = match kind {
            VocabularyKind::Full => (FULL_FEATURES, FULL_TE_FEATURES),
            VocabularyKind::Reduced => (REDUCED_FEATURES, REDUCED_TE_FEATURES),
        };
        let ids = features.iter().enumerate().map(|(i, name)| (*name, i)).collect();
        Self {
            kind,
            features,
            te_features,
            te_metadata,
            ids,
            orders: lowercase_table(TE_ORDERS),
            superfamilies: lowercase_table(TE_SUPERFAMILIES),
        }
    }

    /// Full vocabulary with TE metadata
    pub fn full() -> Self {
        Self::new(VocabularyKind::Full, true)
    }

    /// Reduced vocabulary with TE metadata
    pub fn reduced() -> Self {
        Self::new(VocabularyKind::Reduced, true)
    }

    pub fn kind(&self) -> VocabularyKind {
        self.kind
    }

    /// Whether label rows carry the two TE scalar columns
    pub fn te_metadata(&self) -> bool {
        self.te_metadata
    }

    /// Number of strand-qualified features
    pub fn len(&self) -> usize {
        self.features.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of features per strand
    pub fn half(&self) -> usize {
        self.features.len()
    }

    /// Columns of a label row
    pub fn label_width(&self) -> usize {
        self.len() + if self.te_metadata { 2 } else { 0 }
    }

    /// Column holding the TE order id, when TE metadata is enabled
    pub fn order_column(&self) -> Option<usize> {
        self.te_metadata.then(|| self.len())
    }

    /// Column holding the TE superfamily id, when TE metadata is enabled
    pub fn superfamily_column(&self) -> Option<usize> {
        self.te_metadata.then(|| self.len() + 1)
    }

    /// Strand-qualified id of a feature
    ///
    /// # Examples
    /// ```
    /// use genowin::core::{Strand, Vocabulary};
    /// let vocab = Vocabulary::full();
    /// assert_eq!(vocab.feature_id(Strand::Plus, "CDS"), Some(0));
    /// assert_eq!(vocab.feature_id(Strand::Minus, "CDS"), Some(vocab.half()));
    /// assert_eq!(vocab.feature_id(Strand::Plus, "enhancer"), None);
    /// ```
    pub fn feature_id(&self, strand: Strand, name: &str) -> Option<usize> {
        let id = *self.ids.get(name)?;
        Some(match strand {
            Strand::Plus => id,
            Strand::Minus => id + self.half(),
        })
    }

    /// Strand and unqualified name of a feature id
    pub fn feature(&self, id: usize) -> Option<(Strand, &'static str)> {
        let half = self.half();
        if id < half {
            Some((Strand::Plus, self.features[id]))
        } else if id < 2 * half {
            Some((Strand::Minus, self.features[id - half]))
        } else {
            None
        }
    }

    /// Strand-qualified display name such as `+gene`
    pub fn qualified_name(&self, id: usize) -> Option<String> {
        self.feature(id).map(|(strand, name)| format!("{}{}", strand, name))
    }

    pub fn is_te_feature(&self, id: usize) -> bool {
        self.feature(id)
            .map(|(_, name)| self.te_features.contains(&name))
            .unwrap_or(false)
    }

    /// Ids of every TE feature on both strands
    pub fn te_feature_ids(&self) -> Vec<usize> {
        (0..self.len()).filter(|&id| self.is_te_feature(id)).collect()
    }

    pub fn is_te_name(&self, name: &str) -> bool {
        self.te_features.iter().any(|te| *te == name)
    }

    pub fn is_chromosome_level(name: &str) -> bool {
        CHROMOSOME_LEVEL.iter().any(|level| *level == name)
    }

    /// Case-insensitive order lookup, 0 when unknown
    pub fn order_id(&self, name: &str) -> u8 {
        self.orders.get(&name.to_lowercase()).copied().unwrap_or(0)
    }

    /// Case-insensitive superfamily lookup, 0 when unknown
    pub fn superfamily_id(&self, name: &str) -> u8 {
        self.superfamilies.get(&name.to_lowercase()).copied().unwrap_or(0)
    }

    pub fn order_name(&self, id: usize) -> &'static str {
        TE_ORDERS.get(id).copied().unwrap_or(TE_ORDERS[0])
    }

    pub fn superfamily_name(&self, id: usize) -> &'static str {
        TE_SUPERFAMILIES.get(id).copied().unwrap_or(TE_SUPERFAMILIES[0])
    }

    pub fn n_orders(&self) -> usize {
        TE_ORDERS.len()
    }

    pub fn n_superfamilies(&self) -> usize {
        TE_SUPERFAMILIES.len()
    }

    /// Stable tag recorded in persisted indexes
    pub fn fingerprint(&self) -> String {
        let kind = match self.kind {
            VocabularyKind::Full => "full",
            VocabularyKind::Reduced => "reduced",
        };
        let te = if self.te_metadata { "te" } else { "plain" };
        format!(
            "{}-{}-{}f-{}o-{}s",
            kind,
            te,
            self.features.len(),
            TE_ORDERS.len(),
            TE_SUPERFAMILIES.len()
        )
    }
}

fn lowercase_table(names: &[&str]) -> HashMap<String, u8> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i as u8))
        .collect()
}
