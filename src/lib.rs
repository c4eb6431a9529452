//! # snvscore - SNV pathogenicity scoring from sequence-model likelihoods
//!
//! Estimates whether a single-nucleotide variant is pathogenic by comparing the
//! likelihood a sequence-scoring model assigns to the reference window around
//! the variant against the likelihood of the mutated window. A labelled
//! benchmark cohort calibrates the decision threshold and the per-class spread
//! used to turn a delta score into a bounded confidence.

pub mod benchmark;
pub mod calibrate;
pub mod classify;
pub mod dedup;
pub mod delta;
pub mod online;
pub mod provider;
pub mod scoring;
pub mod utils;
pub mod window;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bases accepted as alleles and kept verbatim in sequences
pub const VALID_BASES: [char; 5] = ['A', 'C', 'G', 'T', 'N'];

/// Window size the reference calibration was produced with
pub const DEFAULT_WINDOW_SIZE: usize = 8192;

/// An immutable, uppercase run of bases (A/C/G/T/N).
///
/// Lowercase (soft-masked) input is uppercased and any other symbol, such as
/// IUPAC ambiguity codes, becomes `N`. The content is therefore always ASCII
/// and byte offsets are base offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Sequence(String);

impl Sequence {
    pub fn new(bases: &str) -> Self {
        Sequence(bases.chars().map(normalize_base).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn base_at(&self, offset: usize) -> Option<char> {
        self.0.as_bytes().get(offset).map(|&b| b as char)
    }

    /// Copy of the bases in `[start, end)`, clipped to the sequence length
    pub fn slice(&self, start: usize, end: usize) -> Sequence {
        let end = end.min(self.len());
        let start = start.min(end);
        Sequence(self.0[start..end].to_string())
    }

    /// Copy with the base at `offset` replaced. `base` must already be normalised.
    pub(crate) fn with_substitution(&self, offset: usize, base: char) -> Sequence {
        let mut bases = String::with_capacity(self.len());
        bases.push_str(&self.0[..offset]);
        bases.push(base);
        bases.push_str(&self.0[offset + 1..]);
        Sequence(bases)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_base(c: char) -> char {
    let upper = c.to_ascii_uppercase();
    if VALID_BASES.contains(&upper) {
        upper
    } else {
        'N'
    }
}

/// Parse a single-base allele, case-insensitively
pub fn parse_base(allele: &str) -> SnvResult<char> {
    let mut chars = allele.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if VALID_BASES.contains(&c.to_ascii_uppercase()) => {
            Ok(c.to_ascii_uppercase())
        }
        _ => Err(SnvError::InvalidAllele(allele.to_string())),
    }
}

/// Two-class functional label of a benchmark variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantClass {
    /// Loss of function, treated as pathogenic
    Lof,
    /// Functional or intermediate, treated as benign
    FuncInt,
}

impl VariantClass {
    /// Collapse a source label: `LOF` stays, everything else becomes `FUNC/INT`
    pub fn from_label(label: &str) -> Self {
        if label.trim() == "LOF" {
            VariantClass::Lof
        } else {
            VariantClass::FuncInt
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantClass::Lof => "LOF",
            VariantClass::FuncInt => "FUNC/INT",
        }
    }

    pub fn is_pathogenic(&self) -> bool {
        matches!(self, VariantClass::Lof)
    }
}

impl fmt::Display for VariantClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-nucleotide variant at a 1-based position
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub chrom: String,
    pub pos: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    /// Mean functional score from the benchmark assay, if any
    pub functional_score: Option<f64>,
    pub label: Option<VariantClass>,
}

impl Variant {
    pub fn new(chrom: String, pos: u64, ref_allele: String, alt_allele: String) -> Self {
        Self {
            chrom,
            pos,
            ref_allele,
            alt_allele,
            functional_score: None,
            label: None,
        }
    }

    pub fn with_label(mut self, label: VariantClass) -> Self {
        self.label = Some(label);
        self
    }

    pub fn is_pathogenic(&self) -> bool {
        self.label.map(|l| l.is_pathogenic()).unwrap_or(false)
    }
}

/// Reference bases around a variant.
///
/// `start_offset` is the 0-based coordinate of the first base and
/// `variant_offset` the 0-based index of the variant inside `bases`, so
/// `start_offset + variant_offset + 1` is the variant's 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub bases: Sequence,
    pub start_offset: usize,
    pub variant_offset: usize,
}

impl Window {
    /// Exclusive 0-based end coordinate
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.bases.len()
    }

    pub fn reference_base(&self) -> Option<char> {
        self.bases.base_at(self.variant_offset)
    }
}

/// Delta score for one variant: `score(variant window) - score(reference window)`
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    pub variant: Variant,
    pub delta_score: f64,
}

impl DeltaRecord {
    pub fn new(variant: Variant, delta_score: f64) -> Self {
        Self {
            variant,
            delta_score,
        }
    }
}

/// Decision threshold and per-class delta-score spread from a benchmark cohort
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub threshold: f64,
    pub pathogenic_class_std: f64,
    pub benign_class_std: f64,
}

impl CalibrationParams {
    pub fn validate(&self) -> SnvResult<()> {
        if !self.threshold.is_finite() {
            return Err(SnvError::InvalidCalibration(format!(
                "threshold must be finite (got {})",
                self.threshold
            )));
        }
        for (name, std) in [
            ("pathogenic_class_std", self.pathogenic_class_std),
            ("benign_class_std", self.benign_class_std),
        ] {
            if !std.is_finite() || std <= 0.0 {
                return Err(SnvError::InvalidCalibration(format!(
                    "{} must be a positive finite number (got {})",
                    name, std
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prediction {
    #[serde(rename = "Likely pathogenic")]
    LikelyPathogenic,
    #[serde(rename = "Likely benign")]
    LikelyBenign,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::LikelyPathogenic => f.write_str("Likely pathogenic"),
            Prediction::LikelyBenign => f.write_str("Likely benign"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub delta_score: f64,
    pub prediction: Prediction,
    pub confidence: f64,
}

/// Parameters for windowing and talking to the scoring model
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub window_size: usize,
    pub batch_size: usize,  // Sequences per request to the model
    pub timeout_secs: u64,  // Budget for a whole scoring call
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            batch_size: 16,
            timeout_secs: 1000,
        }
    }
}


/// Error types for the snvscore library
#[derive(Debug, thiserror::Error)]
pub enum SnvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid position: {0} (positions are 1-based)")]
    InvalidPosition(u64),

    #[error("Invalid allele: {0:?} (expected a single A, C, G, T or N)")]
    InvalidAllele(String),

    /// The offset is `min(half, p)` and never below the window start, so only
    /// the right edge can be violated
    #[error("Variant offset {offset} is at or beyond window end (window [{start}, {end}))")]
    WindowOutOfBounds {
        offset: usize,
        start: usize,
        end: usize,
    },

    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("Insufficient calibration data: {count} {class} records, at least 2 required")]
    InsufficientCalibrationData { class: VariantClass, count: usize },

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Sequence provider error: {0}")]
    SequenceProviderError(String),

    #[error("Fetched {actual} bases for {chrom}:{start}-{end}, expected {expected}")]
    SequenceLengthMismatch {
        chrom: String,
        start: usize,
        end: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Score count mismatch: {0}")]
    ScoreCountMismatch(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SnvResult<T> = Result<T, SnvError>;
