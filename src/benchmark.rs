//! Offline benchmark: delta scores over a labelled cohort and calibration

use crate::calibrate::{calibrate, Calibration};
use crate::dedup::ReferenceDedupCache;
use crate::delta::compute_delta_scores;
use crate::scoring::{validate_scoring_config, BatchScorer, SequenceScorer};
use crate::utils::{has_extension, open_reader};
use crate::window::{build_variant_sequence, WindowExtractor};
use crate::{
    DeltaRecord, ScoringConfig, Sequence, SnvError, SnvResult, Variant, VariantClass, Window,
};
use rayon::prelude::*;
use serde::Deserialize;
use std::path::Path;

/// Configuration for a benchmark run
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub scoring: ScoringConfig,
    /// Evaluate only the first N cohort rows
    pub max_variants: Option<usize>,
    /// Warn when a row's reference allele differs from the reference base
    pub check_reference: bool,
    pub num_threads: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            max_variants: None,
            check_reference: true,
            num_threads: 1,
        }
    }
}

/// One row of the labelled cohort table
#[derive(Debug, Deserialize)]
struct CohortRow {
    chrom: String,
    pos: u64,
    #[serde(rename = "ref")]
    ref_allele: String,
    alt: String,
    score: Option<f64>,
    class: String,
}

/// Read a labelled cohort from a TSV (or CSV, by extension), optionally gzipped.
///
/// Required columns: chrom, pos, ref, alt, score, class. Class labels other
/// than `LOF` collapse to `FUNC/INT`. A malformed row fails the whole read.
pub fn read_benchmark_variants<P: AsRef<Path>>(path: P) -> SnvResult<Vec<Variant>> {
    let reader = open_reader(&path)?;
    let stem = path.as_ref().with_extension("");
    let delimiter = if has_extension(&path, "csv") || has_extension(&stem, "csv") {
        b','
    } else {
        b'\t'
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut variants = Vec::new();
    for (i, row) in csv_reader.deserialize::<CohortRow>().enumerate() {
        // Header is line 1
        let row = row.map_err(|e| SnvError::InvalidRecord(format!("line {}: {}", i + 2, e)))?;
        if row.pos == 0 {
            return Err(SnvError::InvalidPosition(row.pos));
        }

        let mut variant = Variant::new(row.chrom, row.pos, row.ref_allele, row.alt)
            .with_label(VariantClass::from_label(&row.class));
        variant.functional_score = row.score;
        variants.push(variant);
    }

    log::info!("Read {} benchmark variants from {:?}", variants.len(), path.as_ref());
    Ok(variants)
}

/// Outcome of a benchmark run
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub records: Vec<DeltaRecord>,
    pub calibration: Calibration,
    /// Reference windows actually sent to the model
    pub distinct_references: usize,
}

impl BenchmarkReport {
    pub fn auroc(&self) -> f64 {
        self.calibration.auroc
    }
}

/// Drives windowing, dedup, scoring, delta computation and calibration over a cohort
pub struct BenchmarkEvaluator<'a, S: SequenceScorer + ?Sized> {
    scorer: &'a S,
    config: BenchmarkConfig,
}

impl<'a, S: SequenceScorer + ?Sized> BenchmarkEvaluator<'a, S> {
    pub fn new(scorer: &'a S, config: BenchmarkConfig) -> SnvResult<Self> {
        validate_scoring_config(&config.scoring)?;
        if config.num_threads == 0 {
            return Err(SnvError::InvalidConfig(
                "number of threads must be positive".to_string(),
            ));
        }
        Ok(Self { scorer, config })
    }

    /// Evaluate `variants` against one chromosome sequence
    pub fn evaluate(&self, mut variants: Vec<Variant>, chromosome: &Sequence) -> SnvResult<BenchmarkReport> {
        if let Some(max) = self.config.max_variants {
            if variants.len() > max {
                log::info!("Restricting benchmark to the first {} of {} variants", max, variants.len());
                variants.truncate(max);
            }
        }

        let extractor = WindowExtractor::new(self.config.scoring.window_size)?;
        let prepared = self.prepare_windows(&extractor, &variants, chromosome)?;

        let mut cache = ReferenceDedupCache::new();
        let mut ref_indexes = Vec::with_capacity(prepared.len());
        let mut variant_sequences = Vec::with_capacity(prepared.len());
        for (window, variant_sequence) in prepared {
            ref_indexes.push(cache.intern(&window));
            variant_sequences.push(variant_sequence);
        }
        log::info!(
            "{} variants share {} distinct reference windows",
            variants.len(),
            cache.len()
        );

        let batch = BatchScorer::new(self.scorer);
        let reference_scores = batch.score_all(cache.references(), "reference")?;
        let variant_scores = batch.score_all(&variant_sequences, "variant")?;

        let records = compute_delta_scores(&variants, &variant_scores, &reference_scores, &ref_indexes)?;
        let calibration = calibrate(&records)?;
        log::info!("Benchmark AUROC: {:.4}", calibration.auroc);

        Ok(BenchmarkReport {
            records,
            calibration,
            distinct_references: cache.len(),
        })
    }

    /// Reference window and variant sequence per variant, in cohort order
    fn prepare_windows(
        &self,
        extractor: &WindowExtractor,
        variants: &[Variant],
        chromosome: &Sequence,
    ) -> SnvResult<Vec<(Window, Sequence)>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()
            .map_err(|e| SnvError::InvalidConfig(format!("cannot build thread pool: {}", e)))?;

        let check_reference = self.config.check_reference;
        pool.install(|| {
            variants
                .par_iter()
                .map(|variant| {
                    let window = extractor.extract(variant.pos, chromosome.len(), chromosome)?;
                    if check_reference {
                        check_reference_allele(variant, &window);
                    }
                    let variant_sequence = build_variant_sequence(&window, &variant.alt_allele)?;
                    Ok((window, variant_sequence))
                })
                .collect()
        })
    }
}

/// Whether the variant's reference allele matches the window; logs a warning if not
pub fn check_reference_allele(variant: &Variant, window: &Window) -> bool {
    let expected = variant.ref_allele.to_ascii_uppercase();
    let found = window.reference_base().map(|b| b.to_string()).unwrap_or_default();
    if expected != found {
        log::warn!(
            "Reference mismatch at {}:{}: cohort says {}, sequence has {}",
            variant.chrom,
            variant.pos,
            variant.ref_allele,
            found
        );
        return false;
    }
    true
}

/// Median delta score of one class, if any records carry it
pub fn class_median(records: &[DeltaRecord], class: VariantClass) -> Option<f64> {
    let mut scores: Vec<f64> = records
        .iter()
        .filter(|r| r.variant.label.unwrap_or(VariantClass::FuncInt) == class)
        .map(|r| r.delta_score)
        .collect();
    if scores.is_empty() {
        return None;
    }
    scores.sort_by(|a, b| a.total_cmp(b));
    let mid = scores.len() / 2;
    if scores.len() % 2 == 0 {
        Some((scores[mid - 1] + scores[mid]) / 2.0)
    } else {
        Some(scores[mid])
    }
}

/// Write the per-variant delta table as TSV, gzipped when the path ends in `.gz`
pub fn write_delta_table(records: &[DeltaRecord], output_path: &Path) -> SnvResult<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use std::io::Write;

    let file = File::create(output_path)?;
    let writer: Box<dyn Write> = if has_extension(output_path, "gz") {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(file)
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);

    csv_writer.write_record(["chrom", "pos", "ref", "alt", "score", "class", "delta_score"])?;
    for record in records {
        let v = &record.variant;
        csv_writer.write_record([
            v.chrom.clone(),
            v.pos.to_string(),
            v.ref_allele.clone(),
            v.alt_allele.clone(),
            v.functional_score.map(|s| s.to_string()).unwrap_or_default(),
            v.label.map(|l| l.to_string()).unwrap_or_default(),
            record.delta_score.to_string(),
        ])?;
    }
    csv_writer.flush()?;

    Ok(())
}
