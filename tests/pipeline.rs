use snvscore_rs::benchmark::{read_benchmark_variants, write_delta_table, BenchmarkConfig, BenchmarkEvaluator};
use snvscore_rs::calibrate::CalibrationRecord;
use snvscore_rs::online::{VariantAnalyzer, VariantRequest};
use snvscore_rs::provider::SequenceProvider;
use snvscore_rs::scoring::SequenceScorer;
use snvscore_rs::window::WindowExtractor;
use snvscore_rs::{Prediction, ScoringConfig, Sequence, SnvResult, Variant, VariantClass};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic pseudo-random chromosome of `len` bases
fn synthetic_chromosome(len: usize, seed: u64) -> String {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ['A', 'C', 'G', 'T'][((state >> 33) % 4) as usize]
        })
        .collect()
}

/// Penalises T heavily and C lightly, rewards G slightly
struct CompositionScorer {
    sequences_seen: AtomicUsize,
}

impl CompositionScorer {
    fn new() -> Self {
        Self {
            sequences_seen: AtomicUsize::new(0),
        }
    }
}

impl SequenceScorer for CompositionScorer {
    fn score_batch(&self, sequences: &[Sequence]) -> SnvResult<Vec<f64>> {
        self.sequences_seen.fetch_add(sequences.len(), Ordering::SeqCst);
        Ok(sequences
            .iter()
            .map(|s| {
                let count = |b: char| s.as_str().matches(b).count() as i64;
                -((100 * count('T') + 10 * count('C') - count('G')) as f64) * 1e-6
            })
            .collect())
    }
}

struct InMemoryProvider {
    chromosome: Sequence,
}

impl SequenceProvider for InMemoryProvider {
    fn fetch_window(&self, _genome: &str, _chrom: &str, start: usize, end: usize) -> SnvResult<Sequence> {
        Ok(self.chromosome.slice(start, end))
    }

    fn sequence_length(&self, _genome: &str, _chrom: &str) -> SnvResult<Option<usize>> {
        Ok(Some(self.chromosome.len()))
    }
}

/// First 1-based position at or after `from` whose reference base is `base`
fn position_with_base(chromosome: &Sequence, from: u64, base: char) -> u64 {
    (from..chromosome.len() as u64)
        .find(|&pos| chromosome.base_at((pos - 1) as usize) == Some(base))
        .unwrap()
}

/// Eight sites alternating A and G reference bases, each with a T (LOF) and a
/// C (FUNC) substitution
fn cohort(chromosome: &Sequence) -> Vec<Variant> {
    let mut variants = Vec::new();
    for i in 0..8u64 {
        let base = if i % 2 == 0 { 'A' } else { 'G' };
        let pos = position_with_base(chromosome, 200 + i * 500, base);
        let reference = base.to_string();
        variants.push(
            Variant::new("chrS".to_string(), pos, reference.clone(), "T".to_string())
                .with_label(VariantClass::Lof),
        );
        variants.push(
            Variant::new("chrS".to_string(), pos, reference, "C".to_string())
                .with_label(VariantClass::FuncInt),
        );
    }
    variants
}

fn benchmark_config() -> BenchmarkConfig {
    BenchmarkConfig {
        scoring: ScoringConfig {
            window_size: 64,
            ..ScoringConfig::default()
        },
        num_threads: 2,
        ..BenchmarkConfig::default()
    }
}

#[test]
fn test_benchmark_scores_shared_references_once() {
    let chromosome = Sequence::new(&synthetic_chromosome(5_000, 7));
    let scorer = CompositionScorer::new();
    let evaluator = BenchmarkEvaluator::new(&scorer, benchmark_config()).unwrap();

    let report = evaluator.evaluate(cohort(&chromosome), &chromosome).unwrap();

    assert_eq!(report.records.len(), 16);
    assert_eq!(report.distinct_references, 8);
    // 8 references plus 16 variant windows
    assert_eq!(scorer.sequences_seen.load(Ordering::SeqCst), 24);

    // Records keep cohort order
    assert_eq!(report.records[0].variant.alt_allele, "T");
    assert_eq!(report.records[1].variant.alt_allele, "C");
    assert_eq!(report.records[0].variant.pos, report.records[1].variant.pos);
}

#[test]
fn test_benchmark_calibration_separates_classes() {
    let chromosome = Sequence::new(&synthetic_chromosome(5_000, 7));
    let scorer = CompositionScorer::new();
    let evaluator = BenchmarkEvaluator::new(&scorer, benchmark_config()).unwrap();

    let report = evaluator.evaluate(cohort(&chromosome), &chromosome).unwrap();

    let lof: Vec<f64> = report
        .records
        .iter()
        .filter(|r| r.variant.is_pathogenic())
        .map(|r| r.delta_score)
        .collect();
    let benign: Vec<f64> = report
        .records
        .iter()
        .filter(|r| !r.variant.is_pathogenic())
        .map(|r| r.delta_score)
        .collect();
    let max_lof = lof.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_benign = benign.iter().cloned().fold(f64::INFINITY, f64::min);

    assert!(lof.iter().all(|d| (d - -1e-4).abs() < 2e-6));
    assert!(max_lof < min_benign);
    assert_eq!(report.auroc(), 1.0);

    let params = report.calibration.params;
    // The Youden threshold lands on the least negative LOF delta rather than
    // strictly between the classes; with strict `<` that record reads as benign
    assert_eq!(params.threshold, max_lof);
    assert!(params.threshold >= max_lof && params.threshold < min_benign);
    assert!(params.pathogenic_class_std > 0.0);
    assert!(params.benign_class_std > 0.0);
}

#[test]
fn test_benchmark_from_files_to_online_classification() {
    let dir = tempfile::tempdir().unwrap();
    let chromosome = Sequence::new(&synthetic_chromosome(5_000, 11));
    let variants = cohort(&chromosome);

    let cohort_path = dir.path().join("cohort.tsv");
    let mut file = std::fs::File::create(&cohort_path).unwrap();
    writeln!(file, "chrom\tpos\tref\talt\tscore\tclass").unwrap();
    for v in &variants {
        let class = if v.is_pathogenic() { "LOF" } else { "FUNC" };
        writeln!(file, "{}\t{}\t{}\t{}\t-1.0\t{}", v.chrom, v.pos, v.ref_allele, v.alt_allele, class).unwrap();
    }
    drop(file);

    let scorer = CompositionScorer::new();
    let evaluator = BenchmarkEvaluator::new(&scorer, benchmark_config()).unwrap();
    let loaded = read_benchmark_variants(&cohort_path).unwrap();
    assert_eq!(loaded, variants.iter().map(|v| {
        let mut v = v.clone();
        v.functional_score = Some(-1.0);
        v
    }).collect::<Vec<_>>());
    let report = evaluator.evaluate(loaded, &chromosome).unwrap();

    let table_path = dir.path().join("out").join("deltas.tsv.gz");
    snvscore_rs::utils::ensure_parent_dirs(&table_path).unwrap();
    write_delta_table(&report.records, &table_path).unwrap();
    assert!(table_path.exists());

    let calibration_path = dir.path().join("out").join("calibration.json");
    let record = CalibrationRecord {
        cohort: "synthetic".to_string(),
        variants: report.records.len(),
        window_size: 64,
        auroc: report.auroc(),
        params: report.calibration.params,
    };
    record.save(&calibration_path).unwrap();
    let restored = CalibrationRecord::load(&calibration_path).unwrap();
    assert_eq!(restored, record);

    let provider = InMemoryProvider {
        chromosome: chromosome.clone(),
    };
    let analyzer = VariantAnalyzer::new(&provider, &scorer, restored.params, restored.window_size).unwrap();

    // G>T loses a G as well, so it falls below every A>T delta
    let g_site = position_with_base(&chromosome, 3_000, 'G');
    let response = analyzer
        .analyze(&VariantRequest {
            genome: "synthetic".to_string(),
            chromosome: "chrS".to_string(),
            position: g_site,
            alternative: "T".to_string(),
        })
        .unwrap();
    assert_eq!(response.reference, "G");
    assert_eq!(response.prediction, Prediction::LikelyPathogenic);
    assert!(response.classification_confidence > 0.0);
    assert!(response.classification_confidence <= 1.0);

    let a_site = position_with_base(&chromosome, 3_000, 'A');
    let response = analyzer
        .analyze(&VariantRequest {
            genome: "synthetic".to_string(),
            chromosome: "chrS".to_string(),
            position: a_site,
            alternative: "C".to_string(),
        })
        .unwrap();
    assert_eq!(response.reference, "A");
    assert_eq!(response.prediction, Prediction::LikelyBenign);
}

#[test]
fn test_megabase_window_coordinates() {
    let mut bases = synthetic_chromosome(1_000_000, 3).into_bytes();
    bases[499_999] = b'G';
    let chromosome = Sequence::new(&String::from_utf8(bases).unwrap());
    let extractor = WindowExtractor::new(8192).unwrap();

    // 1-based position 500,000 sits at 0-based 499,999
    let window = extractor.extract(500_000, chromosome.len(), &chromosome).unwrap();
    assert_eq!(window.start_offset, 495_903);
    assert_eq!(window.variant_offset, 4096);
    assert_eq!(window.bases.len(), 8192);
    assert_eq!(window.reference_base(), Some('G'));

    let first = extractor.extract(1, chromosome.len(), &chromosome).unwrap();
    assert_eq!(first.start_offset, 0);
    assert_eq!(first.variant_offset, 0);
    assert_eq!(first.bases.len(), 4096);
    assert_eq!(first.reference_base(), chromosome.base_at(0));
}
