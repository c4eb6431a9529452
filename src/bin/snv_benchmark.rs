//! CLI binary for the offline benchmark - delta scores, AUROC and calibration

use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use snvscore_rs::{
    benchmark::{class_median, read_benchmark_variants, write_delta_table, BenchmarkConfig, BenchmarkEvaluator},
    calibrate::CalibrationRecord,
    provider::read_fasta_sequence,
    scoring::HttpScorer,
    utils::{ensure_parent_dirs, get_num_cpus, validate_file_readable, Timer},
    ScoringConfig, SnvError, SnvResult, VariantClass,
};

#[derive(Parser)]
#[command(name = "snv_benchmark")]
#[command(about = "Calibrate SNV pathogenicity scoring against a labelled benchmark cohort")]
#[command(long_about = "
Scores every variant of a labelled cohort with a sequence model and derives the
parameters used to classify new variants.

For each variant a window of --window-size bases centred on the variant is cut
from the reference chromosome, the alternate base is substituted in, and both
windows are scored by the model service. Identical reference windows are scored
only once. The delta score (variant minus reference) is compared against the
cohort labels: LOF counts as pathogenic, every other class as benign.

Outputs:
- a TSV of per-variant delta scores (gzipped if the name ends in .gz)
- a JSON calibration file (threshold and per-class standard deviations) for
  snv_classify
")]
struct Args {
    /// Reference chromosome FASTA (plain or gzip)
    #[arg(long, value_name = "FILE")]
    reference_fasta: PathBuf,

    /// FASTA record to use (default: first record)
    #[arg(long)]
    record: Option<String>,

    /// Benchmark cohort table with chrom, pos, ref, alt, score, class columns
    #[arg(long, value_name = "FILE")]
    benchmark: PathBuf,

    /// Output TSV of delta scores
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Output calibration JSON
    #[arg(long, value_name = "FILE")]
    calibration_output: PathBuf,

    /// Scoring model endpoint
    #[arg(long, value_name = "URL")]
    scorer_url: String,

    /// Cohort name recorded in the calibration file (default: benchmark file name)
    #[arg(long)]
    cohort: Option<String>,

    /// Window size around each variant (even)
    #[arg(long, default_value_t = snvscore_rs::DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Sequences per request to the model
    #[arg(long, default_value = "16")]
    batch_size: usize,

    /// Timeout in seconds for each model request
    #[arg(long, default_value = "1000")]
    timeout_secs: u64,

    /// Only evaluate the first N cohort rows
    #[arg(long)]
    max_variants: Option<usize>,

    /// Do not compare cohort reference alleles against the FASTA
    #[arg(long)]
    skip_reference_check: bool,

    /// Number of threads for window extraction
    #[arg(long, default_value_t = get_num_cpus())]
    num_threads: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn run() -> SnvResult<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    log::info!("Starting SNV benchmark");
    log::info!("Reference FASTA: {:?}", args.reference_fasta);
    log::info!("Benchmark cohort: {:?}", args.benchmark);
    log::info!("Scorer: {}", args.scorer_url);

    validate_file_readable(&args.reference_fasta)?;
    validate_file_readable(&args.benchmark)?;

    let config = BenchmarkConfig {
        scoring: ScoringConfig {
            window_size: args.window_size,
            batch_size: args.batch_size,
            timeout_secs: args.timeout_secs,
        },
        max_variants: args.max_variants,
        check_reference: !args.skip_reference_check,
        num_threads: args.num_threads,
    };
    let scorer = HttpScorer::new(&args.scorer_url, &config.scoring)?;
    let evaluator = BenchmarkEvaluator::new(&scorer, config.clone())?;

    ensure_parent_dirs(&args.output)?;

    let _timer = Timer::new("Loading reference and cohort");
    let (record_name, chromosome) = read_fasta_sequence(&args.reference_fasta, args.record.as_deref())?;
    let variants = read_benchmark_variants(&args.benchmark)?;
    log::info!("Using record {} ({} bases)", record_name, chromosome.len());

    let _timer = Timer::new("Scoring benchmark");
    let report = evaluator.evaluate(variants, &chromosome)?;

    let lof_count = report.records.iter().filter(|r| r.variant.is_pathogenic()).count();
    log::info!("Results summary:");
    log::info!("  Variants scored: {}", report.records.len());
    log::info!("  Reference windows scored: {}", report.distinct_references);
    log::info!("  LOF: {}  FUNC/INT: {}", lof_count, report.records.len() - lof_count);
    for class in [VariantClass::Lof, VariantClass::FuncInt] {
        if let Some(median) = class_median(&report.records, class) {
            log::info!("  Median delta score ({}): {:.6}", class, median);
        }
    }
    log::info!("  AUROC: {:.4}", report.auroc());

    write_delta_table(&report.records, &args.output)?;
    log::info!("Delta scores written to: {:?}", args.output);

    let cohort = args.cohort.clone().unwrap_or_else(|| {
        args.benchmark
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    });
    let record = CalibrationRecord {
        cohort,
        variants: report.records.len(),
        window_size: config.scoring.window_size,
        auroc: report.auroc(),
        params: report.calibration.params,
    };
    record.save(&args.calibration_output)?;
    log::info!("Calibration written to: {:?}", args.calibration_output);

    println!("AUROC: {:.4}", report.auroc());
    println!("Threshold: {}", record.params.threshold);
    println!("LOF std: {}", record.params.pathogenic_class_std);
    println!("FUNC/INT std: {}", record.params.benign_class_std);

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: SnvError) -> ! {
    match error {
        SnvError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        SnvError::InvalidRecord(msg) => {
            eprintln!("Error: Invalid benchmark row: {}", msg);
            eprintln!("Expected columns: chrom, pos, ref, alt, score, class.");
        }
        SnvError::InvalidPosition(_) | SnvError::InvalidAllele(_) | SnvError::WindowOutOfBounds { .. } => {
            eprintln!("Error: {}", error);
            eprintln!("Please check that the cohort coordinates match the reference FASTA.");
        }
        SnvError::ScoringUnavailable(msg) => {
            eprintln!("Error: Scoring model unavailable: {}", msg);
            eprintln!("Please check the --scorer-url endpoint and consider a larger --timeout-secs.");
        }
        SnvError::InsufficientCalibrationData { .. } => {
            eprintln!("Error: {}", error);
            eprintln!("The cohort needs at least two LOF and two non-LOF variants.");
        }
        SnvError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
        }
        other => {
            eprintln!("Error: {}", other);
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from([
            "snv_benchmark",
            "--reference-fasta",
            "chr17.fna.gz",
            "--benchmark",
            "brca1.tsv",
            "--output",
            "out/deltas.tsv",
            "--calibration-output",
            "out/calibration.json",
            "--scorer-url",
            "http://localhost:8000/score",
        ])
        .unwrap();

        assert_eq!(args.window_size, 8192);
        assert_eq!(args.batch_size, 16);
        assert!(args.max_variants.is_none());
        assert!(!args.skip_reference_check);
    }
}
