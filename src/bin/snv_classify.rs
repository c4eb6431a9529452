//! CLI binary for the online path - classify one SNV with stored calibration

use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use snvscore_rs::{
    calibrate::CalibrationRecord,
    online::{VariantAnalyzer, VariantRequest},
    provider::{IndexedFastaProvider, SequenceProvider, UcscClient, UCSC_API_URL},
    scoring::HttpScorer,
    utils::validate_file_readable,
    ScoringConfig, SnvError, SnvResult,
};

#[derive(Parser)]
#[command(name = "snv_classify")]
#[command(about = "Predict whether a single-nucleotide variant is likely pathogenic")]
#[command(long_about = "
Fetches the reference window around a variant, substitutes the alternate base,
scores both windows with the sequence model and classifies the delta score
against a calibration file produced by snv_benchmark.

Reference bases come from the UCSC genome browser API unless an indexed FASTA
is given with --reference-fasta. The result is printed as JSON:
{ position, reference, alternative, delta_score, prediction,
  classification_confidence }

With --list-chromosomes the primary chromosomes of --genome are printed instead.
")]
struct Args {
    /// Genome assembly, e.g. hg38
    #[arg(long, default_value = "hg38")]
    genome: String,

    /// Chromosome name as used by the reference source, e.g. chr17
    #[arg(long, required_unless_present = "list_chromosomes")]
    chromosome: Option<String>,

    /// 1-based variant position
    #[arg(long, required_unless_present = "list_chromosomes")]
    position: Option<u64>,

    /// Alternate base (A, C, G or T)
    #[arg(long, required_unless_present = "list_chromosomes")]
    alternative: Option<String>,

    /// Calibration JSON written by snv_benchmark
    #[arg(long, value_name = "FILE", required_unless_present = "list_chromosomes")]
    calibration: Option<PathBuf>,

    /// Scoring model endpoint
    #[arg(long, value_name = "URL", required_unless_present = "list_chromosomes")]
    scorer_url: Option<String>,

    /// Indexed FASTA to read the reference from instead of UCSC
    #[arg(long, value_name = "FILE")]
    reference_fasta: Option<PathBuf>,

    /// UCSC REST API base URL
    #[arg(long, default_value = UCSC_API_URL)]
    ucsc_url: String,

    /// Window size around the variant (default: the calibration's)
    #[arg(long)]
    window_size: Option<usize>,

    /// Timeout in seconds for remote calls
    #[arg(long, default_value = "1000")]
    timeout_secs: u64,

    /// Print the primary chromosomes of --genome and exit
    #[arg(long)]
    list_chromosomes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn missing(flag: &str) -> SnvError {
    SnvError::InvalidConfig(format!("{} is required", flag))
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

    if args.list_chromosomes {
        let client = UcscClient::new(&args.ucsc_url, args.timeout_secs)?;
        for chromosome in client.chromosomes(&args.genome)? {
            println!("{}\t{}", chromosome.name, chromosome.size);
        }
        return Ok(());
    }

    let calibration_path = args.calibration.as_ref().ok_or_else(|| missing("--calibration"))?;
    validate_file_readable(calibration_path)?;
    let calibration = CalibrationRecord::load(calibration_path)?;
    log::info!(
        "Calibration from cohort {:?} ({} variants, AUROC {:.4})",
        calibration.cohort,
        calibration.variants,
        calibration.auroc
    );

    let window_size = args.window_size.unwrap_or(calibration.window_size);
    if window_size != calibration.window_size {
        log::warn!(
            "Window size {} differs from the calibration's {}",
            window_size,
            calibration.window_size
        );
    }

    let scoring = ScoringConfig {
        window_size,
        timeout_secs: args.timeout_secs,
        ..ScoringConfig::default()
    };
    let scorer_url = args.scorer_url.as_deref().ok_or_else(|| missing("--scorer-url"))?;
    let scorer = HttpScorer::new(scorer_url, &scoring)?;

    let provider: Box<dyn SequenceProvider> = match &args.reference_fasta {
        Some(path) => Box::new(IndexedFastaProvider::new(path)?),
        None => Box::new(UcscClient::new(&args.ucsc_url, args.timeout_secs)?),
    };

    let request = VariantRequest {
        genome: args.genome.clone(),
        chromosome: args.chromosome.clone().ok_or_else(|| missing("--chromosome"))?,
        position: args.position.ok_or_else(|| missing("--position"))?,
        alternative: args.alternative.clone().ok_or_else(|| missing("--alternative"))?,
    };

    let analyzer = VariantAnalyzer::new(provider.as_ref(), &scorer, calibration.params, window_size)?;
    let response = analyzer.analyze(&request)?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: SnvError) -> ! {
    match error {
        SnvError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        SnvError::WindowOutOfBounds { .. } => {
            eprintln!("Error: {}", error);
            eprintln!("The position lies outside the fetched reference window.");
        }
        SnvError::InvalidPosition(_) | SnvError::InvalidAllele(_) => {
            eprintln!("Error: {}", error);
        }
        SnvError::SequenceProviderError(msg) => {
            eprintln!("Error: Could not fetch reference sequence: {}", msg);
            eprintln!("Please check --genome and --chromosome.");
        }
        SnvError::ScoringUnavailable(msg) => {
            eprintln!("Error: Scoring model unavailable: {}", msg);
        }
        SnvError::InvalidCalibration(msg) => {
            eprintln!("Error: Invalid calibration: {}", msg);
            eprintln!("Please regenerate the calibration file with snv_benchmark.");
        }
        SnvError::Htslib(ref e) => {
            eprintln!("Error: FASTA processing error: {}", e);
            eprintln!("Please check that the FASTA is indexed (.fai) or bgzip compressed.");
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
    fn test_list_mode_needs_no_variant() {
        let args = Args::try_parse_from(["snv_classify", "--list-chromosomes", "--genome", "hg19"]).unwrap();
        assert!(args.list_chromosomes);
        assert_eq!(args.genome, "hg19");
    }

    #[test]
    fn test_variant_mode_requires_fields() {
        assert!(Args::try_parse_from(["snv_classify", "--chromosome", "chr17"]).is_err());

        let args = Args::try_parse_from([
            "snv_classify",
            "--chromosome",
            "chr17",
            "--position",
            "43119628",
            "--alternative",
            "T",
            "--calibration",
            "calibration.json",
            "--scorer-url",
            "http://localhost:8000/score",
        ])
        .unwrap();
        assert_eq!(args.position, Some(43_119_628));
        assert!(args.window_size.is_none());
        assert_eq!(args.ucsc_url, UCSC_API_URL);
    }
}
