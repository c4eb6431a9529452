//! Reference sequence providers: local FASTA files and the UCSC REST API

use crate::utils::validate_file_readable;
use crate::window::SequenceAccessor;
use crate::{Sequence, SnvError, SnvResult};
use needletail::parse_fastx_file;
use rust_htslib::faidx;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const UCSC_API_URL: &str = "https://api.genome.ucsc.edu";

/// Source of reference bases for a half-open 0-based range on a chromosome.
///
/// May return fewer bases than requested near a contig end.
pub trait SequenceProvider {
    fn fetch_window(&self, genome: &str, chrom: &str, start: usize, end: usize) -> SnvResult<Sequence>;

    /// Chromosome length, when the provider can tell
    fn sequence_length(&self, _genome: &str, _chrom: &str) -> SnvResult<Option<usize>> {
        Ok(None)
    }
}

/// Adapts a provider to the window extractor for one chromosome
pub struct ProviderAccessor<'a, P: SequenceProvider + ?Sized> {
    provider: &'a P,
    genome: &'a str,
    chrom: &'a str,
}

impl<'a, P: SequenceProvider + ?Sized> ProviderAccessor<'a, P> {
    pub fn new(provider: &'a P, genome: &'a str, chrom: &'a str) -> Self {
        Self {
            provider,
            genome,
            chrom,
        }
    }
}

impl<P: SequenceProvider + ?Sized> SequenceAccessor for ProviderAccessor<'_, P> {
    fn fetch(&self, start: usize, end: usize) -> SnvResult<Sequence> {
        self.provider.fetch_window(self.genome, self.chrom, start, end)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.genome, self.chrom)
    }
}

/// Load one record of a plain or gzipped FASTA file into memory.
///
/// With `record` unset the first record is returned. Record names are the
/// header up to the first whitespace.
pub fn read_fasta_sequence<P: AsRef<Path>>(
    path: P,
    record: Option<&str>,
) -> SnvResult<(String, Sequence)> {
    validate_file_readable(&path)?;
    let mut reader = parse_fastx_file(path.as_ref()).map_err(|e| {
        SnvError::SequenceProviderError(format!("cannot read {}: {}", path.as_ref().display(), e))
    })?;

    while let Some(rec) = reader.next() {
        let rec = rec.map_err(|e| {
            SnvError::SequenceProviderError(format!("invalid record in {}: {}", path.as_ref().display(), e))
        })?;
        let header = String::from_utf8_lossy(rec.id()).to_string();
        let id = header.split_whitespace().next().unwrap_or("").to_string();
        if record.map(|r| r != id).unwrap_or(false) {
            continue;
        }

        let seq = rec.seq();
        let bases = String::from_utf8_lossy(&seq);
        log::info!("Loaded {} ({} bases) from {:?}", id, bases.len(), path.as_ref());
        return Ok((id, Sequence::new(&bases)));
    }

    Err(SnvError::SequenceProviderError(format!(
        "record {} not found in {}",
        record.unwrap_or("<first>"),
        path.as_ref().display()
    )))
}

/// Random access into a faidx-indexed FASTA (plain or bgzip)
pub struct IndexedFastaProvider {
    reader: faidx::Reader,
    path: PathBuf,
}

impl IndexedFastaProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> SnvResult<Self> {
        validate_file_readable(&path)?;
        let reader = faidx::Reader::from_path(&path)?;
        Ok(Self {
            reader,
            path: path.as_ref().to_path_buf(),
        })
    }

    fn chrom_length(&self, chrom: &str) -> SnvResult<usize> {
        // faidx reports a missing sequence as -1
        let len = self.reader.fetch_seq_len(chrom) as i64;
        if len <= 0 {
            return Err(SnvError::SequenceProviderError(format!(
                "sequence {} not found in {}",
                chrom,
                self.path.display()
            )));
        }
        Ok(len as usize)
    }
}

impl SequenceProvider for IndexedFastaProvider {
    fn fetch_window(&self, _genome: &str, chrom: &str, start: usize, end: usize) -> SnvResult<Sequence> {
        let end = end.min(self.chrom_length(chrom)?);
        if start >= end {
            return Ok(Sequence::default());
        }
        // faidx end coordinates are inclusive
        let bases = self.reader.fetch_seq_string(chrom, start, end - 1)?;
        Ok(Sequence::new(&bases))
    }

    fn sequence_length(&self, _genome: &str, chrom: &str) -> SnvResult<Option<usize>> {
        self.chrom_length(chrom).map(Some)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chromosome {
    pub name: String,
    pub size: u64,
}

#[derive(Deserialize)]
struct SequenceResponse {
    dna: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChromosomeResponse {
    chromosomes: Option<HashMap<String, u64>>,
    error: Option<String>,
}

/// Client for the UCSC genome browser REST API
pub struct UcscClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl UcscClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> SnvResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SnvError::SequenceProviderError(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> SnvResult<T> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SnvError::SequenceProviderError(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnvError::SequenceProviderError(format!(
                "{} responded with {}",
                url, status
            )));
        }

        response
            .json()
            .map_err(|e| SnvError::SequenceProviderError(format!("malformed response from {}: {}", url, e)))
    }

    /// Sizes of every sequence in the assembly, alternative contigs included
    pub fn chromosome_sizes(&self, genome: &str) -> SnvResult<HashMap<String, u64>> {
        let url = format!("{}/list/chromosomes?genome={}", self.base_url, genome);
        let body: ChromosomeResponse = self.get_json(&url)?;
        if let Some(error) = body.error {
            return Err(SnvError::SequenceProviderError(error));
        }
        body.chromosomes.ok_or_else(|| {
            SnvError::SequenceProviderError(format!("no chromosomes listed for {}", genome))
        })
    }

    /// Primary chromosomes of the assembly in karyotype order
    pub fn chromosomes(&self, genome: &str) -> SnvResult<Vec<Chromosome>> {
        Ok(primary_chromosomes(self.chromosome_sizes(genome)?))
    }
}

impl SequenceProvider for UcscClient {
    fn fetch_window(&self, genome: &str, chrom: &str, start: usize, end: usize) -> SnvResult<Sequence> {
        let url = format!(
            "{}/getData/sequence?genome={};chrom={};start={};end={}",
            self.base_url, genome, chrom, start, end
        );
        let body: SequenceResponse = self.get_json(&url)?;
        if let Some(error) = body.error {
            return Err(SnvError::SequenceProviderError(error));
        }
        let dna = body.dna.ok_or_else(|| {
            SnvError::SequenceProviderError(format!("no sequence returned for {}:{}-{}", chrom, start, end))
        })?;
        Ok(Sequence::new(&dna))
    }

    fn sequence_length(&self, genome: &str, chrom: &str) -> SnvResult<Option<usize>> {
        let sizes = self.chromosome_sizes(genome)?;
        match sizes.get(chrom) {
            Some(&size) => Ok(Some(size as usize)),
            None => Err(SnvError::SequenceProviderError(format!(
                "chromosome {} not found in {}",
                chrom, genome
            ))),
        }
    }
}

/// Drop alternative, unplaced and random contigs, then sort numerically named
/// chromosomes first and the rest alphabetically
pub fn primary_chromosomes(sizes: HashMap<String, u64>) -> Vec<Chromosome> {
    let mut chromosomes: Vec<Chromosome> = sizes
        .into_iter()
        .filter(|(name, _)| !(name.contains('_') || name.contains("Un") || name.contains("random")))
        .map(|(name, size)| Chromosome { name, size })
        .collect();
    chromosomes.sort_by(|a, b| karyotype_order(&a.name, &b.name));
    chromosomes
}

fn karyotype_order(a: &str, b: &str) -> Ordering {
    let a = a.replacen("chr", "", 1);
    let b = b.replacen("chr", "", 1);
    let number = |s: &str| {
        if !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit()) {
            s.parse::<u64>().ok()
        } else {
            None
        }
    };

    match (number(&a), number(&b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(&b),
    }
}
