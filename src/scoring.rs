//! Sequence scoring: the model collaborator interface and batch orchestration

use crate::window::validate_window_size;
use crate::{ScoringConfig, Sequence, SnvError, SnvResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// External model that assigns one log-likelihood per sequence, in order
pub trait SequenceScorer {
    fn score_batch(&self, sequences: &[Sequence]) -> SnvResult<Vec<f64>>;
}

/// One logical scoring call per distinct set of sequences.
///
/// Failures of the collaborator are surfaced as `ScoringUnavailable` and never
/// retried here.
pub struct BatchScorer<'a, S: SequenceScorer + ?Sized> {
    scorer: &'a S,
}

impl<'a, S: SequenceScorer + ?Sized> BatchScorer<'a, S> {
    pub fn new(scorer: &'a S) -> Self {
        Self { scorer }
    }

    /// Score all `sequences`; `kind` only labels the log line
    pub fn score_all(&self, sequences: &[Sequence], kind: &str) -> SnvResult<Vec<f64>> {
        if sequences.is_empty() {
            return Ok(Vec::new());
        }

        log::info!("Scoring likelihoods of {} {} sequences", sequences.len(), kind);
        let scores = self.scorer.score_batch(sequences).map_err(|e| match e {
            SnvError::ScoringUnavailable(_) => e,
            other => SnvError::ScoringUnavailable(other.to_string()),
        })?;

        if scores.len() != sequences.len() {
            return Err(SnvError::ScoringUnavailable(format!(
                "model returned {} scores for {} {} sequences",
                scores.len(),
                sequences.len(),
                kind
            )));
        }
        if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
            return Err(SnvError::ScoringUnavailable(format!(
                "model returned a non-finite score for {} sequence {}",
                kind, idx
            )));
        }

        Ok(scores)
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    sequences: Vec<&'a str>,
}

#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<f64>,
}

/// Scorer backed by a model service speaking JSON over HTTP.
///
/// Posts `{"sequences": [...]}` in chunks of `batch_size` and expects
/// `{"scores": [...]}` back.
pub struct HttpScorer {
    client: reqwest::blocking::Client,
    endpoint: String,
    batch_size: usize,
}

impl HttpScorer {
    pub fn new(endpoint: &str, config: &ScoringConfig) -> SnvResult<Self> {
        validate_scoring_config(config)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SnvError::ScoringUnavailable(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            batch_size: config.batch_size,
        })
    }

    fn score_chunk(&self, chunk: &[Sequence]) -> SnvResult<Vec<f64>> {
        let request = ScoreRequest {
            sequences: chunk.iter().map(|s| s.as_str()).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| SnvError::ScoringUnavailable(format!("{}: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnvError::ScoringUnavailable(format!(
                "{} responded with {}",
                self.endpoint, status
            )));
        }

        let body: ScoreResponse = response
            .json()
            .map_err(|e| SnvError::ScoringUnavailable(format!("malformed score response: {}", e)))?;

        if body.scores.len() != chunk.len() {
            return Err(SnvError::ScoringUnavailable(format!(
                "{} returned {} scores for {} sequences",
                self.endpoint,
                body.scores.len(),
                chunk.len()
            )));
        }
        Ok(body.scores)
    }
}

impl SequenceScorer for HttpScorer {
    fn score_batch(&self, sequences: &[Sequence]) -> SnvResult<Vec<f64>> {
        let mut scores = Vec::with_capacity(sequences.len());
        for (i, chunk) in sequences.chunks(self.batch_size).enumerate() {
            log::debug!("Posting chunk {} ({} sequences) to {}", i, chunk.len(), self.endpoint);
            scores.extend(self.score_chunk(chunk)?);
        }
        Ok(scores)
    }
}

/// Validate scoring configuration parameters
pub fn validate_scoring_config(config: &ScoringConfig) -> SnvResult<()> {
    validate_window_size(config.window_size)?;

    if config.batch_size == 0 {
        return Err(SnvError::InvalidConfig(
            "batch size must be positive".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(SnvError::InvalidConfig(
            "timeout must be positive".to_string(),
        ));
    }

    Ok(())
}
