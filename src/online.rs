//! Online path: score and classify one variant against a remote or local reference

use crate::classify::classify;
use crate::delta::delta_score;
use crate::provider::{ProviderAccessor, SequenceProvider};
use crate::scoring::{BatchScorer, SequenceScorer};
use crate::window::{build_variant_sequence, WindowExtractor};
use crate::{parse_base, CalibrationParams, Prediction, SnvError, SnvResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRequest {
    pub genome: String,
    pub chromosome: String,
    /// 1-based
    pub position: u64,
    pub alternative: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResponse {
    pub position: u64,
    pub reference: String,
    pub alternative: String,
    pub delta_score: f64,
    pub prediction: Prediction,
    pub classification_confidence: f64,
}

/// Scores single variants with calibration parameters fixed at construction
pub struct VariantAnalyzer<'a, P: SequenceProvider + ?Sized, S: SequenceScorer + ?Sized> {
    provider: &'a P,
    scorer: &'a S,
    params: CalibrationParams,
    extractor: WindowExtractor,
}

impl<'a, P, S> VariantAnalyzer<'a, P, S>
where
    P: SequenceProvider + ?Sized,
    S: SequenceScorer + ?Sized,
{
    pub fn new(
        provider: &'a P,
        scorer: &'a S,
        params: CalibrationParams,
        window_size: usize,
    ) -> SnvResult<Self> {
        params.validate()?;
        Ok(Self {
            provider,
            scorer,
            params,
            extractor: WindowExtractor::new(window_size)?,
        })
    }

    pub fn analyze(&self, request: &VariantRequest) -> SnvResult<VariantResponse> {
        let alternative = parse_base(&request.alternative)?;
        if request.position == 0 {
            return Err(SnvError::InvalidPosition(request.position));
        }

        let length_bound = self
            .provider
            .sequence_length(&request.genome, &request.chromosome)?
            .unwrap_or(usize::MAX);
        let accessor = ProviderAccessor::new(self.provider, &request.genome, &request.chromosome);
        let window = self.extractor.extract(request.position, length_bound, &accessor)?;

        let reference = window.reference_base().ok_or(SnvError::WindowOutOfBounds {
            offset: window.variant_offset,
            start: window.start_offset,
            end: window.end_offset(),
        })?;
        let variant_sequence = build_variant_sequence(&window, &request.alternative)?;
        log::info!(
            "{}:{} {}>{} in window [{}, {})",
            request.chromosome,
            request.position,
            reference,
            alternative,
            window.start_offset,
            window.end_offset()
        );

        let scores = BatchScorer::new(self.scorer)
            .score_all(&[window.bases, variant_sequence], "window")?;
        let delta = delta_score(scores[1], scores[0]);
        let result = classify(delta, &self.params)?;

        Ok(VariantResponse {
            position: request.position,
            reference: reference.to_string(),
            alternative: alternative.to_string(),
            delta_score: result.delta_score,
            prediction: result.prediction,
            classification_confidence: result.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sequence;
    use std::cell::RefCell;

    /// 200-base contig: G at 0-based 99, A elsewhere
    struct ToyProvider;

    impl SequenceProvider for ToyProvider {
        fn fetch_window(&self, _genome: &str, _chrom: &str, start: usize, end: usize) -> SnvResult<Sequence> {
            let bases: String = (start..end.min(200))
                .map(|i| if i == 99 { 'G' } else { 'A' })
                .collect();
            Ok(Sequence::new(&bases))
        }

        fn sequence_length(&self, _genome: &str, _chrom: &str) -> SnvResult<Option<usize>> {
            Ok(Some(200))
        }
    }

    /// Penalises every T by 0.01 and records each batch it sees
    struct TScorer {
        batches: RefCell<Vec<usize>>,
    }

    impl SequenceScorer for TScorer {
        fn score_batch(&self, sequences: &[Sequence]) -> SnvResult<Vec<f64>> {
            self.batches.borrow_mut().push(sequences.len());
            Ok(sequences
                .iter()
                .map(|s| -0.01 * s.as_str().matches('T').count() as f64)
                .collect())
        }
    }

    fn params() -> CalibrationParams {
        CalibrationParams {
            threshold: -0.005,
            pathogenic_class_std: 0.01,
            benign_class_std: 0.002,
        }
    }

    fn request(position: u64, alternative: &str) -> VariantRequest {
        VariantRequest {
            genome: "hg38".to_string(),
            chromosome: "chr17".to_string(),
            position,
            alternative: alternative.to_string(),
        }
    }

    #[test]
    fn test_analyze_pathogenic() {
        let scorer = TScorer { batches: RefCell::new(Vec::new()) };
        let analyzer = VariantAnalyzer::new(&ToyProvider, &scorer, params(), 40).unwrap();

        let response = analyzer.analyze(&request(100, "t")).unwrap();
        assert_eq!(response.position, 100);
        assert_eq!(response.reference, "G");
        assert_eq!(response.alternative, "T");
        assert!((response.delta_score - -0.01).abs() < 1e-12);
        assert_eq!(response.prediction, Prediction::LikelyPathogenic);
        assert!((response.classification_confidence - 0.5).abs() < 1e-9);
        // Reference and variant scored together
        assert_eq!(*scorer.batches.borrow(), vec![2]);
    }

    #[test]
    fn test_analyze_benign() {
        let scorer = TScorer { batches: RefCell::new(Vec::new()) };
        let analyzer = VariantAnalyzer::new(&ToyProvider, &scorer, params(), 40).unwrap();

        let response = analyzer.analyze(&request(100, "C")).unwrap();
        assert_eq!(response.delta_score, 0.0);
        assert_eq!(response.prediction, Prediction::LikelyBenign);
        assert_eq!(response.classification_confidence, 1.0);
    }

    #[test]
    fn test_analyze_position_beyond_contig() {
        let scorer = TScorer { batches: RefCell::new(Vec::new()) };
        let analyzer = VariantAnalyzer::new(&ToyProvider, &scorer, params(), 40).unwrap();

        match analyzer.analyze(&request(250, "C")) {
            Err(err @ SnvError::WindowOutOfBounds { .. }) => {
                assert!(err.to_string().contains("at or beyond window end"))
            }
            other => panic!("Expected WindowOutOfBounds, got {:?}", other),
        }
        assert!(scorer.batches.borrow().is_empty());
    }

    #[test]
    fn test_analyze_rejects_bad_input() {
        let scorer = TScorer { batches: RefCell::new(Vec::new()) };
        let analyzer = VariantAnalyzer::new(&ToyProvider, &scorer, params(), 40).unwrap();

        assert!(matches!(
            analyzer.analyze(&request(0, "C")),
            Err(SnvError::InvalidPosition(0))
        ));
        assert!(matches!(
            analyzer.analyze(&request(100, "CT")),
            Err(SnvError::InvalidAllele(_))
        ));
    }

    #[test]
    fn test_response_json_shape() {
        let response = VariantResponse {
            position: 41_276_045,
            reference: "A".to_string(),
            alternative: "G".to_string(),
            delta_score: -0.002,
            prediction: Prediction::LikelyPathogenic,
            classification_confidence: 0.7147,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["prediction"], "Likely pathogenic");
        assert_eq!(json["classification_confidence"], 0.7147);
        assert_eq!(json["reference"], "A");
    }
}
