//! Delta score classification with bounded confidence

use crate::{CalibrationParams, ClassificationResult, Prediction, SnvError, SnvResult};

/// Classify a delta score against calibrated parameters.
///
/// Scores strictly below the threshold are likely pathogenic. Confidence is the
/// distance from the threshold in units of the predicted class's standard
/// deviation, capped at 1.
pub fn classify(delta_score: f64, params: &CalibrationParams) -> SnvResult<ClassificationResult> {
    params.validate()?;
    if !delta_score.is_finite() {
        return Err(SnvError::InvalidRecord(format!(
            "delta score {} is not finite",
            delta_score
        )));
    }

    let distance = (delta_score - params.threshold).abs();
    let (prediction, class_std) = if delta_score < params.threshold {
        (Prediction::LikelyPathogenic, params.pathogenic_class_std)
    } else {
        (Prediction::LikelyBenign, params.benign_class_std)
    };

    Ok(ClassificationResult {
        delta_score,
        prediction,
        confidence: (distance / class_std).min(1.0),
    })
}
