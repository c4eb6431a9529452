//! Delta scores between variant and reference windows

use crate::{DeltaRecord, SnvError, SnvResult, Variant};

pub fn delta_score(variant_score: f64, reference_score: f64) -> f64 {
    variant_score - reference_score
}

/// Pair each variant's score with the score of the reference window it was built from.
///
/// `ref_indexes[i]` is the dedup index of variant `i`'s reference window.
pub fn compute_delta_scores(
    variants: &[Variant],
    variant_scores: &[f64],
    reference_scores: &[f64],
    ref_indexes: &[usize],
) -> SnvResult<Vec<DeltaRecord>> {
    if variant_scores.len() != variants.len() || ref_indexes.len() != variants.len() {
        return Err(SnvError::ScoreCountMismatch(format!(
            "{} variants, {} variant scores, {} reference indexes",
            variants.len(),
            variant_scores.len(),
            ref_indexes.len()
        )));
    }

    variants
        .iter()
        .zip(variant_scores)
        .zip(ref_indexes)
        .map(|((variant, &variant_score), &ref_idx)| {
            let reference_score = reference_scores.get(ref_idx).copied().ok_or_else(|| {
                SnvError::ScoreCountMismatch(format!(
                    "reference index {} out of range ({} reference scores)",
                    ref_idx,
                    reference_scores.len()
                ))
            })?;
            Ok(DeltaRecord::new(
                variant.clone(),
                delta_score(variant_score, reference_score),
            ))
        })
        .collect()
}
