//! Threshold calibration from a labelled cohort via ROC analysis

use crate::utils::ensure_parent_dirs;
use crate::{CalibrationParams, DeltaRecord, SnvError, SnvResult, VariantClass};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Receiver operating characteristic curve.
///
/// Points are ordered by decreasing threshold. The first point is `(0, 0)` at
/// an infinite threshold; points lying on a straight segment between their
/// neighbours are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    /// Build the curve of `scores` against `truth`, where a higher score means
    /// "more likely positive". Both classes must be present.
    pub fn new(truth: &[bool], scores: &[f64]) -> SnvResult<Self> {
        if truth.len() != scores.len() {
            return Err(SnvError::ScoreCountMismatch(format!(
                "{} labels for {} scores",
                truth.len(),
                scores.len()
            )));
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(SnvError::InvalidCalibration(
                "cannot build a ROC curve over NaN scores".to_string(),
            ));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        // Cumulative counts at the last index of each distinct score
        let mut tps = Vec::new();
        let mut fps = Vec::new();
        let mut thresholds = Vec::new();
        let (mut tp, mut fp) = (0.0, 0.0);
        for (i, &idx) in order.iter().enumerate() {
            if truth[idx] {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            let group_ends = order
                .get(i + 1)
                .map(|&next| scores[next] != scores[idx])
                .unwrap_or(true);
            if group_ends {
                tps.push(tp);
                fps.push(fp);
                thresholds.push(scores[idx]);
            }
        }

        if tp == 0.0 {
            return Err(SnvError::InsufficientCalibrationData {
                class: VariantClass::Lof,
                count: 0,
            });
        }
        if fp == 0.0 {
            return Err(SnvError::InsufficientCalibrationData {
                class: VariantClass::FuncInt,
                count: 0,
            });
        }

        let keep: Vec<bool> = (0..tps.len())
            .map(|i| {
                if i == 0 || i + 1 == tps.len() {
                    return true;
                }
                let fps_bend = fps[i + 1] - 2.0 * fps[i] + fps[i - 1];
                let tps_bend = tps[i + 1] - 2.0 * tps[i] + tps[i - 1];
                fps_bend != 0.0 || tps_bend != 0.0
            })
            .collect();

        let mut curve = RocCurve {
            fpr: vec![0.0],
            tpr: vec![0.0],
            thresholds: vec![f64::INFINITY],
        };
        for i in (0..tps.len()).filter(|&i| keep[i]) {
            curve.fpr.push(fps[i] / fp);
            curve.tpr.push(tps[i] / tp);
            curve.thresholds.push(thresholds[i]);
        }
        Ok(curve)
    }

    /// Area under the curve by the trapezoidal rule
    pub fn auc(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }

    /// Index of the point maximising Youden's J (`tpr - fpr`), first on ties
    pub fn youden_index(&self) -> usize {
        let mut best = 0;
        let mut best_j = f64::NEG_INFINITY;
        for (i, (tpr, fpr)) in self.tpr.iter().zip(&self.fpr).enumerate() {
            let j = tpr - fpr;
            if j > best_j {
                best_j = j;
                best = i;
            }
        }
        best
    }
}

/// Sample standard deviation (n - 1 denominator); `None` below two values
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Calibration outcome: parameters for the classifier plus the cohort AUROC
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub params: CalibrationParams,
    pub auroc: f64,
}

/// Derive the decision threshold and per-class spread from labelled delta scores.
///
/// Lower delta scores indicate pathogenicity, so the ROC is built over the
/// negated delta score with `LOF` as the positive class and the chosen
/// threshold is negated back.
pub fn calibrate(records: &[DeltaRecord]) -> SnvResult<Calibration> {
    let (lof, benign): (Vec<&DeltaRecord>, Vec<&DeltaRecord>) =
        records.iter().partition(|r| r.variant.is_pathogenic());

    if lof.len() < 2 {
        return Err(SnvError::InsufficientCalibrationData {
            class: VariantClass::Lof,
            count: lof.len(),
        });
    }
    if benign.len() < 2 {
        return Err(SnvError::InsufficientCalibrationData {
            class: VariantClass::FuncInt,
            count: benign.len(),
        });
    }

    let truth: Vec<bool> = records.iter().map(|r| r.variant.is_pathogenic()).collect();
    let negated: Vec<f64> = records.iter().map(|r| -r.delta_score).collect();
    let roc = RocCurve::new(&truth, &negated)?;

    let idx = roc.youden_index();
    let threshold = -roc.thresholds[idx];
    if !threshold.is_finite() {
        return Err(SnvError::InvalidCalibration(format!(
            "no ROC operating point beats chance (AUROC {:.4}); LOF delta scores are not lower than FUNC/INT",
            roc.auc()
        )));
    }

    let lof_scores: Vec<f64> = lof.iter().map(|r| r.delta_score).collect();
    let benign_scores: Vec<f64> = benign.iter().map(|r| r.delta_score).collect();

    let params = CalibrationParams {
        threshold,
        pathogenic_class_std: sample_std(&lof_scores).unwrap_or(f64::NAN),
        benign_class_std: sample_std(&benign_scores).unwrap_or(f64::NAN),
    };
    let auroc = roc.auc();

    log::info!(
        "Calibrated on {} LOF / {} FUNC/INT variants: threshold={}, lof_std={}, func_std={}, AUROC={:.4}",
        lof.len(),
        benign.len(),
        params.threshold,
        params.pathogenic_class_std,
        params.benign_class_std,
        auroc
    );

    Ok(Calibration { params, auroc })
}

/// Calibration parameters together with where they came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub cohort: String,
    pub variants: usize,
    pub window_size: usize,
    pub auroc: f64,
    pub params: CalibrationParams,
}

impl CalibrationRecord {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SnvResult<()> {
        self.params.validate()?;
        ensure_parent_dirs(&path)?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Load and validate a record written by [`CalibrationRecord::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> SnvResult<Self> {
        let file = File::open(&path)
            .map_err(|_| SnvError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;
        let record: CalibrationRecord = serde_json::from_reader(BufReader::new(file))?;
        record.params.validate()?;
        Ok(record)
    }
}
