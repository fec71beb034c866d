use serde::{Deserialize, Serialize};

/// Probabilities below this (after min-max scaling) are cleared.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Rescale `values` to [0, 1]. A constant map has no contrast and becomes all zeros.
pub fn normalize_min_max(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Zero every value below `threshold`, keep the rest unchanged.
pub fn suppress_below(values: &mut [f32], threshold: f32) {
    for v in values.iter_mut() {
        if *v < threshold {
            *v = 0.0;
        }
    }
}

/// Min-max normalize a probability map, then clear low-confidence pixels.
pub fn refine_probability_map(probs: &[f32], threshold: f32) -> Vec<f32> {
    let mut out = normalize_min_max(probs);
    suppress_below(&mut out, threshold);
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskOverlap {
    pub intersection: usize,
    pub union: usize,
}

impl MaskOverlap {
    /// Foreground IoU; two empty masks agree perfectly.
    pub fn iou(&self) -> f32 {
        if self.union == 0 {
            1.0
        } else {
            self.intersection as f32 / self.union as f32
        }
    }
}

/// Overlap of positive pixels (`> 0`) between a prediction and a binary label.
pub fn mask_overlap(pred: &[f32], label: &[f32]) -> MaskOverlap {
    let mut overlap = MaskOverlap::default();
    for (p, l) in pred.iter().zip(label.iter()) {
        let p = *p > 0.0;
        let l = *l > 0.5;
        if p && l {
            overlap.intersection += 1;
        }
        if p || l {
            overlap.union += 1;
        }
    }
    overlap
}
