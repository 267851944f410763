//! Keypoint accuracy metrics.

use crate::types::Keypoint;

/// Percentage of Correct Keypoints.
///
/// Fraction of the first `min(pred.len(), gt.len())` predictions that lie
/// within `alpha * bbox_diag` pixels of their ground truth. Returns 0 when
/// either set is empty or the diagonal is not positive.
pub fn pck(pred: &[Keypoint], gt: &[Keypoint], bbox_diag: f32, alpha: f32) -> f32 {
    let n = pred.len().min(gt.len());
    if n == 0 || bbox_diag <= 0.0 {
        return 0.0;
    }

    let threshold = alpha * bbox_diag;
    let correct = pred
        .iter()
        .zip(gt)
        .filter(|(p, g)| (p.x - g.x).hypot(p.y - g.y) <= threshold)
        .count();

    correct as f32 / n as f32
}
