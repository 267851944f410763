//! Model-input preprocessing.
//!
//! - Centred letterbox fit of a source frame into a square model input,
//!   and the inverse mapping of model coordinates back to source pixels
//! - Per-channel mean/std normalisation of packed RGB bytes

use serde::{Deserialize, Serialize};

/// Parameters of a centred letterbox fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Letterbox {
    /// Side of the square model input.
    pub input_size: u32,
    /// Source → resized scale factor.
    pub scale: f32,
    /// Left padding in model input pixels.
    pub dx: u32,
    /// Top padding in model input pixels.
    pub dy: u32,
    pub resized_width: u32,
    pub resized_height: u32,
}

impl Letterbox {
    /// Fit a `src_w × src_h` frame into a square of `input_size`.
    pub fn compute(src_w: u32, src_h: u32, input_size: u32) -> Self {
        let side = input_size as f32;
        let scale = (side / src_w as f32).min(side / src_h as f32);
        let resized_width = (src_w as f32 * scale).round() as u32;
        let resized_height = (src_h as f32 * scale).round() as u32;

        Self {
            input_size,
            scale,
            dx: input_size.saturating_sub(resized_width) / 2,
            dy: input_size.saturating_sub(resized_height) / 2,
            resized_width,
            resized_height,
        }
    }

    /// Map a point from model input space back into source pixels.
    ///
    /// Set `normalized` when the model reports coordinates in `[0, 1]`.
    /// The result is clamped to the source frame.
    pub fn map_to_source(&self, x: f32, y: f32, src_w: u32, src_h: u32, normalized: bool) -> (f32, f32) {
        let (px, py) = if normalized {
            (x * self.input_size as f32, y * self.input_size as f32)
        } else {
            (x, y)
        };
        let ox = ((px - self.dx as f32) / self.scale).clamp(0.0, src_w as f32);
        let oy = ((py - self.dy as f32) / self.scale).clamp(0.0, src_h as f32);
        (ox, oy)
    }
}

/// Normalise packed RGB bytes as `(v / 255 - mean[c]) / std[c]`.
///
/// A trailing partial pixel is normalised with the channels it has.
pub fn normalize_rgb(bytes: &[u8], mean: [f32; 3], std: [f32; 3]) -> Vec<f32> {
    bytes
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let c = i % 3;
            (v as f32 / 255.0 - mean[c]) / std[c]
        })
        .collect()
}
