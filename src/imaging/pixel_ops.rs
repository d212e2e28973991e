//! Per-pixel adjustments: vibrance, exposure, temperature.
//!
//! These are the parameters that cannot be expressed as compositing
//! operations. Each transform consumes its buffer and returns it rewritten;
//! nothing else can observe the buffer mid-transform. Rows are processed in
//! parallel on the rayon pool.
//!
//! [`apply_pixel_adjustments`] runs the fixed pipeline order (vibrance →
//! exposure → temperature). Callers always start it from the decoded
//! baseline, never from a previously adjusted buffer, so repeated edits do
//! not accumulate rounding error.

use super::buffer::{CHANNELS, PixelBuffer};
use crate::adjustments::{AdjustmentSet, ParamKey};
use rayon::prelude::*;

/// Apply `transform` to every RGBA pixel.
pub(super) fn map_pixels<F>(mut buffer: PixelBuffer, transform: F) -> PixelBuffer
where
    F: Fn([f32; 4]) -> [f32; 4] + Sync,
{
    let stride = buffer.stride();
    if stride == 0 {
        return buffer;
    }
    buffer
        .samples_mut()
        .par_chunks_mut(stride)
        .for_each(|row| {
            for px in row.chunks_exact_mut(CHANNELS) {
                let out = transform([px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32]);
                for (dst, v) in px.iter_mut().zip(out) {
                    *dst = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    buffer
}

/// Push the weaker channels of saturated pixels toward the strongest one.
///
/// `amount` is in `-100..=100`; negative values push away (desaturate).
/// Neutral grays are untouched at any amount.
pub fn apply_vibrance(buffer: PixelBuffer, amount: f64) -> PixelBuffer {
    if amount == 0.0 {
        return buffer;
    }
    let amount = amount as f32 / 100.0;
    map_pixels(buffer, move |[r, g, b, a]| {
        let max = r.max(g).max(b);
        let avg = (r + g + b) / 3.0;
        let amt = ((max - avg).abs() * 2.0 / 255.0) * amount;
        let push = |c: f32| c + (max - c) * amt;
        [push(r), push(g), push(b), a]
    })
}

/// Multiply the red, green and blue channels by `2^(amount / 100)`.
///
/// Alpha is not a color channel and is left as is, so brightening never
/// makes a translucent pixel more opaque.
pub fn apply_exposure(buffer: PixelBuffer, amount: f64) -> PixelBuffer {
    if amount == 0.0 {
        return buffer;
    }
    let factor = 2f64.powf(amount / 100.0) as f32;
    map_pixels(buffer, move |[r, g, b, a]| [r * factor, g * factor, b * factor, a])
}

/// Warm (positive) or cool (negative): red gains `amount`, blue loses it.
pub fn apply_temperature(buffer: PixelBuffer, amount: f64) -> PixelBuffer {
    if amount == 0.0 {
        return buffer;
    }
    let shift = amount as f32;
    map_pixels(buffer, move |[r, g, b, a]| [r + shift, g, b - shift, a])
}

/// The per-pixel subset of an [`AdjustmentSet`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelAdjustments {
    pub vibrance: f64,
    pub exposure: f64,
    pub temperature: f64,
}

impl PixelAdjustments {
    pub fn from_set(set: &AdjustmentSet) -> Self {
        Self {
            vibrance: set.number(ParamKey::Vibrance),
            exposure: set.number(ParamKey::Exposure),
            temperature: set.number(ParamKey::Temperature),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.vibrance == 0.0 && self.exposure == 0.0 && self.temperature == 0.0
    }
}

/// Vibrance, then exposure, then temperature.
pub fn apply_pixel_adjustments(buffer: PixelBuffer, adj: &PixelAdjustments) -> PixelBuffer {
    if adj.is_neutral() {
        return buffer;
    }
    log::debug!(
        "pixel adjustments: vibrance={} exposure={} temperature={}",
        adj.vibrance,
        adj.exposure,
        adj.temperature
    );
    let buffer = apply_vibrance(buffer, adj.vibrance);
    let buffer = apply_exposure(buffer, adj.exposure);
    apply_temperature(buffer, adj.temperature)
}
