//! Raster compositor for filter chains.
//!
//! The [`Compositor`] trait applies one [`FilterOp`] to a buffer.
//! [`apply_chain`] runs a whole chain in order, each operation consuming the
//! previous one's output, and skips operations that cannot change a pixel.
//!
//! The production implementation is [`RasterCompositor`]:
//!
//! | Operation | Implementation |
//! |---|---|
//! | brightness, contrast, invert | 8-bit lookup table on RGB |
//! | saturate, grayscale, sepia, hue-rotate | 3×3 color matrix on unpremultiplied RGB |
//! | opacity | alpha multiply |
//! | blur | separable Gaussian, σ = radius px, premultiplied, transparent outside the buffer |
//! | drop-shadow | offset alpha mask, Gaussian with σ = blur / 2, tinted, composited under the source |
//!
//! Every step rounds back to 8 bits, so results are deterministic for a
//! given input and chain.

use super::buffer::{CHANNELS, PixelBuffer};
use super::calculations::{
    ColorMatrix, Transfer, apply_matrix, gaussian_kernel, grayscale_matrix, hue_rotate_matrix,
    saturate_matrix, sepia_matrix,
};
use super::pixel_ops::map_pixels;
use crate::adjustments::HexColor;
use crate::filters::{FilterChain, FilterOp};
use rayon::prelude::*;

/// Applies single filter operations to owned buffers.
pub trait Compositor: Sync {
    fn apply(&self, buffer: PixelBuffer, op: &FilterOp) -> PixelBuffer;
}

/// Run every non-identity operation of `chain`, in order.
pub fn apply_chain<C: Compositor + ?Sized>(
    compositor: &C,
    buffer: PixelBuffer,
    chain: &FilterChain,
) -> PixelBuffer {
    chain
        .iter()
        .filter(|op| !op.is_identity())
        .fold(buffer, |buf, op| compositor.apply(buf, op))
}

/// CPU compositor following the Filter Effects definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCompositor;

impl RasterCompositor {
    pub fn new() -> Self {
        Self
    }
}

impl Compositor for RasterCompositor {
    fn apply(&self, buffer: PixelBuffer, op: &FilterOp) -> PixelBuffer {
        let fraction = |v: f64| (v / 100.0) as f32;
        match *op {
            FilterOp::Brightness(v) => apply_transfer(buffer, Transfer::brightness(fraction(v))),
            FilterOp::Contrast(v) => apply_transfer(buffer, Transfer::contrast(fraction(v))),
            FilterOp::Invert(v) => apply_transfer(buffer, Transfer::invert(fraction(v))),
            FilterOp::Saturate(v) => apply_color_matrix(buffer, saturate_matrix(fraction(v))),
            FilterOp::Grayscale(v) => apply_color_matrix(buffer, grayscale_matrix(fraction(v))),
            FilterOp::Sepia(v) => apply_color_matrix(buffer, sepia_matrix(fraction(v))),
            FilterOp::HueRotate(deg) => apply_color_matrix(buffer, hue_rotate_matrix(deg as f32)),
            FilterOp::Opacity(v) => {
                let factor = fraction(v).clamp(0.0, 1.0);
                map_pixels(buffer, move |[r, g, b, a]| [r, g, b, a * factor])
            }
            FilterOp::Blur(px) => gaussian_blur(buffer, px as f32),
            FilterOp::DropShadow {
                offset_x,
                offset_y,
                blur_radius,
                color,
            } => drop_shadow(buffer, offset_x, offset_y, blur_radius, color),
        }
    }
}

fn apply_transfer(buffer: PixelBuffer, transfer: Transfer) -> PixelBuffer {
    let lut = transfer.lut();
    let lookup = move |v: f32| lut[v as usize] as f32;
    map_pixels(buffer, move |[r, g, b, a]| [lookup(r), lookup(g), lookup(b), a])
}

fn apply_color_matrix(buffer: PixelBuffer, m: ColorMatrix) -> PixelBuffer {
    // The matrices carry no offset term, so they work on 0..=255 directly.
    map_pixels(buffer, move |[r, g, b, a]| {
        let [r, g, b] = apply_matrix(&m, [r, g, b]);
        [r, g, b, a]
    })
}

fn premultiply(samples: &[u8]) -> Vec<[f32; 4]> {
    samples
        .chunks_exact(CHANNELS)
        .map(|p| {
            let a = p[3] as f32 / 255.0;
            [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
        })
        .collect()
}

fn unpremultiply(pixels: &[[f32; 4]]) -> Vec<u8> {
    let byte = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    pixels
        .iter()
        .flat_map(|&[r, g, b, a]| {
            let alpha = byte(a);
            if alpha == 0 {
                return [0, 0, 0, 0];
            }
            let k = 255.0 / a;
            [byte(r * k), byte(g * k), byte(b * k), alpha]
        })
        .collect()
}

/// One separable pass over rows (`horizontal`) or columns.
fn convolve(
    src: &[[f32; 4]],
    width: usize,
    height: usize,
    kernel: &[f32],
    horizontal: bool,
) -> Vec<[f32; 4]> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = vec![[0.0f32; 4]; src.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, dst) in row.iter_mut().enumerate() {
            let mut acc = [0.0f32; 4];
            for (k, weight) in kernel.iter().enumerate() {
                let offset = k as isize - radius;
                let (sx, sy) = if horizontal {
                    (x as isize + offset, y as isize)
                } else {
                    (x as isize, y as isize + offset)
                };
                if sx < 0 || sy < 0 || sx >= width as isize || sy >= height as isize {
                    continue;
                }
                let p = src[sy as usize * width + sx as usize];
                for c in 0..CHANNELS {
                    acc[c] += p[c] * weight;
                }
            }
            *dst = acc;
        }
    });
    out
}

/// Gaussian blur with standard deviation `sigma` pixels.
pub fn gaussian_blur(buffer: PixelBuffer, sigma: f32) -> PixelBuffer {
    if sigma <= 0.0 || buffer.is_empty() {
        return buffer;
    }
    let (w, h) = buffer.dimensions();
    let (width, height) = (w as usize, h as usize);
    let kernel = gaussian_kernel(sigma);

    let premul = premultiply(buffer.samples());
    let pass = convolve(&premul, width, height, &kernel, true);
    let pass = convolve(&pass, width, height, &kernel, false);

    PixelBuffer::from_raw(w, h, unpremultiply(&pass)).unwrap_or(buffer)
}

fn drop_shadow(
    buffer: PixelBuffer,
    offset_x: f64,
    offset_y: f64,
    blur_radius: f64,
    color: HexColor,
) -> PixelBuffer {
    if buffer.is_empty() {
        return buffer;
    }
    let (w, h) = buffer.dimensions();
    let (dx, dy) = (offset_x.round() as i64, offset_y.round() as i64);
    let [cr, cg, cb] = color.rgb();

    let mut shadow = PixelBuffer::filled(w, h, [0, 0, 0, 0]);
    for y in 0..h {
        for x in 0..w {
            let (sx, sy) = (x as i64 - dx, y as i64 - dy);
            if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
                continue;
            }
            match buffer.pixel(sx as u32, sy as u32) {
                Some([_, _, _, a]) if a > 0 => shadow.put_pixel(x, y, [cr, cg, cb, a]),
                _ => {}
            }
        }
    }
    let shadow = gaussian_blur(shadow, (blur_radius / 2.0) as f32);

    // Source over shadow
    let mut out = buffer;
    out.samples_mut()
        .par_chunks_mut(CHANNELS)
        .zip(shadow.samples().par_chunks(CHANNELS))
        .for_each(|(src, under)| {
            let sa = src[3] as f32 / 255.0;
            let ua = under[3] as f32 / 255.0;
            let oa = sa + ua * (1.0 - sa);
            if oa <= 0.0 {
                return;
            }
            for c in 0..3 {
                let v = (src[c] as f32 * sa + under[c] as f32 * ua * (1.0 - sa)) / oa;
                src[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            src[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
        });
    out
}
