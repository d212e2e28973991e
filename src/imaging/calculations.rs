//! Pure calculation functions for compositing and layout.
//!
//! All functions here are pure and testable without any pixels: color
//! matrices for the matrix-based filter operations, per-channel transfer
//! functions, Gaussian kernels, and text placement arithmetic.
//!
//! Color matrices follow the Filter Effects definitions and act on
//! unpremultiplied sRGB values in `0.0..=1.0`.

/// Row-major 3×3 matrix applied to `[r, g, b]`.
pub type ColorMatrix = [[f32; 3]; 3];

/// `amount` is a fraction; values above 1 are treated as 1.
pub fn grayscale_matrix(amount: f32) -> ColorMatrix {
    let a = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
    ]
}

/// `amount` is a fraction; values above 1 are treated as 1.
pub fn sepia_matrix(amount: f32) -> ColorMatrix {
    let a = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
        [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
        [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
    ]
}

/// `s` is a fraction: 0 = fully desaturated, 1 = unchanged, >1 = boosted.
pub fn saturate_matrix(s: f32) -> ColorMatrix {
    let s = s.max(0.0);
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

pub fn hue_rotate_matrix(degrees: f32) -> ColorMatrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

pub fn apply_matrix(m: &ColorMatrix, [r, g, b]: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * r + m[0][1] * g + m[0][2] * b,
        m[1][0] * r + m[1][1] * g + m[1][2] * b,
        m[2][0] * r + m[2][1] * g + m[2][2] * b,
    ]
}

/// Linear transfer: `v * slope + intercept`, both in the `0..=1` domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transfer {
    pub slope: f32,
    pub intercept: f32,
}

impl Transfer {
    pub fn brightness(amount: f32) -> Self {
        Self {
            slope: amount.max(0.0),
            intercept: 0.0,
        }
    }

    pub fn contrast(amount: f32) -> Self {
        let c = amount.max(0.0);
        Self {
            slope: c,
            intercept: 0.5 - 0.5 * c,
        }
    }

    pub fn invert(amount: f32) -> Self {
        let a = amount.clamp(0.0, 1.0);
        Self {
            slope: 1.0 - 2.0 * a,
            intercept: a,
        }
    }

    /// Precompute the 8-bit lookup table for this transfer.
    pub fn lut(&self) -> [u8; 256] {
        let mut lut = [0u8; 256];
        for (i, out) in lut.iter_mut().enumerate() {
            let v = i as f32 / 255.0;
            *out = to_u8(v * self.slope + self.intercept);
        }
        lut
    }
}

/// Map a `0..=1` value to a rounded, clamped byte.
#[inline]
pub fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Normalized 1-D Gaussian kernel for a standard deviation in pixels.
///
/// The kernel spans `±ceil(3σ)` taps. A non-positive sigma yields `[1.0]`.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return vec![1.0];
    }
    let radius = (sigma * 3.0).ceil() as i32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / two_sigma_sq).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Integer glyph scale for a pixel font size on an 8-pixel bitmap face.
pub fn glyph_scale(font_size: u32) -> u32 {
    ((font_size as f32 / 8.0).round() as u32).max(1)
}

/// Top-left corner of a single text line whose bottom edge sits `margin`
/// pixels above the bottom of a `buffer_height`-tall buffer.
pub fn text_origin(buffer_height: u32, line_height: u32, margin: u32) -> (i64, i64) {
    let bottom = buffer_height as i64 - margin as i64;
    (margin as i64, bottom - line_height as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: ColorMatrix = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-3, "{a:?} != {b:?}");
        }
    }

    // =========================================================================
    // color matrices
    // =========================================================================

    #[test]
    fn neutral_matrices_preserve_color() {
        let c = [0.2, 0.5, 0.9];
        assert_close(apply_matrix(&grayscale_matrix(0.0), c), c);
        assert_close(apply_matrix(&sepia_matrix(0.0), c), c);
        assert_close(apply_matrix(&saturate_matrix(1.0), c), c);
        assert_close(apply_matrix(&hue_rotate_matrix(0.0), c), c);
        assert_close(apply_matrix(&IDENTITY, c), c);
    }

    #[test]
    fn full_grayscale_equalizes_channels() {
        let [r, g, b] = apply_matrix(&grayscale_matrix(1.0), [1.0, 0.0, 0.0]);
        assert!((r - g).abs() < 1e-6 && (g - b).abs() < 1e-6);
        assert!((r - 0.2126).abs() < 1e-6);
    }

    #[test]
    fn grayscale_amount_saturates_at_one() {
        assert_eq!(grayscale_matrix(1.0), grayscale_matrix(3.0));
    }

    #[test]
    fn zero_saturation_preserves_luma_weights() {
        let [r, g, b] = apply_matrix(&saturate_matrix(0.0), [0.0, 1.0, 0.0]);
        assert!((r - 0.715).abs() < 1e-6);
        assert!((r - g).abs() < 1e-6 && (g - b).abs() < 1e-6);
    }

    #[test]
    fn hue_rotation_moves_red_off_axis() {
        let rotated = apply_matrix(&hue_rotate_matrix(120.0), [1.0, 0.0, 0.0]);
        assert!(rotated[1] > rotated[0], "{rotated:?}");
    }

    // =========================================================================
    // transfers
    // =========================================================================

    #[test]
    fn neutral_transfers_are_identity_luts() {
        for t in [
            Transfer::brightness(1.0),
            Transfer::contrast(1.0),
            Transfer::invert(0.0),
        ] {
            let lut = t.lut();
            for (i, v) in lut.iter().enumerate() {
                assert_eq!(*v as usize, i);
            }
        }
    }

    #[test]
    fn full_invert_flips_values() {
        let lut = Transfer::invert(1.0).lut();
        assert_eq!(lut[0], 255);
        assert_eq!(lut[255], 0);
        assert_eq!(lut[100], 155);
    }

    #[test]
    fn zero_contrast_is_mid_gray() {
        let lut = Transfer::contrast(0.0).lut();
        assert!(lut.iter().all(|&v| v == 128));
    }

    #[test]
    fn brightness_clamps() {
        let lut = Transfer::brightness(2.0).lut();
        assert_eq!(lut[100], 200);
        assert_eq!(lut[200], 255);
    }

    // =========================================================================
    // kernels and layout
    // =========================================================================

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(2.0);
        assert_eq!(k.len(), 13);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(k[0], k[12]);
        assert!(k[6] > k[5]);
    }

    #[test]
    fn gaussian_kernel_zero_sigma_is_unit() {
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
        assert_eq!(gaussian_kernel(-1.0), vec![1.0]);
    }

    #[test]
    fn glyph_scale_rounds_and_floors_at_one() {
        assert_eq!(glyph_scale(50), 6);
        assert_eq!(glyph_scale(8), 1);
        assert_eq!(glyph_scale(2), 1);
    }

    #[test]
    fn text_origin_anchors_bottom_left() {
        assert_eq!(text_origin(100, 48, 10), (10, 42));
        // Taller line than buffer: origin goes negative and is clipped later
        assert_eq!(text_origin(20, 48, 10), (10, -38));
    }
}
