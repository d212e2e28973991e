//! The canonical pixel buffer every decoder converges to.
//!
//! A [`PixelBuffer`] is `width × height` pixels of interleaved RGBA8. The
//! length invariant (`width * height * 4`) is checked on construction and
//! never broken afterwards: the sample vector is only reachable mutably
//! through [`PixelBuffer::samples_mut`], which hands out a slice (fixed
//! length), never the `Vec` itself.

use image::RgbaImage;

/// Bytes per pixel in the canonical layout.
pub const CHANNELS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA8 samples. Returns `None` when the length does not match
    /// `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        if samples.len() != expected_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            samples,
        })
    }

    /// A buffer filled with one RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let samples = rgba
            .iter()
            .copied()
            .cycle()
            .take(expected_len(width, height))
            .collect();
        Self {
            width,
            height,
            samples,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    /// Number of bytes in one row.
    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// RGBA value at `(x, y)`, or `None` outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([
            self.samples[i],
            self.samples[i + 1],
            self.samples[i + 2],
            self.samples[i + 3],
        ])
    }

    /// Overwrite the pixel at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.samples[i..i + CHANNELS].copy_from_slice(&rgba);
    }

    /// View as an `image` crate buffer (copies).
    pub fn to_rgba_image(&self) -> RgbaImage {
        // Dimensions and length agree by construction.
        RgbaImage::from_raw(self.width, self.height, self.samples.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            samples: img.into_raw(),
        }
    }
}

fn expected_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}
