//! Export flattening: pixel buffer + filter chain → one final raster.
//!
//! [`flatten`] rasterizes the filter chain onto the buffer with the
//! [`RasterCompositor`] and wraps the result in an [`ExportableBuffer`]
//! ready for PNG encoding. Writing the bytes anywhere is the caller's job.
//!
//! The output is a pure function of its inputs: the same buffer and chain
//! always flatten to the same bytes, which [`ExportableBuffer::digest`]
//! makes cheap to check.

use crate::filters::FilterChain;
use crate::imaging::{Compositor, PixelBuffer, RasterCompositor, apply_chain};
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("nothing to export: {0}")]
    Empty(String),
}

/// The flattened result, ready to hand to an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportableBuffer {
    buffer: PixelBuffer,
    has_text: bool,
}

impl ExportableBuffer {
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Whether committed text is part of these pixels.
    pub fn has_text(&self) -> bool {
        self.has_text
    }

    /// Encode as an RGBA8 PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, ExportError> {
        let (width, height) = self.buffer.dimensions();
        if self.buffer.is_empty() {
            return Err(ExportError::Empty(format!("{width}x{height} buffer")));
        }
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(
            self.buffer.samples(),
            width,
            height,
            image::ExtendedColorType::Rgba8,
        )?;
        log::info!("exported {width}x{height} PNG ({} bytes)", out.len());
        Ok(out)
    }

    /// SHA-256 over dimensions and samples, as lowercase hex.
    pub fn digest(&self) -> String {
        let (width, height) = self.buffer.dimensions();
        let mut hasher = Sha256::new();
        hasher.update(width.to_le_bytes());
        hasher.update(height.to_le_bytes());
        hasher.update(self.buffer.samples());
        format!("{:x}", hasher.finalize())
    }
}

/// Apply `chain` to `buffer` with the production compositor.
pub fn flatten(buffer: PixelBuffer, chain: &FilterChain, text_committed: bool) -> ExportableBuffer {
    flatten_with(&RasterCompositor, buffer, chain, text_committed)
}

pub fn flatten_with<C: Compositor + ?Sized>(
    compositor: &C,
    buffer: PixelBuffer,
    chain: &FilterChain,
    text_committed: bool,
) -> ExportableBuffer {
    log::debug!(
        "flattening {:?} through {} ops ({})",
        buffer.dimensions(),
        chain.len(),
        chain.to_css()
    );
    ExportableBuffer {
        buffer: apply_chain(compositor, buffer, chain),
        has_text: text_committed,
    }
}

/// Download name for an export made at `at`: `<unix-millis>.png`.
pub fn export_filename(at: SystemTime) -> String {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{millis}.png")
}
