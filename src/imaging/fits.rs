//! FITS primary-HDU reader.
//!
//! Only the primary Header-Data-Unit is read, and only as a 2-D image
//! (optionally with a third axis of 1, 3 or 4 color planes). World
//! coordinates and further HDUs are ignored.
//!
//! ## Reading
//!
//! CFITSIO (through `fitsio`) parses the header and converts samples to
//! physical `f64` values, applying `BZERO` and `BSCALE`. It reads from a
//! path, so the bytes are staged in a scratch file first ([`StagedFits`]).
//! Axis sizes are checked against the bytes actually present before any
//! sample buffer is allocated.
//!
//! ## Mapping to 8 bits
//!
//! Sample values have no inherent display range, so conversion to RGBA8
//! is an explicit choice ([`FitsStretch`]):
//!
//! - `Linear` (default): each plane is stretched so its finite minimum maps
//!   to 0 and its maximum to 255. A constant plane keeps its value,
//!   clamped.
//! - `Clamp`: values are rounded and clamped to `0..=255` unchanged.
//!
//! NaN samples map to 0. FITS stores the bottom row first; by default rows
//! are flipped so the buffer's first row is the top of the image.

use super::buffer::PixelBuffer;
use fitsio::FitsFile;
use fitsio::hdu::FitsHdu;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::NamedTempFile;
use thiserror::Error;

const BLOCK: usize = 2880;
const CARD: usize = 80;
const VALID_BITPIX: [i32; 6] = [8, 16, 32, 64, -32, -64];

#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    #[error("staging FITS bytes failed: {0}")]
    Staging(#[from] std::io::Error),
    #[error("{0}")]
    Malformed(String),
}

fn malformed(msg: impl Into<String>) -> FitsError {
    FitsError::Malformed(msg.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitsStretch {
    #[default]
    Linear,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitsOptions {
    pub stretch: FitsStretch,
    pub flip_vertical: bool,
}

impl Default for FitsOptions {
    fn default() -> Self {
        Self {
            stretch: FitsStretch::Linear,
            flip_vertical: true,
        }
    }
}

/// Parsed primary header.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsHeader {
    pub bitpix: i32,
    pub width: u32,
    pub height: u32,
    /// 1 (gray), 3 (RGB planes) or 4 (RGBA planes).
    pub channels: u32,
    pub bzero: f64,
    pub bscale: f64,
    /// Byte offset of the data array.
    pub data_offset: usize,
}

impl FitsHeader {
    pub fn bytes_per_sample(&self) -> usize {
        (self.bitpix.unsigned_abs() / 8) as usize
    }

    /// Samples across all planes; `None` if the count overflows `usize`.
    pub fn sample_count(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.channels as usize)
    }

    /// Byte length of the data array; `None` on overflow.
    pub fn data_len(&self) -> Option<usize> {
        self.sample_count()?.checked_mul(self.bytes_per_sample())
    }
}

/// True when `data` starts with a FITS primary header.
pub fn has_fits_magic(data: &[u8]) -> bool {
    data.len() >= 30 && data.starts_with(b"SIMPLE  =")
}

/// Length of the header up to its `END` card, padded to a whole block.
pub fn header_len(data: &[u8]) -> Option<usize> {
    data.chunks_exact(CARD)
        .position(|card| card.starts_with(b"END") && card[3..].iter().all(|&b| b == b' '))
        .map(|i| ((i + 1) * CARD).div_ceil(BLOCK) * BLOCK)
}

/// FITS bytes staged in a scratch file and opened with CFITSIO.
///
/// The scratch file lives as long as this value.
pub struct StagedFits {
    fptr: FitsFile,
    hdu: FitsHdu,
    data_offset: usize,
    available: usize,
    _file: NamedTempFile,
}

impl StagedFits {
    pub fn open(data: &[u8]) -> Result<Self, FitsError> {
        if !has_fits_magic(data) {
            return Err(malformed("missing SIMPLE card"));
        }
        let data_offset = header_len(data).ok_or_else(|| malformed("header has no END card"))?;

        let mut file = tempfile::Builder::new().suffix(".fits").tempfile()?;
        file.write_all(data)?;
        file.flush()?;

        let mut fptr = FitsFile::open(file.path())?;
        let hdu = fptr.hdu(0)?;
        Ok(Self {
            fptr,
            hdu,
            data_offset,
            available: data.len().saturating_sub(data_offset),
            _file: file,
        })
    }

    fn int(&mut self, key: &str) -> Result<i64, FitsError> {
        self.hdu
            .read_key::<i64>(&mut self.fptr, key)
            .map_err(|_| malformed(format!("missing or non-integer {key}")))
    }

    fn float_or(&mut self, key: &str, default: f64) -> f64 {
        self.hdu
            .read_key::<f64>(&mut self.fptr, key)
            .unwrap_or(default)
    }

    /// Read and validate the axes, sample type and scaling.
    pub fn header(&mut self) -> Result<FitsHeader, FitsError> {
        let raw_bitpix = self.int("BITPIX")?;
        let bitpix = i32::try_from(raw_bitpix)
            .ok()
            .filter(|b| VALID_BITPIX.contains(b))
            .ok_or_else(|| malformed(format!("invalid BITPIX {raw_bitpix}")))?;

        let naxis = self.int("NAXIS")?;
        if naxis < 2 {
            return Err(malformed(format!("NAXIS = {naxis}; need two spatial axes")));
        }
        if naxis > 3 {
            return Err(malformed(format!(
                "NAXIS = {naxis}; only 2-D images and color cubes are read"
            )));
        }
        let width = self.axis(1)?;
        let height = self.axis(2)?;
        let channels = if naxis == 3 { self.axis(3)? } else { 1 };
        if ![1, 3, 4].contains(&channels) {
            return Err(malformed(format!(
                "NAXIS3 = {channels}; expected 1, 3 or 4 planes"
            )));
        }

        let header = FitsHeader {
            bitpix,
            width,
            height,
            channels,
            bzero: self.float_or("BZERO", 0.0),
            bscale: self.float_or("BSCALE", 1.0),
            data_offset: self.data_offset,
        };
        let needed = header.data_len().ok_or_else(|| {
            malformed(format!(
                "{width}x{height}x{channels} at BITPIX {bitpix} overflows the address space"
            ))
        })?;
        if self.available < needed {
            return Err(malformed(format!(
                "data array holds {} bytes; {width}x{height}x{channels} at BITPIX {bitpix} needs {needed}",
                self.available
            )));
        }
        Ok(header)
    }

    fn axis(&mut self, n: u32) -> Result<u32, FitsError> {
        let v = self.int(&format!("NAXIS{n}"))?;
        u32::try_from(v)
            .ok()
            .filter(|&v| v > 0)
            .ok_or_else(|| malformed(format!("NAXIS{n} = {v} is not a positive size")))
    }

    /// Read every plane as physical values, plane-major.
    ///
    /// `header` must come from [`StagedFits::header`] on the same file.
    pub fn read_planes(&mut self, header: &FitsHeader) -> Result<Vec<Vec<f64>>, FitsError> {
        let samples: Vec<f64> = self.hdu.read_image(&mut self.fptr)?;
        if header.sample_count() != Some(samples.len()) {
            return Err(malformed(format!(
                "read {} samples for a {}x{}x{} image",
                samples.len(),
                header.width,
                header.height,
                header.channels
            )));
        }
        let plane_len = header.width as usize * header.height as usize;
        Ok(samples.chunks_exact(plane_len).map(<[f64]>::to_vec).collect())
    }
}

/// Map one plane of physical values to bytes.
fn stretch_plane(plane: &[f64], stretch: FitsStretch) -> Vec<u8> {
    let clamp = |v: f64| if v.is_nan() { 0 } else { v.round().clamp(0.0, 255.0) as u8 };
    match stretch {
        FitsStretch::Clamp => plane.iter().map(|&v| clamp(v)).collect(),
        FitsStretch::Linear => {
            let (min, max) = plane
                .iter()
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            if !(max > min) {
                return plane.iter().map(|&v| clamp(v)).collect();
            }
            let scale = 255.0 / (max - min);
            log::debug!("fits plane stretch [{min}, {max}] -> [0, 255]");
            plane.iter().map(|&v| clamp((v - min) * scale)).collect()
        }
    }
}

/// Interleave planes into the canonical RGBA8 buffer.
pub fn planes_to_rgba(
    header: &FitsHeader,
    planes: &[Vec<f64>],
    options: &FitsOptions,
) -> PixelBuffer {
    let (w, h) = (header.width as usize, header.height as usize);
    let bytes: Vec<Vec<u8>> = planes
        .iter()
        .map(|p| stretch_plane(p, options.stretch))
        .collect();

    let mut samples = Vec::with_capacity(w * h * 4);
    for row in 0..h {
        let src_row = if options.flip_vertical { h - 1 - row } else { row };
        for col in 0..w {
            let i = src_row * w + col;
            let px = match bytes.len() {
                1 => [bytes[0][i], bytes[0][i], bytes[0][i], 255],
                3 => [bytes[0][i], bytes[1][i], bytes[2][i], 255],
                _ => [bytes[0][i], bytes[1][i], bytes[2][i], bytes[3][i]],
            };
            samples.extend_from_slice(&px);
        }
    }
    PixelBuffer::from_raw(header.width, header.height, samples)
        .unwrap_or_else(|| PixelBuffer::filled(header.width, header.height, [0, 0, 0, 255]))
}
