//! Format decoding: input bytes + declared MIME type → [`DecodedSource`].
//!
//! | Kind | Detection | Decode |
//! |---|---|---|
//! | **Standard raster** | any other `image/*` type | header identify now, full decode on first pixel read |
//! | **TIFF** | `image/tiff`, `image/tif` | first IFD checked by [`tiff_ifd`](super::tiff_ifd), samples via `image`'s TIFF codec |
//! | **FITS** | `image/fits`, `application/fits` | primary HDU via [`fits`](super::fits) |
//!
//! An empty or `application/octet-stream` type falls back to sniffing the
//! leading bytes.
//!
//! Decoding returns a complete source or an error, never anything partial.
//! A [`CancelToken`] is checked at the start of every stage so an abandoned
//! load stops at the next stage boundary.

use super::buffer::PixelBuffer;
use super::fits::{self, FitsError, FitsHeader, FitsOptions, StagedFits};
use super::tiff_ifd::{self, TiffDirectory};
use image::codecs::tiff::TiffDecoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported TIFF variant: {0}")]
    UnsupportedTiffVariant(String),
    #[error("malformed FITS data: {0}")]
    MalformedFitsData(String),
    #[error("failed to read image data: {0}")]
    DecodeIOFailure(#[from] std::io::Error),
    #[error("unsupported MIME type: {0:?}")]
    UnsupportedMimeType(String),
    #[error("failed to decode image: {0}")]
    Raster(String),
    #[error("decode cancelled")]
    Cancelled,
}

impl From<FitsError> for DecodeError {
    fn from(e: FitsError) -> Self {
        match e {
            FitsError::Staging(io) => DecodeError::DecodeIOFailure(io),
            other => DecodeError::MalformedFitsData(other.to_string()),
        }
    }
}

/// Which decoder handles a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    StandardRaster,
    Tiff,
    Fits,
}

impl SourceKind {
    /// Classify by declared MIME type alone.
    ///
    /// Returns `Ok(None)` when the type says nothing useful and the bytes
    /// must be sniffed.
    pub fn from_mime(mime: &str) -> Result<Option<Self>, DecodeError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "" | "application/octet-stream" => Ok(None),
            "image/tiff" | "image/tif" | "image/x-tiff" => Ok(Some(SourceKind::Tiff)),
            "image/fits" | "application/fits" | "image/x-fits" => Ok(Some(SourceKind::Fits)),
            s if s.starts_with("image/") => Ok(Some(SourceKind::StandardRaster)),
            _ => Err(DecodeError::UnsupportedMimeType(mime.to_string())),
        }
    }

    /// Classify a stream: declared type first, magic bytes as fallback.
    pub fn detect(mime: &str, bytes: &[u8]) -> Result<Self, DecodeError> {
        if let Some(kind) = Self::from_mime(mime)? {
            return Ok(kind);
        }
        if fits::has_fits_magic(bytes) {
            Ok(SourceKind::Fits)
        } else if tiff_ifd::has_tiff_magic(bytes) {
            Ok(SourceKind::Tiff)
        } else if image::guess_format(bytes).is_ok() {
            Ok(SourceKind::StandardRaster)
        } else {
            Err(DecodeError::UnsupportedMimeType(format!(
                "{mime:?} with unrecognized content"
            )))
        }
    }
}

/// Shared flag checked between decode stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), DecodeError> {
        if self.is_cancelled() {
            Err(DecodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A standard-format image kept as encoded bytes until its pixels are
/// needed.
#[derive(Debug)]
pub struct LazyRaster {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: u32,
    height: u32,
    realized: OnceLock<Result<PixelBuffer, String>>,
}

impl LazyRaster {
    /// Identify from the header only; no samples are decoded.
    pub fn identify(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let reader = ImageReader::new(Cursor::new(bytes.as_slice())).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| DecodeError::Raster("unrecognized image format".into()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| DecodeError::Raster(e.to_string()))?;
        Ok(Self {
            bytes,
            format,
            width,
            height,
            realized: OnceLock::new(),
        })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_realized(&self) -> bool {
        self.realized.get().is_some()
    }

    /// Decode the full image on first call; later calls reuse the result.
    pub fn pixels(&self) -> Result<&PixelBuffer, DecodeError> {
        self.realized
            .get_or_init(|| {
                log::debug!("realizing {:?} {}x{}", self.format, self.width, self.height);
                let image = image::load_from_memory_with_format(&self.bytes, self.format)
                    .map_err(|e| e.to_string())?;
                Ok(PixelBuffer::from(image.to_rgba8()))
            })
            .as_ref()
            .map_err(|e| DecodeError::Raster(e.clone()))
    }
}

/// The one loaded image, replaced wholesale on every new load.
#[derive(Debug)]
pub enum DecodedSource {
    StandardRaster(LazyRaster),
    Tiff {
        directory: TiffDirectory,
        pixels: PixelBuffer,
    },
    Fits {
        header: FitsHeader,
        pixels: PixelBuffer,
    },
}

impl DecodedSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            DecodedSource::StandardRaster(_) => SourceKind::StandardRaster,
            DecodedSource::Tiff { .. } => SourceKind::Tiff,
            DecodedSource::Fits { .. } => SourceKind::Fits,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            DecodedSource::StandardRaster(raster) => raster.dimensions(),
            DecodedSource::Tiff { pixels, .. } | DecodedSource::Fits { pixels, .. } => {
                pixels.dimensions()
            }
        }
    }

    /// The decoded RGBA8 buffer, realizing a lazy raster if needed.
    pub fn pixels(&self) -> Result<&PixelBuffer, DecodeError> {
        match self {
            DecodedSource::StandardRaster(raster) => raster.pixels(),
            DecodedSource::Tiff { pixels, .. } | DecodedSource::Fits { pixels, .. } => Ok(pixels),
        }
    }
}

/// Decoder settings that are not part of the input stream.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeOptions {
    pub fits: FitsOptions,
}

/// Decode with default options and no cancellation.
pub fn decode(bytes: Vec<u8>, mime: &str) -> Result<DecodedSource, DecodeError> {
    decode_with(bytes, mime, &DecodeOptions::default(), &CancelToken::new())
}

/// Read a whole stream, then decode it.
pub fn decode_reader<R: Read>(
    mut reader: R,
    mime: &str,
    options: &DecodeOptions,
    cancel: &CancelToken,
) -> Result<DecodedSource, DecodeError> {
    cancel.check()?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode_with(bytes, mime, options, cancel)
}

pub fn decode_with(
    bytes: Vec<u8>,
    mime: &str,
    options: &DecodeOptions,
    cancel: &CancelToken,
) -> Result<DecodedSource, DecodeError> {
    cancel.check()?;
    let kind = SourceKind::detect(mime, &bytes)?;
    log::debug!("decoding {} bytes as {kind:?} (declared {mime:?})", bytes.len());

    match kind {
        SourceKind::StandardRaster => {
            cancel.check()?;
            Ok(DecodedSource::StandardRaster(LazyRaster::identify(bytes)?))
        }
        SourceKind::Tiff => decode_tiff(&bytes, cancel),
        SourceKind::Fits => decode_fits(&bytes, &options.fits, cancel),
    }
}

fn decode_tiff(bytes: &[u8], cancel: &CancelToken) -> Result<DecodedSource, DecodeError> {
    let unsupported = |e: image::ImageError| DecodeError::UnsupportedTiffVariant(e.to_string());

    cancel.check()?;
    let directory =
        tiff_ifd::read_first_directory(bytes).map_err(DecodeError::UnsupportedTiffVariant)?;
    directory
        .check_supported()
        .map_err(DecodeError::UnsupportedTiffVariant)?;
    log::debug!(
        "tiff ifd: {}x{} bits={:?} spp={} compression={:?}",
        directory.width,
        directory.height,
        directory.bits_per_sample,
        directory.samples_per_pixel,
        directory.compression
    );

    cancel.check()?;
    let decoder = TiffDecoder::new(Cursor::new(bytes)).map_err(unsupported)?;
    let image = DynamicImage::from_decoder(decoder).map_err(unsupported)?;

    cancel.check()?;
    let rgba = image.to_rgba8();
    if rgba.dimensions() != (directory.width, directory.height) {
        return Err(DecodeError::UnsupportedTiffVariant(format!(
            "decoded {:?} but directory declares {}x{}",
            rgba.dimensions(),
            directory.width,
            directory.height
        )));
    }
    Ok(DecodedSource::Tiff {
        directory,
        pixels: PixelBuffer::from(rgba),
    })
}

fn decode_fits(
    bytes: &[u8],
    options: &FitsOptions,
    cancel: &CancelToken,
) -> Result<DecodedSource, DecodeError> {
    cancel.check()?;
    let mut staged = StagedFits::open(bytes)?;

    cancel.check()?;
    let header = staged.header()?;
    log::debug!(
        "fits hdu: {}x{}x{} bitpix={}",
        header.width,
        header.height,
        header.channels,
        header.bitpix
    );

    cancel.check()?;
    let planes = staged.read_planes(&header)?;

    cancel.check()?;
    let pixels = fits::planes_to_rgba(&header, &planes, options);
    Ok(DecodedSource::Fits { header, pixels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{build_fits, gray8_fits, rgba8_tiff, rgba16_tiff};
    use image::{ImageEncoder, RgbaImage};

    const QUAD: [u8; 16] = [
        255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 255,
    ];

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut out = Vec::new();
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgba8)
            .unwrap();
        out
    }

    // =========================================================================
    // detection
    // =========================================================================

    #[test]
    fn mime_classification() {
        assert_eq!(SourceKind::from_mime("image/tiff").unwrap(), Some(SourceKind::Tiff));
        assert_eq!(SourceKind::from_mime("image/TIF").unwrap(), Some(SourceKind::Tiff));
        assert_eq!(SourceKind::from_mime("image/fits").unwrap(), Some(SourceKind::Fits));
        assert_eq!(
            SourceKind::from_mime("image/png; charset=binary").unwrap(),
            Some(SourceKind::StandardRaster)
        );
        assert_eq!(SourceKind::from_mime("").unwrap(), None);
        assert!(matches!(
            SourceKind::from_mime("text/plain"),
            Err(DecodeError::UnsupportedMimeType(_))
        ));
    }

    #[test]
    fn sniffing_when_type_is_generic() {
        let fits = gray8_fits(1, &[&[0]]);
        let tiff = rgba8_tiff(false, 2, 2, &QUAD);
        let png = png_bytes(&RgbaImage::new(1, 1));
        assert_eq!(SourceKind::detect("", &fits).unwrap(), SourceKind::Fits);
        assert_eq!(
            SourceKind::detect("application/octet-stream", &tiff).unwrap(),
            SourceKind::Tiff
        );
        assert_eq!(SourceKind::detect("", &png).unwrap(), SourceKind::StandardRaster);
        assert!(SourceKind::detect("", b"plain text").is_err());
    }

    #[test]
    fn declared_type_wins_over_content() {
        let fits = gray8_fits(1, &[&[0]]);
        assert_eq!(SourceKind::detect("image/png", &fits).unwrap(), SourceKind::StandardRaster);
    }

    // =========================================================================
    // TIFF
    // =========================================================================

    #[test]
    fn tiff_quad_decodes_exactly() {
        for big_endian in [false, true] {
            let data = rgba8_tiff(big_endian, 2, 2, &QUAD);
            let source = decode(data, "image/tiff").unwrap();
            assert_eq!(source.kind(), SourceKind::Tiff);
            let pixels = source.pixels().unwrap();
            assert_eq!(pixels.dimensions(), (2, 2));
            assert_eq!(pixels.samples(), &QUAD);
        }
    }

    #[test]
    fn tiff_sixteen_bit_scales_to_eight() {
        // 0x8080 = 128 * 257
        let samples = [0u16, 65535, 0x8080, 65535, 65535, 0, 0, 0x8080];
        for big_endian in [false, true] {
            let data = rgba16_tiff(big_endian, 2, 1, &samples);
            let source = decode(data, "image/tiff").unwrap();
            let DecodedSource::Tiff { directory, pixels } = &source else {
                panic!("expected TIFF source");
            };
            assert_eq!(directory.bits_per_sample, vec![16, 16, 16, 16]);
            assert_eq!(pixels.samples(), &[0, 255, 128, 255, 255, 0, 0, 128]);
        }
    }

    #[test]
    fn tiff_garbage_is_unsupported_variant() {
        let err = decode(b"II*\0\xff\xff\x00\x00".to_vec(), "image/tiff").unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedTiffVariant(_)));
    }

    #[test]
    fn tiff_not_a_tiff_is_unsupported_variant() {
        let err = decode(b"GIF89a".to_vec(), "image/tif").unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedTiffVariant(_)));
    }

    // =========================================================================
    // FITS
    // =========================================================================

    #[test]
    fn fits_decodes_top_row_first() {
        let data = gray8_fits(2, &[&[255, 0], &[0, 255]]);
        let source = decode(data, "image/fits").unwrap();
        let pixels = source.pixels().unwrap();
        assert_eq!(pixels.dimensions(), (2, 2));
        assert_eq!(pixels.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(pixels.pixel(1, 0), Some([0, 0, 0, 255]));
        assert_eq!(pixels.pixel(1, 1), Some([255, 255, 255, 255]));
    }

    #[test]
    fn fits_rgba_cube_decodes_with_alpha() {
        let data = build_fits(8, &[1, 1, 4], &[], &[200, 100, 50, 25]);
        let options = DecodeOptions {
            fits: FitsOptions {
                stretch: fits::FitsStretch::Clamp,
                flip_vertical: true,
            },
        };
        let source = decode_with(data, "image/fits", &options, &CancelToken::new()).unwrap();
        assert_eq!(source.pixels().unwrap().samples(), &[200, 100, 50, 25]);
    }

    #[test]
    fn fits_wide_integer_and_double_samples_decode() {
        let ints: Vec<u8> = [i64::MIN / 2, 0, i64::MAX / 2]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let doubles: Vec<u8> = [-1.0f64, 0.0, 1.0]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let words: Vec<u8> = [-10i32, 0, 10].iter().flat_map(|v| v.to_be_bytes()).collect();
        for (bitpix, data) in [(64, ints), (-64, doubles), (32, words)] {
            let source = decode(build_fits(bitpix, &[3, 1], &[], &data), "image/fits").unwrap();
            let DecodedSource::Fits { header, pixels } = &source else {
                panic!("expected FITS source");
            };
            assert_eq!(header.bitpix, bitpix);
            let row: Vec<u8> = pixels.samples().chunks_exact(4).map(|p| p[0]).collect();
            assert_eq!(row, vec![0, 128, 255], "BITPIX {bitpix}");
        }
    }

    #[test]
    fn fits_overflowing_axes_are_malformed() {
        let data = build_fits(-64, &[u32::MAX, u32::MAX, 4], &[], &[0; 16]);
        assert!(matches!(
            decode(data, "image/fits"),
            Err(DecodeError::MalformedFitsData(_))
        ));
    }

    #[test]
    fn fits_missing_axes_is_malformed() {
        let data = build_fits(8, &[4], &[], &[0; 4]);
        assert!(matches!(
            decode(data, "image/fits"),
            Err(DecodeError::MalformedFitsData(_))
        ));
    }

    // =========================================================================
    // standard raster
    // =========================================================================

    #[test]
    fn standard_raster_is_lazy() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([9, 8, 7, 255]));
        let source = decode(png_bytes(&img), "image/png").unwrap();
        let DecodedSource::StandardRaster(raster) = &source else {
            panic!("expected standard raster");
        };
        assert_eq!(raster.dimensions(), (3, 2));
        assert_eq!(raster.format(), ImageFormat::Png);
        assert!(!raster.is_realized());

        let pixels = source.pixels().unwrap();
        assert_eq!(pixels.pixel(2, 1), Some([9, 8, 7, 255]));
        assert!(raster.is_realized());
    }

    #[test]
    fn standard_raster_with_unknown_bytes_fails() {
        assert!(matches!(
            decode(b"not an image".to_vec(), "image/png"),
            Err(DecodeError::Raster(_))
        ));
    }

    // =========================================================================
    // cancellation and readers
    // =========================================================================

    #[test]
    fn cancelled_token_stops_decode() {
        let token = CancelToken::new();
        token.cancel();
        let data = gray8_fits(1, &[&[1]]);
        let err = decode_with(data, "image/fits", &DecodeOptions::default(), &token).unwrap_err();
        assert!(matches!(err, DecodeError::Cancelled));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk gone"))
        }
    }

    #[test]
    fn reader_failure_is_io_failure() {
        let err = decode_reader(
            FailingReader,
            "image/png",
            &DecodeOptions::default(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::DecodeIOFailure(_)));
    }

    #[test]
    fn reader_input_decodes() {
        let data = rgba8_tiff(false, 2, 2, &QUAD);
        let source = decode_reader(
            Cursor::new(data),
            "image/tiff",
            &DecodeOptions::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(source.dimensions(), (2, 2));
    }
}
