//! First-directory summary of a TIFF stream.
//!
//! Opens the stream with the `tiff` crate's decoder and reads the tags that
//! decide whether the frame can be decoded: dimensions, bits per sample,
//! samples per pixel, compression, photometric interpretation, planar
//! configuration and sample format. Structural problems the decoder itself
//! rejects, such as missing strips or mixed bit depths, surface as errors
//! here before any sample is touched.
//!
//! Sample decoding itself is done by the `image` crate's TIFF codec; this
//! module only gates which variants reach it.

use std::io::Cursor;
use tiff::decoder::Decoder;
use tiff::tags::{ByteOrder, Tag};

/// Compression schemes the decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Deflate,
    PackBits,
    Other(u16),
}

impl Compression {
    fn from_code(code: u16) -> Self {
        match code {
            1 => Compression::None,
            5 => Compression::Lzw,
            8 | 32946 => Compression::Deflate,
            32773 => Compression::PackBits,
            other => Compression::Other(other),
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Compression::Other(_))
    }
}

/// Summary of the first image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffDirectory {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: Vec<u16>,
    pub samples_per_pixel: u16,
    pub compression: Compression,
    pub photometric: u16,
    pub planar_config: u16,
    /// 1 = unsigned integer, 2 = signed, 3 = IEEE float.
    pub sample_format: u16,
    pub big_endian: bool,
}

impl TiffDirectory {
    /// Reject variants the pipeline does not decode.
    pub fn check_supported(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("empty frame {}x{}", self.width, self.height));
        }
        if !self.compression.is_supported() {
            return Err(format!("unsupported compression {:?}", self.compression));
        }
        if let Some(bits) = self
            .bits_per_sample
            .iter()
            .find(|&&b| b != 8 && b != 16)
        {
            return Err(format!("unsupported bit depth {bits}"));
        }
        if self.sample_format != 1 {
            return Err(format!("unsupported sample format {}", self.sample_format));
        }
        if !(1..=4).contains(&self.samples_per_pixel) {
            return Err(format!(
                "unsupported samples per pixel {}",
                self.samples_per_pixel
            ));
        }
        Ok(())
    }
}

/// True when `data` starts with a classic TIFF header.
pub fn has_tiff_magic(data: &[u8]) -> bool {
    data.starts_with(b"II*\0") || data.starts_with(b"MM\0*")
}

/// Open the stream and summarize its first directory.
pub fn read_first_directory(data: &[u8]) -> Result<TiffDirectory, String> {
    if data.starts_with(b"II+\0") || data.starts_with(b"MM\0+") {
        return Err("BigTIFF is not supported".into());
    }
    let mut decoder = Decoder::new(Cursor::new(data)).map_err(|e| e.to_string())?;
    let big_endian = decoder.byte_order() == ByteOrder::BigEndian;
    let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;

    let mut short = |tag: Tag, default: u16| -> Result<u16, String> {
        decoder
            .find_tag_unsigned::<u16>(tag)
            .map(|v| v.unwrap_or(default))
            .map_err(|e| format!("unreadable {tag:?}: {e}"))
    };
    let compression = Compression::from_code(short(Tag::Compression, 1)?);
    let photometric = short(Tag::PhotometricInterpretation, 1)?;
    let samples_per_pixel = short(Tag::SamplesPerPixel, 1)?;
    let planar_config = short(Tag::PlanarConfiguration, 1)?;

    let mut shorts = |tag: Tag, default: u16| -> Result<Vec<u16>, String> {
        decoder
            .find_tag_unsigned_vec::<u16>(tag)
            .map(|v| v.unwrap_or_else(|| vec![default]))
            .map_err(|e| format!("unreadable {tag:?}: {e}"))
    };
    let bits_per_sample = shorts(Tag::BitsPerSample, 1)?;
    let sample_format = shorts(Tag::SampleFormat, 1)?.first().copied().unwrap_or(1);

    Ok(TiffDirectory {
        width,
        height,
        bits_per_sample,
        samples_per_pixel,
        compression,
        photometric,
        planar_config,
        sample_format,
        big_endian,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{TiffEntry, build_tiff};

    fn tag(t: Tag) -> u16 {
        t.to_u16()
    }

    fn rgba_entries(compression: u32, bits: u32) -> Vec<TiffEntry> {
        vec![
            TiffEntry::short(tag(Tag::ImageWidth), &[2]),
            TiffEntry::short(tag(Tag::ImageLength), &[3]),
            TiffEntry::short(tag(Tag::BitsPerSample), &[bits, bits, bits, bits]),
            TiffEntry::short(tag(Tag::Compression), &[compression]),
            TiffEntry::short(tag(Tag::PhotometricInterpretation), &[2]),
            TiffEntry::short(tag(Tag::SamplesPerPixel), &[4]),
        ]
    }

    /// One strip of zeroed samples so the directory is structurally complete.
    fn strip() -> Vec<u8> {
        vec![0; 2 * 3 * 4 * 2]
    }

    #[test]
    fn reads_little_endian_directory() {
        let data = build_tiff(false, &rgba_entries(1, 8), &strip());
        let dir = read_first_directory(&data).unwrap();
        assert_eq!((dir.width, dir.height), (2, 3));
        assert_eq!(dir.bits_per_sample, vec![8, 8, 8, 8]);
        assert_eq!(dir.samples_per_pixel, 4);
        assert_eq!(dir.compression, Compression::None);
        assert_eq!(dir.photometric, 2);
        assert!(!dir.big_endian);
        assert!(dir.check_supported().is_ok());
    }

    #[test]
    fn reads_big_endian_directory() {
        let data = build_tiff(true, &rgba_entries(5, 16), &strip());
        let dir = read_first_directory(&data).unwrap();
        assert!(dir.big_endian);
        assert_eq!(dir.compression, Compression::Lzw);
        assert_eq!(dir.bits_per_sample, vec![16; 4]);
        assert!(dir.check_supported().is_ok());
    }

    #[test]
    fn long_width_is_accepted() {
        let mut entries = rgba_entries(1, 8);
        entries[0] = TiffEntry::long(tag(Tag::ImageWidth), &[70000]);
        let dir = read_first_directory(&build_tiff(false, &entries, &strip())).unwrap();
        assert_eq!(dir.width, 70000);
    }

    #[test]
    fn jpeg_compression_is_unsupported() {
        let data = build_tiff(false, &rgba_entries(7, 8), &strip());
        let dir = read_first_directory(&data).unwrap();
        assert_eq!(dir.compression, Compression::Other(7));
        assert!(dir.check_supported().unwrap_err().contains("compression"));
    }

    #[test]
    fn odd_bit_depth_is_unsupported() {
        let data = build_tiff(false, &rgba_entries(1, 12), &strip());
        let dir = read_first_directory(&data).unwrap();
        assert!(dir.check_supported().unwrap_err().contains("bit depth"));
    }

    #[test]
    fn float_samples_are_unsupported() {
        let mut entries = rgba_entries(1, 16);
        entries.push(TiffEntry::short(tag(Tag::SampleFormat), &[3, 3, 3, 3]));
        let dir = read_first_directory(&build_tiff(false, &entries, &strip())).unwrap();
        assert_eq!(dir.sample_format, 3);
        assert!(dir.check_supported().is_err());
    }

    #[test]
    fn mixed_bit_depths_are_rejected() {
        let mut entries = rgba_entries(1, 8);
        entries[2] = TiffEntry::short(tag(Tag::BitsPerSample), &[8, 8, 8, 16]);
        assert!(read_first_directory(&build_tiff(false, &entries, &strip())).is_err());
    }

    #[test]
    fn directory_without_strips_is_rejected() {
        assert!(read_first_directory(&build_tiff(false, &rgba_entries(1, 8), &[])).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(read_first_directory(b"").is_err());
        assert!(read_first_directory(b"PK\x03\x04junk").is_err());
        assert!(
            read_first_directory(b"II\x2b\x00\x08\x00\x00\x00")
                .unwrap_err()
                .contains("BigTIFF")
        );
        // Valid header pointing past the end
        assert!(read_first_directory(b"II*\0\xff\x00\x00\x00").is_err());
    }

    #[test]
    fn magic_detection() {
        assert!(has_tiff_magic(b"II*\0rest"));
        assert!(has_tiff_magic(b"MM\0*rest"));
        assert!(!has_tiff_magic(b"\x89PNG"));
    }
}
