//! Shared test utilities for the photo-adjust test suite.
//!
//! Builders for synthetic pixel buffers and in-memory TIFF and FITS
//! streams, so decoder tests do not depend on fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tiff = build_tiff(false, &[TiffEntry::short(256, &[2])], &[]);
//! let fits = build_fits(8, &[2, 2], &[("BZERO", "0")], &[0, 1, 2, 3]);
//! let buf = gradient_buffer(16, 4);
//! ```

use crate::imaging::PixelBuffer;

// =========================================================================
// Pixel buffers
// =========================================================================

/// Opaque buffer whose channels vary along both axes.
pub fn gradient_buffer(width: u32, height: u32) -> PixelBuffer {
    let mut buf = PixelBuffer::filled(width, height, [0, 0, 0, 255]);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 16) % 256) as u8;
            let g = ((y * 32) % 256) as u8;
            let b = (((x + y) * 8) % 256) as u8;
            buf.put_pixel(x, y, [r, g, b, 255]);
        }
    }
    buf
}

// =========================================================================
// TIFF builder
// =========================================================================

const TIFF_SHORT: u16 = 3;
const TIFF_LONG: u16 = 4;

/// One IFD entry with SHORT or LONG values.
#[derive(Debug, Clone)]
pub struct TiffEntry {
    pub tag: u16,
    pub field_type: u16,
    pub values: Vec<u32>,
}

impl TiffEntry {
    pub fn short(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            field_type: TIFF_SHORT,
            values: values.to_vec(),
        }
    }

    pub fn long(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            field_type: TIFF_LONG,
            values: values.to_vec(),
        }
    }

    fn value_size(&self) -> usize {
        if self.field_type == TIFF_SHORT { 2 } else { 4 }
    }
}

/// Build a single-IFD TIFF stream.
///
/// When `pixel_data` is non-empty it is stored as one strip and the
/// StripOffsets, RowsPerStrip and StripByteCounts tags are added. Entries
/// are written in ascending tag order as the format requires.
pub fn build_tiff(big_endian: bool, entries: &[TiffEntry], pixel_data: &[u8]) -> Vec<u8> {
    let mut entries = entries.to_vec();
    let height = entries
        .iter()
        .find(|e| e.tag == 257)
        .and_then(|e| e.values.first().copied())
        .unwrap_or(1);
    if !pixel_data.is_empty() {
        // Offset is patched once the layout is known
        entries.push(TiffEntry::long(273, &[0]));
        entries.push(TiffEntry::long(278, &[height]));
        entries.push(TiffEntry::long(279, &[pixel_data.len() as u32]));
    }
    entries.sort_by_key(|e| e.tag);

    let ifd_len = 2 + entries.len() * 12 + 4;
    let overflow_start = 8 + ifd_len;
    let overflow_len: usize = entries
        .iter()
        .map(|e| e.values.len() * e.value_size())
        .filter(|&n| n > 4)
        .sum();
    let pixel_offset = (overflow_start + overflow_len) as u32;
    for e in &mut entries {
        if e.tag == 273 {
            e.values = vec![pixel_offset];
        }
    }

    let u16b = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
    let u32b = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
    let encode = |e: &TiffEntry| -> Vec<u8> {
        e.values
            .iter()
            .flat_map(|&v| {
                if e.field_type == TIFF_SHORT {
                    u16b(v as u16).to_vec()
                } else {
                    u32b(v).to_vec()
                }
            })
            .collect()
    };

    let mut out = Vec::new();
    out.extend_from_slice(if big_endian { b"MM" } else { b"II" });
    out.extend_from_slice(&u16b(42));
    out.extend_from_slice(&u32b(8));
    out.extend_from_slice(&u16b(entries.len() as u16));

    let mut overflow = Vec::new();
    for e in &entries {
        out.extend_from_slice(&u16b(e.tag));
        out.extend_from_slice(&u16b(e.field_type));
        out.extend_from_slice(&u32b(e.values.len() as u32));
        let bytes = encode(e);
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&u32b((overflow_start + overflow.len()) as u32));
            overflow.extend_from_slice(&bytes);
        }
    }
    out.extend_from_slice(&u32b(0));
    out.extend_from_slice(&overflow);
    out.extend_from_slice(pixel_data);
    out
}

/// Uncompressed 8-bit RGBA TIFF holding `rgba` row-major.
pub fn rgba8_tiff(big_endian: bool, width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    build_tiff(
        big_endian,
        &[
            TiffEntry::long(256, &[width]),
            TiffEntry::long(257, &[height]),
            TiffEntry::short(258, &[8, 8, 8, 8]),
            TiffEntry::short(259, &[1]),
            TiffEntry::short(262, &[2]),
            TiffEntry::short(277, &[4]),
            TiffEntry::short(284, &[1]),
            TiffEntry::short(338, &[2]),
        ],
        rgba,
    )
}

/// Uncompressed 16-bit RGBA TIFF; samples are written in the file's byte order.
pub fn rgba16_tiff(big_endian: bool, width: u32, height: u32, rgba: &[u16]) -> Vec<u8> {
    let data: Vec<u8> = rgba
        .iter()
        .flat_map(|&v| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() })
        .collect();
    build_tiff(
        big_endian,
        &[
            TiffEntry::long(256, &[width]),
            TiffEntry::long(257, &[height]),
            TiffEntry::short(258, &[16, 16, 16, 16]),
            TiffEntry::short(259, &[1]),
            TiffEntry::short(262, &[2]),
            TiffEntry::short(277, &[4]),
            TiffEntry::short(284, &[1]),
            TiffEntry::short(338, &[2]),
        ],
        &data,
    )
}

// =========================================================================
// FITS builder
// =========================================================================

fn fits_card(keyword: &str, value: &str) -> String {
    format!("{keyword:<8}= {value:>20}{:<50}", "")
}

/// Build a primary-HDU FITS stream.
///
/// `axes` become NAXIS/NAXISn cards; `extra` cards follow them verbatim.
/// Header and data are each padded to whole 2880-byte blocks.
pub fn build_fits(bitpix: i32, axes: &[u32], extra: &[(&str, &str)], data: &[u8]) -> Vec<u8> {
    let mut header = String::new();
    header.push_str(&fits_card("SIMPLE", "T"));
    header.push_str(&fits_card("BITPIX", &bitpix.to_string()));
    header.push_str(&fits_card("NAXIS", &axes.len().to_string()));
    for (i, n) in axes.iter().enumerate() {
        header.push_str(&fits_card(&format!("NAXIS{}", i + 1), &n.to_string()));
    }
    for (k, v) in extra {
        header.push_str(&fits_card(k, v));
    }
    header.push_str(&format!("{:<80}", "END"));

    let mut out = header.into_bytes();
    out.resize(out.len().div_ceil(2880) * 2880, b' ');
    out.extend_from_slice(data);
    out.resize(out.len().div_ceil(2880) * 2880, 0);
    out
}

/// 8-bit grayscale FITS image; `rows` are given top row first.
pub fn gray8_fits(width: u32, rows: &[&[u8]]) -> Vec<u8> {
    let data: Vec<u8> = rows.iter().rev().flat_map(|r| r.iter().copied()).collect();
    build_fits(8, &[width, rows.len() as u32], &[], &data)
}
