//! Image decoding, per-pixel math, filter compositing and text.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode standard formats** | `image` crate, lazily on first pixel read |
//! | **Decode TIFF** | `tiff` directory check + `image`'s TIFF codec |
//! | **Decode FITS** | `fitsio` (CFITSIO) primary HDU, size-checked before reading |
//! | **Vibrance / exposure / temperature** | row-parallel pixel math on `rayon` |
//! | **Filter chain** | [`RasterCompositor`]: LUTs, color matrices, Gaussian blur |
//! | **Text** | `fontdb` face lookup, `usvg`/`resvg` rasterized; `font8x8` fallback |
//!
//! The module is split into:
//! - **Buffer**: [`PixelBuffer`], the canonical RGBA8 layout
//! - **Calculations**: Pure functions for matrices, kernels and layout (unit testable)
//! - **Parameters**: Data structures describing text runs
//! - **Decoders**: [`decode`] plus the TIFF and FITS readers behind it
//! - **Compositor**: [`Compositor`] trait + [`RasterCompositor`]
//! - **Pixel ops / text**: buffer-consuming transforms

mod buffer;
mod calculations;
mod compositor;
mod decode;
mod fits;
mod params;
mod pixel_ops;
mod text;
mod tiff_ifd;

pub use buffer::{CHANNELS, PixelBuffer};
pub use compositor::{Compositor, RasterCompositor, apply_chain, gaussian_blur};
pub use decode::{
    CancelToken, DecodeError, DecodeOptions, DecodedSource, LazyRaster, SourceKind, decode,
    decode_reader, decode_with,
};
pub use fits::{FitsError, FitsHeader, FitsOptions, FitsStretch};
pub use params::{Anchor, MAX_FONT_SIZE, TextRun, TextStyle};
pub use pixel_ops::{
    PixelAdjustments, apply_exposure, apply_pixel_adjustments, apply_temperature, apply_vibrance,
};
pub use text::{FontBook, commit_text};
pub use tiff_ifd::{Compression, TiffDirectory};
