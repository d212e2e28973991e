//! # Photo Adjust
//!
//! An image ingestion and adjustment pipeline. Load a raster (standard
//! formats, TIFF, or FITS), adjust it through a chain of filters and
//! per-pixel transforms, optionally burn in a line of text, and flatten the
//! result into one RGBA8 buffer ready for PNG encoding.
//!
//! # Architecture: Decode, Adjust, Flatten
//!
//! ```text
//! 1. Decode    bytes + MIME   →  DecodedSource       (canonical RGBA8, lazy for standard formats)
//! 2. Adjust    AdjustmentSet  →  FilterChain         (declarative, compositable keys)
//!                             →  adjusted buffer     (vibrance, exposure, temperature)
//! 3. Flatten   buffer + chain →  ExportableBuffer    (deterministic raster compositing)
//! ```
//!
//! Adjustments are split in two because some parameters are compositing
//! operations with a standard definition (brightness, blur, drop-shadow)
//! while others only exist as pixel arithmetic. The first group is kept
//! declarative until export; the second is rerun from the decoded baseline
//! on every recompute.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`adjustments`] | Ordered, ranged parameters with validation |
//! | [`filters`] | Filter-chain builder and CSS rendering |
//! | [`imaging`] | Pixel buffer, decoders, compositor, per-pixel ops, text |
//! | [`export`] | Flattening, PNG encoding, download naming |
//! | [`session`] | Owned-state controller: get/set by key, loads, recompute |
//! | [`config`] | `config.toml` loading, validation and merging |
//!
//! # Design Decisions
//!
//! ## Explicit Recompute
//!
//! Nothing recomputes on its own. Mutations mark the [`session::Session`]
//! dirty and notify subscribers; the host calls
//! [`recompute`](session::Session::recompute) when it wants fresh pixels.
//!
//! ## Last Writer Wins
//!
//! Loads are numbered. Only the newest load can commit; older ones are
//! cancelled at their next stage boundary and discarded when they settle.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and installs no logger.

pub mod adjustments;
pub mod config;
pub mod export;
pub mod filters;
pub mod imaging;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;
