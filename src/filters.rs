//! Filter-chain builder: compositable parameters → ordered filter operations.
//!
//! [`build_filter_chain`] is a pure function of the [`AdjustmentSet`]. It
//! walks the set in iteration order, emits one [`FilterOp`] per compositable
//! parameter, skips per-pixel parameters entirely, and appends exactly one
//! drop-shadow built from the four shadow parameters as the last operation.
//!
//! Sharpen is an approximation: it is emitted as a second `contrast`
//! operation carrying the sharpen value, next to (not instead of) the
//! regular contrast. There is no unsharp-mask kernel behind it.
//!
//! The chain renders to a CSS `filter` string via [`FilterChain::to_css`] and
//! is rasterized by the compositor in [`crate::imaging`].

use crate::adjustments::{AdjustmentSet, HexColor, ParamGroup, ParamKey};
use std::fmt;

/// One compositing operation. Percentages are in percent (100 = 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOp {
    Brightness(f64),
    Contrast(f64),
    Saturate(f64),
    Grayscale(f64),
    Sepia(f64),
    HueRotate(f64),
    Blur(f64),
    Invert(f64),
    Opacity(f64),
    DropShadow {
        offset_x: f64,
        offset_y: f64,
        blur_radius: f64,
        color: HexColor,
    },
}

impl FilterOp {
    /// The CSS function name of this operation.
    pub fn name(&self) -> &'static str {
        match self {
            FilterOp::Brightness(_) => "brightness",
            FilterOp::Contrast(_) => "contrast",
            FilterOp::Saturate(_) => "saturate",
            FilterOp::Grayscale(_) => "grayscale",
            FilterOp::Sepia(_) => "sepia",
            FilterOp::HueRotate(_) => "hue-rotate",
            FilterOp::Blur(_) => "blur",
            FilterOp::Invert(_) => "invert",
            FilterOp::Opacity(_) => "opacity",
            FilterOp::DropShadow { .. } => "drop-shadow",
        }
    }

    /// Display suffix of the operation's scalar value.
    pub fn unit(&self) -> &'static str {
        match self {
            FilterOp::HueRotate(_) => "deg",
            FilterOp::Blur(_) | FilterOp::DropShadow { .. } => "px",
            _ => "%",
        }
    }

    /// True when applying this operation cannot change any pixel.
    pub fn is_identity(&self) -> bool {
        match *self {
            FilterOp::Brightness(v)
            | FilterOp::Contrast(v)
            | FilterOp::Saturate(v)
            | FilterOp::Opacity(v) => v == 100.0,
            FilterOp::Grayscale(v) | FilterOp::Sepia(v) | FilterOp::Invert(v) => v == 0.0,
            FilterOp::HueRotate(deg) => deg.rem_euclid(360.0) == 0.0,
            FilterOp::Blur(px) => px <= 0.0,
            // A zero-offset, unblurred shadow sits entirely under its source.
            FilterOp::DropShadow {
                offset_x,
                offset_y,
                blur_radius,
                ..
            } => offset_x == 0.0 && offset_y == 0.0 && blur_radius <= 0.0,
        }
    }

    fn from_param(key: ParamKey, value: f64) -> Option<Self> {
        let op = match key {
            ParamKey::Brightness => FilterOp::Brightness(value),
            ParamKey::Contrast => FilterOp::Contrast(value),
            ParamKey::Saturate => FilterOp::Saturate(value),
            ParamKey::Grayscale => FilterOp::Grayscale(value),
            ParamKey::Sepia => FilterOp::Sepia(value),
            ParamKey::HueRotate => FilterOp::HueRotate(value),
            ParamKey::Blur => FilterOp::Blur(value),
            ParamKey::Invert => FilterOp::Invert(value),
            ParamKey::Opacity => FilterOp::Opacity(value),
            // Approximation: sharpen is a second contrast boost.
            ParamKey::Sharpen => FilterOp::Contrast(value),
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Brightness(v)
            | FilterOp::Contrast(v)
            | FilterOp::Saturate(v)
            | FilterOp::Grayscale(v)
            | FilterOp::Sepia(v)
            | FilterOp::HueRotate(v)
            | FilterOp::Blur(v)
            | FilterOp::Invert(v)
            | FilterOp::Opacity(v) => write!(f, "{}({}{})", self.name(), v, self.unit()),
            FilterOp::DropShadow {
                offset_x,
                offset_y,
                blur_radius,
                color,
            } => write!(
                f,
                "drop-shadow({offset_x}px {offset_y}px {blur_radius}px {color})"
            ),
        }
    }
}

/// Ordered list of filter operations; order is significant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    ops: Vec<FilterOp>,
}

impl FilterChain {
    pub fn from_ops(ops: Vec<FilterOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[FilterOp] {
        &self.ops
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// True when no operation in the chain changes pixels.
    pub fn is_identity(&self) -> bool {
        self.ops.iter().all(FilterOp::is_identity)
    }

    /// The chain as a CSS `filter` property value.
    pub fn to_css(&self) -> String {
        self.ops
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<'a> IntoIterator for &'a FilterChain {
    type Item = &'a FilterOp;
    type IntoIter = std::slice::Iter<'a, FilterOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Build the compositing chain for the current adjustment values.
pub fn build_filter_chain(set: &AdjustmentSet) -> FilterChain {
    let mut ops: Vec<FilterOp> = set
        .iter()
        .filter(|p| p.key.group() == ParamGroup::Compositable)
        .filter_map(|p| FilterOp::from_param(p.key, p.value.as_number()?))
        .collect();

    ops.push(FilterOp::DropShadow {
        offset_x: set.number(ParamKey::ShadowX),
        offset_y: set.number(ParamKey::ShadowY),
        blur_radius: set.number(ParamKey::ShadowBlur),
        color: set.color(ParamKey::ShadowColor),
    });

    log::debug!("filter chain: {} ops", ops.len());
    FilterChain { ops }
}
