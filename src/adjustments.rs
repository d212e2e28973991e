//! The adjustment model: an ordered set of named, ranged parameters.
//!
//! [`AdjustmentSet::stock`] builds the full control surface with its
//! defaults. Every parameter is addressed by a stable [`ParamKey`]; the
//! display label and unit only matter to whoever draws the controls.
//!
//! Values are validated on the way in. A numeric value outside its range is
//! refused by [`AdjustmentSet::set`] (or pulled back into range by
//! [`AdjustmentSet::set_clamped`]); it is never stored out of range. Color
//! values are always `#rrggbb`.
//!
//! Keys fall into three groups (see [`ParamGroup`]): compositable keys become
//! filter operations, shadow keys collapse into a single drop-shadow, and
//! per-pixel keys are handled by the pixel engine only.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdjustmentError {
    #[error("{key}: value {value} outside [{min}, {max}]")]
    InvalidParameterValue {
        key: ParamKey,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{key}: invalid color {value:?} (expected #rrggbb)")]
    InvalidColor { key: ParamKey, value: String },
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("{key}: expected a {expected} value")]
    TypeMismatch {
        key: ParamKey,
        expected: &'static str,
    },
}

/// Stable identifier of an adjustment parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKey {
    Brightness,
    Contrast,
    Saturate,
    Grayscale,
    Sepia,
    HueRotate,
    Blur,
    Invert,
    Opacity,
    ShadowX,
    ShadowY,
    ShadowBlur,
    ShadowColor,
    Sharpen,
    Vibrance,
    Exposure,
    Temperature,
}

/// How a parameter reaches the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamGroup {
    /// Becomes one named operation in the filter chain.
    Compositable,
    /// One of the four inputs of the single drop-shadow operation.
    Shadow,
    /// Direct pixel arithmetic; never part of the filter chain.
    PerPixel,
}

impl ParamKey {
    pub const ALL: [ParamKey; 17] = [
        ParamKey::Brightness,
        ParamKey::Contrast,
        ParamKey::Saturate,
        ParamKey::Grayscale,
        ParamKey::Sepia,
        ParamKey::HueRotate,
        ParamKey::Blur,
        ParamKey::Invert,
        ParamKey::Opacity,
        ParamKey::ShadowX,
        ParamKey::ShadowY,
        ParamKey::ShadowBlur,
        ParamKey::ShadowColor,
        ParamKey::Sharpen,
        ParamKey::Vibrance,
        ParamKey::Exposure,
        ParamKey::Temperature,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::Brightness => "brightness",
            ParamKey::Contrast => "contrast",
            ParamKey::Saturate => "saturate",
            ParamKey::Grayscale => "grayscale",
            ParamKey::Sepia => "sepia",
            ParamKey::HueRotate => "hue-rotate",
            ParamKey::Blur => "blur",
            ParamKey::Invert => "invert",
            ParamKey::Opacity => "opacity",
            ParamKey::ShadowX => "shadowX",
            ParamKey::ShadowY => "shadowY",
            ParamKey::ShadowBlur => "shadowBlur",
            ParamKey::ShadowColor => "shadowColor",
            ParamKey::Sharpen => "sharpen",
            ParamKey::Vibrance => "vibrance",
            ParamKey::Exposure => "exposure",
            ParamKey::Temperature => "temperature",
        }
    }

    pub fn group(self) -> ParamGroup {
        match self {
            ParamKey::ShadowX | ParamKey::ShadowY | ParamKey::ShadowBlur | ParamKey::ShadowColor => {
                ParamGroup::Shadow
            }
            ParamKey::Vibrance | ParamKey::Exposure | ParamKey::Temperature => ParamGroup::PerPixel,
            _ => ParamGroup::Compositable,
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKey {
    type Err = AdjustmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AdjustmentError::UnknownParameter(s.to_string()))
    }
}

impl Serialize for ParamKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// An sRGB color written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HexColor(pub [u8; 3]);

impl HexColor {
    pub const BLACK: HexColor = HexColor([0, 0, 0]);
    pub const WHITE: HexColor = HexColor([255, 255, 255]);

    /// Parse `#rrggbb` (case-insensitive). Shorthand `#rgb` is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    pub fn rgb(self) -> [u8; 3] {
        self.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl Serialize for HexColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Current value of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Color(HexColor),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Color(_) => None,
        }
    }

    pub fn as_color(&self) -> Option<HexColor> {
        match self {
            ParamValue::Color(c) => Some(*c),
            ParamValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Color(c) => write!(f, "{c}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentParameter {
    pub name: &'static str,
    pub key: ParamKey,
    pub value: ParamValue,
    pub range: Range,
    pub unit: &'static str,
    #[serde(skip)]
    pub default: ParamValue,
}

impl AdjustmentParameter {
    fn number(
        name: &'static str,
        key: ParamKey,
        default: f64,
        (min, max): (f64, f64),
        unit: &'static str,
    ) -> Self {
        Self {
            name,
            key,
            value: ParamValue::Number(default),
            range: Range { min, max },
            unit,
            default: ParamValue::Number(default),
        }
    }

    fn color(name: &'static str, key: ParamKey, default: HexColor) -> Self {
        Self {
            name,
            key,
            value: ParamValue::Color(default),
            range: Range { min: 0.0, max: 1.0 },
            unit: "",
            default: ParamValue::Color(default),
        }
    }

    /// True when the value equals the stock default.
    pub fn is_default(&self) -> bool {
        self.value == self.default
    }

    /// Check a candidate value against this parameter's kind and range.
    pub fn validate(&self, value: &ParamValue) -> Result<(), AdjustmentError> {
        match (&self.default, value) {
            (ParamValue::Number(_), ParamValue::Number(n)) => {
                if n.is_finite() && self.range.contains(*n) {
                    Ok(())
                } else {
                    Err(AdjustmentError::InvalidParameterValue {
                        key: self.key,
                        value: *n,
                        min: self.range.min,
                        max: self.range.max,
                    })
                }
            }
            (ParamValue::Color(_), ParamValue::Color(_)) => Ok(()),
            (ParamValue::Number(_), ParamValue::Color(_)) => Err(AdjustmentError::TypeMismatch {
                key: self.key,
                expected: "numeric",
            }),
            (ParamValue::Color(_), ParamValue::Number(_)) => Err(AdjustmentError::TypeMismatch {
                key: self.key,
                expected: "color",
            }),
        }
    }
}

/// Ordered parameter collection with unique keys.
///
/// Iteration order is the order the filter chain is emitted in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AdjustmentSet {
    params: Vec<AdjustmentParameter>,
}

impl Default for AdjustmentSet {
    fn default() -> Self {
        Self::stock()
    }
}

impl AdjustmentSet {
    /// The stock control surface with neutral defaults.
    pub fn stock() -> Self {
        use AdjustmentParameter as P;
        use ParamKey as K;
        Self {
            params: vec![
                P::number("Brightness", K::Brightness, 100.0, (0.0, 200.0), "%"),
                P::number("Contrast", K::Contrast, 100.0, (0.0, 200.0), "%"),
                P::number("Saturation", K::Saturate, 100.0, (0.0, 200.0), "%"),
                P::number("Grayscale", K::Grayscale, 0.0, (0.0, 100.0), "%"),
                P::number("Sepia", K::Sepia, 0.0, (0.0, 100.0), "%"),
                P::number("Hue Rotate", K::HueRotate, 0.0, (0.0, 360.0), "deg"),
                P::number("Blur", K::Blur, 0.0, (0.0, 20.0), "px"),
                P::number("Invert", K::Invert, 0.0, (0.0, 100.0), "%"),
                P::number("Opacity", K::Opacity, 100.0, (0.0, 100.0), "%"),
                P::number("Shadow X", K::ShadowX, 0.0, (-50.0, 50.0), "px"),
                P::number("Shadow Y", K::ShadowY, 0.0, (-50.0, 50.0), "px"),
                P::number("Shadow Blur", K::ShadowBlur, 0.0, (0.0, 50.0), "px"),
                P::color("Shadow Color", K::ShadowColor, HexColor::BLACK),
                // 100 is neutral: sharpen is rendered as contrast(sharpen%).
                P::number("Sharpen", K::Sharpen, 100.0, (0.0, 100.0), ""),
                P::number("Vibrance", K::Vibrance, 0.0, (-100.0, 100.0), ""),
                P::number("Exposure", K::Exposure, 0.0, (-100.0, 100.0), ""),
                P::number("Temperature", K::Temperature, 0.0, (-100.0, 100.0), ""),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdjustmentParameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, key: ParamKey) -> Option<&AdjustmentParameter> {
        self.params.iter().find(|p| p.key == key)
    }

    /// Parameter at a position in iteration order (control-surface selection).
    pub fn at(&self, index: usize) -> Option<&AdjustmentParameter> {
        self.params.get(index)
    }

    pub fn position(&self, key: ParamKey) -> Option<usize> {
        self.params.iter().position(|p| p.key == key)
    }

    /// Numeric value of `key`, or `0.0` if the key is absent or a color.
    pub fn number(&self, key: ParamKey) -> f64 {
        self.get(key)
            .and_then(|p| p.value.as_number())
            .unwrap_or(0.0)
    }

    /// Color value of `key`, or black if the key is absent or numeric.
    pub fn color(&self, key: ParamKey) -> HexColor {
        self.get(key)
            .and_then(|p| p.value.as_color())
            .unwrap_or(HexColor::BLACK)
    }

    fn get_mut(&mut self, key: ParamKey) -> Result<&mut AdjustmentParameter, AdjustmentError> {
        self.params
            .iter_mut()
            .find(|p| p.key == key)
            .ok_or_else(|| AdjustmentError::UnknownParameter(key.to_string()))
    }

    /// Store a value, refusing anything out of range or of the wrong kind.
    ///
    /// Returns whether the stored value changed.
    pub fn set(&mut self, key: ParamKey, value: ParamValue) -> Result<bool, AdjustmentError> {
        let param = self.get_mut(key)?;
        param.validate(&value)?;
        let changed = param.value != value;
        param.value = value;
        Ok(changed)
    }

    /// Store a numeric value, clamping it into range first.
    pub fn set_clamped(&mut self, key: ParamKey, value: f64) -> Result<bool, AdjustmentError> {
        let param = self.get_mut(key)?;
        if value.is_nan() {
            return Err(AdjustmentError::InvalidParameterValue {
                key,
                value,
                min: param.range.min,
                max: param.range.max,
            });
        }
        let clamped = ParamValue::Number(param.range.clamp(value));
        param.validate(&clamped)?;
        let changed = param.value != clamped;
        param.value = clamped;
        Ok(changed)
    }

    /// Store a color from its `#rrggbb` form.
    pub fn set_color(&mut self, key: ParamKey, value: &str) -> Result<bool, AdjustmentError> {
        let color = HexColor::parse(value).ok_or_else(|| AdjustmentError::InvalidColor {
            key,
            value: value.to_string(),
        })?;
        self.set(key, ParamValue::Color(color))
    }

    pub fn reset(&mut self, key: ParamKey) -> Result<bool, AdjustmentError> {
        let param = self.get_mut(key)?;
        let changed = param.value != param.default;
        param.value = param.default;
        Ok(changed)
    }

    /// Replace the startup default of `key` and move the value to it.
    pub fn set_default(&mut self, key: ParamKey, value: ParamValue) -> Result<(), AdjustmentError> {
        let param = self.get_mut(key)?;
        param.validate(&value)?;
        param.default = value;
        param.value = value;
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for param in &mut self.params {
            param.value = param.default;
        }
    }

    /// True when every parameter sits at its stock default.
    pub fn is_neutral(&self) -> bool {
        self.params.iter().all(AdjustmentParameter::is_default)
    }

    /// JSON snapshot of the control surface for a rendering layer.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
