//! Editor configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults
//! are the base layer; a user file overrides just the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [adjustments]
//! # Startup value (and reset target) per parameter key
//! # exposure = 10
//! # shadowColor = "#202020"
//!
//! [text]
//! font_family = "Arial"     # Falls back to an installed sans-serif face
//! system_fonts = true       # Look families up among installed fonts
//! font_dirs = []            # Extra directories scanned for font files
//! font_size = 50            # Line height in pixels, at most 4096
//! margin = 10               # Distance from the left and bottom edges
//! fill = "#ffffff"
//!
//! [fits]
//! stretch = "linear"        # "linear" (per-plane min/max) or "clamp"
//! flip_vertical = true      # FITS rows are stored bottom-up
//!
//! [processing]
//! max_threads = 4           # Worker threads (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::adjustments::{AdjustmentSet, HexColor, ParamKey, ParamValue};
use crate::imaging::{DecodeOptions, FitsOptions, FitsStretch, MAX_FONT_SIZE, TextStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Editor configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Startup overrides keyed by parameter key (`brightness`, `shadowColor`, ...).
    pub adjustments: BTreeMap<String, AdjustmentDefault>,
    /// Text overlay style.
    pub text: TextConfig,
    /// FITS sample mapping.
    pub fits: FitsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

/// A startup value: a number, or a `#rrggbb` color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdjustmentDefault {
    Number(f64),
    Color(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextConfig {
    pub font_family: String,
    /// Include the installed system fonts when resolving families.
    pub system_fonts: bool,
    pub font_dirs: Vec<PathBuf>,
    pub font_size: u32,
    pub margin: u32,
    pub fill: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            system_fonts: true,
            font_dirs: Vec::new(),
            font_size: 50,
            margin: 10,
            fill: "#ffffff".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitsConfig {
    pub stretch: FitsStretch,
    pub flip_vertical: bool,
}

impl Default for FitsConfig {
    fn default() -> Self {
        Self {
            stretch: FitsStretch::Linear,
            flip_vertical: true,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of worker threads for per-pixel work.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Initialize the global rayon pool from processing config.
///
/// Returns `false` when a global pool already exists (first caller wins).
pub fn init_thread_pool(config: &ProcessingConfig) -> bool {
    let threads = effective_threads(config);
    let installed = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .is_ok();
    if installed {
        log::debug!("rayon pool: {threads} threads");
    }
    installed
}

impl EditorConfig {
    /// Validate values the type system cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.adjustment_set()?;
        if self.text.font_family.trim().is_empty() {
            return Err(ConfigError::Validation(
                "text.font_family must not be empty".into(),
            ));
        }
        if self.text.font_size == 0 {
            return Err(ConfigError::Validation(
                "text.font_size must be non-zero".into(),
            ));
        }
        if self.text.font_size > MAX_FONT_SIZE {
            return Err(ConfigError::Validation(format!(
                "text.font_size {} exceeds {MAX_FONT_SIZE}",
                self.text.font_size
            )));
        }
        if let Some(dir) = self.text.font_dirs.iter().find(|d| !d.is_dir()) {
            return Err(ConfigError::Validation(format!(
                "text.font_dirs entry {} is not a directory",
                dir.display()
            )));
        }
        if HexColor::parse(&self.text.fill).is_none() {
            return Err(ConfigError::Validation(format!(
                "text.fill {:?} is not #rrggbb",
                self.text.fill
            )));
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// The stock adjustment set with this config's startup overrides.
    pub fn adjustment_set(&self) -> Result<AdjustmentSet, ConfigError> {
        let invalid = |e: crate::adjustments::AdjustmentError| {
            ConfigError::Validation(format!("adjustments: {e}"))
        };
        let mut set = AdjustmentSet::stock();
        for (name, default) in &self.adjustments {
            let key: ParamKey = name.parse().map_err(invalid)?;
            let value = match default {
                AdjustmentDefault::Number(n) => ParamValue::Number(*n),
                AdjustmentDefault::Color(s) => ParamValue::Color(HexColor::parse(s).ok_or_else(
                    || ConfigError::Validation(format!("adjustments.{name}: {s:?} is not #rrggbb")),
                )?),
            };
            set.set_default(key, value).map_err(invalid)?;
        }
        Ok(set)
    }

    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            font_size: self.text.font_size,
            margin: self.text.margin,
            fill: HexColor::parse(&self.text.fill).unwrap_or(HexColor::WHITE),
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            fits: FitsOptions {
                stretch: self.fits.stretch,
                flip_vertical: self.fits.flip_vertical,
            },
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(EditorConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EditorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EditorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<EditorConfig, ConfigError> {
    let config = resolve_config(stock_defaults_value(), load_raw_config(dir)?)?;
    log::debug!("config loaded from {}", dir.display());
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
pub fn stock_config_toml() -> &'static str {
    r##"# Photo Adjust Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Adjustment startup values
# ---------------------------------------------------------------------------
# Each entry replaces the stock default (and reset target) of one parameter.
# Keys: brightness, contrast, saturate, grayscale, sepia, hue-rotate, blur,
# invert, opacity, shadowX, shadowY, shadowBlur, shadowColor, sharpen,
# vibrance, exposure, temperature. Values must lie within the parameter's
# range; shadowColor takes "#rrggbb".
[adjustments]
# brightness = 100
# shadowColor = "#000000"

# ---------------------------------------------------------------------------
# Text overlay
# ---------------------------------------------------------------------------
[text]
# Requested family. When no installed face carries it, text falls back to
# the sans-serif face, then to the first face found. With no faces at all
# the built-in bitmap face is used.
font_family = "Arial"

# Look families up among the installed system fonts.
system_fonts = true

# Extra directories scanned (recursively) for font files.
font_dirs = []

# Line height in pixels, 1 to 4096.
font_size = 50

# Distance from the left and bottom edges, in pixels.
margin = 10

# Fill color.
fill = "#ffffff"

# ---------------------------------------------------------------------------
# FITS decoding
# ---------------------------------------------------------------------------
[fits]
# How sample values map to 0-255:
#   "linear" - stretch each plane's min..max to 0..255
#   "clamp"  - round and clamp values into 0..255 unchanged
stretch = "linear"

# FITS stores the bottom row first; flip so the top row comes first.
flip_vertical = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum worker threads for per-pixel adjustments and compositing.
# Omit to use all CPU cores. Values above the core count are clamped.
# max_threads = 4
"##
}
