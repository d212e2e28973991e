//! Parameter types for text compositing.
//!
//! These structs describe *what* to draw, not *how*. A [`TextRun`] is built
//! when the user commits an "add text" action, handed to
//! [`commit_text`](super::text::commit_text), and dropped: once drawn it is
//! ordinary pixels.
//!
//! - [`TextRun`]: content, family, synthetic bold/italic flags, anchor.
//! - [`TextStyle`]: size, margin and fill shared by every run of a session.

use crate::adjustments::HexColor;

/// Where a run is anchored. Only the bottom-left baseline is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    /// Left edge at the margin, bottom edge `margin` pixels above the
    /// bottom of the buffer.
    #[default]
    BottomLeft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub content: String,
    pub font_family: String,
    pub bold: bool,
    pub italic: bool,
    pub anchor: Anchor,
}

impl TextRun {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            font_family: default_font_family(),
            bold: false,
            italic: false,
            anchor: Anchor::BottomLeft,
        }
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    pub fn bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }
}

pub(crate) fn default_font_family() -> String {
    "Arial".to_string()
}

/// Largest accepted line height in pixels.
pub const MAX_FONT_SIZE: u32 = 4096;

/// Rendering settings shared by all runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    /// Line height in pixels, at most [`MAX_FONT_SIZE`].
    pub font_size: u32,
    /// Distance from the left and bottom edges.
    pub margin: u32,
    pub fill: HexColor,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 50,
            margin: 10,
            fill: HexColor::WHITE,
        }
    }
}
