//! Text overlay: burns a [`TextRun`] into a buffer.
//!
//! The run's family is looked up in a [`FontBook`], a `fontdb` database
//! holding the system fonts plus any configured font directories. A family
//! the book lacks falls back to the generic sans-serif face and then to the
//! book's first face, so the same request always lands on the same face.
//! The line is laid out as a one-element SVG document, rasterized by
//! `resvg` into a transparent pixmap the size of the buffer and composited
//! source-over.
//!
//! When the book has no faces, or the document does not parse, glyphs come
//! from the embedded 8×8 bitmap face in `font8x8` instead, scaled by an
//! integer factor so the line height is close to the requested font size.
//! There bold and italic are synthetic: bold draws every glyph a second
//! time a few pixels to the right, italic shears glyph rows so the top
//! leans right.
//!
//! Either way the run sits on a single line anchored at the bottom-left
//! margin, filled with the style color, without stroke or wrapping.
//! Pixels past the buffer edges are clipped.

use super::buffer::PixelBuffer;
use super::calculations::{glyph_scale, text_origin};
use super::params::{Anchor, MAX_FONT_SIZE, TextRun, TextStyle};
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tiny_skia::{Pixmap, Transform};
use usvg::fontdb::{Database, Family, ID, Query, Stretch, Style, Weight};
use usvg::{Options, Tree};

const GLYPH: u32 = 8;
/// Baseline position as a fraction of the line height, from the line top.
const ASCENT: f32 = 0.8;

/// Font faces available to text overlays.
#[derive(Clone)]
pub struct FontBook {
    db: Arc<Database>,
}

impl FontBook {
    /// A book with no faces. Text drawn with it uses the bitmap face.
    pub fn empty() -> Self {
        Self {
            db: Arc::new(Database::new()),
        }
    }

    /// The installed system fonts, scanned once per process.
    pub fn system() -> Self {
        static SYSTEM: OnceLock<Arc<Database>> = OnceLock::new();
        let db = SYSTEM.get_or_init(|| {
            let mut db = Database::new();
            db.load_system_fonts();
            log::debug!("font book: {} system faces", db.len());
            Arc::new(db)
        });
        Self { db: Arc::clone(db) }
    }

    /// System fonts when `system` is set, plus every face found under `dirs`.
    pub fn load(system: bool, dirs: &[PathBuf]) -> Self {
        if dirs.is_empty() {
            return if system { Self::system() } else { Self::empty() };
        }
        let mut db = if system {
            Database::clone(&Self::system().db)
        } else {
            Database::new()
        };
        for dir in dirs {
            db.load_fonts_dir(dir);
        }
        log::debug!("font book: {} faces after {} extra dirs", db.len(), dirs.len());
        Self { db: Arc::new(db) }
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Family name of the face that will draw `family`.
    ///
    /// Names match case-insensitively. An unknown family resolves to the
    /// sans-serif face, else to the first face loaded. `None` only when the
    /// book is empty.
    pub fn resolve(&self, family: &str, bold: bool, italic: bool) -> Option<String> {
        let installed = self
            .db
            .faces()
            .flat_map(|face| face.families.iter())
            .map(|(name, _)| name.as_str())
            .find(|name| name.eq_ignore_ascii_case(family))
            .unwrap_or(family);
        let id = self
            .lookup(&[Family::Name(installed)], bold, italic)
            .or_else(|| self.lookup(&[Family::SansSerif], bold, italic))
            .or_else(|| self.db.faces().next().map(|face| face.id))?;
        self.db
            .face(id)?
            .families
            .first()
            .map(|(name, _)| name.clone())
    }

    fn lookup(&self, families: &[Family<'_>], bold: bool, italic: bool) -> Option<ID> {
        self.db.query(&Query {
            families,
            weight: if bold { Weight::BOLD } else { Weight::NORMAL },
            stretch: Stretch::Normal,
            style: if italic { Style::Italic } else { Style::Normal },
        })
    }
}

impl fmt::Debug for FontBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontBook").field("faces", &self.db.len()).finish()
    }
}

/// Draw `run` onto `buffer` and return it.
///
/// Empty content returns the buffer untouched. Font sizes above
/// [`MAX_FONT_SIZE`] are capped.
pub fn commit_text(
    mut buffer: PixelBuffer,
    run: &TextRun,
    style: &TextStyle,
    fonts: &FontBook,
) -> PixelBuffer {
    if run.content.is_empty() || buffer.is_empty() {
        return buffer;
    }
    let font_size = style.font_size.clamp(1, MAX_FONT_SIZE);

    let Some(face) = fonts.resolve(&run.font_family, run.bold, run.italic) else {
        log::warn!(
            "no font faces available; drawing {:?} with the built-in bitmap face",
            run.font_family
        );
        draw_bitmap(&mut buffer, run, style, font_size);
        return buffer;
    };
    if !face.eq_ignore_ascii_case(&run.font_family) {
        log::warn!(
            "font family {:?} unavailable; drawing with {face:?}",
            run.font_family
        );
    }

    let svg = svg_document(buffer.width(), buffer.height(), run, style, font_size, &face);
    match rasterize(&svg, buffer.width(), buffer.height(), fonts) {
        Ok(layer) => {
            log::debug!(
                "text {:?} in {face:?} at {font_size}px bold={} italic={}",
                run.content,
                run.bold,
                run.italic
            );
            composite(&mut buffer, &layer);
        }
        Err(e) => {
            log::warn!("text layout failed ({e}); drawing with the built-in bitmap face");
            draw_bitmap(&mut buffer, run, style, font_size);
        }
    }
    buffer
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn svg_document(
    width: u32,
    height: u32,
    run: &TextRun,
    style: &TextStyle,
    font_size: u32,
    face: &str,
) -> String {
    let (left, top) = match run.anchor {
        Anchor::BottomLeft => text_origin(height, font_size, style.margin),
    };
    let baseline = top as f32 + font_size as f32 * ASCENT;
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}">"#,
            r#"<text x="{left}" y="{baseline}" font-family="{family}" font-size="{font_size}" "#,
            r#"font-weight="{weight}" font-style="{slant}" fill="{fill}" xml:space="preserve">"#,
            "{content}</text></svg>",
        ),
        width = width,
        height = height,
        left = left,
        baseline = baseline,
        font_size = font_size,
        family = escape_xml(face),
        weight = if run.bold { "bold" } else { "normal" },
        slant = if run.italic { "italic" } else { "normal" },
        fill = style.fill,
        content = escape_xml(&run.content),
    )
}

fn rasterize(svg: &str, width: u32, height: u32, fonts: &FontBook) -> Result<Pixmap, String> {
    let options = Options {
        fontdb: Arc::clone(&fonts.db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).map_err(|e| e.to_string())?;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| format!("cannot allocate a {width}x{height} text layer"))?;
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());
    Ok(pixmap)
}

/// Source-over of a premultiplied layer onto the buffer.
fn composite(buffer: &mut PixelBuffer, layer: &Pixmap) {
    let over = |src: u8, dst: u8, inv: u32| -> u8 {
        (src as u32 + (dst as u32 * inv + 127) / 255).min(255) as u8
    };
    for (dst, src) in buffer.samples_mut().chunks_exact_mut(4).zip(layer.pixels()) {
        if src.alpha() == 0 {
            continue;
        }
        let inv = 255 - src.alpha() as u32;
        dst[0] = over(src.red(), dst[0], inv);
        dst[1] = over(src.green(), dst[1], inv);
        dst[2] = over(src.blue(), dst[2], inv);
        dst[3] = over(src.alpha(), dst[3], inv);
    }
}

fn glyph_for(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
}

fn draw_bitmap(buffer: &mut PixelBuffer, run: &TextRun, style: &TextStyle, font_size: u32) {
    let scale = glyph_scale(font_size) as i64;
    let line_height = GLYPH.saturating_mul(scale as u32);
    let (left, top) = match run.anchor {
        Anchor::BottomLeft => text_origin(buffer.height(), line_height, style.margin),
    };
    let bold_offset = if run.bold { (scale / 3).max(1) } else { 0 };
    let [r, g, b] = style.fill.rgb();
    let fill = [r, g, b, 255];

    log::debug!(
        "bitmap text {:?} at ({left}, {top}) scale={scale} bold={} italic={}",
        run.content,
        run.bold,
        run.italic
    );

    let mut put = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x <= u32::MAX as i64 && y <= u32::MAX as i64 {
            buffer.put_pixel(x as u32, y as u32, fill);
        }
    };

    let advance = GLYPH as i64 * scale + bold_offset;
    for (i, ch) in run.content.chars().enumerate() {
        let Some(glyph) = glyph_for(ch) else {
            continue;
        };
        let glyph_left = left + i as i64 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH as i64 {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                for sy in 0..scale {
                    let dy = row as i64 * scale + sy;
                    // Rows near the top lean furthest right
                    let shear = if run.italic {
                        (line_height as i64 - 1 - dy) / 4
                    } else {
                        0
                    };
                    for sx in 0..scale {
                        let x = glyph_left + col * scale + sx + shear;
                        let y = top + dy;
                        put(x, y);
                        if bold_offset > 0 {
                            put(x + bold_offset, y);
                        }
                    }
                }
            }
        }
    }
}
