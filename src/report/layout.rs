//! Cursor-based page writer on top of `printpdf`.
//!
//! Coordinates are millimetres measured from the top-left corner of the page
//! (the PDF origin is bottom-left; conversion happens here only). Font sizes
//! are points. Text widths are estimated from an average Helvetica advance
//! since built-in fonts expose no metrics.
//!
//! Every text run and image placement is also recorded in a transcript so a
//! generated document can be inspected without parsing the PDF. The
//! transcript keeps logical text; mirrored pages write shaped, visually
//! ordered glyphs.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use printpdf::path::PaintMode;
use printpdf::*;

use super::raster::{EncodedRaster, RasterError};
use super::shaping::visual_rtl;

pub const PT_TO_MM: f32 = 0.352_778;

/// Average glyph advance as a fraction of the em size.
const AVG_GLYPH_EM: f32 = 0.5;
const BOLD_GLYPH_EM: f32 = 0.55;
const LINE_SPACING: f32 = 1.4;
const EMBED_DPI: f32 = 300.0;

/// DejaVu Sans, covering Latin and the Arabic presentation forms.
/// License: assets/fonts/LICENSE-DejaVu.txt.
static BUNDLED_REGULAR: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
static BUNDLED_BOLD: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("PDF image error: {0}")]
    Image(#[from] RasterError),

    #[error("PDF save error: {0}")]
    Save(String),
}

// ─── Geometry & style ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_x: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
}

impl PageGeometry {
    pub const A4: Self = Self {
        width: 210.0,
        height: 297.0,
        margin_x: 20.0,
        margin_top: 20.0,
        margin_bottom: 20.0,
    };

    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin_x
    }

    /// Lowest y a block may reach.
    pub fn bottom_limit(&self) -> f32 {
        self.height - self.margin_bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor(pub u8, pub u8, pub u8);

impl RgbColor {
    pub const BLACK: Self = Self(0, 0, 0);
    pub const WHITE: Self = Self(255, 255, 255);
    pub const GREY: Self = Self(150, 150, 150);
    pub const SLATE: Self = Self(100, 116, 139);
    pub const MEDICAL_BLUE: Self = Self(41, 128, 185);
    pub const RISK_RED: Self = Self(231, 76, 60);
    pub const SAFE_GREEN: Self = Self(39, 174, 96);
    pub const PALE_GREEN: Self = Self(232, 246, 239);
    pub const PALE_SLATE: Self = Self(241, 245, 249);

    fn to_pdf(self) -> Color {
        Color::Rgb(Rgb::new(
            f32::from(self.0) / 255.0,
            f32::from(self.1) / 255.0,
            f32::from(self.2) / 255.0,
            None,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    fn mirrored(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Center => Self::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub bold: bool,
    pub color: RgbColor,
}

impl TextStyle {
    pub fn new(size: f32) -> Self {
        Self {
            size,
            bold: false,
            color: RgbColor::BLACK,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn color(mut self, color: RgbColor) -> Self {
        self.color = color;
        self
    }

    /// Vertical advance per wrapped line, in mm.
    pub fn line_height(&self) -> f32 {
        self.size * PT_TO_MM * LINE_SPACING
    }
}

/// Estimated rendered width of `text` in mm.
pub fn estimate_text_width(text: &str, style: &TextStyle) -> f32 {
    let em = if style.bold { BOLD_GLYPH_EM } else { AVG_GLYPH_EM };
    text.chars().count() as f32 * style.size * PT_TO_MM * em
}

/// How many characters fit on one line of `max_width` mm.
pub fn chars_per_line(max_width: f32, style: &TextStyle) -> usize {
    let em = if style.bold { BOLD_GLYPH_EM } else { AVG_GLYPH_EM };
    let per_char = style.size * PT_TO_MM * em;
    ((max_width / per_char).floor() as usize).max(1)
}

/// Word wrap on character counts. Explicit newlines start a new line, blank
/// lines are kept as empty lines, and words longer than the line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        if paragraph.trim().is_empty() {
            // blank line between paragraphs
            if !lines.is_empty() {
                lines.push(String::new());
            }
            continue;
        }
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if current_len > 0 && current_len + 1 + word.len() > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }
        if current_len > 0 {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Font resource applied to the whole document before any text is written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FontSource {
    /// Helvetica, WinAnsi text only.
    #[default]
    Builtin,
    /// Embedded DejaVu Sans regular and bold.
    Bundled,
    /// TrueType file used for both weights; falls back to `Bundled`.
    External(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    pub geometry: PageGeometry,
    /// Right-to-left: text anchors and alignments are mirrored.
    pub mirrored: bool,
    pub font: FontSource,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            geometry: PageGeometry::A4,
            mirrored: false,
            font: FontSource::Builtin,
        }
    }
}

// ─── Transcript ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// 1-based page number.
    pub page: usize,
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub align: Align,
    pub size: f32,
    pub bold: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub page: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Finished PDF plus what was placed on it.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub text_runs: Vec<TextRun>,
    pub images: Vec<ImagePlacement>,
    /// A TrueType font (bundled or configured) was embedded.
    pub external_font: bool,
}

impl GeneratedDocument {
    pub fn texts(&self) -> Vec<&str> {
        self.text_runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.text_runs.iter().any(|run| run.text.contains(needle))
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

pub struct LayoutEngine {
    doc: PdfDocumentReference,
    pages: Vec<(PdfPageIndex, PdfLayerIndex)>,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    external_font: bool,
    geometry: PageGeometry,
    mirrored: bool,
    cursor: f32,
    text_runs: Vec<TextRun>,
    images: Vec<ImagePlacement>,
}

impl LayoutEngine {
    pub fn new(title: &str, options: LayoutOptions) -> Result<Self, LayoutError> {
        let geometry = options.geometry;
        let (doc, page1, layer1) = PdfDocument::new(
            title,
            Mm(geometry.width),
            Mm(geometry.height),
            "Layer 1",
        );

        let (regular, bold, external_font) = match &options.font {
            FontSource::Builtin => (
                doc.add_builtin_font(BuiltinFont::Helvetica)
                    .map_err(|e| LayoutError::Font(e.to_string()))?,
                doc.add_builtin_font(BuiltinFont::HelveticaBold)
                    .map_err(|e| LayoutError::Font(e.to_string()))?,
                false,
            ),
            FontSource::Bundled => {
                let (regular, bold) = load_bundled_fonts(&doc)?;
                (regular, bold, true)
            }
            FontSource::External(path) => match load_font_file(&doc, path) {
                Ok(font) => (font.clone(), font, true),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Configured font unusable, using bundled font");
                    let (regular, bold) = load_bundled_fonts(&doc)?;
                    (regular, bold, true)
                }
            },
        };

        Ok(Self {
            doc,
            pages: vec![(page1, layer1)],
            regular,
            bold,
            external_font,
            geometry,
            mirrored: options.mirrored,
            cursor: geometry.margin_top,
            text_runs: Vec::new(),
            images: Vec::new(),
        })
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn uses_external_font(&self) -> bool {
        self.external_font
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn set_cursor(&mut self, y: f32) {
        self.cursor = y;
    }

    pub fn advance(&mut self, dy: f32) {
        self.cursor += dy;
    }

    /// Start a new page when a block of `height` mm would cross the bottom
    /// margin. Returns true when a page was added.
    pub fn ensure_space(&mut self, height: f32) -> bool {
        if self.cursor + height <= self.geometry.bottom_limit() {
            return false;
        }
        self.new_page();
        true
    }

    pub fn new_page(&mut self) {
        let label = format!("Page {}", self.pages.len() + 1);
        let (page, layer) = self.doc.add_page(
            Mm(self.geometry.width),
            Mm(self.geometry.height),
            label,
        );
        self.pages.push((page, layer));
        self.cursor = self.geometry.margin_top;
        tracing::debug!(page = self.pages.len(), "Layout page added");
    }

    fn layer(&self) -> PdfLayerReference {
        let (page, layer) = self.pages[self.pages.len() - 1];
        self.doc.get_page(page).get_layer(layer)
    }

    fn pdf_y(&self, y: f32) -> Mm {
        Mm(self.geometry.height - y)
    }

    /// Single text run; no wrapping.
    pub fn write_heading(&mut self, text: &str, x: f32, y: f32, align: Align, style: TextStyle) {
        let (x, align) = if self.mirrored {
            (self.geometry.width - x, align.mirrored())
        } else {
            (x, align)
        };
        self.put_text(text, x, y, align, style);
    }

    /// Text attached to a graphic (caption, signature line). Never mirrored,
    /// so it stays with the graphic it labels.
    pub fn write_pinned(&mut self, text: &str, x: f32, y: f32, align: Align, style: TextStyle) {
        self.put_text(text, x, y, align, style);
    }

    fn put_text(&mut self, text: &str, x: f32, y: f32, align: Align, style: TextStyle) {
        let glyphs = if self.mirrored {
            visual_rtl(text)
        } else {
            text.to_string()
        };
        let width = estimate_text_width(&glyphs, &style);
        let left = match align {
            Align::Left => x,
            Align::Center => x - width / 2.0,
            Align::Right => x - width,
        };

        let layer = self.layer();
        let font = if style.bold { &self.bold } else { &self.regular };
        layer.set_fill_color(style.color.to_pdf());
        layer.use_text(glyphs, style.size, Mm(left), self.pdf_y(y), font);
        layer.set_fill_color(RgbColor::BLACK.to_pdf());

        self.text_runs.push(TextRun {
            page: self.pages.len(),
            text: text.to_string(),
            x,
            y,
            align,
            size: style.size,
            bold: style.bold,
        });
    }

    /// Wrapped block starting at baseline `y`; returns the number of lines.
    /// The caller advances by `lines * style.line_height()`.
    pub fn write_paragraph(&mut self, text: &str, x: f32, y: f32, max_width: f32, style: TextStyle) -> usize {
        let lines = wrap_text(text, chars_per_line(max_width, &style));
        let step = style.line_height();
        for (i, line) in lines.iter().enumerate() {
            if !line.is_empty() {
                self.write_heading(line, x, y + i as f32 * step, Align::Left, style);
            }
        }
        lines.len()
    }

    /// Embed a raster with its top-left corner at (x, y), scaled to w × h mm.
    pub fn place_image(&mut self, raster: &EncodedRaster, x: f32, y: f32, width: f32, height: f32) -> Result<(), LayoutError> {
        let decoded = raster.decode()?;
        let rgb = ::image::DynamicImage::ImageRgb8(decoded.to_rgb8());
        let native_w = raster.width().max(1) as f32 / EMBED_DPI * 25.4;
        let native_h = raster.height().max(1) as f32 / EMBED_DPI * 25.4;

        let pdf_image = Image::from_dynamic_image(&rgb);
        pdf_image.add_to_layer(
            self.layer(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(self.pdf_y(y + height)),
                scale_x: Some(width / native_w),
                scale_y: Some(height / native_h),
                dpi: Some(EMBED_DPI),
                ..Default::default()
            },
        );

        self.images.push(ImagePlacement {
            page: self.pages.len(),
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    /// Horizontal rule at y between x1 and x2.
    pub fn draw_rule(&mut self, x1: f32, x2: f32, y: f32, color: RgbColor) {
        let layer = self.layer();
        layer.set_outline_color(color.to_pdf());
        layer.set_outline_thickness(0.5);
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), self.pdf_y(y)), false),
                (Point::new(Mm(x2), self.pdf_y(y)), false),
            ],
            is_closed: false,
        });
    }

    /// Filled rectangle with its top-left corner at (x, y).
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: RgbColor) {
        let layer = self.layer();
        layer.set_fill_color(color.to_pdf());
        layer.add_rect(
            Rect::new(Mm(x), self.pdf_y(y + height), Mm(x + width), self.pdf_y(y))
                .with_mode(PaintMode::Fill),
        );
        layer.set_fill_color(RgbColor::BLACK.to_pdf());
    }

    pub fn finish(self) -> Result<GeneratedDocument, LayoutError> {
        let page_count = self.pages.len();
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| LayoutError::Save(e.to_string()))?;
        let bytes = buf
            .into_inner()
            .map_err(|e| LayoutError::Save(format!("PDF buffer error: {e}")))?;

        Ok(GeneratedDocument {
            bytes,
            page_count,
            text_runs: self.text_runs,
            images: self.images,
            external_font: self.external_font,
        })
    }
}

fn load_bundled_fonts(doc: &PdfDocumentReference) -> Result<(IndirectFontRef, IndirectFontRef), LayoutError> {
    let regular = doc
        .add_external_font(BUNDLED_REGULAR)
        .map_err(|e| LayoutError::Font(e.to_string()))?;
    let bold = doc
        .add_external_font(BUNDLED_BOLD)
        .map_err(|e| LayoutError::Font(e.to_string()))?;
    Ok((regular, bold))
}

fn load_font_file(doc: &PdfDocumentReference, path: &Path) -> Result<IndirectFontRef, LayoutError> {
    let file = File::open(path).map_err(|e| LayoutError::Font(e.to_string()))?;
    doc.add_external_font(BufReader::new(file))
        .map_err(|e| LayoutError::Font(e.to_string()))
}
