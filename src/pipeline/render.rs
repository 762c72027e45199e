//! PDF assembly: lay fetched cards onto A4 pages with printpdf.
//!
//! ## Why spawn_blocking?
//!
//! Building the op streams and serialising the document is CPU-bound; running
//! it under `tokio::task::spawn_blocking` keeps the async executor free. The
//! finished bytes are then written with `tokio::fs`, overwriting any previous
//! export at the same path.
//!
//! ## Layout
//!
//! One card per page: a "Question" heading, the wrapped question text, any
//! question images, then the same for the answer. A card whose content is
//! taller than one page continues on the next; the page-per-card invariant is
//! therefore "at least one page per card", never fewer. Images are scaled to
//! the text column width and capped at 80 % of the printable height so a
//! single photo cannot swallow the whole card.
//!
//! Text uses the built-in Helvetica faces — no font files to ship, and glyph
//! coverage is adequate for the Latin-script decks this tool targets. Width
//! arithmetic for wrapping uses an average-glyph estimate rather than real
//! advance widths; for card-sized paragraphs the difference is invisible.

use crate::config::ExportConfig;
use crate::error::{CardError, ExportError};
use crate::pipeline::fetch::Card;
use printpdf::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Fetched (and possibly re-encoded) media bytes, keyed by Anki filename.
pub type MediaStore = HashMap<String, Vec<u8>>;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const PT_TO_MM: f32 = 25.4 / 72.0;

/// Images are registered at this resolution; display size derives from it.
const IMAGE_DPI: f32 = 300.0;

/// Average glyph width as a fraction of the font size, for wrap estimates.
const GLYPH_WIDTH_RATIO: f32 = 0.5;

/// Vertical gap after an image, in millimetres.
const IMAGE_SPACING_MM: f32 = 4.0;

/// What the renderer produced.
#[derive(Debug)]
pub struct RenderSummary {
    /// Size of the written PDF in bytes.
    pub pdf_bytes: u64,
    /// Pages in the document (>= number of cards).
    pub pages: usize,
    /// Non-fatal problems with embedded media.
    pub warnings: Vec<CardError>,
}

/// Render the deck to a PDF at `output_path`, overwriting any existing file.
pub async fn render_pdf(
    title: &str,
    cards: &[Card],
    media: &MediaStore,
    config: &ExportConfig,
    output_path: &Path,
) -> Result<RenderSummary, ExportError> {
    let title = title.to_string();
    let cards = cards.to_vec();
    let media = media.clone();
    let config = config.clone();

    let (bytes, pages, warnings) =
        tokio::task::spawn_blocking(move || assemble_document(&title, &cards, &media, &config))
            .await
            .map_err(|e| ExportError::Internal(format!("render task panicked: {e}")))??;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ExportError::OutputWriteFailed {
                    path: output_path.to_path_buf(),
                    source: e,
                }
            })?;
        }
    }

    tokio::fs::write(output_path, &bytes)
        .await
        .map_err(|e| ExportError::OutputWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    info!(
        "Wrote {} pages ({} bytes) to {}",
        pages,
        bytes.len(),
        output_path.display()
    );

    Ok(RenderSummary {
        pdf_bytes: bytes.len() as u64,
        pages,
        warnings,
    })
}

/// Build the whole document in memory. Blocking; call via `spawn_blocking`.
fn assemble_document(
    title: &str,
    cards: &[Card],
    media: &MediaStore,
    config: &ExportConfig,
) -> Result<(Vec<u8>, usize, Vec<CardError>), ExportError> {
    let mut doc = PdfDocument::new(title);
    let mut composer = PageComposer::new(config);
    let mut warnings = Vec::new();
    let total = cards.len();

    for (i, card) in cards.iter().enumerate() {
        composer.start_card();
        write_side(
            &mut doc,
            &mut composer,
            config,
            "Question",
            &card.question.text,
            &card.question.images,
            card.note_id,
            media,
            &mut warnings,
        );
        composer.advance(config.heading_size_pt * PT_TO_MM);
        write_side(
            &mut doc,
            &mut composer,
            config,
            "Answer",
            &card.answer.text,
            &card.answer.images,
            card.note_id,
            media,
            &mut warnings,
        );

        debug!("Laid out card {}/{} (note {})", i + 1, total, card.note_id);
        if let Some(ref cb) = config.progress_callback {
            cb.on_card_rendered(i + 1, total);
        }
    }
    composer.finish();

    let pages = composer.pages.len();
    doc.pages = composer.pages;

    let mut save_warnings = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut save_warnings);
    if bytes.is_empty() {
        return Err(ExportError::RenderFailed {
            detail: "document serialised to zero bytes".to_string(),
        });
    }

    Ok((bytes, pages, warnings))
}

/// Write one side of a card: heading, body text, then images.
#[allow(clippy::too_many_arguments)]
fn write_side(
    doc: &mut PdfDocument,
    composer: &mut PageComposer,
    config: &ExportConfig,
    heading: &str,
    text: &str,
    images: &[String],
    note_id: u64,
    media: &MediaStore,
    warnings: &mut Vec<CardError>,
) {
    composer.write_heading(heading);

    if text.is_empty() && images.is_empty() {
        composer.write_body("(empty)");
    } else if !text.is_empty() {
        composer.write_body(text);
    }

    for filename in images {
        match media.get(filename) {
            Some(bytes) => {
                if let Err(detail) = composer.place_image(doc, bytes) {
                    composer.write_body(&format!("[image '{filename}' could not be displayed]"));
                    let warning = CardError::MediaUnreadable {
                        note_id,
                        filename: filename.clone(),
                        detail,
                    };
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_card_warning(warning.to_string());
                    }
                    warnings.push(warning);
                }
            }
            // Fetch already recorded the warning for missing media;
            // the page just gets the placeholder.
            None => composer.write_body(&format!("[image '{filename}' is missing]")),
        }
    }
}

/// Accumulates ops for the current page and finished pages for the document.
///
/// Tracks a cursor in millimetres from the page bottom. Every write asks for
/// vertical room first; when the printable area is exhausted the current op
/// stream becomes a page and a fresh one starts.
struct PageComposer {
    pages: Vec<PdfPage>,
    ops: Vec<Op>,
    cursor_mm: f32,
    margin_mm: f32,
    font_size_pt: f32,
    heading_size_pt: f32,
}

impl PageComposer {
    fn new(config: &ExportConfig) -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            cursor_mm: PAGE_HEIGHT_MM - config.margin_mm,
            margin_mm: config.margin_mm,
            font_size_pt: config.font_size_pt,
            heading_size_pt: config.heading_size_pt,
        }
    }

    fn column_width_mm(&self) -> f32 {
        PAGE_WIDTH_MM - 2.0 * self.margin_mm
    }

    fn line_height_mm(&self, size_pt: f32) -> f32 {
        size_pt * PT_TO_MM * 1.35
    }

    /// Characters that fit one line at the body size, by estimate.
    fn chars_per_line(&self) -> usize {
        let glyph_mm = self.font_size_pt * GLYPH_WIDTH_RATIO * PT_TO_MM;
        ((self.column_width_mm() / glyph_mm) as usize).max(8)
    }

    /// Every card begins on a fresh page.
    fn start_card(&mut self) {
        if !self.ops.is_empty() {
            self.flush_page();
        }
    }

    fn flush_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages
            .push(PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops));
        self.cursor_mm = PAGE_HEIGHT_MM - self.margin_mm;
    }

    fn finish(&mut self) {
        if !self.ops.is_empty() {
            self.flush_page();
        }
    }

    fn ensure_room(&mut self, needed_mm: f32) {
        if self.cursor_mm - needed_mm < self.margin_mm && !self.ops.is_empty() {
            self.flush_page();
        }
    }

    fn advance(&mut self, mm: f32) {
        self.cursor_mm -= mm;
    }

    fn write_heading(&mut self, text: &str) {
        let line = self.line_height_mm(self.heading_size_pt);
        self.ensure_room(line);
        self.advance(line);
        self.ops.push(Op::SetFillColor {
            col: Color::Rgb(Rgb {
                r: 0.0,
                g: 0.0,
                b: 0.5,
                icc_profile: None,
            }),
        });
        self.write_line(text, BuiltinFont::HelveticaBold, self.heading_size_pt);
        self.ops.push(Op::SetFillColor {
            col: Color::Rgb(Rgb {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                icc_profile: None,
            }),
        });
        self.advance(1.5);
    }

    fn write_body(&mut self, text: &str) {
        let line = self.line_height_mm(self.font_size_pt);
        for wrapped in wrap_text(text, self.chars_per_line()) {
            self.ensure_room(line);
            self.advance(line);
            self.write_line(&wrapped, BuiltinFont::Helvetica, self.font_size_pt);
        }
        self.advance(2.0);
    }

    /// Emit one line of text at the current cursor position.
    fn write_line(&mut self, text: &str, font: BuiltinFont, size_pt: f32) {
        self.ops.push(Op::StartTextSection);
        self.ops.push(Op::SetTextCursor {
            pos: Point {
                x: Mm(self.margin_mm).into_pt(),
                y: Mm(self.cursor_mm).into_pt(),
            },
        });
        self.ops.push(Op::SetFontSizeBuiltinFont {
            font,
            size: Pt(size_pt),
        });
        self.ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text.to_string())],
            font,
        });
        self.ops.push(Op::EndTextSection);
    }

    /// Decode, register and place an image, scaled to the column.
    ///
    /// Returns a human-readable detail string on decode failure so the
    /// caller can attach it to a [`CardError`].
    fn place_image(&mut self, doc: &mut PdfDocument, bytes: &[u8]) -> Result<(), String> {
        let mut decode_warnings = Vec::new();
        let img = RawImage::decode_from_bytes(bytes, &mut decode_warnings)?;

        if img.width == 0 || img.height == 0 {
            return Err("image has zero dimension".to_string());
        }

        let natural_w_mm = img.width as f32 / IMAGE_DPI * 25.4;
        let natural_h_mm = img.height as f32 / IMAGE_DPI * 25.4;

        let max_w = self.column_width_mm();
        let max_h = (PAGE_HEIGHT_MM - 2.0 * self.margin_mm) * 0.8;

        let mut scale = (max_w / natural_w_mm).min(1.0);
        if natural_h_mm * scale > max_h {
            scale = max_h / natural_h_mm;
        }
        let display_h = natural_h_mm * scale;

        self.ensure_room(display_h + IMAGE_SPACING_MM);
        self.advance(display_h);

        let id = doc.add_image(&img);
        self.ops.push(Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Mm(self.margin_mm).into_pt()),
                translate_y: Some(Mm(self.cursor_mm).into_pt()),
                rotate: None,
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
            },
        });
        self.advance(IMAGE_SPACING_MM);

        Ok(())
    }
}

/// Greedy word wrap with a hard split for words longer than a line.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut current = String::new();
        for word in raw.split_whitespace() {
            for piece in split_long_word(word, max_chars) {
                let sep = usize::from(!current.is_empty());
                if current.chars().count() + sep + piece.chars().count() <= max_chars {
                    if sep == 1 {
                        current.push(' ');
                    }
                    current.push_str(&piece);
                } else {
                    if !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                    }
                    current = piece;
                }
            }
        }
        lines.push(current);
    }
    lines
}

fn split_long_word(word: &str, max_chars: usize) -> Vec<String> {
    if word.chars().count() <= max_chars {
        return vec![word.to_string()];
    }
    word.chars()
        .collect::<Vec<_>>()
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
