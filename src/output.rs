//! Output types: what an export run produced and how long each stage took.
//!
//! [`ExportOutput`] is serde-serialisable so the CLI can dump it as JSON for
//! scripting (`anki2pdf … --json`), mirroring the stats the human-readable
//! summary prints.

use crate::error::CardError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened in the OCR stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrOutcome {
    /// OCR was not requested.
    #[default]
    Disabled,
    /// OCR ran to completion; `forced` records whether forced mode was used
    /// (either requested up front or applied on the single retry).
    Applied { forced: bool },
    /// The OCR tool is not installed; the stage was skipped.
    SkippedToolMissing,
}

impl OcrOutcome {
    /// True when the PDF carries a text layer produced by this run.
    pub fn applied(&self) -> bool {
        matches!(self, OcrOutcome::Applied { .. })
    }
}

/// Counters and timings for a completed export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportStats {
    /// Notes found in the deck (after per-note deduplication).
    pub total_cards: usize,
    /// Cards actually laid onto pages.
    pub rendered_cards: usize,
    /// Notes skipped because no question/answer fields were recognised.
    pub skipped_cards: usize,
    /// Unique media files fetched from Anki.
    pub media_files: usize,
    /// Media files re-encoded by the compression stage.
    pub compressed_images: usize,
    /// Size of the written PDF in bytes (before OCR rewrites it in place).
    pub pdf_bytes: u64,
    /// OCR stage outcome.
    pub ocr: OcrOutcome,
    /// Wall-clock spent talking to AnkiConnect (cards + media).
    pub fetch_duration_ms: u64,
    /// Wall-clock spent assembling and writing the PDF.
    pub render_duration_ms: u64,
    /// Wall-clock spent in the OCR subprocess (0 when skipped).
    pub ocr_duration_ms: u64,
    /// Total wall-clock for the whole run.
    pub total_duration_ms: u64,
}

/// The result of a successful export.
///
/// "Successful" here means the PDF exists at `pdf_path`; individual cards
/// may still have degraded (see [`warnings`](Self::warnings)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutput {
    /// Where the PDF was written.
    pub pdf_path: PathBuf,
    /// Counters and timings.
    pub stats: ExportStats,
    /// Non-fatal per-card problems, in the order they were encountered.
    pub warnings: Vec<CardError>,
}
