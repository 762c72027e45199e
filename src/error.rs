//! Error types for the anki2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExportError`] — **Fatal**: the export cannot proceed at all
//!   (Anki unreachable, deck missing, PDF cannot be written). Returned as
//!   `Err(ExportError)` from the top-level [`crate::export()`] entry point.
//!
//! * [`CardError`] — **Non-fatal**: a single card or media file had a
//!   problem (unrecognised fields, a broken image) but every other card is
//!   fine. Collected into [`crate::output::ExportOutput::warnings`] so
//!   callers can inspect partial degradation rather than losing the whole
//!   deck to one bad note.
//!
//! The separation lets callers decide their own tolerance: abort on the
//! first warning, log and continue, or dump them all into the sidecar file
//! the exporter writes next to the PDF.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the anki2pdf library.
///
/// Card-level problems use [`CardError`] and are stored in
/// [`crate::output::ExportOutput`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExportError {
    // ── AnkiConnect errors ────────────────────────────────────────────────
    /// The AnkiConnect endpoint could not be reached at all.
    #[error("Could not connect to AnkiConnect at {url}: {reason}\nMake sure Anki is running and the AnkiConnect add-on is installed and enabled.")]
    ConnectionFailed { url: String, reason: String },

    /// AnkiConnect answered, but with an error string in its envelope.
    #[error("AnkiConnect error during '{action}': {message}")]
    ApiError { action: String, message: String },

    /// AnkiConnect returned a body that does not match the expected shape.
    #[error("AnkiConnect returned an invalid response for '{action}': {detail}")]
    InvalidResponse { action: String, detail: String },

    /// The named deck does not exist in the running Anki instance.
    #[error("Deck not found: '{deck}'\nCheck the exact deck name with Anki's deck list (names are case-sensitive).")]
    DeckNotFound { deck: String },

    /// The deck exists but contains no cards; there is nothing to render.
    #[error("Deck '{deck}' contains no cards")]
    EmptyDeck { deck: String },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// PDF assembly failed (font parsing, page construction, save).
    #[error("PDF rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR tool ran but failed for a reason other than the retried
    /// prior-text condition.
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem with a single card or media file.
///
/// Stored in [`crate::output::ExportOutput::warnings`]; the export continues
/// and the affected content is replaced by a placeholder on the page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CardError {
    /// Neither the question nor the answer field could be located by name.
    #[error("note {note_id} ({model}): no question/answer fields found among {available:?}")]
    UnrecognisedFields {
        note_id: u64,
        model: String,
        available: Vec<String>,
    },

    /// AnkiConnect could not supply the referenced media file.
    #[error("note {note_id}: media '{filename}' could not be fetched: {detail}")]
    MediaFetchFailed {
        note_id: u64,
        filename: String,
        detail: String,
    },

    /// The media payload decoded from base64 but is not a usable image.
    #[error("note {note_id}: media '{filename}' is not a readable image: {detail}")]
    MediaUnreadable {
        note_id: u64,
        filename: String,
        detail: String,
    },

    /// Re-encoding at the requested quality failed; original bytes kept.
    #[error("media '{filename}': re-encode failed, keeping original bytes: {detail}")]
    CompressFailed { filename: String, detail: String },
}
