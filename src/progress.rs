//! Progress-callback trait for per-card export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ExportConfigBuilder::progress_callback`] to receive
//! events as the pipeline fetches and lays out each card.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a terminal progress bar, a log, or a GUI without
//! the library knowing anything about how the host application communicates.
//! The trait is `Send + Sync` so the same callback type also works for
//! callers that drive the exporter from a spawned task.

use std::sync::Arc;

/// Called by the export pipeline as it progresses through the deck.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline itself is sequential; methods are
/// never invoked concurrently for a single run.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once after the deck has been fetched, before rendering.
    ///
    /// # Arguments
    /// * `total_cards` — number of cards that will be laid out
    fn on_export_start(&self, total_cards: usize) {
        let _ = total_cards;
    }

    /// Called after each card has been placed onto its page(s).
    ///
    /// # Arguments
    /// * `card_num`    — 1-indexed card number
    /// * `total_cards` — total cards in the deck
    fn on_card_rendered(&self, card_num: usize, total_cards: usize) {
        let _ = (card_num, total_cards);
    }

    /// Called when a card or media file degrades without aborting the run.
    ///
    /// # Arguments
    /// * `message` — human-readable description of the problem
    fn on_card_warning(&self, message: String) {
        let _ = message;
    }

    /// Called just before the OCR subprocess is started.
    ///
    /// # Arguments
    /// * `forced` — whether forced mode is in effect for this attempt
    fn on_ocr_start(&self, forced: bool) {
        let _ = forced;
    }

    /// Called once after the PDF (and any OCR pass) is finished.
    ///
    /// # Arguments
    /// * `rendered` — cards that made it onto pages
    /// * `total`    — cards found in the deck
    fn on_export_complete(&self, rendered: usize, total: usize) {
        let _ = (rendered, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;
