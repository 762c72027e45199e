//! # anki2pdf
//!
//! Export an Anki deck to a paginated, optionally searchable PDF.
//!
//! ## Why this crate?
//!
//! Anki's built-in export formats (apkg, plain text) are made for moving
//! decks between machines, not for printing or archiving them. This crate
//! talks to a running Anki instance over the AnkiConnect HTTP add-on, lays
//! every card onto its own A4 page, and can hand the result to `ocrmypdf`
//! for a searchable text layer and re-encode bulky media at a target JPEG
//! quality. All the hard parts — deck storage, OCR, image codecs — stay in
//! their external tools; this crate is the pipeline between them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! deck name
//!  │
//!  ├─ 1. Fetch     cards + media via AnkiConnect (local HTTP)
//!  ├─ 2. Parse     field HTML → text + image references
//!  ├─ 3. Compress  optional media JPEG re-encode at --image-quality
//!  ├─ 4. Render    one card per A4 page via printpdf (spawn_blocking)
//!  └─ 5. OCR       optional ocrmypdf pass, retried once with --force-ocr
//!                  when the tool reports an existing text layer
//! ```
//!
//! Stages run strictly in sequence. The optional stages degrade gracefully:
//! no `--image-quality` leaves media untouched, and a missing `ocrmypdf`
//! binary skips OCR with a warning instead of failing the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use anki2pdf::{export, ExportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Anki must be running with the AnkiConnect add-on enabled.
//!     let config = ExportConfig::builder()
//!         .ocr_language("eng")
//!         .image_quality(85)
//!         .build()?;
//!     let output = export("Spanish Verbs", "spanish-verbs.pdf", &config).await?;
//!     eprintln!(
//!         "{} cards → {} ({} bytes)",
//!         output.stats.rendered_cards,
//!         output.pdf_path.display(),
//!         output.stats.pdf_bytes,
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `anki2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! anki2pdf = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExportConfig, ExportConfigBuilder, ANKI_CONNECT_VERSION, DEFAULT_ANKI_URL};
pub use error::{CardError, ExportError};
pub use export::{export, export_sync, list_decks};
pub use output::{ExportOutput, ExportStats, OcrOutcome};
pub use pipeline::fetch::{AnkiClient, Card};
pub use pipeline::parse::FieldContent;
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
