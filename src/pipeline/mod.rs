//! Pipeline stages for deck-to-PDF export.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap an external
//! collaborator (a different OCR tool, say) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ parse ──▶ compress ──▶ render ──▶ ocr
//! (AnkiConnect) (HTML)  (media JPEG)  (printpdf) (ocrmypdf)
//! ```
//!
//! 1. [`fetch`]    — pull card records and media from the AnkiConnect HTTP
//!    endpoint; the only stage with network I/O
//! 2. [`parse`]    — reduce each field's HTML to text plus image references
//! 3. [`compress`] — optionally re-encode media at a target JPEG quality
//! 4. [`render`]   — lay cards onto A4 pages; runs in `spawn_blocking`
//!    because document assembly is CPU-bound
//! 5. [`ocr`]      — rewrite the PDF in place with a text layer via the
//!    external tool, with the single prior-text retry
//!
//! Stages run strictly in sequence; each consumes the previous stage's
//! output and nothing else.

pub mod compress;
pub mod fetch;
pub mod ocr;
pub mod parse;
pub mod render;
