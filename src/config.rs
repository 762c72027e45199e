//! Configuration types for deck export.
//!
//! All export behaviour is controlled through [`ExportConfig`], built via
//! [`ExportConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config between the CLI and library callers and to diff two runs
//! to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::ExportError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Standard AnkiConnect listen address.
pub const DEFAULT_ANKI_URL: &str = "http://127.0.0.1:8765";

/// AnkiConnect API version this crate speaks.
pub const ANKI_CONNECT_VERSION: u32 = 6;

/// Configuration for a deck-to-PDF export.
///
/// Built via [`ExportConfig::builder()`] or [`ExportConfig::default()`].
///
/// # Example
/// ```rust
/// use anki2pdf::ExportConfig;
///
/// let config = ExportConfig::builder()
///     .ocr_language("eng")
///     .image_quality(85)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    /// AnkiConnect endpoint. Default: `http://127.0.0.1:8765`.
    pub anki_url: String,

    /// Per-request HTTP timeout in seconds. Default: 30.
    ///
    /// AnkiConnect answers from a local process, so anything slower than a
    /// few seconds normally means Anki is wedged in a sync or a dialog.
    /// Media retrieval for large files is the one legitimate slow path, which
    /// is why the default is generous rather than sub-second.
    pub request_timeout_secs: u64,

    /// How many card ids go into a single `cardsInfo` request. Default: 100.
    ///
    /// AnkiConnect serialises the full field content of every requested card
    /// into one JSON body; thousand-card decks in a single request produce
    /// multi-megabyte responses and stall the Anki UI thread. Batches of 100
    /// keep each response small without a noticeable round-trip penalty.
    pub batch_size: usize,

    /// Tesseract language tag(s) for OCR, e.g. `"eng"` or `"spa+eng"`.
    ///
    /// `None` disables the OCR stage unless [`force_ocr`](Self::force_ocr)
    /// is set, in which case `"eng"` is assumed.
    pub ocr_language: Option<String>,

    /// Run OCR in forced mode from the first attempt, rasterising pages that
    /// already carry a text layer. Default: false.
    pub force_ocr: bool,

    /// Explicit path to the `ocrmypdf` executable.
    ///
    /// `None` resolves the tool from `PATH`. Setting this is mainly useful
    /// for sandboxed installs and for pointing tests at a stub.
    pub ocr_binary: Option<PathBuf>,

    /// JPEG quality (1–95) for re-encoding embedded media images.
    ///
    /// `None` disables the compression stage entirely; media bytes pass
    /// through untouched.
    pub image_quality: Option<u8>,

    /// Page margin in millimetres. Default: 15.0.
    pub margin_mm: f32,

    /// Body text size in points. Default: 11.0.
    pub font_size_pt: f32,

    /// "Question"/"Answer" heading size in points. Default: 14.0.
    pub heading_size_pt: f32,

    /// Optional per-card progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            anki_url: DEFAULT_ANKI_URL.to_string(),
            request_timeout_secs: 30,
            batch_size: 100,
            ocr_language: None,
            force_ocr: false,
            ocr_binary: None,
            image_quality: None,
            margin_mm: 15.0,
            font_size_pt: 11.0,
            heading_size_pt: 14.0,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("anki_url", &self.anki_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("ocr_language", &self.ocr_language)
            .field("force_ocr", &self.force_ocr)
            .field("ocr_binary", &self.ocr_binary)
            .field("image_quality", &self.image_quality)
            .field("margin_mm", &self.margin_mm)
            .field("font_size_pt", &self.font_size_pt)
            .field("heading_size_pt", &self.heading_size_pt)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ExportConfig {
    /// Create a new builder for `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the OCR stage should run at all.
    pub fn ocr_enabled(&self) -> bool {
        self.ocr_language.is_some() || self.force_ocr
    }

    /// The effective OCR language, falling back to English when only
    /// `force_ocr` was set.
    pub fn effective_ocr_language(&self) -> &str {
        self.ocr_language.as_deref().unwrap_or("eng")
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn anki_url(mut self, url: impl Into<String>) -> Self {
        self.config.anki_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = Some(lang.into());
        self
    }

    pub fn force_ocr(mut self, v: bool) -> Self {
        self.config.force_ocr = v;
        self
    }

    pub fn ocr_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ocr_binary = Some(path.into());
        self
    }

    pub fn image_quality(mut self, q: u8) -> Self {
        self.config.image_quality = Some(q.clamp(1, 95));
        self
    }

    pub fn margin_mm(mut self, mm: f32) -> Self {
        self.config.margin_mm = mm.max(0.0);
        self
    }

    pub fn font_size_pt(mut self, pt: f32) -> Self {
        self.config.font_size_pt = pt.max(4.0);
        self
    }

    pub fn heading_size_pt(mut self, pt: f32) -> Self {
        self.config.heading_size_pt = pt.max(4.0);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExportConfig, ExportError> {
        let c = &self.config;
        if c.anki_url.is_empty() {
            return Err(ExportError::InvalidConfig(
                "AnkiConnect URL must not be empty".into(),
            ));
        }
        if !c.anki_url.starts_with("http://") && !c.anki_url.starts_with("https://") {
            return Err(ExportError::InvalidConfig(format!(
                "AnkiConnect URL must be http(s), got '{}'",
                c.anki_url
            )));
        }
        if let Some(q) = c.image_quality {
            if !(1..=95).contains(&q) {
                return Err(ExportError::InvalidConfig(format!(
                    "Image quality must be 1–95, got {q}"
                )));
            }
        }
        if c.margin_mm * 2.0 >= 210.0 {
            return Err(ExportError::InvalidConfig(format!(
                "Margin of {} mm leaves no printable area on an A4 page",
                c.margin_mm
            )));
        }
        Ok(self.config)
    }
}
