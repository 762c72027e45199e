//! CLI binary for anki2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExportConfig` and prints results.

use anki2pdf::{
    export, list_decks, ExportConfig, ExportProgressCallback, OcrOutcome, ProgressCallback,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::io;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live card counter plus warning log lines.
struct CliProgressCallback {
    bar: ProgressBar,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose bar length is set by `on_export_start`,
    /// once the deck has actually been fetched.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Fetching");
        bar.set_message("Contacting AnkiConnect…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            warnings: AtomicUsize::new(0),
        })
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_export_start(&self, total_cards: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cards  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_cards as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Exporting {total_cards} cards…"))
        ));
    }

    fn on_card_rendered(&self, card_num: usize, _total: usize) {
        self.bar.set_message(format!("card {card_num}"));
        self.bar.inc(1);
    }

    fn on_card_warning(&self, message: String) {
        self.warnings.fetch_add(1, Ordering::SeqCst);

        // Truncate very long messages to keep the log tidy.
        let msg = if message.len() > 100 {
            format!("{}\u{2026}", &message[..99])
        } else {
            message
        };
        self.bar.println(format!("  {} {}", yellow("⚠"), yellow(&msg)));
    }

    fn on_ocr_start(&self, forced: bool) {
        self.bar.set_prefix("OCR");
        self.bar.set_message(if forced {
            "running ocrmypdf (forced)".to_string()
        } else {
            "running ocrmypdf".to_string()
        });
    }

    fn on_export_complete(&self, rendered: usize, total: usize) {
        self.bar.finish_and_clear();

        let warnings = self.warnings.load(Ordering::SeqCst);
        if rendered == total && warnings == 0 {
            eprintln!(
                "{} {} cards exported",
                green("✔"),
                bold(&rendered.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} cards exported  ({} warnings)",
                cyan("⚠"),
                bold(&rendered.to_string()),
                total,
                yellow(&warnings.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic export
  anki2pdf "Spanish Verbs" spanish-verbs.pdf

  # Searchable PDF (English text layer)
  anki2pdf "Spanish Verbs" spanish-verbs.pdf --ocr-lang eng

  # Multi-language OCR, forced from the first attempt
  anki2pdf "HSK 1" hsk1.pdf --ocr-lang "chi_sim+eng" --force-ocr

  # Shrink photo-heavy decks
  anki2pdf "Art History" art.pdf --image-quality 80

  # Machine-readable stats
  anki2pdf "Spanish Verbs" out.pdf --json > stats.json

  # Which decks are available?
  anki2pdf --list-decks

ENVIRONMENT VARIABLES:
  ANKI2PDF_URL            AnkiConnect endpoint (default: http://127.0.0.1:8765)
  ANKI2PDF_OCR_LANG       OCR language tag(s), e.g. "eng" or "ces+eng"
  ANKI2PDF_OCR_BIN        Path to the ocrmypdf executable
  ANKI2PDF_IMAGE_QUALITY  JPEG quality (1-95) for embedded media

SETUP:
  1. Install the AnkiConnect add-on (code 2055492159) and keep Anki running.
  2. Optional, for --ocr-lang: install ocrmypdf and the Tesseract language
     packs you need. Without it the OCR stage is skipped with a warning.
"#;

/// Export an Anki deck to a paginated, searchable PDF.
#[derive(Parser, Debug)]
#[command(
    name = "anki2pdf",
    version,
    about = "Export an Anki deck to a paginated, searchable PDF",
    long_about = "Export a deck from a running Anki instance (via the AnkiConnect add-on) to a \
PDF with one card per page. Optionally runs ocrmypdf for a searchable text layer and \
re-encodes embedded media images at a target JPEG quality.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Exact name of the deck to export.
    #[arg(required_unless_present = "list_decks")]
    deck: Option<String>,

    /// Output PDF path; overwritten if it exists.
    #[arg(required_unless_present = "list_decks")]
    output: Option<PathBuf>,

    /// Tesseract language tag(s) for OCR, e.g. eng or ces+chi_sim.
    ///
    /// Enables the OCR stage. Requires ocrmypdf; when the tool is missing
    /// the stage is skipped with a warning.
    #[arg(long, env = "ANKI2PDF_OCR_LANG")]
    ocr_lang: Option<String>,

    /// Force OCR even on pages that already contain text.
    #[arg(long, env = "ANKI2PDF_FORCE_OCR")]
    force_ocr: bool,

    /// JPEG quality (1-95) for re-encoding embedded media images.
    #[arg(long, env = "ANKI2PDF_IMAGE_QUALITY",
          value_parser = clap::value_parser!(u8).range(1..=95))]
    image_quality: Option<u8>,

    /// AnkiConnect endpoint.
    #[arg(long, env = "ANKI2PDF_URL", default_value = anki2pdf::DEFAULT_ANKI_URL)]
    anki_url: String,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "ANKI2PDF_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Cards per cardsInfo request.
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Path to the ocrmypdf executable (default: resolve from PATH).
    #[arg(long, env = "ANKI2PDF_OCR_BIN")]
    ocr_bin: Option<PathBuf>,

    /// Page margin in millimetres.
    #[arg(long, default_value_t = 15.0)]
    margin_mm: f32,

    /// Body text size in points.
    #[arg(long, default_value_t = 11.0)]
    font_size: f32,

    /// List the decks in the running Anki instance and exit.
    #[arg(long)]
    list_decks: bool,

    /// Output export statistics as JSON instead of a summary line.
    #[arg(long, env = "ANKI2PDF_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "ANKI2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ANKI2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ANKI2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── List-decks mode ──────────────────────────────────────────────────
    if cli.list_decks {
        let config = build_config(&cli, None)?;
        let decks = list_decks(&config)
            .await
            .context("Failed to list decks")?;
        for deck in decks {
            println!("{deck}");
        }
        return Ok(());
    }

    // clap guarantees both positionals when --list-decks is absent.
    let deck = cli.deck.clone().context("missing deck name")?;
    let output_path = cli.output.clone().context("missing output path")?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExportProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run export ───────────────────────────────────────────────────────
    let output = export(&deck, &output_path, &config)
        .await
        .context("Export failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if !cli.quiet {
        let ocr_note = match output.stats.ocr {
            OcrOutcome::Disabled => dim("no OCR"),
            OcrOutcome::Applied { forced: false } => green("OCR ✓"),
            OcrOutcome::Applied { forced: true } => green("OCR ✓ (forced)"),
            OcrOutcome::SkippedToolMissing => yellow("OCR skipped — ocrmypdf not found"),
        };
        eprintln!(
            "{}  {} cards  {}ms  {}  →  {}",
            if output.warnings.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.stats.rendered_cards,
            output.stats.total_duration_ms,
            ocr_note,
            bold(&output.pdf_path.display().to_string()),
        );
        if !output.warnings.is_empty() {
            eprintln!(
                "   {} warnings — see {}",
                output.warnings.len(),
                dim(&format!(
                    "{}_errors.txt",
                    output.pdf_path.with_extension("").display()
                )),
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ExportConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExportConfig> {
    let mut builder = ExportConfig::builder()
        .anki_url(&cli.anki_url)
        .request_timeout_secs(cli.timeout)
        .batch_size(cli.batch_size)
        .force_ocr(cli.force_ocr)
        .margin_mm(cli.margin_mm)
        .font_size_pt(cli.font_size);

    if let Some(ref lang) = cli.ocr_lang {
        builder = builder.ocr_language(lang);
    }
    if let Some(ref bin) = cli.ocr_bin {
        builder = builder.ocr_binary(bin);
    }
    if let Some(q) = cli.image_quality {
        builder = builder.image_quality(q);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
