//! Export orchestration: the four pipeline stages, run in order.
//!
//! This is the primary entry point of the library. Control flows strictly
//! forward — fetch, media, render, OCR — and each stage consumes the
//! previous stage's output. There is deliberately no concurrency here: the
//! deck lives in a local single-threaded application, the PDF is one file,
//! and the OCR tool rewrites that file in place, so nothing can usefully
//! overlap.

use crate::config::ExportConfig;
use crate::error::{CardError, ExportError};
use crate::output::{ExportOutput, ExportStats, OcrOutcome};
use crate::pipeline::fetch::{self, AnkiClient, Card};
use crate::pipeline::render::{self, MediaStore};
use crate::pipeline::{compress, ocr};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Export a deck to a PDF file.
///
/// # Arguments
/// * `deck`        — exact deck name as shown in Anki
/// * `output_path` — where the PDF is written; overwritten if present
/// * `config`      — export configuration
///
/// # Returns
/// `Ok(ExportOutput)` when the PDF exists at `output_path`, even if some
/// cards degraded (check `output.warnings`).
///
/// # Errors
/// Returns `Err(ExportError)` only for fatal conditions: AnkiConnect
/// unreachable, deck missing or empty, the PDF unwritable, or an OCR
/// failure other than the retried prior-text case. No file is created when
/// fetching fails.
pub async fn export(
    deck: &str,
    output_path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportOutput, ExportError> {
    let total_start = Instant::now();
    let output_path = output_path.as_ref();
    info!("Exporting deck '{}' to {}", deck, output_path.display());

    // ── Stage 1: fetch cards ─────────────────────────────────────────────
    let fetch_start = Instant::now();
    let client = AnkiClient::new(config)?;
    let (cards, mut warnings) = fetch::fetch_deck(&client, deck, config.batch_size).await?;
    let skipped_cards = warnings.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_export_start(cards.len());
        for w in &warnings {
            cb.on_card_warning(w.to_string());
        }
    }

    // ── Stage 2: fetch media, optionally compressing ─────────────────────
    let (media, compressed_images, media_warnings) = collect_media(&client, &cards, config).await;
    warnings.extend(media_warnings);
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
    info!(
        "Fetched {} cards and {} media files in {}ms",
        cards.len(),
        media.len(),
        fetch_duration_ms
    );

    // ── Stage 3: render the PDF ──────────────────────────────────────────
    let render_start = Instant::now();
    let title = format!("Anki deck: {deck}");
    let summary = render::render_pdf(&title, &cards, &media, config, output_path).await?;
    warnings.extend(summary.warnings);
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Stage 4: OCR ─────────────────────────────────────────────────────
    let ocr_start = Instant::now();
    let ocr_outcome = if config.ocr_enabled() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_ocr_start(config.force_ocr);
        }
        ocr::apply_ocr(
            output_path,
            config.effective_ocr_language(),
            config.force_ocr,
            config.ocr_binary.as_deref(),
        )
        .await?
    } else {
        OcrOutcome::Disabled
    };
    let ocr_duration_ms = match ocr_outcome {
        OcrOutcome::Disabled => 0,
        _ => ocr_start.elapsed().as_millis() as u64,
    };

    // ── Warnings sidecar ─────────────────────────────────────────────────
    if !warnings.is_empty() {
        write_sidecar(output_path, &warnings).await;
    }

    let stats = ExportStats {
        total_cards: cards.len() + skipped_cards,
        rendered_cards: cards.len(),
        skipped_cards,
        media_files: media.len(),
        compressed_images,
        pdf_bytes: summary.pdf_bytes,
        ocr: ocr_outcome,
        fetch_duration_ms,
        render_duration_ms,
        ocr_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_export_complete(stats.rendered_cards, stats.total_cards);
    }
    info!(
        "Export complete: {}/{} cards, {} pages worth of content, {}ms total",
        stats.rendered_cards, stats.total_cards, summary.pages, stats.total_duration_ms
    );

    Ok(ExportOutput {
        pdf_path: output_path.to_path_buf(),
        stats,
        warnings,
    })
}

/// Synchronous wrapper around [`export`].
///
/// Creates a temporary tokio runtime internally.
pub fn export_sync(
    deck: &str,
    output_path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportOutput, ExportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExportError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(export(deck, output_path, config))
}

/// List the decks available in the running Anki instance.
///
/// Does not touch the filesystem; useful for `--list-decks` style tooling.
pub async fn list_decks(config: &ExportConfig) -> Result<Vec<String>, ExportError> {
    let client = AnkiClient::new(config)?;
    client.deck_names().await
}

/// Fetch every media file referenced by the cards, once per unique filename.
///
/// Media problems never abort the export: a file that cannot be fetched,
/// decoded or re-encoded is recorded as a warning and the renderer shows a
/// placeholder (or the original bytes, for a failed re-encode).
async fn collect_media(
    client: &AnkiClient,
    cards: &[Card],
    config: &ExportConfig,
) -> (MediaStore, usize, Vec<CardError>) {
    let mut store = MediaStore::new();
    let mut requested: HashSet<&str> = HashSet::new();
    let mut warnings = Vec::new();
    let mut compressed = 0usize;

    for card in cards {
        for filename in card.question.images.iter().chain(card.answer.images.iter()) {
            if !requested.insert(filename.as_str()) {
                continue;
            }

            let fetched = match client.retrieve_media_file(filename).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    push_warning(
                        &mut warnings,
                        config,
                        CardError::MediaFetchFailed {
                            note_id: card.note_id,
                            filename: filename.clone(),
                            detail: "file not present in the Anki media folder".to_string(),
                        },
                    );
                    continue;
                }
                Err(e) => {
                    push_warning(
                        &mut warnings,
                        config,
                        CardError::MediaFetchFailed {
                            note_id: card.note_id,
                            filename: filename.clone(),
                            detail: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            let bytes = match config.image_quality {
                Some(quality) => match compress::compress_image(&fetched, quality) {
                    Ok(re_encoded) => {
                        compressed += 1;
                        re_encoded
                    }
                    Err(e) => {
                        push_warning(
                            &mut warnings,
                            config,
                            CardError::CompressFailed {
                                filename: filename.clone(),
                                detail: e.to_string(),
                            },
                        );
                        fetched
                    }
                },
                None => fetched,
            };

            store.insert(filename.clone(), bytes);
        }
    }

    (store, compressed, warnings)
}

fn push_warning(warnings: &mut Vec<CardError>, config: &ExportConfig, warning: CardError) {
    warn!("{warning}");
    if let Some(ref cb) = config.progress_callback {
        cb.on_card_warning(warning.to_string());
    }
    warnings.push(warning);
}

/// Path of the plain-text warnings file written next to the PDF.
fn sidecar_path(pdf_path: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    pdf_path.with_file_name(format!("{stem}_errors.txt"))
}

/// Best-effort dump of the collected warnings; failure only logs.
async fn write_sidecar(pdf_path: &Path, warnings: &[CardError]) {
    let path = sidecar_path(pdf_path);
    let mut body = String::from("Problems encountered while generating the PDF\n");
    for w in warnings {
        body.push_str(&w.to_string());
        body.push('\n');
    }
    match tokio::fs::write(&path, body).await {
        Ok(()) => info!("Wrote {} warnings to {}", warnings.len(), path.display()),
        Err(e) => warn!("Could not write warnings file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_sits_next_to_the_pdf() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/out/deck.pdf")),
            PathBuf::from("/tmp/out/deck_errors.txt")
        );
        assert_eq!(
            sidecar_path(Path::new("deck.pdf")),
            PathBuf::from("deck_errors.txt")
        );
    }
}
