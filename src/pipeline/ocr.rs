//! OCR: drive the external `ocrmypdf` tool over the rendered PDF.
//!
//! The tool rewrites the PDF with a searchable text layer. It is invoked as
//! a subprocess writing to a staging file in the output directory, which is
//! renamed over the original only on success — a failed OCR run can never
//! leave a half-written PDF behind.
//!
//! ## Retry behaviour
//!
//! In its default mode `ocrmypdf` refuses to process pages that already
//! carry text. When the first (unforced) attempt fails with that signal, the
//! run is retried exactly once with `--force-ocr`; any other failure is
//! surfaced without retry. How "already has text" manifests (exit code 6,
//! a stderr message) is the tool's own contract — [`signals_prior_text`]
//! is the single place that interprets it.
//!
//! A missing tool is not an error: the stage reports
//! [`OcrOutcome::SkippedToolMissing`] and the export completes without a
//! text layer.

use crate::error::ExportError;
use crate::output::OcrOutcome;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Tool resolved from PATH when no explicit binary is configured.
const DEFAULT_OCR_BINARY: &str = "ocrmypdf";

/// ocrmypdf's documented exit code for "prior OCR found".
const PRIOR_OCR_EXIT_CODE: i32 = 6;

/// Outcome of a single subprocess invocation.
enum RunStatus {
    Success,
    ToolMissing,
    Failed { code: Option<i32>, stderr: String },
}

/// Run OCR over `pdf_path` in place.
///
/// `force` applies forced mode from the first attempt; otherwise forced mode
/// is only used on the single prior-text retry.
pub async fn apply_ocr(
    pdf_path: &Path,
    language: &str,
    force: bool,
    binary: Option<&Path>,
) -> Result<OcrOutcome, ExportError> {
    let program = binary
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OCR_BINARY));

    match run_once(&program, pdf_path, language, force).await? {
        RunStatus::Success => {
            info!("OCR complete: {}", pdf_path.display());
            Ok(OcrOutcome::Applied { forced: force })
        }
        RunStatus::ToolMissing => {
            warn!(
                "'{}' not found; skipping the OCR stage",
                program.display()
            );
            Ok(OcrOutcome::SkippedToolMissing)
        }
        RunStatus::Failed { code, stderr } => {
            if !force && signals_prior_text(code, &stderr) {
                info!("PDF already carries a text layer; retrying once with --force-ocr");
                match run_once(&program, pdf_path, language, true).await? {
                    RunStatus::Success => {
                        info!("OCR complete (forced): {}", pdf_path.display());
                        Ok(OcrOutcome::Applied { forced: true })
                    }
                    RunStatus::ToolMissing => Ok(OcrOutcome::SkippedToolMissing),
                    RunStatus::Failed { code, stderr } => Err(ExportError::OcrFailed {
                        detail: describe_failure(code, &stderr),
                    }),
                }
            } else {
                Err(ExportError::OcrFailed {
                    detail: describe_failure(code, &stderr),
                })
            }
        }
    }
}

/// One ocrmypdf invocation: input → staging file → rename over input.
async fn run_once(
    program: &Path,
    pdf_path: &Path,
    language: &str,
    force: bool,
) -> Result<RunStatus, ExportError> {
    let staging_dir = match pdf_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let staging = tempfile::Builder::new()
        .prefix(".anki2pdf-ocr-")
        .suffix(".pdf")
        .tempfile_in(&staging_dir)
        .map_err(|e| ExportError::Internal(format!("could not create OCR staging file: {e}")))?;

    let mut cmd = Command::new(program);
    cmd.arg("--language")
        .arg(language)
        .arg("--output-type")
        .arg("pdf")
        .arg("--optimize")
        .arg("3");
    if force {
        cmd.arg("--force-ocr");
    }
    cmd.arg(pdf_path).arg(staging.path());

    debug!(
        "Running {} (language={}, force={})",
        program.display(),
        language,
        force
    );

    let output = match cmd.output().await {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RunStatus::ToolMissing),
        Err(e) => {
            return Err(ExportError::OcrFailed {
                detail: format!("failed to launch '{}': {e}", program.display()),
            })
        }
    };

    if output.status.success() {
        staging.persist(pdf_path).map_err(|e| ExportError::OcrFailed {
            detail: format!("could not move OCR output into place: {e}"),
        })?;
        Ok(RunStatus::Success)
    } else {
        // Staging file is dropped (and deleted) here.
        Ok(RunStatus::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Does this failure mean "the PDF already contains text"?
///
/// Opaque contract of ocrmypdf: exit code 6 (PriorOcrFound), or the
/// matching message on stderr for versions/wrappers that mangle the code.
fn signals_prior_text(code: Option<i32>, stderr: &str) -> bool {
    if code == Some(PRIOR_OCR_EXIT_CODE) {
        return true;
    }
    let lower = stderr.to_lowercase();
    lower.contains("page already has text") || lower.contains("priorocrfound")
}

fn describe_failure(code: Option<i32>, stderr: &str) -> String {
    let code = code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
    let stderr = stderr.trim();
    if stderr.is_empty() {
        code
    } else {
        format!("{code}: {stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_six_signals_prior_text() {
        assert!(signals_prior_text(Some(6), ""));
    }

    #[test]
    fn stderr_message_signals_prior_text() {
        assert!(signals_prior_text(
            Some(1),
            "ERROR - 1: page already has text! - aborting"
        ));
        assert!(signals_prior_text(Some(1), "ocrmypdf.exceptions.PriorOcrFound"));
    }

    #[test]
    fn other_failures_do_not_signal_prior_text() {
        assert!(!signals_prior_text(Some(1), "tesseract not installed"));
        assert!(!signals_prior_text(None, ""));
    }

    #[test]
    fn describe_failure_includes_code_and_stderr() {
        let msg = describe_failure(Some(15), "  something broke \n");
        assert_eq!(msg, "exit code 15: something broke");
        assert_eq!(describe_failure(None, ""), "killed by signal");
    }

    #[tokio::test]
    async fn missing_tool_is_skipped_and_pdf_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("deck.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\noriginal").expect("write fixture");

        let outcome = apply_ocr(
            &pdf,
            "eng",
            false,
            Some(Path::new("/definitely/not/ocrmypdf")),
        )
        .await
        .expect("missing tool must not error");

        assert_eq!(outcome, OcrOutcome::SkippedToolMissing);
        assert_eq!(std::fs::read(&pdf).unwrap(), b"%PDF-1.4\noriginal");
    }
}
