//! End-to-end integration tests for anki2pdf.
//!
//! Most tests run against an `httpmock` stand-in for AnkiConnect and (on
//! Unix) a stub shell script standing in for `ocrmypdf`, so they need no
//! external software. The handful of tests that talk to a real running Anki
//! are gated behind the `E2E_ENABLED` environment variable and skip
//! themselves in CI.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! Against a live Anki instance:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use anki2pdf::{export, ExportConfig, ExportError, OcrOutcome};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use httpmock::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Mock the three AnkiConnect actions needed to fetch a deck of basic cards.
///
/// `cards` is `(card_id, note_id, front_html, back_html)`.
fn mock_deck(server: &MockServer, deck: &str, cards: &[(u64, u64, &str, &str)]) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "deckNames"}"#);
        then.status(200)
            .json_body(json!({ "result": [deck, "Default"], "error": null }));
    });

    let ids: Vec<u64> = cards.iter().map(|c| c.0).collect();
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "findCards"}"#);
        then.status(200)
            .json_body(json!({ "result": ids, "error": null }));
    });

    let infos: Vec<serde_json::Value> = cards
        .iter()
        .map(|(card_id, note_id, front, back)| {
            json!({
                "cardId": card_id,
                "note": note_id,
                "modelName": "Basic",
                "deckName": deck,
                "fields": {
                    "Front": { "value": front, "order": 0 },
                    "Back": { "value": back, "order": 1 }
                }
            })
        })
        .collect();
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "cardsInfo"}"#);
        then.status(200)
            .json_body(json!({ "result": infos, "error": null }));
    });
}

fn base_config(server: &MockServer) -> anki2pdf::ExportConfigBuilder {
    ExportConfig::builder()
        .anki_url(server.base_url())
        .request_timeout_secs(5)
}

/// Count page objects in a serialised PDF (tolerating either name spacing).
fn count_page_objects(bytes: &[u8]) -> usize {
    let with_space = count_occurrences(bytes, b"/Type /Page")
        - count_occurrences(bytes, b"/Type /Pages");
    let without_space =
        count_occurrences(bytes, b"/Type/Page") - count_occurrences(bytes, b"/Type/Pages");
    with_space.max(without_space)
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|w| *w == needle)
        .count()
}

fn assert_is_pdf(path: &Path) -> Vec<u8> {
    let bytes = std::fs::read(path).expect("output file must exist");
    assert!(
        bytes.starts_with(b"%PDF-"),
        "output must start with the PDF magic, got {:?}",
        &bytes[..bytes.len().min(8)]
    );
    bytes
}

/// A 16×16 red PNG for media fixtures.
fn png_fixture() -> Vec<u8> {
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([200, 20, 20, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode fixture");
    buf
}

// ── Deck fetching + rendering ────────────────────────────────────────────────

#[tokio::test]
async fn three_card_deck_renders_three_pages() {
    let server = MockServer::start();
    mock_deck(
        &server,
        "Spanish Verbs",
        &[
            (1, 101, "hablar", "to speak"),
            (2, 102, "comer", "to eat"),
            (3, 103, "vivir", "to live"),
        ],
    );

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.pdf");
    let config = base_config(&server).build().unwrap();

    let output = export("Spanish Verbs", &out, &config)
        .await
        .expect("export should succeed");

    assert_eq!(output.stats.total_cards, 3);
    assert_eq!(output.stats.rendered_cards, 3);
    assert_eq!(output.stats.skipped_cards, 0);
    assert_eq!(output.stats.ocr, OcrOutcome::Disabled);
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);

    let bytes = assert_is_pdf(&out);
    assert_eq!(output.stats.pdf_bytes, bytes.len() as u64);
    assert!(
        count_page_objects(&bytes) >= 3,
        "3 cards must yield at least 3 pages"
    );
}

#[tokio::test]
async fn html_fields_are_cleaned_before_layout() {
    let server = MockServer::start();
    mock_deck(
        &server,
        "HTML Deck",
        &[(1, 201, "<b>ser</b> vs <i>estar</i><br>two copulas", "a &amp; b")],
    );

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("html.pdf");
    let config = base_config(&server).build().unwrap();

    let output = export("HTML Deck", &out, &config).await.expect("export");
    assert_eq!(output.stats.rendered_cards, 1);
    assert!(output.warnings.is_empty());
    assert_is_pdf(&out);
}

#[tokio::test]
async fn cards_of_one_note_are_deduplicated() {
    let server = MockServer::start();
    // Two cards (forward + reverse) of the same note.
    mock_deck(
        &server,
        "Reversed",
        &[(1, 301, "front", "back"), (2, 301, "front", "back")],
    );

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("dedup.pdf");
    let config = base_config(&server).build().unwrap();

    let output = export("Reversed", &out, &config).await.expect("export");
    assert_eq!(output.stats.rendered_cards, 1, "one note → one card");
}

#[tokio::test]
async fn unrecognised_note_layout_is_skipped_with_warning() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "deckNames"}"#);
        then.status(200)
            .json_body(json!({ "result": ["Mixed"], "error": null }));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "findCards"}"#);
        then.status(200)
            .json_body(json!({ "result": [1, 2], "error": null }));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "cardsInfo"}"#);
        then.status(200).json_body(json!({
            "result": [
                {
                    "cardId": 1, "note": 401, "modelName": "Basic", "deckName": "Mixed",
                    "fields": {
                        "Front": { "value": "ok", "order": 0 },
                        "Back": { "value": "fine", "order": 1 }
                    }
                },
                {
                    "cardId": 2, "note": 402, "modelName": "Japanese", "deckName": "Mixed",
                    "fields": {
                        "Expression": { "value": "犬", "order": 0 },
                        "Reading": { "value": "いぬ", "order": 1 }
                    }
                }
            ],
            "error": null
        }));
    });

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("mixed.pdf");
    let config = base_config(&server).build().unwrap();

    let output = export("Mixed", &out, &config).await.expect("export");
    assert_eq!(output.stats.rendered_cards, 1);
    assert_eq!(output.stats.skipped_cards, 1);
    assert_eq!(output.warnings.len(), 1);

    // The sidecar records the skipped note.
    let sidecar = dir.path().join("mixed_errors.txt");
    let text = std::fs::read_to_string(&sidecar).expect("sidecar must exist");
    assert!(text.contains("402"), "sidecar should name note 402: {text}");
}

#[tokio::test]
async fn rerun_overwrites_previous_output() {
    let server = MockServer::start();
    mock_deck(&server, "Overwrite", &[(1, 501, "q", "a")]);

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.pdf");
    std::fs::write(&out, b"stale junk from a previous run").unwrap();

    let config = base_config(&server).build().unwrap();
    export("Overwrite", &out, &config).await.expect("export");

    let bytes = assert_is_pdf(&out);
    assert!(!bytes.windows(5).any(|w| w == b"stale"));
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unreachable_api_fails_without_creating_output() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("never.pdf");

    // Nothing listens on port 1.
    let config = ExportConfig::builder()
        .anki_url("http://127.0.0.1:1")
        .request_timeout_secs(2)
        .build()
        .unwrap();

    let err = export("Any Deck", &out, &config)
        .await
        .expect_err("export must fail");
    assert!(
        matches!(err, ExportError::ConnectionFailed { .. }),
        "got: {err}"
    );
    assert!(!out.exists(), "no PDF may be created when fetching fails");
}

#[tokio::test]
async fn unknown_deck_is_reported_as_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "deckNames"}"#);
        then.status(200)
            .json_body(json!({ "result": ["Default", "Biology"], "error": null }));
    });

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("missing.pdf");
    let config = base_config(&server).build().unwrap();

    let err = export("Spanish Verbs", &out, &config)
        .await
        .expect_err("export must fail");
    assert!(matches!(err, ExportError::DeckNotFound { .. }), "got: {err}");
    assert!(!out.exists());
}

#[tokio::test]
async fn empty_deck_is_an_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "deckNames"}"#);
        then.status(200)
            .json_body(json!({ "result": ["Empty"], "error": null }));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "findCards"}"#);
        then.status(200).json_body(json!({ "result": [], "error": null }));
    });

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("empty.pdf");
    let config = base_config(&server).build().unwrap();

    let err = export("Empty", &out, &config).await.expect_err("must fail");
    assert!(matches!(err, ExportError::EmptyDeck { .. }), "got: {err}");
    assert!(!out.exists());
}

#[tokio::test]
async fn api_error_envelope_is_surfaced() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/");
        then.status(200)
            .json_body(json!({ "result": null, "error": "collection is not available" }));
    });

    let dir = TempDir::new().unwrap();
    let config = base_config(&server).build().unwrap();

    let err = export("Any", dir.path().join("x.pdf"), &config)
        .await
        .expect_err("must fail");
    assert!(matches!(err, ExportError::ApiError { .. }), "got: {err}");
}

// ── Media and compression ────────────────────────────────────────────────────

fn mock_media(server: &MockServer, payload: &[u8]) {
    let b64 = STANDARD.encode(payload);
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "retrieveMediaFile"}"#);
        then.status(200)
            .json_body(json!({ "result": b64, "error": null }));
    });
}

#[tokio::test]
async fn media_is_fetched_and_embedded() {
    let server = MockServer::start();
    mock_deck(
        &server,
        "Media Deck",
        &[(1, 601, r#"What organ? <img src="heart.png">"#, "the heart")],
    );
    mock_media(&server, &png_fixture());

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("media.pdf");
    let config = base_config(&server).build().unwrap();

    let output = export("Media Deck", &out, &config).await.expect("export");
    assert_eq!(output.stats.media_files, 1);
    assert_eq!(output.stats.compressed_images, 0, "no quality configured");
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert_is_pdf(&out);
}

#[tokio::test]
async fn image_quality_triggers_compression() {
    let server = MockServer::start();
    mock_deck(
        &server,
        "Media Deck",
        &[(1, 601, r#"<img src="heart.png">"#, "the heart")],
    );
    mock_media(&server, &png_fixture());

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("compressed.pdf");
    let config = base_config(&server).image_quality(70).build().unwrap();

    let output = export("Media Deck", &out, &config).await.expect("export");
    assert_eq!(output.stats.media_files, 1);
    assert_eq!(output.stats.compressed_images, 1);
    assert_is_pdf(&out);
}

#[tokio::test]
async fn missing_media_degrades_to_placeholder() {
    let server = MockServer::start();
    mock_deck(
        &server,
        "Media Deck",
        &[(1, 601, r#"<img src="lost.png">"#, "answer")],
    );
    // AnkiConnect signals a missing file with the literal `false`.
    server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .json_body_partial(r#"{"action": "retrieveMediaFile"}"#);
        then.status(200)
            .json_body(json!({ "result": false, "error": null }));
    });

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("placeholder.pdf");
    let config = base_config(&server).build().unwrap();

    let output = export("Media Deck", &out, &config).await.expect("export");
    assert_eq!(output.stats.media_files, 0);
    assert_eq!(output.warnings.len(), 1);
    assert_is_pdf(&out);
}

// ── OCR stage (stub ocrmypdf, Unix only) ─────────────────────────────────────

/// Write an executable stub standing in for ocrmypdf.
///
/// The stub appends its argv to `log`, and in `prior_text` mode fails with
/// ocrmypdf's PriorOcrFound exit code unless `--force-ocr` is present. On
/// success it copies the input over the staging path and appends a marker so
/// tests can tell the "OCR output" from the renderer's.
#[cfg(unix)]
fn write_stub_ocr(dir: &Path, log: &Path, prior_text: bool) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let body = format!(
        r#"#!/bin/sh
echo "$@" >> "{log}"
force=0
prev1=""
prev2=""
for a in "$@"; do
  if [ "$a" = "--force-ocr" ]; then force=1; fi
  prev2="$prev1"
  prev1="$a"
done
if [ "{prior_text}" = "true" ] && [ "$force" = "0" ]; then
  echo "ERROR - 1: page already has text! - aborting" >&2
  exit 6
fi
cp "$prev2" "$prev1"
printf 'OCR-MARKER' >> "$prev1"
exit 0
"#,
        log = log.display(),
        prior_text = prior_text,
    );

    let path = dir.join("ocrmypdf-stub");
    std::fs::write(&path, body).expect("write stub");
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(unix)]
fn read_invocations(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(unix)]
#[tokio::test]
async fn prior_text_triggers_exactly_one_forced_retry() {
    let server = MockServer::start();
    mock_deck(&server, "OCR Deck", &[(1, 701, "q", "a")]);

    let dir = TempDir::new().unwrap();
    let log = dir.path().join("invocations.log");
    let stub = write_stub_ocr(dir.path(), &log, true);
    let out = dir.path().join("ocr.pdf");

    let config = base_config(&server)
        .ocr_language("eng")
        .ocr_binary(&stub)
        .build()
        .unwrap();

    let output = export("OCR Deck", &out, &config).await.expect("export");
    assert_eq!(output.stats.ocr, OcrOutcome::Applied { forced: true });

    let invocations = read_invocations(&log);
    assert_eq!(invocations.len(), 2, "one plain attempt, one retry");
    assert!(!invocations[0].contains("--force-ocr"));
    assert!(invocations[1].contains("--force-ocr"));
    assert!(invocations[0].contains("--language eng"));

    let bytes = assert_is_pdf(&out);
    assert!(
        bytes.ends_with(b"OCR-MARKER"),
        "the retried OCR output must be in place"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn force_ocr_is_applied_on_the_first_attempt() {
    let server = MockServer::start();
    mock_deck(&server, "OCR Deck", &[(1, 701, "q", "a")]);

    let dir = TempDir::new().unwrap();
    let log = dir.path().join("invocations.log");
    let stub = write_stub_ocr(dir.path(), &log, true);
    let out = dir.path().join("forced.pdf");

    let config = base_config(&server)
        .ocr_language("eng")
        .force_ocr(true)
        .ocr_binary(&stub)
        .build()
        .unwrap();

    let output = export("OCR Deck", &out, &config).await.expect("export");
    assert_eq!(output.stats.ocr, OcrOutcome::Applied { forced: true });

    let invocations = read_invocations(&log);
    assert_eq!(invocations.len(), 1, "force mode must not retry");
    assert!(invocations[0].contains("--force-ocr"));
}

#[cfg(unix)]
#[tokio::test]
async fn clean_ocr_run_needs_no_retry() {
    let server = MockServer::start();
    mock_deck(&server, "OCR Deck", &[(1, 701, "q", "a")]);

    let dir = TempDir::new().unwrap();
    let log = dir.path().join("invocations.log");
    let stub = write_stub_ocr(dir.path(), &log, false);
    let out = dir.path().join("clean.pdf");

    let config = base_config(&server)
        .ocr_language("deu")
        .ocr_binary(&stub)
        .build()
        .unwrap();

    let output = export("OCR Deck", &out, &config).await.expect("export");
    assert_eq!(output.stats.ocr, OcrOutcome::Applied { forced: false });

    let invocations = read_invocations(&log);
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].contains("--language deu"));
}

#[cfg(unix)]
#[tokio::test]
async fn other_ocr_failures_propagate_without_retry() {
    use std::os::unix::fs::PermissionsExt;

    let server = MockServer::start();
    mock_deck(&server, "OCR Deck", &[(1, 701, "q", "a")]);

    let dir = TempDir::new().unwrap();
    let log = dir.path().join("invocations.log");
    let stub = dir.path().join("broken-stub");
    std::fs::write(
        &stub,
        format!(
            "#!/bin/sh\necho \"$@\" >> \"{}\"\necho 'tesseract not installed' >&2\nexit 2\n",
            log.display()
        ),
    )
    .unwrap();
    let mut perms = std::fs::metadata(&stub).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&stub, perms).unwrap();

    let out = dir.path().join("fails.pdf");
    let config = base_config(&server)
        .ocr_language("eng")
        .ocr_binary(&stub)
        .build()
        .unwrap();

    let err = export("OCR Deck", &out, &config)
        .await
        .expect_err("OCR failure must propagate");
    assert!(matches!(err, ExportError::OcrFailed { .. }), "got: {err}");
    assert_eq!(read_invocations(&log).len(), 1, "no retry for other errors");

    // The rendered PDF stays in place untouched.
    assert_is_pdf(&out);
}

#[tokio::test]
async fn missing_ocr_tool_leaves_renderer_output_untouched() {
    let server = MockServer::start();
    mock_deck(&server, "OCR Deck", &[(1, 701, "q", "a")]);

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("noocr.pdf");

    let config = base_config(&server)
        .ocr_language("eng")
        .ocr_binary("/definitely/not/installed/ocrmypdf")
        .build()
        .unwrap();

    let output = export("OCR Deck", &out, &config)
        .await
        .expect("missing tool must not fail the run");
    assert_eq!(output.stats.ocr, OcrOutcome::SkippedToolMissing);

    let bytes = assert_is_pdf(&out);
    assert_eq!(
        output.stats.pdf_bytes,
        bytes.len() as u64,
        "bytes on disk must be exactly what the renderer wrote"
    );
}

// ── Live tests (need a running Anki with AnkiConnect) ────────────────────────

/// Skip unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 and run Anki with AnkiConnect");
            return;
        }
    };
}

#[tokio::test]
async fn live_list_decks() {
    e2e_skip_unless_enabled!();

    let config = ExportConfig::builder().build().unwrap();
    let decks = anki2pdf::list_decks(&config)
        .await
        .expect("a live Anki must answer deckNames");
    assert!(!decks.is_empty(), "every collection has at least one deck");
    println!("decks: {decks:?}");
}

#[tokio::test]
async fn live_export_default_deck() {
    e2e_skip_unless_enabled!();

    let deck = std::env::var("E2E_DECK").unwrap_or_else(|_| "Default".to_string());
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("live.pdf");

    let config = ExportConfig::builder().build().unwrap();
    match export(&deck, &out, &config).await {
        Ok(output) => {
            println!(
                "exported {} cards, {} bytes",
                output.stats.rendered_cards, output.stats.pdf_bytes
            );
            assert_is_pdf(&out);
        }
        Err(ExportError::EmptyDeck { .. }) => {
            println!("SKIP — deck '{deck}' is empty");
        }
        Err(e) => panic!("live export failed: {e}"),
    }
}
