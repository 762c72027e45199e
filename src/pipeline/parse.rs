//! HTML field parsing: Anki field HTML → plain text + media references.
//!
//! Anki stores card fields as HTML fragments. For PDF layout we need two
//! things out of a fragment: the visible text, and the filenames of any
//! `<img>` elements so the media can be fetched and embedded separately.
//!
//! A full HTML parser would be overkill for the fragments Anki produces
//! (flat markup, no scripts, rarely nested beyond a couple of levels), so
//! this module applies a fixed sequence of regex/string rules. Each rule is
//! a pure function and independently testable.
//!
//! ## Rule Order
//!
//! Image extraction must run before tag stripping (stripping destroys the
//! `src` attributes), `<br>` conversion before tag stripping (otherwise the
//! line structure is lost), and entity decoding last so that literal
//! `&lt;b&gt;` in a field does not resurrect a tag mid-pipeline.

use once_cell::sync::Lazy;
use regex::Regex;

/// The usable content of one side of a card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldContent {
    /// Visible text, newline-separated, with blank lines removed.
    pub text: String,
    /// Media filenames referenced by `<img src=…>`, in document order.
    pub images: Vec<String>,
}

impl FieldContent {
    /// True when the field has neither text nor images.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.images.is_empty()
    }
}

/// Parse an Anki field's HTML into text and image references.
pub fn parse_field(html: &str) -> FieldContent {
    if html.trim().is_empty() {
        return FieldContent::default();
    }

    let images = extract_image_sources(html);
    let s = strip_image_tags(html);
    let s = convert_line_breaks(&s);
    let s = strip_tags(&s);
    let s = decode_entities(&s);
    let text = normalise_whitespace(&s);

    FieldContent { text, images }
}

// ── Rule 1: Extract <img src=…> filenames ────────────────────────────────────

static RE_IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]*?\bsrc\s*=\s*(?:"([^"]+)"|'([^']+)'|([^\s>"']+))[^>]*>"#).unwrap()
});

fn extract_image_sources(input: &str) -> Vec<String> {
    RE_IMG_SRC
        .captures_iter(input)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

// ── Rule 2: Remove the <img> tags themselves ─────────────────────────────────

static RE_IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img[^>]*>").unwrap());

fn strip_image_tags(input: &str) -> String {
    RE_IMG_TAG.replace_all(input, "").to_string()
}

// ── Rule 3: <br> and block-element boundaries become newlines ────────────────

static RE_LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(?:div|p|li|tr)>").unwrap());

fn convert_line_breaks(input: &str) -> String {
    RE_LINE_BREAK.replace_all(input, "\n").to_string()
}

// ── Rule 4: Strip every remaining tag ────────────────────────────────────────

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

fn strip_tags(input: &str) -> String {
    RE_TAG.replace_all(input, "").to_string()
}

// ── Rule 5: Decode the entities Anki actually emits ──────────────────────────

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ── Rule 6: Collapse runs of spaces, trim lines, drop blanks ─────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

fn normalise_whitespace(input: &str) -> String {
    let collapsed = RE_SPACES.replace_all(input, " ");
    collapsed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
