//! Deck fetching: the AnkiConnect HTTP client.
//!
//! AnkiConnect is an Anki add-on that exposes the running collection over a
//! local JSON-over-HTTP endpoint. Every action uses the same envelope —
//! `{"action", "version", "params"}` out, `{"result", "error"}` back, always
//! HTTP 200 — so a single generic [`AnkiClient::invoke`] covers the whole
//! protocol surface and per-action methods stay one line each.
//!
//! ## Failure mapping
//!
//! A refused connection means Anki is not running (or the add-on is not
//! installed) and gets a dedicated error with a hint. An `error` string
//! inside a 200 response is an API-level failure. Neither is retried — the
//! service is local, so transient network faults are not a real failure
//! mode.

use crate::config::{ExportConfig, ANKI_CONNECT_VERSION};
use crate::error::{CardError, ExportError};
use crate::pipeline::parse::{parse_field, FieldContent};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Field names conventionally used for the question side, checked in order.
const QUESTION_FIELD_NAMES: &[&str] = &["front", "question", "q", "term", "text"];

/// Field names conventionally used for the answer side, checked in order.
const ANSWER_FIELD_NAMES: &[&str] = &["back", "answer", "a", "definition", "back extra"];

/// One flashcard, ready for layout.
#[derive(Debug, Clone)]
pub struct Card {
    /// Anki note id the card came from.
    pub note_id: u64,
    /// Note type name, e.g. "Basic".
    pub model_name: String,
    /// Parsed question side.
    pub question: FieldContent,
    /// Parsed answer side.
    pub answer: FieldContent,
}

/// Raw per-card record as returned by the `cardsInfo` action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCardInfo {
    pub card_id: u64,
    /// Owning note id; multiple cards of one note share it.
    pub note: u64,
    pub model_name: String,
    pub fields: HashMap<String, RawFieldValue>,
}

/// A single field value inside [`RawCardInfo::fields`].
#[derive(Debug, Deserialize)]
pub struct RawFieldValue {
    pub value: String,
    pub order: u32,
}

#[derive(Serialize)]
struct AnkiRequest<'a, P: Serialize> {
    action: &'a str,
    version: u32,
    params: P,
}

#[derive(Deserialize)]
struct AnkiResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

/// Thin client over one AnkiConnect endpoint.
pub struct AnkiClient {
    http: reqwest::Client,
    url: String,
}

impl AnkiClient {
    /// Build a client from the export configuration.
    pub fn new(config: &ExportConfig) -> Result<Self, ExportError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExportError::Internal(format!("HTTP client construction failed: {e}")))?;

        Ok(Self {
            http,
            url: config.anki_url.clone(),
        })
    }

    /// Send one AnkiConnect action and unwrap its envelope.
    async fn invoke<P, T>(&self, action: &str, params: P) -> Result<T, ExportError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        debug!("AnkiConnect: {}", action);
        let response = self
            .http
            .post(&self.url)
            .json(&AnkiRequest {
                action,
                version: ANKI_CONNECT_VERSION,
                params,
            })
            .send()
            .await
            .map_err(|e| ExportError::ConnectionFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ExportError::InvalidResponse {
                action: action.to_string(),
                detail: format!("HTTP {}", response.status()),
            });
        }

        let envelope: AnkiResponse<T> =
            response
                .json()
                .await
                .map_err(|e| ExportError::InvalidResponse {
                    action: action.to_string(),
                    detail: e.to_string(),
                })?;

        if let Some(message) = envelope.error {
            return Err(ExportError::ApiError {
                action: action.to_string(),
                message,
            });
        }

        envelope.result.ok_or_else(|| ExportError::InvalidResponse {
            action: action.to_string(),
            detail: "envelope carried neither result nor error".to_string(),
        })
    }

    /// Names of all decks in the running collection.
    pub async fn deck_names(&self) -> Result<Vec<String>, ExportError> {
        self.invoke("deckNames", json!({})).await
    }

    /// Card ids matching an Anki search query.
    pub async fn find_cards(&self, query: &str) -> Result<Vec<u64>, ExportError> {
        self.invoke("findCards", json!({ "query": query })).await
    }

    /// Full card records for the given ids.
    pub async fn cards_info(&self, ids: &[u64]) -> Result<Vec<RawCardInfo>, ExportError> {
        self.invoke("cardsInfo", json!({ "cards": ids })).await
    }

    /// Media file contents, or `None` when the file does not exist.
    ///
    /// AnkiConnect returns the base64 payload on success and the JSON
    /// literal `false` for a missing file, hence the `Value` detour.
    pub async fn retrieve_media_file(
        &self,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, ExportError> {
        let value: serde_json::Value = self
            .invoke("retrieveMediaFile", json!({ "filename": filename }))
            .await?;

        match value {
            serde_json::Value::String(b64) => {
                let bytes =
                    STANDARD
                        .decode(b64.as_bytes())
                        .map_err(|e| ExportError::InvalidResponse {
                            action: "retrieveMediaFile".to_string(),
                            detail: format!("invalid base64 for '{filename}': {e}"),
                        })?;
                Ok(Some(bytes))
            }
            serde_json::Value::Bool(false) => Ok(None),
            other => Err(ExportError::InvalidResponse {
                action: "retrieveMediaFile".to_string(),
                detail: format!("unexpected result type: {other}"),
            }),
        }
    }
}

/// The search query selecting every card of one deck.
fn deck_query(deck: &str) -> String {
    // Quotes inside deck names must be escaped or the query splits.
    format!("deck:\"{}\"", deck.replace('"', "\\\""))
}

/// Fetch and parse every card of the named deck.
///
/// Validates the deck name against `deckNames` first — `findCards` alone
/// returns an empty list for both a misspelled deck and an empty one, and
/// those need different errors. Cards are fetched in batches and collapsed
/// to one [`Card`] per note, preserving collection order.
///
/// Returns the cards plus non-fatal warnings for notes whose fields could
/// not be recognised.
pub async fn fetch_deck(
    client: &AnkiClient,
    deck: &str,
    batch_size: usize,
) -> Result<(Vec<Card>, Vec<CardError>), ExportError> {
    info!("Fetching deck '{}'", deck);

    let names = client.deck_names().await?;
    if !names.iter().any(|n| n == deck) {
        return Err(ExportError::DeckNotFound {
            deck: deck.to_string(),
        });
    }

    let card_ids = client.find_cards(&deck_query(deck)).await?;
    if card_ids.is_empty() {
        return Err(ExportError::EmptyDeck {
            deck: deck.to_string(),
        });
    }
    info!("Deck '{}' has {} cards", deck, card_ids.len());

    let mut cards = Vec::new();
    let mut warnings = Vec::new();
    let mut seen_notes: HashSet<u64> = HashSet::new();

    for chunk in card_ids.chunks(batch_size) {
        let infos = client.cards_info(chunk).await?;
        if infos.is_empty() {
            warn!("cardsInfo returned nothing for a batch of {}", chunk.len());
            continue;
        }

        for info in infos {
            if !seen_notes.insert(info.note) {
                continue;
            }
            match resolve_fields(&info) {
                Some((question_html, answer_html)) => {
                    cards.push(Card {
                        note_id: info.note,
                        model_name: info.model_name,
                        question: parse_field(&question_html),
                        answer: parse_field(&answer_html),
                    });
                }
                None => {
                    let mut available: Vec<String> = info.fields.keys().cloned().collect();
                    available.sort();
                    warn!(
                        "note {}: no question/answer fields among {:?}",
                        info.note, available
                    );
                    warnings.push(CardError::UnrecognisedFields {
                        note_id: info.note,
                        model: info.model_name,
                        available,
                    });
                }
            }
        }
    }

    info!("Parsed {} unique notes from '{}'", cards.len(), deck);
    Ok((cards, warnings))
}

/// Locate the question and answer field values by conventional names.
fn resolve_fields(info: &RawCardInfo) -> Option<(String, String)> {
    let by_lower: HashMap<String, &str> = info
        .fields
        .iter()
        .map(|(name, field)| (name.to_lowercase(), field.value.as_str()))
        .collect();

    let question = QUESTION_FIELD_NAMES
        .iter()
        .find_map(|name| by_lower.get(*name).copied())?;
    let answer = ANSWER_FIELD_NAMES
        .iter()
        .find_map(|name| by_lower.get(*name).copied())?;

    Some((question.to_string(), answer.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with_fields(pairs: &[(&str, &str)]) -> RawCardInfo {
        RawCardInfo {
            card_id: 1,
            note: 100,
            model_name: "Basic".to_string(),
            fields: pairs
                .iter()
                .enumerate()
                .map(|(i, (name, value))| {
                    (
                        name.to_string(),
                        RawFieldValue {
                            value: value.to_string(),
                            order: i as u32,
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn deck_query_quotes_the_name() {
        assert_eq!(deck_query("Spanish Verbs"), r#"deck:"Spanish Verbs""#);
    }

    #[test]
    fn deck_query_escapes_embedded_quotes() {
        assert_eq!(deck_query(r#"say "hi""#), r#"deck:"say \"hi\"""#);
    }

    #[test]
    fn resolve_fields_standard_basic_note() {
        let info = info_with_fields(&[("Front", "hablar"), ("Back", "to speak")]);
        let (q, a) = resolve_fields(&info).expect("Basic note resolves");
        assert_eq!(q, "hablar");
        assert_eq!(a, "to speak");
    }

    #[test]
    fn resolve_fields_is_case_insensitive() {
        let info = info_with_fields(&[("QUESTION", "q?"), ("Answer", "a.")]);
        assert_eq!(
            resolve_fields(&info),
            Some(("q?".to_string(), "a.".to_string()))
        );
    }

    #[test]
    fn resolve_fields_prefers_earlier_names() {
        // "front" outranks "text" for the question side.
        let info = info_with_fields(&[("Text", "cloze text"), ("Front", "front"), ("Back", "b")]);
        let (q, _) = resolve_fields(&info).unwrap();
        assert_eq!(q, "front");
    }

    #[test]
    fn resolve_fields_rejects_unknown_layout() {
        let info = info_with_fields(&[("Expression", "x"), ("Reading", "y")]);
        assert_eq!(resolve_fields(&info), None);
    }

    #[test]
    fn envelope_with_error_is_surfaced() {
        let body = r#"{"result": null, "error": "deck was not found"}"#;
        let envelope: AnkiResponse<Vec<String>> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.error.as_deref(), Some("deck was not found"));
        assert!(envelope.result.is_none());
    }

    #[test]
    fn card_info_deserialises_from_ankiconnect_shape() {
        let body = r#"{
            "cardId": 1498938915662,
            "note": 1502298033753,
            "modelName": "Basic",
            "deckName": "Default",
            "fields": {
                "Front": {"value": "front content", "order": 0},
                "Back": {"value": "back content", "order": 1}
            }
        }"#;
        let info: RawCardInfo = serde_json::from_str(body).expect("deserialise cardsInfo record");
        assert_eq!(info.note, 1502298033753);
        assert_eq!(info.fields["Front"].value, "front content");
    }
}
