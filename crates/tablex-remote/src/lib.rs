//! Remote LLM classifier backend for tablex.
//!
//! Speaks an OpenAI-compatible chat-completions API: the region's text
//! is rendered into a prompt asking for a strict JSON verdict, and the
//! response is parsed tolerantly (markdown-fenced JSON included). HTTP
//! and parsing failures map onto the adapter's retryable
//! [`ClassifyError`] taxonomy — the backend itself never retries; the
//! [`ClassifierAdapter`](tablex_core::ClassifierAdapter) owns backoff
//! and the fail-closed fallback.
//!
//! ## Example
//!
//! ```no_run
//! use tablex_remote::RemoteClassifier;
//!
//! let classifier = RemoteClassifier::new(
//!     "https://api.openai.com/v1".to_string(),
//!     std::env::var("OPENAI_API_KEY").unwrap_or_default(),
//!     "gpt-4o".to_string(),
//! );
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tablex_core::{Classifier, ClassifyError, RegionView, Verdict};

/// Chat-completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Chat-completions response body.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Verdict JSON the model is asked to produce.
#[derive(Debug, Deserialize)]
struct VerdictResponse {
    is_table: bool,
    #[serde(default)]
    title_hint: String,
    classifier_confidence: f64,
}

/// Classifier backend calling a remote reasoning service.
#[derive(Debug, Clone)]
pub struct RemoteClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl RemoteClassifier {
    /// Create a backend for an OpenAI-compatible endpoint.
    ///
    /// `base_url` is the API root (e.g. `https://api.openai.com/v1`);
    /// the `/chat/completions` path is appended per call.
    #[must_use]
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn request_for(&self, region: &RegionView) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: format!(
                    "{CLASSIFY_PROMPT}\n\nPage {page}, region text:\n{body}",
                    page = region.page,
                    body = region.lines.join("\n"),
                ),
            }],
            max_tokens: 256,
            temperature: 0.0,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
        }
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, region: &RegionView) -> Result<Verdict, ClassifyError> {
        let request = self.request_for(region);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Transport {
                        reason: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ClassifyError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Transport {
                reason: format!("API error ({status}): {body}"),
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|err| {
            ClassifyError::Malformed {
                reason: format!("response body: {err}"),
            }
        })?;
        let content = chat
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| ClassifyError::Malformed {
                reason: "empty choices".to_string(),
            })?;

        debug!(page = region.page, "remote verdict received");
        parse_verdict(content)
    }
}

/// Parse the model's verdict JSON, tolerating markdown fences.
fn parse_verdict(content: &str) -> Result<Verdict, ClassifyError> {
    let json = extract_json(content);
    let parsed: VerdictResponse =
        serde_json::from_str(&json).map_err(|err| ClassifyError::Malformed {
            reason: format!("verdict JSON: {err}"),
        })?;
    Ok(Verdict {
        is_table: parsed.is_table,
        title_hint: parsed.title_hint,
        classifier_confidence: parsed.classifier_confidence.clamp(0.0, 100.0),
    })
}

/// Extract JSON from a response, handling ```json fences.
fn extract_json(text: &str) -> String {
    let text = text.trim();

    if text.starts_with("```") {
        if let Some(start) = text.find('\n') {
            let after_first_line = &text[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            return text[start..=end].to_string();
        }
    }

    text.to_string()
}

const CLASSIFY_PROMPT: &str = r#"You judge whether a document region is a genuine data table.

A genuine table has aligned columns of related values. Letterheads, contact blocks, running page headers/footers, and prose are NOT tables, even when visually aligned.

OUTPUT JSON SCHEMA:
{
  "is_table": <bool>,
  "title_hint": "<title of the table if one is visible inside the region, else empty string>",
  "classifier_confidence": <0-100>
}

RULES:
1. is_table=false for letterheads, addresses, phone blocks, page furniture.
2. title_hint must be text actually present in the region; never invent one.
3. classifier_confidence reflects certainty in the is_table judgment.

Return ONLY valid JSON. No markdown, no explanation."#;
