//! Vision extraction of supplement-facts panels.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;
use crate::models::{ExtractedFact, ImageRef, VisionConfig};
use crate::utils::http::status_error;

/// Default instructions for the vision model.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert at reading dietary supplement labels.
Look at the image. If it does not show a "Supplement Facts" panel, reply with
{"supplement_facts_visible": false}.
Otherwise reply with ONLY this JSON object:
{
  "supplement_facts_visible": true,
  "serving_size": "serving size as printed, e.g. 2 Gummies",
  "form": "one of Gummies, Chewable, Tablets, Capsules, Liquid, Drops, Powder, Softgels",
  "age_group": "age group as 2+, 4+ and so on, empty if not stated",
  "facts": [
    {"nutrient": "name", "amount": "number as printed", "unit": "mg, mcg, IU, g ...", "daily_value": "percent daily value or empty"}
  ]
}
List every row of the panel. Leave out the "Other ingredients" line."#;

/// Trait for services that turn a label image into structured facts.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    /// Extract the facts shown on an image.
    ///
    /// Returns an empty list when the image shows no facts panel. Fails with
    /// `ClientError::Extraction` when the model output cannot be parsed.
    async fn extract_facts(&self, image: &ImageRef) -> Result<Vec<ExtractedFact>, ClientError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
    detail: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct LabelPanel {
    #[serde(default = "default_visible")]
    supplement_facts_visible: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    serving_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    form: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    age_group: Option<String>,
    #[serde(default)]
    facts: Vec<PanelFact>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PanelFact {
    #[serde(default, deserialize_with = "lenient_string")]
    nutrient: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    unit: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    daily_value: Option<String>,
}

/// Accept strings or numbers; empty strings and nulls become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Remove a Markdown code fence around the model reply, if any.
fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a model reply into facts for `product_id`.
fn parse_reply(product_id: &str, content: &str) -> Result<Vec<ExtractedFact>, ClientError> {
    let body = strip_fence(content);
    let panel: LabelPanel = serde_json::from_str(body).map_err(|e| {
        ClientError::Extraction(format!("unparseable model output for {product_id}: {e}"))
    })?;

    if !panel.supplement_facts_visible {
        return Ok(Vec::new());
    }

    let facts = panel
        .facts
        .into_iter()
        .filter_map(|f| {
            Some(ExtractedFact {
                product_id: product_id.to_string(),
                nutrient: f.nutrient?,
                amount: f.amount.unwrap_or_default(),
                unit: f.unit.unwrap_or_default(),
                daily_value: f.daily_value,
                serving_size: panel.serving_size.clone(),
                form: panel.form.clone(),
                age_group: panel.age_group.clone(),
            })
        })
        .collect();
    Ok(facts)
}

/// OpenAI chat-completions client with image input.
#[derive(Debug, Clone)]
pub struct OpenAiVision {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl OpenAiVision {
    pub fn new(config: &VisionConfig, api_key: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Rejected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

#[async_trait]
impl FactExtractor for OpenAiVision {
    async fn extract_facts(&self, image: &ImageRef) -> Result<Vec<ExtractedFact>, ClientError> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key.trim()))
            .map_err(|_| ClientError::Unauthorized("invalid OpenAI API key".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(&self.system_prompt),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: format!("Read the Supplement Facts for: {}", image.context),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: &image.url,
                                detail: "high",
                            },
                        },
                    ]),
                },
            ],
        };

        tracing::debug!(asin = %image.product_id, url = %image.url, "vision request");
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, auth)
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                // The image could not be fetched or decoded on the model side.
                400 => {
                    let body = response.text().await.unwrap_or_default();
                    ClientError::Extraction(format!("image rejected: {}", body.trim()))
                }
                404 => ClientError::Rejected(format!("model {} not available", self.model)),
                _ => status_error(response).await,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(ClientError::from_transport)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::Extraction("empty model reply".to_string()))?;

        parse_reply(&image.product_id, &content)
    }
}
