//! Category suggester: prompt context, reply parsing, and the OpenAI-compatible client.

use crate::classifier::Classification;
use crate::config::{AiConfig, Config, PriceBand};
use crate::history::PricePhase;
use crate::http;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use wreq::Client;

/// Number of URLs the suggester ranks as top picks.
pub const TOP_PICKS: usize = 3;

/// A discovered category offered to the suggester.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub url: String,
    pub name: String,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_count: Option<usize>,
    pub subcategories: usize,
}

/// A historical category and how well it produced.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub url: String,
    pub products_found: usize,
    pub performance_score: f64,
}

/// A URL the suggester should not propose again, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct FailedSummary {
    pub url: String,
    pub reason: String,
}

/// Everything the suggester sees for one selection cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionContext {
    pub supplier_url: String,
    pub price_phase: PricePhase,
    pub price_band: PriceBand,
    pub candidates: Vec<CandidateSummary>,
    pub top_performers: Vec<PerformanceSummary>,
    pub previously_suggested: Vec<String>,
    pub previously_failed: Vec<FailedSummary>,
    pub total_products_processed: u64,
}

/// A well-formed suggester reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suggestion {
    pub top_urls: Vec<String>,
    pub secondary_urls: Vec<String>,
    pub skip_urls: Vec<String>,
    pub reasoning: String,
    pub progression_strategy: String,
}

/// Why a suggester reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuggestionError {
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("missing key '{0}'")]
    MissingKey(&'static str),

    #[error("key '{0}' must be an array of strings")]
    WrongType(&'static str),
}

/// Parses a raw suggester reply, tolerating a Markdown code fence around the JSON.
pub fn parse_suggestion(raw: &str) -> Result<Suggestion, SuggestionError> {
    let body = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| SuggestionError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(SuggestionError::NotAnObject)?;

    let string_list = |key: &'static str| -> Result<Vec<String>, SuggestionError> {
        let items = object
            .get(key)
            .ok_or(SuggestionError::MissingKey(key))?
            .as_array()
            .ok_or(SuggestionError::WrongType(key))?;

        items
            .iter()
            .map(|item| {
                item.as_str().map(|s| s.trim().to_string()).ok_or(SuggestionError::WrongType(key))
            })
            .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
            .collect()
    };

    let mut top_urls = string_list("top_3_urls")?;
    let mut secondary_urls = string_list("secondary_urls")?;
    let skip_urls = string_list("skip_urls")?;

    // Extra top picks become the first backups
    if top_urls.len() > TOP_PICKS {
        let mut overflow = top_urls.split_off(TOP_PICKS);
        overflow.append(&mut secondary_urls);
        secondary_urls = overflow;
    }

    let reasoning = match object.get("detailed_reasoning") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let progression_strategy = object
        .get("progression_strategy")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Suggestion { top_urls, secondary_urls, skip_urls, reasoning, progression_strategy })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag line, then the closing fence
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Builds the user prompt for one cycle.
pub fn build_prompt(context: &SuggestionContext) -> Result<String> {
    let context_json =
        serde_json::to_string_pretty(context).context("Failed to serialize suggestion context")?;

    Ok(format!(
        "You select supplier categories for Amazon FBA arbitrage sourcing.\n\
         Current price phase: {phase} (supplier prices {min:.2} to {max:.2}).\n\
         Prefer small, light, non-restricted goods that sell well on Amazon. \
         Never propose URLs listed in previously_suggested or previously_failed. \
         Only propose URLs from the candidates list or other category URLs on the same site.\n\n\
         Reply with a single JSON object with exactly these keys:\n\
         - \"top_3_urls\": array of up to 3 category URLs, best first\n\
         - \"secondary_urls\": array of backup category URLs\n\
         - \"skip_urls\": array of candidate URLs to avoid\n\
         - \"detailed_reasoning\": object mapping URL to a short reason\n\
         - \"progression_strategy\": string describing what to try next\n\n\
         Context:\n{context_json}",
        phase = context.price_phase,
        min = context.price_band.min,
        max = context.price_band.max,
    ))
}

/// External category suggester. Returns the raw reply text; validation
/// happens in `parse_suggestion` so malformed replies take the fallback path.
#[async_trait]
pub trait AiSuggester: Send + Sync {
    async fn suggest(&self, context: &SuggestionContext) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

const SYSTEM_PROMPT: &str =
    "You are a sourcing analyst. Answer with one JSON object and nothing else.";

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiSuggester {
    client: Client,
    settings: AiConfig,
    api_key: String,
}

impl OpenAiSuggester {
    /// Creates a suggester; fails when no API key is configured.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .ai
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("No AI API key configured (set OPENAI_API_KEY or ai.api_key, or pass --no-ai)")?;

        let client = http::build_client(config, Duration::from_secs(config.ai.timeout_secs))?;

        Ok(Self { client, settings: config.ai.clone(), api_key })
    }
}

#[async_trait]
impl AiSuggester for OpenAiSuggester {
    async fn suggest(&self, context: &SuggestionContext) -> Result<String> {
        let prompt = build_prompt(context)?;
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &prompt },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let body = serde_json::to_string(&request).context("Failed to encode chat request")?;

        let url = format!("{}/chat/completions", self.settings.endpoint.trim_end_matches('/'));
        info!(
            "Requesting category suggestions from {} ({} candidates)",
            self.settings.model,
            context.candidates.len()
        );

        let response = self
            .client
            .post(url.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to reach suggester")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read suggester response")?;
        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            bail!("Suggester returned status {}: {}", status, snippet);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).context("Unexpected suggester response shape")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Suggester response has no content")?;

        debug!("Suggester reply: {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> SuggestionContext {
        SuggestionContext {
            supplier_url: "https://shop.example.com".to_string(),
            price_phase: PricePhase::Low,
            price_band: PriceBand { min: 0.0, max: 15.0 },
            candidates: vec![CandidateSummary {
                url: "https://shop.example.com/kitchen".to_string(),
                name: "Kitchen".to_string(),
                classification: Classification::Friendly,
                product_count: Some(24),
                subcategories: 2,
            }],
            top_performers: Vec::new(),
            previously_suggested: vec!["https://shop.example.com/toys".to_string()],
            previously_failed: Vec::new(),
            total_products_processed: 0,
        }
    }

    #[test]
    fn test_parse_valid_reply() {
        let raw = r#"{
            "top_3_urls": ["https://s.com/a", "https://s.com/b"],
            "secondary_urls": ["https://s.com/c"],
            "skip_urls": [],
            "detailed_reasoning": {"https://s.com/a": "cheap kitchenware"},
            "progression_strategy": "garden next"
        }"#;

        let suggestion = parse_suggestion(raw).unwrap();
        assert_eq!(suggestion.top_urls, vec!["https://s.com/a", "https://s.com/b"]);
        assert_eq!(suggestion.secondary_urls, vec!["https://s.com/c"]);
        assert!(suggestion.skip_urls.is_empty());
        assert!(suggestion.reasoning.contains("cheap kitchenware"));
        assert_eq!(suggestion.progression_strategy, "garden next");
    }

    #[test]
    fn test_parse_strips_code_fence() {
        let raw = "```json\n{\"top_3_urls\": [\"https://s.com/a\"], \"secondary_urls\": [], \"skip_urls\": []}\n```";
        let suggestion = parse_suggestion(raw).unwrap();
        assert_eq!(suggestion.top_urls, vec!["https://s.com/a"]);
        assert_eq!(suggestion.reasoning, "");
    }

    #[test]
    fn test_parse_moves_extra_top_picks_to_secondary() {
        let raw = r#"{"top_3_urls": ["1", "2", "3", "4"], "secondary_urls": ["5"], "skip_urls": []}"#;
        let suggestion = parse_suggestion(raw).unwrap();
        assert_eq!(suggestion.top_urls, vec!["1", "2", "3"]);
        assert_eq!(suggestion.secondary_urls, vec!["4", "5"]);
    }

    #[test]
    fn test_parse_rejects_malformed_replies() {
        assert!(matches!(parse_suggestion("I think kitchen"), Err(SuggestionError::InvalidJson(_))));
        assert_eq!(parse_suggestion("[1, 2]"), Err(SuggestionError::NotAnObject));
        assert_eq!(
            parse_suggestion(r#"{"top_3_urls": [], "skip_urls": []}"#),
            Err(SuggestionError::MissingKey("secondary_urls"))
        );
        assert_eq!(
            parse_suggestion(r#"{"top_3_urls": "a", "secondary_urls": [], "skip_urls": []}"#),
            Err(SuggestionError::WrongType("top_3_urls"))
        );
        assert_eq!(
            parse_suggestion(r#"{"top_3_urls": [1], "secondary_urls": [], "skip_urls": []}"#),
            Err(SuggestionError::WrongType("top_3_urls"))
        );
    }

    #[test]
    fn test_prompt_contains_context() {
        let prompt = build_prompt(&context()).unwrap();
        assert!(prompt.contains("top_3_urls"));
        assert!(prompt.contains("https://shop.example.com/kitchen"));
        assert!(prompt.contains("\"previously_suggested\""));
        assert!(prompt.contains("price phase: low"));
    }

    fn make_test_config(endpoint: &str) -> Config {
        let mut config = Config::default();
        config.ai.endpoint = endpoint.to_string();
        config.ai.api_key = Some("test-key".to_string());
        config
    }

    #[tokio::test]
    async fn test_openai_suggester_returns_content() {
        let server = MockServer::start().await;
        let reply = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"top_3_urls\": []}"}}]
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("json_object"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .expect(1)
            .mount(&server)
            .await;

        let suggester = OpenAiSuggester::new(&make_test_config(&server.uri())).unwrap();
        let content = suggester.suggest(&context()).await.unwrap();
        assert_eq!(content, "{\"top_3_urls\": []}");
    }

    #[tokio::test]
    async fn test_openai_suggester_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let suggester = OpenAiSuggester::new(&make_test_config(&server.uri())).unwrap();
        let err = suggester.suggest(&context()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_missing_api_key_is_setup_error() {
        let mut config = Config::default();
        config.ai.api_key = None;
        assert!(OpenAiSuggester::new(&config).is_err());
    }
}
