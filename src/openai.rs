//! LLM gateway and a minimal OpenAI client behind it.
//!
//! We only call the Responses API with a single text input and read back the
//! concatenated output text. Calls log model names, latencies and sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

/// Generation-configuration hints passed along with the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationHints {
  pub reasoning_effort: String,
  pub verbosity: String,
}

impl Default for GenerationHints {
  fn default() -> Self {
    Self { reasoning_effort: "low".into(), verbosity: "low".into() }
  }
}

#[derive(Clone, Debug)]
pub struct GenerateRequest {
  pub prompt: String,
  pub model: String,
  pub hints: GenerationHints,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Generation {
  pub text: String,
  pub total_tokens: Option<u32>,
}

#[derive(Debug, Error)]
pub enum LlmError {
  #[error("LLM transport error: {0}")]
  Transport(String),
  #[error("LLM HTTP {status}: {message}")]
  Api { status: u16, message: String },
  #[error("LLM returned an empty response")]
  EmptyResponse,
  #[error("LLM response parse error: {0}")]
  Parse(String),
}

#[async_trait::async_trait]
pub trait LlmGateway: Send + Sync {
  async fn generate(&self, req: &GenerateRequest) -> Result<Generation, LlmError>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    Self::new(api_key, base_url).ok()
  }

  pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(|e| LlmError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      api_key: api_key.into(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
    })
  }
}

#[async_trait::async_trait]
impl LlmGateway for OpenAI {
  #[instrument(level = "info", skip_all, fields(model = %req.model, prompt_len = req.prompt.len()))]
  async fn generate(&self, req: &GenerateRequest) -> Result<Generation, LlmError> {
    let url = format!("{}/responses", self.base_url);
    let body = ResponsesRequest {
      model: req.model.clone(),
      input: req.prompt.clone(),
      reasoning: Some(Reasoning { effort: req.hints.reasoning_effort.clone() }),
      text: Some(TextOptions { verbosity: req.hints.verbosity.clone() }),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "thinkscore-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&body).send().await.map_err(|e| LlmError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(status = status.as_u16(), elapsed_ms = start.elapsed().as_millis() as u64, "OpenAI call failed");
      return Err(LlmError::Api { status: status.as_u16(), message: msg });
    }

    let body: ResponsesResponse = res.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;
    let total_tokens = body.usage.as_ref().and_then(|u| u.total_tokens);
    if let Some(usage) = &body.usage {
      info!(input_tokens = ?usage.input_tokens, output_tokens = ?usage.output_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }

    let text = body.output_text();
    info!(elapsed_ms = start.elapsed().as_millis() as u64, text_len = text.len(), "OpenAI response received");
    if text.trim().is_empty() {
      return Err(LlmError::EmptyResponse);
    }
    Ok(Generation { text, total_tokens })
  }
}

// --- Responses DTOs ---

#[derive(Serialize)]
struct ResponsesRequest {
  model: String,
  input: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  reasoning: Option<Reasoning>,
  #[serde(skip_serializing_if = "Option::is_none")]
  text: Option<TextOptions>,
}
#[derive(Serialize)]
struct Reasoning { effort: String }
#[derive(Serialize)]
struct TextOptions { verbosity: String }

#[derive(Deserialize)]
struct ResponsesResponse {
  #[serde(default)] output_text: Option<String>,
  #[serde(default)] output: Vec<OutputItem>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct OutputItem {
  #[serde(rename = "type")] kind: String,
  #[serde(default)] content: Vec<OutputContent>,
}
#[derive(Deserialize)]
struct OutputContent {
  #[serde(rename = "type")] kind: String,
  #[serde(default)] text: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] input_tokens: Option<u32>,
  #[serde(default)] output_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

impl ResponsesResponse {
  /// Top-level `output_text` if the server provides it, else the joined
  /// `output_text` parts of every message item (reasoning items are skipped).
  fn output_text(&self) -> String {
    if let Some(t) = &self.output_text {
      return t.clone();
    }
    self.output.iter()
      .filter(|item| item.kind == "message")
      .flat_map(|item| item.content.iter())
      .filter(|c| c.kind == "output_text")
      .filter_map(|c| c.text.as_deref())
      .collect::<Vec<_>>()
      .join("")
  }
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn request() -> GenerateRequest {
    GenerateRequest { prompt: "hi".into(), model: "gpt-5-nano".into(), hints: GenerationHints::default() }
  }

  #[tokio::test]
  async fn joins_message_output_and_reports_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/responses"))
      .and(header("authorization", "Bearer sk-test"))
      .and(body_partial_json(json!({
        "model": "gpt-5-nano",
        "reasoning": { "effort": "low" },
        "text": { "verbosity": "low" }
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "output": [
          { "type": "reasoning", "content": [] },
          { "type": "message", "content": [
            { "type": "output_text", "text": "{\"score\":" },
            { "type": "output_text", "text": "82}" }
          ]}
        ],
        "usage": { "input_tokens": 120, "output_tokens": 30, "total_tokens": 150 }
      })))
      .mount(&server)
      .await;

    let oa = OpenAI::new("sk-test", server.uri()).unwrap();
    let out = oa.generate(&request()).await.unwrap();
    assert_eq!(out.text, "{\"score\":82}");
    assert_eq!(out.total_tokens, Some(150));
  }

  #[tokio::test]
  async fn api_errors_surface_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/responses"))
      .respond_with(ResponseTemplate::new(429).set_body_json(json!({
        "error": { "message": "Rate limit reached" }
      })))
      .mount(&server)
      .await;

    let oa = OpenAI::new("sk-test", server.uri()).unwrap();
    match oa.generate(&request()).await {
      Err(LlmError::Api { status, message }) => {
        assert_eq!(status, 429);
        assert_eq!(message, "Rate limit reached");
      }
      other => panic!("unexpected: {other:?}"),
    }
  }

  #[tokio::test]
  async fn blank_output_is_an_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/responses"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": [] })))
      .mount(&server)
      .await;

    let oa = OpenAI::new("sk-test", server.uri()).unwrap();
    assert!(matches!(oa.generate(&request()).await, Err(LlmError::EmptyResponse)));
  }
}
