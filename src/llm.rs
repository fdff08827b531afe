//! LLM integration for the running coach
//!
//! Talks to the Claude messages API. The rest of the crate treats every call
//! here as "prompt in, text out"; only plan generation asks for JSON.

use crate::models::TrainingPlan;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

const COACH_SYSTEM: &str = include_str!("prompts/coach_system.txt");
const PLAN_SYSTEM: &str = include_str!("prompts/plan_system.txt");
const SUMMARY_SYSTEM: &str = include_str!("prompts/summary_system.txt");
const ANALYSIS_SYSTEM: &str = include_str!("prompts/analysis_system.txt");

#[derive(Debug, Clone)]
pub struct LlmConfig {
  pub api_key: String,
  pub api_url: String,
  pub model: String,
}

impl LlmConfig {
  pub fn from_env() -> Result<Self, LlmError> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| LlmError::MissingApiKey)?;

    Ok(Self {
      api_key,
      api_url: std::env::var("ANTHROPIC_API_URL").unwrap_or_else(|_| CLAUDE_API_URL.to_string()),
      model: CLAUDE_MODEL.to_string(),
    })
  }
}

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Serialize)]
pub enum LlmError {
  #[error("API key not configured")]
  MissingApiKey,

  #[error("Request failed: {0}")]
  Request(String),

  #[error("API error: {0}")]
  Api(String),

  #[error("Parse error: {0}")]
  Parse(String),
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
  model: &'a str,
  max_tokens: u32,
  system: &'a str,
  messages: &'a [ChatMessage],
}

/// One turn of a conversation, `role` is "user" or "assistant".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

impl ChatMessage {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: "user".to_string(), content: content.into() }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: "assistant".to_string(), content: content.into() }
  }
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
  content: Vec<ContentBlock>,
  usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Claude Client
/// ---------------------------------------------------------------------------

pub struct ClaudeClient {
  client: Client,
  config: LlmConfig,
}

impl ClaudeClient {
  pub fn new(config: LlmConfig) -> Self {
    Self {
      client: Client::new(),
      config,
    }
  }

  /// Create a new Claude client, loading API key from environment
  pub fn from_env() -> Result<Self, LlmError> {
    Ok(Self::new(LlmConfig::from_env()?))
  }

  /// Call Claude with a system prompt and a single user message
  pub async fn complete(
    &self,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
  ) -> Result<(String, Usage), LlmError> {
    self
      .converse(system_prompt, &[ChatMessage::user(user_message)], max_tokens)
      .await
  }

  /// Call Claude with a full message history, oldest first
  pub async fn converse(
    &self,
    system_prompt: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
  ) -> Result<(String, Usage), LlmError> {
    let request = ClaudeRequest {
      model: &self.config.model,
      max_tokens,
      system: system_prompt,
      messages,
    };

    let response = self
      .client
      .post(&self.config.api_url)
      .header("x-api-key", &self.config.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    if !status.is_success() {
      if let Ok(error_resp) = serde_json::from_str::<ClaudeErrorResponse>(&body) {
        return Err(LlmError::Api(error_resp.error.message));
      }
      return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
    }

    let claude_response: ClaudeResponse =
      serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

    let text = claude_response
      .content
      .iter()
      .find(|c| c.content_type == "text")
      .and_then(|c| c.text.clone())
      .ok_or_else(|| LlmError::Parse("No text content in response".to_string()))?;

    tracing::debug!(
      input_tokens = claude_response.usage.input_tokens,
      output_tokens = claude_response.usage.output_tokens,
      "Claude call complete"
    );

    Ok((text, claude_response.usage))
  }

  /// Coach reply to the latest message, given earlier turns and a training
  /// context block.
  pub async fn coach_reply(
    &self,
    history: &[ChatMessage],
    message: &str,
    context_json: &str,
  ) -> Result<String, LlmError> {
    let system_prompt = format!("{}\n\nATHLETE CONTEXT:\n{}", COACH_SYSTEM, context_json);

    let mut messages = history.to_vec();
    messages.push(ChatMessage::user(message));

    let (reply, _) = self.converse(&system_prompt, &messages, 1500).await?;
    Ok(reply)
  }

  /// Ask for a plan as JSON. Returns the parsed plan and the raw text so
  /// callers can fall back to text extraction when parsing fails.
  pub async fn generate_plan(
    &self,
    goal: &str,
    context_json: &str,
  ) -> Result<(Option<TrainingPlan>, String), LlmError> {
    let user_message = format!(
      r#"Create a one-week training plan for this goal: {}

TRAINING CONTEXT:
{}

Respond with valid JSON matching the OUTPUT FORMAT specified in your instructions."#,
      goal, context_json
    );

    let (response_text, _) = self.complete(PLAN_SYSTEM, &user_message, 2000).await?;

    let plan = extract_json(&response_text)
      .and_then(|json| {
        serde_json::from_str::<TrainingPlan>(&json).map_err(|e| LlmError::Parse(e.to_string()))
      })
      .map_err(|e| tracing::warn!(error = %e, "Plan response was not valid JSON"))
      .ok();

    Ok((plan, response_text))
  }

  pub async fn fitness_summary(&self, context_json: &str) -> Result<String, LlmError> {
    let user_message = format!("Summarize my current running fitness.\n\nTRAINING DATA:\n{}", context_json);
    let (summary, _) = self.complete(SUMMARY_SYSTEM, &user_message, 800).await?;
    Ok(summary)
  }

  pub async fn analyze_activity(&self, activity_json: &str) -> Result<String, LlmError> {
    let user_message = format!("Give feedback on this run.\n\nRUN:\n{}", activity_json);
    let (analysis, _) = self.complete(ANALYSIS_SYSTEM, &user_message, 600).await?;
    Ok(analysis)
  }
}

/// Extract JSON from Claude's response (handles markdown code blocks)
pub fn extract_json(text: &str) -> Result<String, LlmError> {
  if text.trim().starts_with('{') {
    return Ok(text.trim().to_string());
  }

  if let Some(start) = text.find("```json") {
    let start = start + 7;
    if let Some(end) = text[start..].find("```") {
      return Ok(text[start..start + end].trim().to_string());
    }
  }

  if let Some(start) = text.find("```") {
    let start = start + 3;
    // Skip language identifier if present
    let content_start = text[start..]
      .find('\n')
      .map(|i| start + i + 1)
      .unwrap_or(start);
    if let Some(end) = text[content_start..].find("```") {
      return Ok(text[content_start..content_start + end].trim().to_string());
    }
  }

  // Last resort: first { to last }
  if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
    if start < end {
      return Ok(text[start..=end].to_string());
    }
  }

  Err(LlmError::Parse("Could not extract JSON from response".to_string()))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
