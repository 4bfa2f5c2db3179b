//! OpenAI chat-completions advisor.

use crate::domain::error::HftaError;
use crate::ports::advisor_port::AdvisorPort;
use crate::ports::config_port::ConfigPort;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

fn advisor_error(reason: impl std::fmt::Display) -> HftaError {
    HftaError::Advisor {
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub timeout: Duration,
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_output_tokens: 512,
            timeout: Duration::from_secs(60),
            base_url: BASE_URL.to_string(),
        }
    }
}

impl OpenAiConfig {
    /// Read `model`, `temperature` and `max_output_tokens` from `section`,
    /// falling back to `[ai]` and then the defaults.
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        let model = config
            .get_string(section, "model")
            .or_else(|| config.get_string("ai", "model"))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(d.model);
        let temperature = config.get_double(
            section,
            "temperature",
            config.get_double("ai", "temperature", d.temperature),
        );
        let max_output_tokens = config
            .get_int(
                section,
                "max_output_tokens",
                config.get_int("ai", "max_output_tokens", i64::from(d.max_output_tokens)),
            )
            .clamp(1, i64::from(u32::MAX)) as u32;
        Self {
            model,
            temperature,
            max_output_tokens,
            timeout: d.timeout,
            base_url: config.get_string("ai", "base_url").unwrap_or(d.base_url),
        }
    }
}

/// `HFTA_OPENAI_API_KEY`, then `OPENAI_API_KEY`.
pub fn resolve_api_key(env: impl Fn(&str) -> Option<String>) -> Result<String, HftaError> {
    env("HFTA_OPENAI_API_KEY")
        .or_else(|| env("OPENAI_API_KEY"))
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| HftaError::ConfigMissing {
            section: "ai".into(),
            key: "HFTA_OPENAI_API_KEY / OPENAI_API_KEY".into(),
        })
}

/// Request body for `/chat/completions`. The state goes in its own user turn.
pub fn request_body(
    config: &OpenAiConfig,
    system_prompt: &str,
    user_prompt: &str,
    state_json: &str,
) -> Value {
    json!({
        "model": config.model,
        "messages": [
            {"role": "system", "content": system_prompt},
            {"role": "user", "content": user_prompt},
            {"role": "user", "content": format!("Current state JSON:\n{state_json}")},
        ],
        "temperature": config.temperature,
        "max_completion_tokens": config.max_output_tokens,
        "response_format": {"type": "json_object"},
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Pull the first choice's content; empty replies are errors.
pub fn extract_content(payload: &Value) -> Result<String, HftaError> {
    let response: ChatResponse =
        serde_json::from_value(payload.clone()).map_err(advisor_error)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| advisor_error("empty content in model response"))
}

pub struct OpenAiAdvisor {
    client: reqwest::Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiAdvisor {
    pub fn new(config: OpenAiConfig) -> Result<Self, HftaError> {
        let api_key = resolve_api_key(|k| std::env::var(k).ok())?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(advisor_error)?;
        tracing::info!("OpenAI advisor initialized with model={}", config.model);
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }
}

#[async_trait]
impl AdvisorPort for OpenAiAdvisor {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        state_json: &str,
    ) -> Result<String, HftaError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body(&self.config, system_prompt, user_prompt, state_json))
            .send()
            .await
            .map_err(advisor_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(advisor_error(format!("{status}: {body}")));
        }
        let payload: Value = resp.json().await.map_err(advisor_error)?;
        extract_content(&payload)
    }
}
