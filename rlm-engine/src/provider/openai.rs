//! OpenAI-compatible client implementation
//!
//! Works with OpenRouter, OpenAI, vLLM, Ollama, and other OpenAI-compatible APIs.

use super::*;
use reqwest::Client;
use rlm_error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix for fragment results, which the chat API receives as user turns
pub const EXECUTION_RESULT_PREFIX: &str = "Execution result:\n";

/// OpenAI-compatible client
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::model_unavailable("failed to create HTTP client")
                    .with_operation("provider::openai::new")
                    .set_source(e)
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl ModelClient for OpenAIClient {
    async fn generate(&self, transcript: &[ChatMessage], model: &str) -> Result<Generation> {
        let api_request = OpenAIRequest {
            model: model.to_string(),
            messages: transcript.iter().map(OpenAIMessage::from).collect(),
            temperature: self.config.temperature,
        };

        let mut req = self.client.post(self.endpoint()).json(&api_request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.bearer_auth(api_key);
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await.map_err(|e| {
            Error::model_unavailable(format!("request failed: {}", e))
                .temporary()
                .with_operation("provider::openai::generate")
                .with_context("model", model)
                .set_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = if status.as_u16() == 429 {
                Error::rate_limited(format!("HTTP 429: {}", text))
            } else if status.is_server_error() {
                Error::model_unavailable(format!("HTTP {}: {}", status.as_u16(), text)).temporary()
            } else {
                Error::model_unavailable(format!("HTTP {}: {}", status.as_u16(), text)).permanent()
            };
            return Err(err
                .with_operation("provider::openai::generate")
                .with_context("status", status.as_u16().to_string())
                .with_context("model", model));
        }

        let api_response: OpenAIResponse = response.json().await.map_err(|e| {
            Error::model_unavailable("malformed completion payload")
                .permanent()
                .with_operation("provider::openai::generate")
                .with_context("model", model)
                .set_source(e)
        })?;

        generation_from_response(api_response).map_err(|e| e.with_context("model", model))
    }
}

fn generation_from_response(api_response: OpenAIResponse) -> Result<Generation> {
    let choice = api_response.choices.into_iter().next().ok_or_else(|| {
        Error::model_unavailable("no choices in response")
            .permanent()
            .with_operation("provider::openai::generate")
    })?;

    let usage = api_response
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(Generation {
        content: choice.message.content.unwrap_or_default(),
        usage,
    })
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(msg: &ChatMessage) -> Self {
        let (role, content) = match msg.role {
            Role::System => ("system", msg.content.clone()),
            Role::User => ("user", msg.content.clone()),
            Role::Assistant => ("assistant", msg.content.clone()),
            Role::Tool => ("user", format!("{}{}", EXECUTION_RESULT_PREFIX, msg.content)),
        };
        Self {
            role: role.into(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_error::ErrorKind;

    #[test]
    fn test_tool_turns_become_user_turns() {
        let msg = OpenAIMessage::from(&ChatMessage::tool_result("10"));
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content.as_deref(), Some("Execution result:\n10"));

        let msg = OpenAIMessage::from(&ChatMessage::assistant("FINAL(10)"));
        assert_eq!(msg.role, "assistant");
    }

    #[test]
    fn test_request_body() {
        let request = OpenAIRequest {
            model: "openai/gpt-4o".into(),
            messages: vec![OpenAIMessage::from(&ChatMessage::user("q"))],
            temperature: DEFAULT_TEMPERATURE,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_generation_from_response() {
        let response: OpenAIResponse = serde_json::from_value(serde_json::json!({
            "id": "gen-1",
            "choices": [{ "message": { "role": "assistant", "content": "FINAL(3)" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16 }
        }))
        .unwrap();
        let generation = generation_from_response(response).unwrap();
        assert_eq!(generation.content, "FINAL(3)");
        assert_eq!(generation.usage.total_tokens, 16);
    }

    #[test]
    fn test_missing_choice_is_model_unavailable() {
        let response: OpenAIResponse =
            serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        let err = generation_from_response(response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_null_content_is_empty() {
        let response: OpenAIResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        }))
        .unwrap();
        assert_eq!(generation_from_response(response).unwrap().content, "");
    }

    #[test]
    fn test_client_builds() {
        let client = OpenAIClient::new(ProviderConfig::local("http://localhost:8000/v1/")).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/v1/chat/completions");
    }
}
