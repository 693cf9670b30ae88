use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::{GeneratorConfig, SamplingConfig};
use crate::error::RequestError;

const BLOCKED_MARKER: &str = "API_KEY_SERVICE_BLOCKED";

/// Text-generation endpoint used by the batch requester.
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, api_key: &str, prompt: &str) -> Result<String, RequestError>;
}

pub struct GeminiBackend {
    api_base: String,
    model: String,
    sampling: SamplingConfig,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            sampling: config.sampling.clone(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(&self, prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "temperature": self.sampling.temperature,
                "topP": self.sampling.top_p,
                "maxOutputTokens": self.sampling.max_output_tokens,
            },
        })
    }

    /// Concatenates the text parts of the first candidate that has any.
    fn extract_text(payload: &Value) -> Option<String> {
        let candidates = payload.get("candidates").and_then(Value::as_array)?;
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array);
            let Some(parts) = parts else {
                continue;
            };
            let text = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>();
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
        None
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, api_key: &str, prompt: &str) -> Result<String, RequestError> {
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&self.build_payload(prompt))
            .send()
            .map_err(|err| RequestError::Transport(format!("Gemini request failed: {err}")))?;

        let code = response.status().as_u16();
        let success = response.status().is_success();
        let body = response
            .text()
            .map_err(|err| RequestError::Transport(format!("Gemini body read failed: {err}")))?;
        if !success {
            return Err(classify_failure(code, &body));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            RequestError::MalformedPayload(format!("Gemini returned invalid JSON: {err}"))
        })?;
        Self::extract_text(&payload).ok_or_else(|| {
            let reason = payload
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no text candidates");
            RequestError::MalformedPayload(format!("Gemini returned no text ({reason})"))
        })
    }
}

/// Maps a non-success HTTP response onto the retry classes.
pub fn classify_failure(code: u16, body: &str) -> RequestError {
    let body = truncate_text(body, 512);
    if code == 403 || body.contains(BLOCKED_MARKER) {
        return RequestError::Blocked(format!("HTTP {code}: {body}"));
    }
    RequestError::Status { code, body }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
