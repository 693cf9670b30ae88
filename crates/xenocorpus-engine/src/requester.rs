use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::error::{ConfigError, RequestError};
use crate::gemini::{truncate_text, GenerationBackend};

/// Round-robin cursor over the credential pool.
///
/// The cursor lives in the request context; concurrent workers share it
/// through `&self`, so the Nth call overall gets key `(N-1) % len`.
#[derive(Debug)]
pub struct CredentialRing {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialRing {
    pub fn new(keys: Vec<String>) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn next_key(&self) -> (usize, &str) {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        (idx, self.keys[idx].as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Short, non-reversible label for logging a credential.
pub fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..4])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay,
        }
    }

    /// Delay after the failed attempt `attempt` (0-based): base × 2^attempt.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchFailure {
    #[error("batch {batch}: credential blocked after {attempts} attempt(s): {message}")]
    Blocked {
        batch: usize,
        attempts: usize,
        message: String,
    },
    #[error("batch {batch}: failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        batch: usize,
        attempts: usize,
        last_error: String,
    },
}

impl BatchFailure {
    pub fn attempts(&self) -> usize {
        match self {
            Self::Blocked { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

pub struct BatchRequester<B> {
    backend: B,
    credentials: CredentialRing,
    policy: RetryPolicy,
}

impl<B: GenerationBackend> BatchRequester<B> {
    pub fn new(backend: B, credentials: CredentialRing, policy: RetryPolicy) -> Self {
        Self {
            backend,
            credentials,
            policy,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Requests one batch and returns the raw records.
    ///
    /// Blocked credentials end the batch at once; any other failure is
    /// retried with exponential backoff up to `max_attempts`.
    pub fn request_batch(&self, prompt: &str, batch: usize) -> Result<Vec<Value>, BatchFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let (key_index, key) = self.credentials.next_key();
            debug!(
                batch,
                attempt = attempt + 1,
                backend = self.backend.name(),
                credential = key_index,
                fingerprint = %fingerprint(key),
                "requesting batch"
            );

            let outcome = self
                .backend
                .generate(key, prompt)
                .and_then(|text| parse_payload(&text));
            match outcome {
                Ok(records) => {
                    info!(batch, records = records.len(), "batch generated");
                    return Ok(records);
                }
                Err(err) if err.is_blocked() => {
                    let message = truncate_text(&err.to_string(), 100);
                    warn!(batch, attempt = attempt + 1, credential = key_index, "{message}");
                    return Err(BatchFailure::Blocked {
                        batch,
                        attempts: attempt + 1,
                        message,
                    });
                }
                Err(err) => {
                    last_error = truncate_text(&err.to_string(), 200);
                    warn!(batch, attempt = attempt + 1, "batch attempt failed: {last_error}");
                    if attempt + 1 < max_attempts {
                        thread::sleep(self.policy.delay_for(attempt));
                    }
                }
            }
        }

        warn!(batch, attempts = max_attempts, "batch abandoned");
        Err(BatchFailure::Exhausted {
            batch,
            attempts: max_attempts,
            last_error,
        })
    }
}

/// Removes a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parses a model reply into a list of raw records, falling back to the
/// outermost `[...]` span when the reply carries extra prose.
pub fn parse_payload(text: &str) -> Result<Vec<Value>, RequestError> {
    let cleaned = strip_code_fence(text);
    let parsed = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(first_err) => {
            let first_error = truncate_text(&first_err.to_string(), 100);
            let embedded = array_pattern()
                .find(cleaned)
                .ok_or_else(|| RequestError::MalformedPayload(first_error.clone()))?;
            serde_json::from_str::<Value>(embedded.as_str())
                .map_err(|_| RequestError::MalformedPayload(first_error))?
        }
    };
    match parsed {
        Value::Array(items) => Ok(items),
        _ => Err(RequestError::NotAList),
    }
}

fn array_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("array pattern compiles"))
}
