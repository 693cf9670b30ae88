use thiserror::Error;

/// Failure of a single call to the generation API.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("credential blocked: {0}")]
    Blocked(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request failed ({code}): {body}")]
    Status { code: u16, body: String },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("response is not a JSON array")]
    NotAList,
}

impl RequestError {
    /// Blocked credentials fail the same way on every retry.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no Gemini API key found; set GEMINI_API_KEY or GEMINI_API_KEY_1..GEMINI_API_KEY_8")]
    MissingCredentials,
    #[error("failed to read prompt template {path}: {reason}")]
    Template { path: String, reason: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("no text is awaiting annotation")]
    NothingAwaiting,
    #[error("text {0} is not in the corpus")]
    UnknownText(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("unknown subcategory '{0}'")]
    UnknownSubcategory(String),
    #[error("unknown intensity '{0}'")]
    UnknownIntensity(String),
    #[error("{0} is required when the category is XENOFOBIA")]
    MissingLayer(&'static str),
}

#[cfg(test)]
mod tests {
    use super::RequestError;

    #[test]
    fn only_blocked_errors_short_circuit() {
        assert!(RequestError::Blocked("403".to_string()).is_blocked());
        assert!(!RequestError::Transport("reset".to_string()).is_blocked());
        assert!(!RequestError::Status {
            code: 500,
            body: String::new()
        }
        .is_blocked());
    }
}
