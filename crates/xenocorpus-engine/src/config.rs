use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OUTPUT: &str = "corpus_xenofobia_sintetico.jsonl";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MAX_CREDENTIALS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub max_output_tokens: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            max_output_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub model: String,
    pub api_base: String,
    pub max_attempts: usize,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    pub batch_size: usize,
    pub output_path: PathBuf,
    pub rejected_path: PathBuf,
    pub min_words: usize,
    /// Platform message ceiling.
    pub max_chars: usize,
    pub max_in_flight: usize,
    pub include_non_hate: bool,
    /// Draw a batch progress bar on stderr when it is a terminal.
    pub show_progress: bool,
    pub sampling: SamplingConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let output_path = PathBuf::from(DEFAULT_OUTPUT);
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(90),
            batch_size: DEFAULT_BATCH_SIZE,
            rejected_path: rejected_path_for(&output_path),
            output_path,
            min_words: 3,
            max_chars: 280,
            max_in_flight: 3,
            include_non_hate: true,
            show_progress: true,
            sampling: SamplingConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Defaults with `GEMINI_MODEL` and `GEMINI_API_BASE` applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(model) = non_empty(lookup("GEMINI_MODEL")) {
            config.model = model;
        }
        if let Some(base) = non_empty(lookup("GEMINI_API_BASE")) {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        config
    }

    /// Points the corpus at `path`; the rejection audit file follows it.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self.rejected_path = rejected_path_for(&self.output_path);
        self
    }
}

/// `corpus.jsonl` -> `corpus.rejected.jsonl`, next to the corpus.
pub fn rejected_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "corpus".to_string());
    output.with_file_name(format!("{stem}.rejected.jsonl"))
}

pub fn load_api_keys() -> Result<Vec<String>, ConfigError> {
    load_api_keys_from(|key| env::var(key).ok())
}

/// Numbered keys `GEMINI_API_KEY_1..=8` in order, duplicates dropped; the
/// unnumbered `GEMINI_API_KEY` is used only when no numbered key is set.
pub fn load_api_keys_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<String>, ConfigError> {
    let mut keys: Vec<String> = Vec::new();
    for idx in 1..=MAX_CREDENTIALS {
        if let Some(key) = non_empty(lookup(&format!("GEMINI_API_KEY_{idx}"))) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    if keys.is_empty() {
        if let Some(key) = non_empty(lookup("GEMINI_API_KEY")) {
            keys.push(key);
        }
    }
    if keys.is_empty() {
        return Err(ConfigError::MissingCredentials);
    }
    Ok(keys)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
