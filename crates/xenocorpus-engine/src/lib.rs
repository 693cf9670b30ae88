pub mod agreement;
pub mod config;
pub mod desk;
pub mod error;
pub mod gemini;
pub mod orchestrator;
pub mod postprocess;
pub mod prompt;
pub mod requester;
pub mod validator;

use chrono::{SecondsFormat, Utc};

pub use agreement::{evaluate, render_markdown, AgreementOutcome, AgreementReport, Layer};
pub use config::{load_api_keys, GeneratorConfig};
pub use desk::{AnnotationDesk, FormAction, FormState, Submission};
pub use error::{ConfigError, FormError, RequestError};
pub use gemini::{GeminiBackend, GenerationBackend};
pub use orchestrator::{run_generation, GenerationSummary};
pub use prompt::{build_prompt, PromptPlan, PromptTemplate};
pub use requester::{BatchFailure, BatchRequester, CredentialRing, RetryPolicy};
pub use validator::Validator;

/// Current UTC time as RFC 3339 with microseconds.
pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
