//! Generative model clients.
//!
//! Backends differ in what they can do. Callers ask [`ModelClient::capabilities`]
//! instead of checking which provider they hold.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ModelConfig, ModelProvider};
use crate::secrets::{resolve_secret, SecretError};

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("http error: {0}")]
    Http(String),

    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response error: {0}")]
    Response(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{client} does not support {feature}")]
    Unsupported {
        client: &'static str,
        feature: &'static str,
    },

    #[error("model client misconfigured: {0}")]
    Configuration(String),
}

impl From<SecretError> for ModelError {
    fn from(e: SecretError) -> Self {
        ModelError::Configuration(format!("API key: {}", e))
    }
}

impl ModelError {
    /// Whether the same call could succeed if repeated later.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ModelError::Unsupported { .. } | ModelError::Configuration(_)
        )
    }
}

/// What a backend can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub batch: bool,
    pub streaming: bool,
    /// Accepts document attachments alongside the prompt.
    pub documents: bool,
}

/// A document sent together with a prompt.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: PDF_MIME_TYPE.to_string(),
            bytes,
        }
    }
}

/// A text-generation backend. Calls block the current thread.
pub trait ModelClient: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Single prompt, optional attachments, single text response.
    fn generate(&self, prompt: &str, attachments: &[Attachment]) -> Result<String, ModelError>;

    /// Prompt plus one document. Fails with [`ModelError::Unsupported`] when
    /// the backend cannot read documents.
    fn generate_with_document(
        &self,
        prompt: &str,
        document: Attachment,
    ) -> Result<String, ModelError> {
        if !self.capabilities().documents {
            return Err(ModelError::Unsupported {
                client: self.name(),
                feature: "document input",
            });
        }
        self.generate(prompt, std::slice::from_ref(&document))
    }

    /// Several prompts, one response each, in order.
    fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>, ModelError> {
        if !self.capabilities().batch {
            return Err(ModelError::Unsupported {
                client: self.name(),
                feature: "batch generation",
            });
        }
        prompts.iter().map(|p| self.generate(p, &[])).collect()
    }
}

/// Builds the client selected by `config`, resolving its API key.
///
/// Without an explicit key source the provider's conventional environment
/// variable is read (`GEMINI_API_KEY`, `OPENAI_API_KEY`).
pub fn build_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, ModelError> {
    let env_var = config
        .api_key_env
        .as_deref()
        .unwrap_or_else(|| config.provider.default_api_key_env());
    let api_key = resolve_secret(
        config.api_key.as_deref(),
        config.api_key_file.as_deref(),
        Some(env_var),
    )?;
    let timeout = Duration::from_secs(config.timeout_secs);

    log::info!(
        "Using {} model '{}' at {}",
        config.provider,
        config.model_name(),
        config.base_url()
    );

    let client: Arc<dyn ModelClient> = match config.provider {
        ModelProvider::Gemini => Arc::new(GeminiClient::new(
            api_key,
            config.model_name(),
            config.base_url(),
            timeout,
        )?),
        ModelProvider::OpenAi => Arc::new(OpenAiClient::new(
            api_key,
            config.model_name(),
            config.base_url(),
            timeout,
        )?),
    };
    Ok(client)
}

fn truncate_body(body: &str) -> String {
    const MAX_BODY_CHARS: usize = 512;
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
    format!("{}...", truncated)
}

/// Reads a blocking response, turning non-2xx statuses into [`ModelError::Status`].
fn read_response(response: reqwest::blocking::Response) -> Result<String, ModelError> {
    let status = response.status();
    let text = response.text().map_err(|e| ModelError::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(ModelError::Status {
            status: status.as_u16(),
            body: truncate_body(&text),
        });
    }
    Ok(text)
}
