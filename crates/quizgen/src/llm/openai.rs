//! OpenAI-compatible chat completions client. Text only.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{read_response, Attachment, Capabilities, ModelClient, ModelError};

pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    api_key: SecretString,
    model: String,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: SecretString,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    fn headers(&self) -> Result<HeaderMap, ModelError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret()))
            .map_err(|e| ModelError::Configuration(format!("invalid API key: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

fn parse_response(body: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Serialization(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ModelError::Response("Missing choices".to_string()))
}

impl ModelClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch: true,
            streaming: false,
            documents: false,
        }
    }

    fn generate(&self, prompt: &str, attachments: &[Attachment]) -> Result<String, ModelError> {
        if !attachments.is_empty() {
            return Err(ModelError::Unsupported {
                client: self.name(),
                feature: "document input",
            });
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|e| ModelError::Http(e.to_string()))?;

        let text = read_response(response)?;
        parse_response(&text)
    }
}
