//! Gemini client over the REST `generateContent` endpoint.

use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{read_response, Attachment, Capabilities, ModelClient, ModelError};

pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_key: SecretString,
    model: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(
        api_key: SecretString,
        model: &str,
        endpoint: &str,
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
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn headers(&self) -> Result<HeaderMap, ModelError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(self.api_key.expose_secret())
            .map_err(|e| ModelError::Configuration(format!("invalid API key: {}", e)))?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
}

#[derive(Debug, Serialize)]
struct GeminiBlob {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn build_request(prompt: &str, attachments: &[Attachment]) -> GeminiRequest {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    parts.push(GeminiPart::Text {
        text: prompt.to_string(),
    });
    for attachment in attachments {
        parts.push(GeminiPart::InlineData {
            inline_data: GeminiBlob {
                mime_type: attachment.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&attachment.bytes),
            },
        });
    }
    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts,
        }],
    }
}

/// Joins the text parts of the first candidate.
fn parse_response(body: &str) -> Result<String, ModelError> {
    let parsed: GeminiResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Serialization(e.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(ModelError::Response(format!(
            "Gemini API error: {}",
            error.message
        )));
    }

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ModelError::Response(format!("prompt blocked: {}", reason)));
    }

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Response("No candidates in response".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ModelError::Response(format!(
            "Empty response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

impl ModelClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch: true,
            streaming: true,
            documents: true,
        }
    }

    fn generate(&self, prompt: &str, attachments: &[Attachment]) -> Result<String, ModelError> {
        let body = build_request(prompt, attachments);
        log::debug!(
            "Gemini request to model {} ({} attachments)",
            self.model,
            attachments.len()
        );

        let response = self
            .client
            .post(self.build_url())
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|e| ModelError::Http(e.to_string()))?;

        let text = read_response(response)?;
        parse_response(&text)
    }
}
