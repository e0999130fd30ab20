//! Model channel: send a prompt plus screenshots, get free text back.
//!
//! [`Model`] is the seam the round loop depends on. [`HttpModel`] talks to the
//! configured provider over blocking HTTP; tests substitute scripted replies.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::config::{ModelConfig, Provider};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("read image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("http request failed: {0}")]
    Transport(String),
    #[error("{provider} API error {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("unexpected {provider} response shape: {body}")]
    Shape { provider: &'static str, body: String },
}

/// Anything that can answer a prompt accompanied by images.
pub trait Model {
    /// `images` are sent in order (e.g. before, then after).
    fn respond(&self, prompt: &str, images: &[&Path]) -> Result<String, ModelError>;
}

/// HTTP-backed model for every supported provider.
#[derive(Debug, Clone)]
pub struct HttpModel {
    client: reqwest::blocking::Client,
    provider: Provider,
    api_base: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
}

impl HttpModel {
    pub fn new(config: &ModelConfig, api_key: &str) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| ModelError::Transport(err.to_string()))?;
        let endpoint = config.endpoint();
        Ok(Self {
            client,
            provider: config.provider,
            api_base: endpoint.api_base.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
            api_key: api_key.to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// OpenAI chat-completions wire format. DashScope's compatible mode
    /// accepts the same body, so Qwen goes through here too.
    fn chat_completion(&self, prompt: &str, images: &[String]) -> Result<String, ModelError> {
        let mut content = vec![json!({"type": "text", "text": prompt})];
        content.extend(images.iter().map(|data| {
            json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{data}")},
            })
        }));
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": content}],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let parsed = self.post(&self.api_base, Some(&self.api_key), &body)?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.shape_error(&parsed))
    }

    fn generate_content(&self, prompt: &str, images: &[String]) -> Result<String, ModelError> {
        let mut parts = vec![json!({"text": prompt})];
        parts.extend(images.iter().map(|data| {
            json!({"inline_data": {"mime_type": "image/png", "data": data}})
        }));
        let body = json!({
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        });
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );
        let parsed = self.post(&url, None, &body)?;
        let text: String = parsed["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();
        if text.is_empty() {
            return Err(self.shape_error(&parsed));
        }
        Ok(text)
    }

    fn post(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<Value, ModelError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .map_err(|err| ModelError::Transport(err.without_url().to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .map_err(|err| ModelError::Transport(format!("read response: {err}")))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "model API returned an error");
            return Err(ModelError::Status {
                provider: self.provider.as_str(),
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|_| ModelError::Shape {
            provider: self.provider.as_str(),
            body: text,
        })
    }

    fn shape_error(&self, parsed: &Value) -> ModelError {
        ModelError::Shape {
            provider: self.provider.as_str(),
            body: parsed.to_string(),
        }
    }
}

impl Model for HttpModel {
    #[instrument(skip_all, fields(provider = self.provider.as_str(), images = images.len()))]
    fn respond(&self, prompt: &str, images: &[&Path]) -> Result<String, ModelError> {
        let encoded = images
            .iter()
            .map(|path| encode_image(path))
            .collect::<Result<Vec<_>, _>>()?;
        let reply = match self.provider {
            Provider::OpenAi | Provider::Qwen => self.chat_completion(prompt, &encoded)?,
            Provider::Gemini => self.generate_content(prompt, &encoded)?,
        };
        debug!(reply_chars = reply.chars().count(), "model replied");
        Ok(reply)
    }
}

/// Base64 of a file's raw bytes.
pub fn encode_image(path: &Path) -> Result<String, ModelError> {
    let bytes = fs::read(path).map_err(|source| ModelError::Image {
        path: path.display().to_string(),
        source,
    })?;
    Ok(STANDARD.encode(bytes))
}
