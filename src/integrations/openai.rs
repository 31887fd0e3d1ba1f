use serde::Deserialize;
use serde_json::json;

use super::{ensure_success, require_key, IntegrationError};
use crate::config::IntegrationsConfig;

const SERVICE: &str = "OpenAI";
const API_BASE: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    image_model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, config: &IntegrationsConfig) -> Self {
        Self {
            http,
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            image_model: config.openai_image_model.clone(),
        }
    }

    /// Single chat completion; returns the first choice's text
    pub async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String, IntegrationError> {
        require_key(SERVICE, &self.api_key)?;
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.4,
            "max_tokens": max_tokens,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", API_BASE))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let chat: ChatResponse = ensure_success(SERVICE, response).await?.json().await?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(IntegrationError::InvalidResponse {
                service: SERVICE,
                message: "completion has no content".to_string(),
            })
    }

    /// Returns the hosted URL of one generated image
    pub async fn generate_image(&self, prompt: &str, size: &str) -> Result<String, IntegrationError> {
        require_key(SERVICE, &self.api_key)?;
        let response = self
            .http
            .post(format!("{}/images/generations", API_BASE))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.image_model,
                "prompt": prompt,
                "n": 1,
                "size": size,
            }))
            .send()
            .await?;
        let images: ImageResponse = ensure_success(SERVICE, response).await?.json().await?;

        images
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or(IntegrationError::InvalidResponse {
                service: SERVICE,
                message: "image response has no url".to_string(),
            })
    }
}
