use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AssistantEndpoint, CHAT_PATH};
use crate::config::Settings;
use crate::error::EndpointError;

#[derive(Serialize)]
struct ChatRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

/// HTTP client for the TravelPal chat endpoint
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client whose requests give up after `timeout`
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, EndpointError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, EndpointError> {
        match settings.timeout {
            Some(timeout) => Self::with_timeout(&settings.api_url, timeout),
            None => Ok(Self::new(&settings.api_url)),
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, CHAT_PATH)
    }
}

#[async_trait]
impl AssistantEndpoint for ChatClient {
    async fn send(&self, text: &str) -> Result<String, EndpointError> {
        let response = self
            .client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .json(&ChatRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let chat_response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| EndpointError::Malformed(e.to_string()))?;
        Ok(chat_response.response)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
