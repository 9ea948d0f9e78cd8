pub mod http;

pub use http::ChatClient;

use async_trait::async_trait;

use crate::error::EndpointError;

/// Path of the chat route, relative to the endpoint's base URL
pub const CHAT_PATH: &str = "/api/v1/chat";

/// Remote assistant that turns one user message into one reply
#[async_trait]
pub trait AssistantEndpoint: Send + Sync {
    async fn send(&self, text: &str) -> Result<String, EndpointError>;

    /// Human-readable location, shown in the UI header
    fn describe(&self) -> String;
}
