pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types for convenience
pub use config::{Config, Overrides, Settings};
pub use controller::{ConversationController, PendingReply, Reply, Submission, ERROR_REPLY};
pub use endpoint::{AssistantEndpoint, ChatClient};
pub use error::{EndpointError, FailureKind};
pub use state::{ConversationState, Message, MessageId, Phase, Sender, DEFAULT_GREETING};
