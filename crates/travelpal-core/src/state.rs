//! UI-agnostic conversation state types
//!
//! These are shared by every front end (the terminal widget, the one-shot
//! `ask` command) and don't depend on any UI framework. Mutation goes through
//! [`crate::ConversationController`]; front ends only get read access.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Greeting seeded into every new conversation
pub const DEFAULT_GREETING: &str = "Hello! I'm your TravelPal assistant. How can I help you today?";

/// Opaque identity of a message, unique within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A single entry in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    text: String,
    sender: Sender,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }

    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }
}

/// Whether a request to the assistant is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Waiting on the reply to the user message with this id
    AwaitingResponse { request: MessageId },
}

/// Messages, draft buffer and busy flag of one conversation
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub(crate) messages: Vec<Message>,
    pub(crate) draft: String,
    pub(crate) phase: Phase,
}

impl ConversationState {
    /// Fresh conversation holding only the assistant greeting
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(greeting)],
            draft: String::new(),
            phase: Phase::Idle,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::with_greeting(DEFAULT_GREETING)
    }
}
