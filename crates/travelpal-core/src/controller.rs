//! Conversation controller
//!
//! Owns the conversation state and runs the submit cycle: append the user
//! message, clear the draft, mark busy, ask the assistant, append the reply
//! (or the fallback error message), clear busy. Only one request may be in
//! flight at a time.
//!
//! A UI that needs to keep drawing while the assistant thinks uses
//! [`ConversationController::dispatch`] and feeds the [`Reply`] back through
//! [`ConversationController::resolve`]. Everything else can simply
//! `submit(..).await`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::endpoint::AssistantEndpoint;
use crate::error::EndpointError;
use crate::state::{ConversationState, Message, MessageId, Phase, DEFAULT_GREETING};

/// Shown in place of a reply whenever the assistant request fails
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again later.";

pub type ReplyOutcome = Result<String, EndpointError>;

/// An accepted submission, ready to be sent to the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    request: MessageId,
    text: String,
}

impl Submission {
    pub fn request(&self) -> MessageId {
        self.request
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Result of the assistant request for one user message
#[derive(Debug)]
pub struct Reply {
    pub request: MessageId,
    pub outcome: ReplyOutcome,
}

/// In-flight assistant request spawned by [`ConversationController::dispatch`]
pub struct PendingReply {
    request: MessageId,
    handle: JoinHandle<ReplyOutcome>,
}

impl PendingReply {
    pub fn request(&self) -> MessageId {
        self.request
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for PendingReply {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Reply> {
        let request = self.request;
        Pin::new(&mut self.handle).poll(cx).map(|joined| Reply {
            request,
            outcome: joined.unwrap_or_else(|e| Err(EndpointError::Interrupted(e.to_string()))),
        })
    }
}

/// Convert a character index to a byte index for UTF-8 safe edits
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct ConversationController {
    endpoint: Arc<dyn AssistantEndpoint>,
    state: ConversationState,
    scroll_tx: watch::Sender<usize>,
}

impl ConversationController {
    pub fn new(endpoint: Arc<dyn AssistantEndpoint>) -> Self {
        Self::with_greeting(endpoint, DEFAULT_GREETING)
    }

    pub fn with_greeting(endpoint: Arc<dyn AssistantEndpoint>, greeting: impl Into<String>) -> Self {
        let state = ConversationState::with_greeting(greeting);
        let (scroll_tx, _) = watch::channel(state.messages.len() - 1);
        Self {
            endpoint,
            state,
            scroll_tx,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.state.messages()
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn endpoint(&self) -> &dyn AssistantEndpoint {
        self.endpoint.as_ref()
    }

    /// Receiver that changes to the index of the newest message on every append
    pub fn subscribe_scroll(&self) -> watch::Receiver<usize> {
        self.scroll_tx.subscribe()
    }

    // Draft buffer

    pub fn draft(&self) -> &str {
        self.state.draft()
    }

    /// Replace the draft. Ignored while a request is outstanding.
    pub fn set_draft(&mut self, text: impl Into<String>) -> bool {
        if self.is_busy() {
            return false;
        }
        self.state.draft = text.into();
        true
    }

    /// Insert `c` at character position `at` (clamped to the end)
    pub fn insert_char(&mut self, at: usize, c: char) -> bool {
        if self.is_busy() {
            return false;
        }
        let byte_pos = char_to_byte_index(&self.state.draft, at);
        self.state.draft.insert(byte_pos, c);
        true
    }

    /// Remove the character at position `at`, if there is one
    pub fn remove_char(&mut self, at: usize) -> bool {
        if self.is_busy() || at >= self.state.draft.chars().count() {
            return false;
        }
        let byte_pos = char_to_byte_index(&self.state.draft, at);
        self.state.draft.remove(byte_pos);
        true
    }

    // Submit cycle

    /// Accept `text` for sending: append it as a user message, clear the
    /// draft and mark the conversation busy.
    ///
    /// Returns `None` (and changes nothing) for blank text or while another
    /// request is outstanding.
    pub fn begin(&mut self, text: &str) -> Option<Submission> {
        if text.trim().is_empty() {
            return None;
        }
        if let Phase::AwaitingResponse { request } = self.state.phase {
            debug!(%request, "submission rejected, request already in flight");
            return None;
        }

        let message = Message::user(text);
        let request = message.id();
        self.push(message);
        self.state.draft.clear();
        self.state.phase = Phase::AwaitingResponse { request };

        Some(Submission {
            request,
            text: text.to_string(),
        })
    }

    /// [`begin`](Self::begin), then send the request on a background task
    pub fn dispatch(&mut self, text: &str) -> Option<PendingReply> {
        let submission = self.begin(text)?;
        debug!(request = %submission.request, chars = submission.text.chars().count(), "dispatching chat request");

        let endpoint = Arc::clone(&self.endpoint);
        let Submission { request, text } = submission;
        let handle = tokio::spawn(async move { endpoint.send(&text).await });
        Some(PendingReply { request, handle })
    }

    /// Record the outcome of the outstanding request and return to idle.
    ///
    /// Failures are logged and replaced by [`ERROR_REPLY`]. A reply that
    /// doesn't match the outstanding request is dropped.
    pub fn resolve(&mut self, reply: Reply) {
        match self.state.phase {
            Phase::AwaitingResponse { request } if request == reply.request => {}
            phase => {
                warn!(request = %reply.request, ?phase, "ignoring reply with no matching request");
                return;
            }
        }

        let text = match reply.outcome {
            Ok(text) => text,
            Err(err) => {
                warn!(request = %reply.request, kind = ?err.kind(), error = %err, "assistant request failed");
                ERROR_REPLY.to_string()
            }
        };
        self.push(Message::assistant(text));
        self.state.phase = Phase::Idle;
    }

    /// Run a full submit cycle for `text`.
    ///
    /// Dropping the returned future before it completes still ends the
    /// cycle: the request is resolved as interrupted and busy is cleared.
    pub async fn submit(&mut self, text: &str) {
        let Some(submission) = self.begin(text) else {
            return;
        };
        let endpoint = Arc::clone(&self.endpoint);
        let mut in_flight = InFlight {
            controller: self,
            request: submission.request(),
        };
        let outcome = endpoint.send(submission.text()).await;
        in_flight.controller.resolve(Reply {
            request: submission.request(),
            outcome,
        });
    }

    /// Submit whatever is in the draft buffer
    pub async fn submit_draft(&mut self) {
        let text = self.state.draft.clone();
        self.submit(&text).await;
    }

    fn push(&mut self, message: Message) {
        self.state.messages.push(message);
        self.scroll_tx.send_replace(self.state.messages.len() - 1);
    }
}

/// Resolves the request held by an abandoned [`ConversationController::submit`]
struct InFlight<'a> {
    controller: &'a mut ConversationController,
    request: MessageId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let awaiting = Phase::AwaitingResponse {
            request: self.request,
        };
        if self.controller.state.phase == awaiting {
            self.controller.resolve(Reply {
                request: self.request,
                outcome: Err(EndpointError::Interrupted("submit cancelled".to_string())),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Sender;
    use crate::testing::ScriptedEndpoint;
    use async_trait::async_trait;

    fn setup(endpoint: ScriptedEndpoint) -> (ConversationController, Arc<ScriptedEndpoint>) {
        let endpoint = Arc::new(endpoint);
        (ConversationController::new(endpoint.clone()), endpoint)
    }

    fn tail(conversation: &ConversationController) -> Vec<(Sender, String)> {
        conversation
            .messages()
            .iter()
            .skip(1)
            .map(|m| (m.sender(), m.text().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (controller, _) = setup(ScriptedEndpoint::new());
        assert_eq!(controller.messages().len(), 1);
        assert_eq!(controller.messages()[0].sender(), Sender::Assistant);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_custom_greeting() {
        let endpoint = Arc::new(ScriptedEndpoint::new());
        let controller = ConversationController::with_greeting(endpoint, "Bonjour!");
        assert_eq!(controller.messages()[0].text(), "Bonjour!");
    }

    #[tokio::test]
    async fn test_successful_reply_is_appended() {
        let (mut controller, endpoint) = setup(ScriptedEndpoint::new().reply("Paris is lovely"));

        controller.submit("Where should I go in May?").await;

        assert_eq!(
            tail(&controller),
            vec![
                (Sender::User, "Where should I go in May?".to_string()),
                (Sender::Assistant, "Paris is lovely".to_string()),
            ]
        );
        assert!(!controller.is_busy());
        assert_eq!(endpoint.requests(), vec!["Where should I go in May?"]);
    }

    #[tokio::test]
    async fn test_server_error_becomes_fallback_message() {
        let (mut controller, _) = setup(
            ScriptedEndpoint::new().fail(EndpointError::Status { status: 500, body: String::new() }),
        );

        controller.submit("hello").await;

        assert_eq!(
            tail(&controller),
            vec![
                (Sender::User, "hello".to_string()),
                (Sender::Assistant, ERROR_REPLY.to_string()),
            ]
        );
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_transport_error_becomes_fallback_message() {
        let (mut controller, _) =
            setup(ScriptedEndpoint::new().fail(EndpointError::Transport("refused".into())));

        controller.submit("hello").await;

        assert_eq!(controller.messages().last().unwrap().text(), ERROR_REPLY);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_blank_submit_is_noop() {
        let (mut controller, endpoint) = setup(ScriptedEndpoint::new().reply("unused"));
        controller.set_draft("   ");

        for text in ["", "   ", "\t\n"] {
            controller.submit(text).await;
        }
        controller.submit_draft().await;

        assert_eq!(controller.messages().len(), 1);
        assert!(!controller.is_busy());
        assert_eq!(controller.draft(), "   ");
        assert!(endpoint.requests().is_empty());
    }

    #[tokio::test]
    async fn test_begin_appends_user_message_and_sets_busy() {
        let (mut controller, _) = setup(ScriptedEndpoint::new());
        controller.set_draft("  Lisbon tips  ");

        let submission = controller.begin("  Lisbon tips  ").unwrap();

        assert_eq!(controller.messages().len(), 2);
        let last = controller.messages().last().unwrap();
        assert_eq!(last.sender(), Sender::User);
        assert_eq!(last.text(), "  Lisbon tips  ");
        assert_eq!(last.id(), submission.request());
        assert_eq!(submission.text(), "  Lisbon tips  ");
        assert!(controller.draft().is_empty());
        assert_eq!(
            controller.phase(),
            Phase::AwaitingResponse { request: submission.request() }
        );
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_rejected() {
        let (endpoint, gate) = ScriptedEndpoint::gated();
        let (mut controller, endpoint) = setup(endpoint.reply("first").reply("second"));

        let pending = controller.dispatch("first question").unwrap();
        assert!(controller.is_busy());

        assert!(controller.dispatch("second question").is_none());
        assert!(controller.begin("third question").is_none());
        assert_eq!(controller.messages().len(), 2);

        gate.notify_one();
        let reply = pending.await;
        controller.resolve(reply);

        assert!(!controller.is_busy());
        assert_eq!(endpoint.requests(), vec!["first question"]);
        assert_eq!(
            tail(&controller),
            vec![
                (Sender::User, "first question".to_string()),
                (Sender::Assistant, "first".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_busy_only_between_dispatch_and_resolve() {
        let (endpoint, gate) = ScriptedEndpoint::gated();
        let (mut controller, _) = setup(endpoint.reply("ok"));
        assert!(!controller.is_busy());

        let pending = controller.dispatch("hi").unwrap();
        tokio::task::yield_now().await;
        assert!(controller.is_busy());
        assert!(!pending.is_finished());

        gate.notify_one();
        let reply = pending.await;
        assert!(controller.is_busy());
        controller.resolve(reply);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_stale_reply_is_ignored() {
        let (mut controller, _) = setup(ScriptedEndpoint::new());
        let stale = Reply {
            request: Message::user("never sent").id(),
            outcome: Ok("ghost".to_string()),
        };

        controller.resolve(stale);
        assert_eq!(controller.messages().len(), 1);

        let submission = controller.begin("real").unwrap();
        let wrong = Reply {
            request: Message::user("other").id(),
            outcome: Ok("ghost".to_string()),
        };
        controller.resolve(wrong);
        assert_eq!(controller.messages().len(), 2);
        assert_eq!(controller.phase(), Phase::AwaitingResponse { request: submission.request() });
    }

    #[tokio::test]
    async fn test_scroll_signal_fires_on_every_append() {
        let (mut controller, _) = setup(ScriptedEndpoint::new().reply("sure"));
        let mut scroll = controller.subscribe_scroll();
        assert!(!scroll.has_changed().unwrap());

        let submission = controller.begin("hi").unwrap();
        assert!(scroll.has_changed().unwrap());
        assert_eq!(*scroll.borrow_and_update(), 1);

        controller.resolve(Reply {
            request: submission.request(),
            outcome: Ok("sure".to_string()),
        });
        assert!(scroll.has_changed().unwrap());
        assert_eq!(*scroll.borrow_and_update(), 2);

        controller.submit("   ").await;
        assert!(!scroll.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_draft_edits_ignored_while_busy() {
        let (mut controller, _) = setup(ScriptedEndpoint::new());
        assert!(controller.insert_char(0, 'h'));
        assert!(controller.insert_char(1, 'é'));
        assert!(controller.insert_char(5, '!'));
        assert_eq!(controller.draft(), "hé!");
        assert!(controller.remove_char(1));
        assert!(!controller.remove_char(9));
        assert_eq!(controller.draft(), "h!");

        controller.begin("go").unwrap();
        assert!(!controller.insert_char(0, 'x'));
        assert!(!controller.set_draft("typed while busy"));
        assert!(controller.draft().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_submit_clears_busy() {
        let (endpoint, gate) = ScriptedEndpoint::gated();
        let (mut controller, endpoint) = setup(endpoint.reply("Rome is lovely"));

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            controller.submit("hello"),
        )
        .await;
        assert!(timed_out.is_err());

        assert!(!controller.is_busy());
        assert_eq!(
            tail(&controller),
            vec![
                (Sender::User, "hello".to_string()),
                (Sender::Assistant, ERROR_REPLY.to_string()),
            ]
        );

        gate.notify_one();
        controller.submit("second").await;

        assert!(!controller.is_busy());
        assert_eq!(endpoint.requests(), vec!["hello", "second"]);
        assert_eq!(controller.messages().last().unwrap().text(), "Rome is lovely");
    }

    struct PanickingEndpoint;

    #[async_trait]
    impl AssistantEndpoint for PanickingEndpoint {
        async fn send(&self, _text: &str) -> Result<String, EndpointError> {
            panic!("endpoint blew up");
        }

        fn describe(&self) -> String {
            "panicking".to_string()
        }
    }

    #[tokio::test]
    async fn test_interrupted_request_still_clears_busy() {
        let mut controller = ConversationController::new(Arc::new(PanickingEndpoint));

        let pending = controller.dispatch("hello").unwrap();
        let reply = pending.await;
        assert!(matches!(reply.outcome, Err(EndpointError::Interrupted(_))));

        controller.resolve(reply);
        assert!(!controller.is_busy());
        assert_eq!(controller.messages().last().unwrap().text(), ERROR_REPLY);
    }
}
