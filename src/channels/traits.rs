use crate::model::UserId;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One inline button: a visible label and the opaque token sent back on tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAction {
    pub label: String,
    pub token: String,
}

impl InlineAction {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Outbound message addressed to one user's private chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub user_id: UserId,
    pub text: String,
    /// Inline keyboard rows; empty for a plain message.
    pub actions: Vec<Vec<InlineAction>>,
}

impl OutboundMessage {
    pub fn text(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_actions(mut self, actions: Vec<Vec<InlineAction>>) -> Self {
        self.actions = actions;
        self
    }
}

/// Inbound event received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text message (commands included).
    Message { user_id: UserId, text: String },
    /// An inline button tap.
    Callback {
        user_id: UserId,
        callback_id: String,
        token: String,
    },
}

impl InboundEvent {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            Self::Message { user_id, .. } | Self::Callback { user_id, .. } => *user_id,
        }
    }
}

/// Delivery contract used by the scheduler and focus timers.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Stable transport identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Deliver one message. An error means the message was not delivered.
    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()>;
}

/// Transport that also receives user input.
#[async_trait]
pub trait ChatTransport: Notifier {
    /// Receive inbound events and forward them until the receiver closes.
    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()>;

    /// Acknowledge a button tap so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()>;
}
