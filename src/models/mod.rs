//! Conversational model session abstractions.
//!
//! Defines the [`RealtimeModel`] factory trait, the [`ModelSession`]
//! handle the orchestrator drives, the [`SessionEvent`]s a session
//! emits, and the concrete [`OpenAIRealtime`] backend.

pub mod openai_realtime;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::tools::ToolRegistry;

pub use openai_realtime::OpenAIRealtime;

/// Capacity of the per-session event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// A conversation item seeded into a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// `"assistant"`, `"user"` or `"system"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

// ---------------------------------------------------------------------------
// Session events
// ---------------------------------------------------------------------------

/// Events emitted by a running model session, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new turn (model response) began.
    TurnStarted { turn_id: String },
    /// Incremental text (or audio transcript) for a turn.
    TurnDelta { turn_id: String, text: String },
    /// A turn finished.
    TurnCompleted { turn_id: String },
    /// The model wants a tool invoked.  `arguments` is the raw JSON payload.
    ToolCall {
        turn_id: String,
        call_id: String,
        name: String,
        arguments: String,
    },
    /// A non-fatal error reported by the model service.
    Error { message: String },
    /// The session is gone; no further events follow.
    Closed,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Parameters for a new session.
#[derive(Clone)]
pub struct SessionConfig {
    pub instructions: String,
    /// Tools advertised to the model; calls come back as [`SessionEvent::ToolCall`].
    pub tools: Arc<ToolRegistry>,
}

/// A live session plus the stream of its events.
pub struct StartedSession {
    pub session: Arc<dyn ModelSession>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Factory for model sessions.
#[async_trait]
pub trait RealtimeModel: Send + Sync {
    async fn start_session(&self, config: SessionConfig) -> anyhow::Result<StartedSession>;
}

/// Commands accepted by a running session.
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// Add a message to the conversation without generating a response.
    async fn create_item(&self, message: ChatMessage) -> anyhow::Result<()>;

    /// Ask the model to generate the next turn.
    async fn request_response(&self) -> anyhow::Result<()>;

    /// Hand the reply for `call_id` back to the model.
    async fn submit_tool_output(&self, call_id: &str, output: &str) -> anyhow::Result<()>;

    /// Tear the session down.  Idempotent.
    async fn close(&self) -> anyhow::Result<()>;
}
