//! Error taxonomy shared by the tool dispatcher and the session
//! orchestrator.

use thiserror::Error;

/// Failure of a single tool invocation.
///
/// None of these end the conversation: the orchestrator turns each one
/// into a spoken reply via [`ToolError::spoken_reply`].
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid argument '{field}': {reason}")]
    InvalidArguments { field: String, reason: String },

    #[error("tool '{tool}' failed: {source}")]
    ToolExecutionFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ToolError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Text handed back to the model in place of a tool result.
    ///
    /// Handler failures never carry the underlying cause; that only
    /// goes to the log.
    pub fn spoken_reply(&self) -> String {
        match self {
            ToolError::UnknownTool(_) => {
                "Say: Sorry, I couldn't do that. That action isn't available.".to_string()
            }
            ToolError::InvalidArguments { field, reason } => {
                format!("Say: Sorry, I couldn't do that because the {field} {reason}.")
            }
            ToolError::ToolExecutionFailed { .. } => {
                "Say: Sorry, I couldn't do that right now. Please try again in a moment."
                    .to_string()
            }
        }
    }
}

/// Failures that end (or prevent) a voice session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] anyhow::Error),

    #[error("no participant joined: {0}")]
    ParticipantUnavailable(#[source] anyhow::Error),

    #[error("model session error: {0}")]
    ModelSession(#[source] anyhow::Error),
}
