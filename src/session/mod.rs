//! Conversation state: per-turn lifecycle tracking.
//!
//! Each turn id moves `Open → Completed` exactly once.  Events that do
//! not fit that progression (a second start, a chunk for a closed or
//! unseen turn, a repeated completion) are reported as not accepted so
//! the caller can drop them instead of processing them twice.
//!
//! A completion whose start was never delivered is recorded through
//! [`ConversationState::settle_unseen`]: the turn is closed for good but
//! not counted, since no observer ever saw it open.

use std::collections::HashMap;

/// Lifecycle of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Open,
    Completed,
}

/// Turn bookkeeping for one session.
#[derive(Debug, Default)]
pub struct ConversationState {
    turns: HashMap<String, TurnStatus>,
    completed: usize,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a turn start.  `false` if the id was already seen.
    pub fn begin(&mut self, turn_id: &str) -> bool {
        if self.turns.contains_key(turn_id) {
            return false;
        }
        self.turns.insert(turn_id.to_string(), TurnStatus::Open);
        true
    }

    /// Whether output for `turn_id` should be accepted.
    pub fn accepts_chunk(&self, turn_id: &str) -> bool {
        self.status(turn_id) == Some(TurnStatus::Open)
    }

    /// Record a turn completion.  `false` for unknown or already
    /// completed turns.
    pub fn complete(&mut self, turn_id: &str) -> bool {
        match self.turns.get_mut(turn_id) {
            Some(status @ TurnStatus::Open) => {
                *status = TurnStatus::Completed;
                self.completed += 1;
                true
            }
            _ => false,
        }
    }

    /// Close a turn that completed without ever starting.  `false` if the
    /// id is already known.
    pub fn settle_unseen(&mut self, turn_id: &str) -> bool {
        if self.turns.contains_key(turn_id) {
            return false;
        }
        self.turns.insert(turn_id.to_string(), TurnStatus::Completed);
        true
    }

    pub fn status(&self, turn_id: &str) -> Option<TurnStatus> {
        self.turns.get(turn_id).copied()
    }

    pub fn is_completed(&self, turn_id: &str) -> bool {
        self.status(turn_id) == Some(TurnStatus::Completed)
    }

    /// Turns that went through `Open → Completed`.
    pub fn completed_count(&self) -> usize {
        self.completed
    }
}
