//! Session orchestrator: binds one participant's voice session to the
//! tool dispatcher.
//!
//! Lifecycle: `Idle → Connected → AwaitingParticipant → SessionActive →
//! Ended`.  Once active, the orchestrator seeds a greeting, asks for the
//! first response, and then reacts to model events: turn events go to
//! the [`TurnObserver`], tool calls run concurrently on the
//! [`ToolDispatcher`] and their replies are fed back into the session.
//! Text utterances from the room become user messages that each get a
//! response.
//!
//! A turn that issued tool calls gets exactly one follow-up response,
//! requested once the turn has completed and every reply for it has been
//! submitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::comm::TurnObserver;
use crate::error::{SessionError, ToolError};
use crate::models::{
    ChatMessage, ModelSession, RealtimeModel, SessionConfig, SessionEvent, StartedSession,
};
use crate::room::{Participant, RoomTransport};
use crate::session::ConversationState;
use crate::store::{DayZone, FoodStore};
use crate::tools::{ToolContext, ToolDispatcher, ToolRegistry};

/// Default system instructions for the model.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant that helps track food consumption. \
You can record foods eaten and report daily totals for calories and macronutrients \
(protein, carbs, and fats). You always respond with voice. Never respond with text.";

/// Default synthetic assistant message that opens the conversation.
pub const DEFAULT_GREETING: &str =
    "Please greet the user via voice, and ask if they have anything to track.";

/// How long a finished session waits for in-flight tool calls.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connected,
    AwaitingParticipant,
    SessionActive,
    Ended,
}

/// Behavioural knobs for a session.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub instructions: String,
    pub greeting: String,
    pub day_zone: DayZone,
    pub drain_timeout: Duration,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            day_zone: DayZone::Local,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// What happened during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub participant: String,
    pub turns_completed: usize,
    pub tool_calls: usize,
    pub tool_failures: usize,
    /// Replies that arrived after the session ended and were discarded.
    pub dropped_replies: usize,
}

/// One tool call in flight.  Lives only until its reply is relayed or
/// dropped.
#[derive(Debug)]
struct ToolInvocation {
    turn_id: String,
    call_id: String,
    name: String,
    result: Result<String, ToolError>,
}

/// Drives one voice session end to end.
pub struct SessionOrchestrator {
    room: Box<dyn RoomTransport>,
    model: Arc<dyn RealtimeModel>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn FoodStore>,
    observer: Arc<dyn TurnObserver>,
    settings: AssistantSettings,
    shutdown: CancellationToken,
    phase: SessionPhase,
}

impl SessionOrchestrator {
    pub fn new(
        room: Box<dyn RoomTransport>,
        model: Arc<dyn RealtimeModel>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn FoodStore>,
        observer: Arc<dyn TurnObserver>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            room,
            model,
            registry,
            store,
            observer,
            settings,
            shutdown: CancellationToken::new(),
            phase: SessionPhase::Idle,
        }
    }

    /// End the session when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn transition(&mut self, next: SessionPhase) {
        debug!(from = ?self.phase, to = ?next, "session phase");
        self.phase = next;
    }

    /// Run the whole lifecycle.  Returns once the session has ended.
    pub async fn run(&mut self) -> Result<SessionSummary, SessionError> {
        self.room
            .connect()
            .await
            .map_err(SessionError::ConnectionFailed)?;
        self.transition(SessionPhase::Connected);

        self.transition(SessionPhase::AwaitingParticipant);
        info!("waiting for participant");
        let participant = self
            .room
            .wait_for_participant()
            .await
            .map_err(SessionError::ParticipantUnavailable)?;
        info!(participant = %participant.identity, "starting assistant for participant");

        let dispatcher = ToolDispatcher::new(
            Arc::clone(&self.registry),
            ToolContext {
                participant_identity: participant.identity.clone(),
                store: Arc::clone(&self.store),
                day_zone: self.settings.day_zone,
            },
        );
        let StartedSession { session, events } = self
            .model
            .start_session(SessionConfig {
                instructions: self.settings.instructions.clone(),
                tools: Arc::clone(&self.registry),
            })
            .await
            .map_err(SessionError::ModelSession)?;
        self.transition(SessionPhase::SessionActive);

        let utterances = self.room.take_utterances();
        let result = self
            .drive(&participant, dispatcher, Arc::clone(&session), events, utterances)
            .await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close model session");
        }
        self.transition(SessionPhase::Ended);

        if let Ok(ref summary) = result {
            info!(
                participant = %summary.participant,
                turns = summary.turns_completed,
                tool_calls = summary.tool_calls,
                tool_failures = summary.tool_failures,
                dropped = summary.dropped_replies,
                "session ended"
            );
        }
        result
    }

    async fn drive(
        &self,
        participant: &Participant,
        dispatcher: ToolDispatcher,
        session: Arc<dyn ModelSession>,
        mut events: mpsc::Receiver<SessionEvent>,
        mut utterances: Option<mpsc::Receiver<String>>,
    ) -> Result<SessionSummary, SessionError> {
        let mut summary = SessionSummary {
            participant: participant.identity.clone(),
            ..Default::default()
        };
        let mut tasks: JoinSet<ToolInvocation> = JoinSet::new();
        let mut state = ConversationState::new();
        // Outstanding tool replies per turn.  An entry at zero means every
        // reply is in and the follow-up waits only on turn completion.
        let mut pending: HashMap<String, usize> = HashMap::new();

        let exit = async {
            session
                .create_item(ChatMessage::assistant(self.settings.greeting.clone()))
                .await?;
            session.request_response().await
        }
        .await
        .map_err(SessionError::ModelSession);

        let exit = match exit {
            Err(e) => Err(e),
            Ok(()) => loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("session terminated");
                        break Ok(());
                    }
                    _ = self.room.disconnected() => {
                        info!(participant = %participant.identity, "participant disconnected");
                        break Ok(());
                    }
                    utterance = next_utterance(&mut utterances) => {
                        let Some(text) = utterance else {
                            debug!("utterance input closed");
                            utterances = None;
                            continue;
                        };
                        debug!(chars = text.chars().count(), "participant utterance");
                        let sent = async {
                            session.create_item(ChatMessage::user(text)).await?;
                            session.request_response().await
                        }
                        .await;
                        if let Err(e) = sent {
                            break Err(SessionError::ModelSession(e));
                        }
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        let invocation = match joined {
                            Ok(inv) => inv,
                            Err(e) => {
                                warn!(error = %e, "tool task aborted");
                                continue;
                            }
                        };
                        if let Err(e) = self
                            .relay(invocation, &*session, &state, &mut pending, &mut summary)
                            .await
                        {
                            break Err(e);
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            info!("model event stream ended");
                            break Ok(());
                        };
                        match event {
                            SessionEvent::TurnStarted { turn_id } => {
                                if state.begin(&turn_id) {
                                    self.observer.on_turn_started(&turn_id);
                                } else {
                                    debug!(turn = %turn_id, "duplicate turn start ignored");
                                }
                            }
                            SessionEvent::TurnDelta { turn_id, text } => {
                                if state.accepts_chunk(&turn_id) {
                                    self.observer.on_turn_chunk(&turn_id, &text);
                                } else {
                                    debug!(turn = %turn_id, "output for closed turn ignored");
                                }
                            }
                            SessionEvent::TurnCompleted { turn_id } => {
                                if state.complete(&turn_id) {
                                    self.observer.on_turn_completed(&turn_id);
                                } else if state.settle_unseen(&turn_id) {
                                    warn!(turn = %turn_id, "completion for a turn that never started");
                                } else {
                                    debug!(turn = %turn_id, "duplicate completion ignored");
                                    continue;
                                }
                                if pending.get(&turn_id) == Some(&0) {
                                    pending.remove(&turn_id);
                                    if let Err(e) = session.request_response().await {
                                        break Err(SessionError::ModelSession(e));
                                    }
                                }
                            }
                            SessionEvent::ToolCall { turn_id, call_id, name, arguments } => {
                                summary.tool_calls += 1;
                                *pending.entry(turn_id.clone()).or_insert(0) += 1;
                                debug!(
                                    tool = %name,
                                    call_id = %call_id,
                                    args = %crate::utils::truncate_str(&arguments, 200),
                                    "tool call received"
                                );
                                let dispatcher = dispatcher.clone();
                                tasks.spawn(async move {
                                    let result = dispatcher.invoke(&name, &arguments).await;
                                    if let Err(ToolError::UnknownTool(_)) = result {
                                        warn!(tool = %name, args = %arguments, "model called an unknown tool");
                                    }
                                    ToolInvocation { turn_id, call_id, name, result }
                                });
                            }
                            SessionEvent::Error { message } => {
                                warn!(error = %message, "model session reported an error");
                            }
                            SessionEvent::Closed => {
                                info!("model session closed");
                                break Ok(());
                            }
                        }
                    }
                }
            },
        };

        summary.turns_completed = state.completed_count();
        if !pending.is_empty() {
            debug!(turns = pending.len(), "session ended with follow-ups outstanding");
        }

        // Stop listening before waiting on stragglers.
        drop(events);
        self.drain(tasks, &mut summary).await;
        exit.map(|()| summary)
    }

    /// Submit one reply and, if it was the last one its turn was waiting
    /// on, request the follow-up response.
    async fn relay(
        &self,
        invocation: ToolInvocation,
        session: &dyn ModelSession,
        state: &ConversationState,
        pending: &mut HashMap<String, usize>,
        summary: &mut SessionSummary,
    ) -> Result<(), SessionError> {
        let reply = match invocation.result {
            Ok(reply) => reply,
            Err(e) => {
                summary.tool_failures += 1;
                warn!(tool = %invocation.name, call_id = %invocation.call_id, error = %e, "tool call failed");
                e.spoken_reply()
            }
        };
        session
            .submit_tool_output(&invocation.call_id, &reply)
            .await
            .map_err(SessionError::ModelSession)?;

        let remaining = pending.entry(invocation.turn_id.clone()).or_insert(1);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 && state.is_completed(&invocation.turn_id) {
            pending.remove(&invocation.turn_id);
            session
                .request_response()
                .await
                .map_err(SessionError::ModelSession)?;
        }
        Ok(())
    }

    /// Let in-flight tool calls finish after the session ended.  Their
    /// side effects stand; their replies are dropped.
    async fn drain(&self, mut tasks: JoinSet<ToolInvocation>, summary: &mut SessionSummary) {
        if tasks.is_empty() {
            return;
        }
        info!(in_flight = tasks.len(), "waiting for in-flight tool calls");
        let drained = tokio::time::timeout(self.settings.drain_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(inv) => {
                        summary.dropped_replies += 1;
                        debug!(tool = %inv.name, call_id = %inv.call_id, "session ended; tool reply dropped");
                    }
                    Err(e) => warn!(error = %e, "tool task aborted"),
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "drain timeout reached; leaving tool calls running detached"
            );
            tasks.detach_all();
        }
    }
}

/// Next utterance from the room, or never when the room has none.
async fn next_utterance(utterances: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match utterances {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
