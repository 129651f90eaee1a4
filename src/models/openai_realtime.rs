//! OpenAI Realtime API backend over WebSocket.
//!
//! One socket per session.  A writer task drains an outbound queue of
//! client events; a reader task maps server events to
//! [`SessionEvent`]s.  Audio frames travel through the room transport
//! and never pass through here.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ChatMessage, ModelSession, RealtimeModel, SessionConfig, SessionEvent, StartedSession,
    EVENT_CHANNEL_CAPACITY,
};

/// Default realtime endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";
/// Default realtime model.
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

/// Realtime model factory.
pub struct OpenAIRealtime {
    api_key: String,
    endpoint: String,
    model: String,
    voice: Option<String>,
    modalities: Vec<String>,
}

impl OpenAIRealtime {
    pub fn with_config(api_key: String, endpoint: String, model: String) -> Self {
        Self {
            api_key,
            endpoint,
            model,
            voice: None,
            modalities: vec!["text".into(), "audio".into()],
        }
    }

    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<String>) -> Self {
        self.modalities = modalities;
        self
    }

    fn url(&self) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{sep}model={}", self.endpoint, self.model)
    }

    /// The `session.update` event sent right after connecting.
    pub fn session_update(&self, config: &SessionConfig) -> Value {
        let mut session = json!({
            "instructions": config.instructions,
            "modalities": self.modalities,
            "tools": config.tools.function_defs(),
            "tool_choice": "auto",
        });
        if let Some(ref voice) = self.voice {
            session["voice"] = json!(voice);
        }
        json!({ "type": "session.update", "session": session })
    }
}

#[async_trait]
impl RealtimeModel for OpenAIRealtime {
    async fn start_session(&self, config: SessionConfig) -> anyhow::Result<StartedSession> {
        let mut request = self
            .url()
            .into_client_request()
            .context("invalid realtime endpoint")?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .context("invalid API key header")?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        install_crypto_provider();
        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("failed to connect to {}", self.endpoint))?;
        info!(model = %self.model, "realtime session connected");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Value>(EVENT_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        // Writer: outbound client events → socket.  Queued events are
        // flushed before the close frame.
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        next = out_rx.recv() => {
                            let Some(event) = next else { break };
                            if let Err(e) = sink.send(Message::Text(event.to_string().into())).await {
                                warn!(error = %e, "realtime send failed");
                                break;
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
            });
        }

        // Reader: socket → session events.
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        _ = cancel.cancelled() => break,
                        frame = stream.next() => frame,
                    };
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                                debug!("ignoring non-JSON realtime frame");
                                continue;
                            };
                            if let Some(event) = parse_server_event(&value) {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "realtime socket error");
                            break;
                        }
                    }
                }
                let _ = event_tx.send(SessionEvent::Closed).await;
            });
        }

        let session = RealtimeSession {
            outbound: out_tx,
            cancel,
        };
        session.send(self.session_update(&config)).await?;

        Ok(StartedSession {
            session: Arc::new(session),
            events: event_rx,
        })
    }
}

/// rustls needs a process-wide crypto provider before the first `wss://`
/// handshake.  Installing twice is harmless; the first one wins.
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

struct RealtimeSession {
    outbound: mpsc::Sender<Value>,
    cancel: CancellationToken,
}

impl RealtimeSession {
    async fn send(&self, event: Value) -> anyhow::Result<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("realtime session is closed"))
    }
}

#[async_trait]
impl ModelSession for RealtimeSession {
    async fn create_item(&self, message: ChatMessage) -> anyhow::Result<()> {
        self.send(message_item(&message)).await
    }

    async fn request_response(&self) -> anyhow::Result<()> {
        self.send(json!({ "type": "response.create" })).await
    }

    async fn submit_tool_output(&self, call_id: &str, output: &str) -> anyhow::Result<()> {
        self.send(function_output_item(call_id, output)).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire mapping
// ---------------------------------------------------------------------------

/// `conversation.item.create` for a plain message.
pub fn message_item(message: &ChatMessage) -> Value {
    let content_type = if message.role == "assistant" {
        "text"
    } else {
        "input_text"
    };
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "message",
            "role": message.role,
            "content": [{ "type": content_type, "text": message.content }],
        },
    })
}

/// `conversation.item.create` carrying a tool reply.
pub fn function_output_item(call_id: &str, output: &str) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "function_call_output",
            "call_id": call_id,
            "output": output,
        },
    })
}

/// Map one server event to a [`SessionEvent`]; `None` for events the
/// session does not surface.
pub fn parse_server_event(v: &Value) -> Option<SessionEvent> {
    let str_at = |ptr: &str| v.pointer(ptr).and_then(Value::as_str).map(str::to_string);

    match v.get("type")?.as_str()? {
        "response.created" => Some(SessionEvent::TurnStarted {
            turn_id: str_at("/response/id")?,
        }),
        "response.text.delta" | "response.audio_transcript.delta" => {
            Some(SessionEvent::TurnDelta {
                turn_id: str_at("/response_id")?,
                text: str_at("/delta")?,
            })
        }
        "response.done" => Some(SessionEvent::TurnCompleted {
            turn_id: str_at("/response/id")?,
        }),
        "response.output_item.done" => {
            if v.pointer("/item/type").and_then(Value::as_str) != Some("function_call") {
                return None;
            }
            Some(SessionEvent::ToolCall {
                turn_id: str_at("/response_id")?,
                call_id: str_at("/item/call_id")?,
                name: str_at("/item/name")?,
                arguments: str_at("/item/arguments").unwrap_or_else(|| "{}".to_string()),
            })
        }
        "error" => Some(SessionEvent::Error {
            message: str_at("/error/message").unwrap_or_else(|| "unknown error".to_string()),
        }),
        other => {
            debug!(event = other, "unhandled realtime event");
            None
        }
    }
}
