//! Room transport: connection and participant membership.
//!
//! The audio path lives entirely behind this trait.  [`LocalRoom`] is a
//! single-participant stand-in used by the CLI: it "connects" at once,
//! reports the configured identity, and disconnects when its token is
//! cancelled.  Typed lines from the participant stand in for speech.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The remote human in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub identity: String,
}

#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Establish the transport connection.
    async fn connect(&mut self) -> anyhow::Result<()>;

    /// Suspend until a remote participant is present.
    async fn wait_for_participant(&mut self) -> anyhow::Result<Participant>;

    /// Resolves once the transport has disconnected.
    async fn disconnected(&self);

    /// Text the participant says, one message per utterance.  Taken once
    /// by the orchestrator; `None` when the transport only carries audio.
    fn take_utterances(&mut self) -> Option<mpsc::Receiver<String>> {
        None
    }
}

/// In-process room with one fixed participant.
pub struct LocalRoom {
    participant: String,
    connected: bool,
    shutdown: CancellationToken,
    utterances: Option<mpsc::Receiver<String>>,
}

impl LocalRoom {
    pub fn new(participant: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            participant: participant.into(),
            connected: false,
            shutdown,
            utterances: None,
        }
    }

    /// Feed participant utterances from `rx`.
    pub fn with_utterances(mut self, rx: mpsc::Receiver<String>) -> Self {
        self.utterances = Some(rx);
        self
    }
}

#[async_trait]
impl RoomTransport for LocalRoom {
    async fn connect(&mut self) -> anyhow::Result<()> {
        if self.shutdown.is_cancelled() {
            anyhow::bail!("room shut down before connecting");
        }
        self.connected = true;
        info!("connected to local room");
        Ok(())
    }

    async fn wait_for_participant(&mut self) -> anyhow::Result<Participant> {
        if !self.connected {
            anyhow::bail!("room is not connected");
        }
        Ok(Participant {
            identity: self.participant.clone(),
        })
    }

    async fn disconnected(&self) {
        self.shutdown.cancelled().await;
    }

    fn take_utterances(&mut self) -> Option<mpsc::Receiver<String>> {
        self.utterances.take()
    }
}
