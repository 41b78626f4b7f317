use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::domains::transcript::{ChatMessage, Transcript};
use crate::interfaces::callbacks::CallbackHandler;

/// Shared destination for everything a plan run wants to show the user.
/// Messages are kept in order and optionally forwarded live.
#[derive(Clone, Default)]
pub struct TranscriptSink {
    transcript: Arc<Mutex<Transcript>>,
    live: Option<UnboundedSender<ChatMessage>>,
}

impl TranscriptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live(mut self, sender: UnboundedSender<ChatMessage>) -> Self {
        self.live = Some(sender);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, message: ChatMessage) {
        self.lock().push(message.clone());
        if let Some(live) = &self.live {
            if live.send(message).is_err() {
                debug!("Live transcript receiver dropped");
            }
        }
    }

    pub fn snapshot(&self) -> Transcript {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages().to_vec()
    }
}

/// Bound to one agent: task input goes out as `assistant`, the agent's
/// answer under the agent's own name.
pub struct TranscriptHandler {
    agent_name: String,
    sink: TranscriptSink,
}

impl TranscriptHandler {
    pub fn new(agent_name: &str, sink: TranscriptSink) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            sink,
        }
    }
}

impl CallbackHandler for TranscriptHandler {
    fn on_chain_start(&self, input: &str) {
        self.sink.push(ChatMessage::assistant(input));
    }

    fn on_chain_end(&self, output: &str) {
        self.sink.push(ChatMessage::new(&self.agent_name, output));
    }
}
