//! Observer boundary between the chat core and its front-end
//!
//! The server and client report everything the user should see through
//! [`ChatObserver`]. A front-end implements the trait directly or uses one
//! of the adapters below.

use std::sync::Arc;

use tokio::sync::mpsc;

/// Callbacks from the chat core into the UI
///
/// Called from runtime worker tasks, so implementations must not block.
pub trait ChatObserver: Send + Sync {
    /// Show one line of chat or status text
    fn display_line(&self, text: &str);

    /// Client role: the connection became active or inactive
    fn on_connected_state_changed(&self, _active: bool) {}

    /// Server role: the listener became active or inactive
    fn on_server_state_changed(&self, _active: bool) {}
}

/// Shared observer handle held by the core
pub type SharedObserver = Arc<dyn ChatObserver>;

/// Observer callbacks as values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Line(String),
    ConnectedStateChanged(bool),
    ServerStateChanged(bool),
}

/// Forwards every callback as a [`ChatEvent`] on an unbounded channel
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }
}

impl ChatObserver for ChannelObserver {
    fn display_line(&self, text: &str) {
        self.emit(ChatEvent::Line(text.to_string()));
    }

    fn on_connected_state_changed(&self, active: bool) {
        self.emit(ChatEvent::ConnectedStateChanged(active));
    }

    fn on_server_state_changed(&self, active: bool) {
        self.emit(ChatEvent::ServerStateChanged(active));
    }
}

/// Display-only observer built from a closure
pub struct CallbackObserver<F>
where
    F: Fn(&str) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackObserver<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ChatObserver for CallbackObserver<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn display_line(&self, text: &str) {
        (self.callback)(text);
    }
}
