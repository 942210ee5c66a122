//! Fire-and-forget progress reporting.

use tokio::sync::mpsc;

/// Receives human-readable pipeline events. Must never block or fail.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &str);
}

/// Logs each event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, message: &str) {
        tracing::info!(target: "sitesmith::progress", "{}", message);
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _message: &str) {}
}

/// Forwards events to a channel, e.g. a live log stream.
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, message: &str) {
        let _ = self.tx.send(message.to_string());
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, message: &str) {
        self(message)
    }
}
