use bytes::Bytes;
use framelink_frame::RawFrame;
use tokio::sync::mpsc;

use crate::state::ConnectionState;
use crate::stats::CommunicationStats;

/// Notifications emitted by a [`ConnectionSupervisor`](crate::ConnectionSupervisor).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    FrameReceived(RawFrame),
    RawDataReceived(Bytes),
    Error(String),
    Warning(String),
    StatisticsUpdated(CommunicationStats),
}

/// Fan-out of [`SessionEvent`]s to any number of subscribers.
///
/// Each subscriber owns an unbounded channel. Subscribers whose receiver
/// was dropped are pruned on the next emit and never affect the others.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drops every subscriber; their receivers see the channel close.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}
