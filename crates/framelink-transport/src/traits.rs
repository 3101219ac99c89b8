use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::{ConfigValidation, ConnectionConfig};
use crate::error::{Result, TransportError};

/// Something a transport reports to its owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// Inbound bytes, already aggregated at the transport boundary.
    DataReceived(Bytes),
    /// A transport-level failure that did not come from a direct call.
    Error(TransportError),
    /// The link came up.
    Connected,
    /// The link went away.
    Disconnected,
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the event channel a factory hands to a new transport.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A byte-stream transport (serial port, socket, BLE characteristic, ...).
///
/// Inbound data is delivered through the [`EventSender`] given to
/// [`TransportFactory::create`], never through a return value.
#[async_trait]
pub trait Transport: Send {
    /// Open the underlying device. Suspends until the driver confirms.
    async fn open(&mut self) -> Result<()>;

    /// Close the underlying device.
    async fn close(&mut self) -> Result<()>;

    /// Release every resource held by the transport. Idempotent.
    fn destroy(&mut self);

    fn is_open(&self) -> bool;

    fn is_readable(&self) -> bool;

    fn is_writable(&self) -> bool;

    /// Write bytes, returning how many were accepted.
    ///
    /// Fails with [`TransportError::NotWritable`] when the transport is read-only.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Driver-specific configuration check.
    fn validate_configuration(&self) -> ConfigValidation;

    /// The configuration this transport was built from.
    fn configuration(&self) -> &ConnectionConfig;
}

/// Builds transports from typed configuration.
///
/// This is the driver-registry seam: the session layer receives a factory
/// instead of looking drivers up in global state.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &ConnectionConfig, events: EventSender) -> Result<Box<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&ConnectionConfig, EventSender) -> Result<Box<dyn Transport>> + Send + Sync,
{
    fn create(&self, config: &ConnectionConfig, events: EventSender) -> Result<Box<dyn Transport>> {
        self(config, events)
    }
}
