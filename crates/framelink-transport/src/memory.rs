use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::aggregator::ReadAggregator;
use crate::config::{BusType, ConfigValidation, ConnectionConfig};
use crate::error::{Result, TransportError};
use crate::traits::{EventSender, Transport, TransportEvent, TransportFactory};

/// In-process transport.
///
/// Inbound bytes are injected through a [`MemoryHandle`]; writes are
/// recorded so callers can inspect them. Every transport created by the
/// same factory shares one handle, and injected data always goes to the
/// most recently opened transport.
pub struct MemoryTransport {
    config: ConnectionConfig,
    shared: Arc<Mutex<SharedState>>,
    events: EventSender,
    open: bool,
    destroyed: bool,
}

#[derive(Debug, Default)]
struct SharedState {
    events: Option<EventSender>,
    aggregator: ReadAggregator,
    writable: bool,
    loopback: bool,
    fail_next_open: Option<String>,
    fail_next_write: Option<String>,
    written: BytesMut,
    opens: usize,
    closes: usize,
    destroys: usize,
}

/// Test-side controls for [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryHandle {
    shared: Arc<Mutex<SharedState>>,
}

/// Factory producing [`MemoryTransport`]s for [`BusType::Memory`] configs.
#[derive(Clone)]
pub struct MemoryTransportFactory {
    shared: Arc<Mutex<SharedState>>,
}

impl Default for MemoryTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        let state = SharedState {
            writable: true,
            ..SharedState::default()
        };
        Self {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    /// Handle for injecting data and inspecting the transports built by this factory.
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create(&self, config: &ConnectionConfig, events: EventSender) -> Result<Box<dyn Transport>> {
        if config.bus != BusType::Memory {
            return Err(TransportError::Unsupported(config.bus));
        }
        Ok(Box::new(MemoryTransport {
            config: config.clone(),
            shared: Arc::clone(&self.shared),
            events,
            open: false,
            destroyed: false,
        }))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(TransportError::Shutdown);
        }
        if self.open {
            return Ok(());
        }

        let mut shared = self.shared.lock();
        shared.opens += 1;
        if let Some(message) = shared.fail_next_open.take() {
            return Err(TransportError::Open {
                address: self.config.address.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, message),
            });
        }
        shared.events = Some(self.events.clone());
        shared.aggregator = ReadAggregator::new(self.config.buffer_size);
        drop(shared);

        self.open = true;
        debug!(address = %self.config.address, "memory transport opened");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let mut shared = self.shared.lock();
        shared.closes += 1;
        if let Some(rest) = shared.aggregator.flush() {
            let _ = self.events.send(TransportEvent::DataReceived(rest));
        }
        if shared
            .events
            .as_ref()
            .is_some_and(|current| current.same_channel(&self.events))
        {
            shared.events = None;
        }
        debug!(address = %self.config.address, "memory transport closed");
        Ok(())
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.open = false;

        let mut shared = self.shared.lock();
        shared.destroys += 1;
        if shared
            .events
            .as_ref()
            .is_some_and(|current| current.same_channel(&self.events))
        {
            shared.events = None;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_readable(&self) -> bool {
        self.open
    }

    fn is_writable(&self) -> bool {
        self.open && self.shared.lock().writable
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }

        let mut shared = self.shared.lock();
        if !shared.writable {
            return Err(TransportError::NotWritable);
        }
        if let Some(message) = shared.fail_next_write.take() {
            return Err(TransportError::other(message));
        }
        shared.written.extend_from_slice(data);
        if shared.loopback {
            let ready = shared.aggregator.push(data);
            for chunk in ready.into_iter().chain(shared.aggregator.flush()) {
                let _ = self.events.send(TransportEvent::DataReceived(chunk));
            }
        }
        trace!(len = data.len(), "memory transport write");
        Ok(data.len())
    }

    fn validate_configuration(&self) -> ConfigValidation {
        self.config.validate_common()
    }

    fn configuration(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl MemoryHandle {
    /// Feed inbound bytes through the read aggregator.
    ///
    /// Returns `false` when no transport is currently open.
    pub fn inject(&self, data: &[u8]) -> bool {
        let mut shared = self.shared.lock();
        let Some(events) = shared.events.clone() else {
            return false;
        };
        for chunk in shared.aggregator.push(data) {
            let _ = events.send(TransportEvent::DataReceived(chunk));
        }
        true
    }

    /// Feed inbound bytes and immediately flush the aggregator.
    pub fn deliver(&self, data: &[u8]) -> bool {
        if !self.inject(data) {
            return false;
        }
        self.flush();
        true
    }

    /// Forward any bytes held by the aggregator.
    pub fn flush(&self) {
        let mut shared = self.shared.lock();
        let Some(events) = shared.events.clone() else {
            return;
        };
        if let Some(rest) = shared.aggregator.flush() {
            let _ = events.send(TransportEvent::DataReceived(rest));
        }
    }

    /// Report an asynchronous transport error.
    pub fn inject_error(&self, error: TransportError) -> bool {
        self.send(TransportEvent::Error(error))
    }

    /// Report that the link dropped.
    pub fn emit_disconnected(&self) -> bool {
        self.send(TransportEvent::Disconnected)
    }

    /// Report that the link came (back) up.
    pub fn emit_connected(&self) -> bool {
        self.send(TransportEvent::Connected)
    }

    pub fn set_writable(&self, writable: bool) {
        self.shared.lock().writable = writable;
    }

    /// Echo written bytes back as inbound data.
    pub fn set_loopback(&self, loopback: bool) {
        self.shared.lock().loopback = loopback;
    }

    /// Make the next `open()` fail with the given message.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.shared.lock().fail_next_open = Some(message.into());
    }

    /// Make the next `write()` fail with the given message.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.shared.lock().fail_next_write = Some(message.into());
    }

    /// Everything written so far, across all transports.
    pub fn written(&self) -> Bytes {
        Bytes::copy_from_slice(&self.shared.lock().written)
    }

    pub fn is_attached(&self) -> bool {
        self.shared.lock().events.is_some()
    }

    pub fn open_count(&self) -> usize {
        self.shared.lock().opens
    }

    pub fn close_count(&self) -> usize {
        self.shared.lock().closes
    }

    pub fn destroy_count(&self) -> usize {
        self.shared.lock().destroys
    }

    fn send(&self, event: TransportEvent) -> bool {
        match &self.shared.lock().events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::event_channel;

    #[tokio::test]
    async fn injected_data_reaches_open_transport() {
        let factory = MemoryTransportFactory::new();
        let handle = factory.handle();
        let (tx, mut rx) = event_channel();

        let mut transport = factory
            .create(&ConnectionConfig::memory("mem://a"), tx)
            .unwrap();
        assert!(!handle.deliver(b"early"));

        transport.open().await.unwrap();
        assert!(handle.deliver(b"hello"));

        match rx.recv().await {
            Some(TransportEvent::DataReceived(data)) => assert_eq!(data.as_ref(), b"hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_requires_writable_transport() {
        let factory = MemoryTransportFactory::new();
        let handle = factory.handle();
        let (tx, _rx) = event_channel();
        let mut transport = factory
            .create(&ConnectionConfig::memory("mem://w"), tx)
            .unwrap();

        assert!(matches!(
            transport.write(b"x").await,
            Err(TransportError::NotOpen)
        ));

        transport.open().await.unwrap();
        assert_eq!(transport.write(b"abc").await.unwrap(), 3);

        handle.set_writable(false);
        assert!(!transport.is_writable());
        assert!(matches!(
            transport.write(b"x").await,
            Err(TransportError::NotWritable)
        ));
        assert_eq!(handle.written().as_ref(), b"abc");
    }

    #[tokio::test]
    async fn failed_open_is_reported_once() {
        let factory = MemoryTransportFactory::new();
        let handle = factory.handle();
        handle.fail_next_open("no such device");
        let (tx, _rx) = event_channel();
        let mut transport = factory
            .create(&ConnectionConfig::memory("mem://f"), tx)
            .unwrap();

        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(transport.open().await.is_ok());
        assert_eq!(handle.open_count(), 2);
    }

    #[test]
    fn rejects_other_buses() {
        let factory = MemoryTransportFactory::new();
        let (tx, _rx) = event_channel();
        let err = factory
            .create(&ConnectionConfig::new(BusType::Uart, "/dev/ttyS0"), tx)
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Unsupported(BusType::Uart)));
    }

    #[tokio::test]
    async fn destroy_detaches_and_is_idempotent() {
        let factory = MemoryTransportFactory::new();
        let handle = factory.handle();
        let (tx, _rx) = event_channel();
        let mut transport = factory
            .create(&ConnectionConfig::memory("mem://d"), tx)
            .unwrap();
        transport.open().await.unwrap();
        assert!(handle.is_attached());

        transport.close().await.unwrap();
        transport.destroy();
        transport.destroy();

        assert!(!handle.is_attached());
        assert_eq!(handle.close_count(), 1);
        assert_eq!(handle.destroy_count(), 1);
        assert!(matches!(
            transport.open().await,
            Err(TransportError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn loopback_echoes_writes() {
        let factory = MemoryTransportFactory::new();
        let handle = factory.handle();
        handle.set_loopback(true);
        let (tx, mut rx) = event_channel();
        let mut transport = factory
            .create(&ConnectionConfig::memory("mem://l"), tx)
            .unwrap();
        transport.open().await.unwrap();
        transport.write(b"ping\n").await.unwrap();

        match rx.recv().await {
            Some(TransportEvent::DataReceived(data)) => assert_eq!(data.as_ref(), b"ping\n"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
