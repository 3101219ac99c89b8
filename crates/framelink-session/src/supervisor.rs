//! The connection supervisor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use framelink_frame::{FrameConfig, FrameConfigUpdate, FrameExtractor, RawFrame};
use framelink_transport::{
    event_channel, ConnectionConfig, EventReceiver, Transport, TransportError, TransportEvent,
    TransportFactory,
};
use framelink_worker::{PoolConfig, PoolEvent, PoolStats, WorkerPool};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ReconnectPolicy, SupervisorConfig};
use crate::error::{Result, SessionError};
use crate::events::{EventBus, SessionEvent};
use crate::state::ConnectionState;
use crate::stats::{CircuitState, CommunicationStats};

/// Owns one transport session at a time and turns its bytes into frames.
///
/// All methods take `&mut self`: the supervisor is meant to live in a
/// single task (see [`spawn`](crate::spawn)), so its accumulator and
/// counters need no locking. Parsing on the parallel path happens in
/// worker threads and only crosses over as messages.
///
/// Frames are renumbered with the supervisor's own counter, so
/// `sequence` increases by one per emitted frame whichever path produced
/// it.
pub struct ConnectionSupervisor {
    factory: Arc<dyn TransportFactory>,
    config: SupervisorConfig,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    transport_events: Option<EventReceiver>,
    last_config: Option<ConnectionConfig>,
    extractor: FrameExtractor,
    sequence: u64,
    pool: Option<WorkerPool>,
    pool_events: Option<mpsc::UnboundedReceiver<PoolEvent>>,
    threaded: bool,
    paused: bool,
    stats: CommunicationStats,
    connected_at: Option<Instant>,
    events: EventBus,
    destroyed: bool,
}

impl ConnectionSupervisor {
    /// Creates a supervisor. With threaded extraction enabled this also
    /// starts the worker pool, which fails outside a tokio runtime.
    pub fn new(factory: Arc<dyn TransportFactory>, config: SupervisorConfig) -> Result<Self> {
        let mut supervisor = Self::build(factory, config)?;
        if supervisor.threaded {
            supervisor.start_pool()?;
        }
        Ok(supervisor)
    }

    /// Creates a supervisor around an existing worker pool.
    pub fn with_worker_pool(
        factory: Arc<dyn TransportFactory>,
        config: SupervisorConfig,
        pool: WorkerPool,
    ) -> Result<Self> {
        let mut supervisor = Self::build(factory, config)?;
        pool.set_threaded_extraction(supervisor.threaded);
        supervisor.pool_events = Some(pool.subscribe());
        supervisor.pool = Some(pool);
        Ok(supervisor)
    }

    fn build(factory: Arc<dyn TransportFactory>, config: SupervisorConfig) -> Result<Self> {
        let extractor = FrameExtractor::new(config.frame_config.clone())?;
        Ok(Self {
            factory,
            threaded: config.threaded_extraction,
            config,
            state: ConnectionState::Disconnected,
            transport: None,
            transport_events: None,
            last_config: None,
            extractor,
            sequence: 0,
            pool: None,
            pool_events: None,
            paused: false,
            stats: CommunicationStats::default(),
            connected_at: None,
            events: EventBus::default(),
            destroyed: false,
        })
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn threaded_extraction(&self) -> bool {
        self.threaded
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn frame_config(&self) -> &FrameConfig {
        self.extractor.config()
    }

    /// Configuration of the active session, or of the last one.
    pub fn connection_config(&self) -> Option<&ConnectionConfig> {
        self.transport
            .as_ref()
            .map(|t| t.configuration())
            .or(self.last_config.as_ref())
    }

    /// Readable but not writable.
    pub fn is_read_only(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.is_readable() && !t.is_writable())
    }

    pub fn is_read_write(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.is_readable() && t.is_writable())
    }

    /// Opens a new session, replacing any existing one.
    ///
    /// The configuration is validated before the current session is
    /// touched; a rejected configuration leaves state unchanged.
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<()> {
        self.ensure_alive()?;
        let (transport, events) = self.create_transport(&config)?;

        if self.transport.is_some() {
            if let Err(err) = self.disconnect().await {
                warn!(error = %err, "closing previous session failed");
            }
        }

        self.set_state(ConnectionState::Connecting);
        self.open_transport(transport, events, config).await
    }

    /// Closes and destroys the active session. No-op without one.
    ///
    /// Data the transport still delivers while closing is extracted before
    /// the accumulator is cleared.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        self.set_state(ConnectionState::Disconnected);

        let closed = transport.close().await;
        transport.destroy();
        self.drain_final_data().await;
        self.transport_events = None;
        self.extractor.reset();
        self.connected_at = None;
        info!(address = %transport.configuration().address, "disconnected");

        if let Err(err) = closed {
            return Err(self.transport_failure(err));
        }
        Ok(())
    }

    /// Writes to the active session.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        let transport = match self.transport.as_mut() {
            Some(transport) if self.state.is_connected() => transport,
            _ => return Err(SessionError::NotConnected),
        };
        if !transport.is_writable() {
            return Err(SessionError::NotWritable);
        }

        let written = transport.write(data).await;
        match written {
            Ok(n) => {
                self.stats.bytes_sent += n as u64;
                self.stats.frames_sent += 1;
                Ok(n)
            }
            Err(err) => Err(self.transport_failure(err)),
        }
    }

    /// Merges `update` into the framing configuration and resets the
    /// accumulator. The new configuration is pushed to the workers on a
    /// best-effort basis.
    pub async fn update_frame_config(&mut self, update: FrameConfigUpdate) -> Result<()> {
        let merged = self.extractor.config().merged(update);
        self.extractor.set_config(merged.clone())?;
        debug!(detection = %merged.frame_detection, "frame configuration updated");

        if let Some(pool) = &self.pool {
            match pool.configure(merged).await {
                Ok(()) => {}
                Err(err) if err.is_pool_destroyed() => {}
                Err(err) => warn!(error = %err, "failed to configure workers"),
            }
        }
        Ok(())
    }

    /// Accounts for inbound bytes and extracts frames from them.
    ///
    /// Returns the number of frames emitted. While paused, bytes are
    /// counted and forwarded as raw data only.
    pub async fn process_incoming_data(&mut self, data: Bytes) -> usize {
        self.drain_pool_events();
        self.stats.bytes_received += data.len() as u64;
        self.events.emit(SessionEvent::RawDataReceived(data.clone()));

        if self.paused {
            trace!(len = data.len(), "paused; data not processed");
            return 0;
        }

        // A partial frame held by the accumulator is finished sequentially.
        let pool = match self.extractor.buffered() {
            0 => self.parallel_pool(),
            held => {
                trace!(held, "accumulator holds a partial frame; staying sequential");
                None
            }
        };
        let frames = match pool {
            Some(pool) => {
                Self::process_parallel(pool, data.clone(), self.config.parallel_timeout).await
            }
            None => None,
        };
        let frames = match frames {
            Some(frames) => {
                self.stats.frames_processed += frames.len() as u64;
                frames
            }
            None => self.extractor.push(&data),
        };

        let count = frames.len();
        for frame in frames {
            self.emit_frame(frame);
        }
        count
    }

    /// Races the pool against the parallel timeout. `None` means the
    /// caller must fall back to the sequential path.
    async fn process_parallel(
        pool: WorkerPool,
        data: Bytes,
        timeout: Duration,
    ) -> Option<Vec<RawFrame>> {
        tokio::select! {
            result = pool.process_data(data) => match result {
                Ok(frames) => Some(frames),
                Err(err) => {
                    if !err.is_pool_destroyed() {
                        warn!(error = %err, "parallel extraction failed, falling back");
                    }
                    None
                }
            },
            _ = tokio::time::sleep(timeout) => {
                warn!(?timeout, "parallel extraction timed out, falling back");
                None
            }
        }
    }

    /// Feeds one transport notification into the supervisor.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::DataReceived(data) => {
                self.process_incoming_data(data).await;
            }
            TransportEvent::Error(err) => {
                self.record_error(&err.to_string());
            }
            TransportEvent::Connected if self.transport.is_some() => {
                self.set_state(ConnectionState::Connected)
            }
            TransportEvent::Connected => {}
            TransportEvent::Disconnected => self.set_state(ConnectionState::Disconnected),
        }
    }

    /// Waits for the next notification from the active transport.
    ///
    /// Pending forever while no session is open.
    pub async fn next_transport_event(&mut self) -> Option<TransportEvent> {
        let Some(events) = self.transport_events.as_mut() else {
            return std::future::pending().await;
        };
        let event = events.recv().await;
        if event.is_none() {
            self.transport_events = None;
        }
        event
    }

    /// Extracts the data events still queued from a closing transport.
    /// Other notifications are dropped with the session.
    async fn drain_final_data(&mut self) {
        while let Some(Ok(event)) = self.transport_events.as_mut().map(|rx| rx.try_recv()) {
            match event {
                TransportEvent::DataReceived(data) => {
                    self.process_incoming_data(data).await;
                }
                other => trace!(?other, "notification after close dropped"),
            }
        }
    }

    /// Handles every transport notification already queued.
    pub async fn pump_transport_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.transport_events.as_mut().map(|rx| rx.try_recv()) {
                Some(Ok(event)) => event,
                _ => break,
            };
            self.handle_transport_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Closes the session and opens it again with the same configuration.
    ///
    /// Only the resulting `Reconnecting -> Connected` transition counts as
    /// a reconnection.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let snapshot = self
            .connection_config()
            .cloned()
            .ok_or(SessionError::NothingToReconnect)?;

        if let Err(err) = self.disconnect().await {
            warn!(error = %err, "closing session before reconnect failed");
        }
        self.set_state(ConnectionState::Reconnecting);

        let (transport, events) = match self.create_transport(&snapshot) {
            Ok(created) => created,
            Err(err) => {
                self.set_state(ConnectionState::Error);
                self.events.emit(SessionEvent::Error(err.to_string()));
                return Err(err);
            }
        };
        self.open_transport(transport, events, snapshot).await
    }

    /// Retries [`reconnect`](Self::reconnect) with exponential backoff.
    pub async fn reconnect_with_policy(&mut self, policy: &ReconnectPolicy) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.reconnect().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= policy.max_attempts || !err.is_retryable() => {
                    return Err(err)
                }
                Err(err) => {
                    let delay = policy.delay_for(attempt);
                    warn!(attempt, ?delay, error = %err, "reconnect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Refreshes uptime and emits a statistics snapshot.
    pub fn tick_statistics(&mut self) -> CommunicationStats {
        self.drain_pool_events();
        if self.state.is_connected() {
            if let Some(at) = self.connected_at {
                self.stats.uptime = at.elapsed();
            }
        }
        let snapshot = self.statistics();
        self.events
            .emit(SessionEvent::StatisticsUpdated(snapshot.clone()));
        snapshot
    }

    pub fn statistics(&self) -> CommunicationStats {
        CommunicationStats {
            memory_usage: self.extractor.buffered() as u64,
            ..self.stats.clone()
        }
    }

    /// Zeroes all counters and restarts uptime.
    pub fn reset_statistics(&mut self) {
        self.stats.reset();
        if self.state.is_connected() {
            self.connected_at = Some(Instant::now());
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        CircuitState::from_errors(self.stats.errors)
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        let message = if paused {
            "data processing paused"
        } else {
            "data processing resumed"
        };
        self.events.emit(SessionEvent::Warning(message.to_string()));
    }

    /// Switches between the parallel and sequential paths. Enabling starts
    /// the pool if it does not exist yet; if that fails the supervisor
    /// stays sequential.
    pub fn set_threaded_extraction(&mut self, enabled: bool) -> Result<()> {
        if enabled && self.pool.is_none() && !self.destroyed {
            self.start_pool()?;
        }
        self.threaded = enabled;
        if let Some(pool) = &self.pool {
            pool.set_threaded_extraction(enabled);
        }
        let state = if enabled { "enabled" } else { "disabled" };
        self.events.emit(SessionEvent::Warning(format!(
            "threaded frame extraction {state}"
        )));
        Ok(())
    }

    /// Clears every worker's private buffer.
    pub async fn reset_workers(&mut self) -> Result<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };
        match pool.reset_workers().await {
            Ok(()) => {
                self.events
                    .emit(SessionEvent::Warning("workers reset".to_string()));
                Ok(())
            }
            Err(err) if err.is_pool_destroyed() => Ok(()),
            Err(err) => {
                self.events.emit(SessionEvent::Error(err.to_string()));
                Err(err.into())
            }
        }
    }

    pub fn worker_stats(&mut self) -> Option<PoolStats> {
        self.drain_pool_events();
        self.pool.as_ref().map(|pool| PoolStats {
            threaded_extraction: self.threaded,
            ..pool.stats()
        })
    }

    /// Stops the pool, closes the session and drops all subscribers.
    /// Idempotent.
    pub async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(pool) = self.pool.take() {
            pool.destroy();
        }
        self.pool_events = None;
        if let Err(err) = self.disconnect().await {
            debug!(error = %err, "disconnect during destroy failed");
        }
        self.events.clear();
        info!("supervisor destroyed");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed {
            Err(SessionError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn start_pool(&mut self) -> Result<()> {
        let pool_config = PoolConfig {
            threaded_extraction: true,
            frame_config: Some(self.extractor.config().clone()),
            ..self.config.pool.clone().unwrap_or_default()
        };
        let pool = WorkerPool::new(pool_config)?;
        self.pool_events = Some(pool.subscribe());
        self.pool = Some(pool);
        Ok(())
    }

    fn parallel_pool(&self) -> Option<WorkerPool> {
        if !self.threaded {
            return None;
        }
        self.pool.as_ref().filter(|p| !p.is_destroyed()).cloned()
    }

    fn create_transport(
        &self,
        config: &ConnectionConfig,
    ) -> Result<(Box<dyn Transport>, EventReceiver)> {
        let (tx, rx) = event_channel();
        let transport = self
            .factory
            .create(config, tx)
            .map_err(|err| SessionError::Configuration(err.to_string()))?;
        let validation = transport.validate_configuration();
        if !validation.valid {
            return Err(SessionError::Configuration(validation.errors.join("; ")));
        }
        Ok((transport, rx))
    }

    async fn open_transport(
        &mut self,
        mut transport: Box<dyn Transport>,
        events: EventReceiver,
        config: ConnectionConfig,
    ) -> Result<()> {
        let opened = transport.open().await;
        self.last_config = Some(config);
        match opened {
            Ok(()) => {
                info!(address = %transport.configuration().address, bus = %transport.configuration().bus, "connected");
                self.transport = Some(transport);
                self.transport_events = Some(events);
                self.connected_at = Some(Instant::now());
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                transport.destroy();
                self.set_state(ConnectionState::Error);
                Err(self.transport_failure(err))
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        let previous = self.state;
        self.state = state;
        if previous == ConnectionState::Reconnecting && state == ConnectionState::Connected {
            self.stats.reconnections += 1;
        }
        debug!(from = %previous, to = %state, "state changed");
        self.events.emit(SessionEvent::StateChanged(state));
    }

    fn emit_frame(&mut self, mut frame: RawFrame) {
        self.sequence += 1;
        frame.sequence = self.sequence;
        self.stats.frames_received += 1;
        self.events.emit(SessionEvent::FrameReceived(frame));
    }

    /// Records a transport failure and picks the error to return.
    fn transport_failure(&mut self, err: TransportError) -> SessionError {
        let message = err.to_string();
        if self.record_error(&message) {
            SessionError::Fatal(message)
        } else {
            SessionError::Transport(err)
        }
    }

    /// Counts an error and emits it. Fatal errors tear the session down;
    /// returns whether that happened.
    fn record_error(&mut self, message: &str) -> bool {
        self.stats.errors += 1;
        error!(error = message, errors = self.stats.errors, "session error");
        self.events.emit(SessionEvent::Error(message.to_string()));

        let fatal = self.stats.errors > self.config.fatal_error_threshold
            || self.config.is_fatal_message(message);
        if fatal {
            self.force_teardown();
        }
        fatal
    }

    fn force_teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.destroy();
            warn!(address = %transport.configuration().address, "session torn down after fatal error");
        }
        self.transport_events = None;
        self.extractor.reset();
        self.connected_at = None;
        self.set_state(ConnectionState::Error);
    }

    fn drain_pool_events(&mut self) {
        let Some(rx) = self.pool_events.as_mut() else {
            return;
        };
        let mut drained = Vec::new();
        while let Ok(event) = rx.try_recv() {
            drained.push(event);
        }
        for event in drained {
            match event {
                PoolEvent::Initialized { workers } => {
                    self.events.emit(SessionEvent::Warning(format!(
                        "initialized {workers} workers, threaded extraction: {}",
                        self.threaded
                    )));
                }
                PoolEvent::WorkerFailed { worker, message } => {
                    self.stats.errors += 1;
                    self.events
                        .emit(SessionEvent::Warning(format!("{worker} error: {message}")));
                }
                PoolEvent::WorkerReplaced { old, new } => {
                    debug!(%old, %new, "worker replaced");
                }
                // Already handled by the fallback in process_parallel.
                PoolEvent::ProcessingError { .. } => {}
            }
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.state)
            .field("threaded", &self.threaded)
            .field("paused", &self.paused)
            .field("buffered", &self.extractor.buffered())
            .finish()
    }
}
