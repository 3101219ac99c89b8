//! Connection supervision for framelink.
//!
//! [`ConnectionSupervisor`] owns one transport session at a time, tracks the
//! connection state machine and turns inbound bytes into frames, either on
//! its own accumulator or through a [`framelink_worker::WorkerPool`] with a
//! timeout-guarded fallback. [`spawn`] runs a supervisor as a single task
//! and returns a cloneable [`SupervisorHandle`].

pub mod actor;
pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod stats;
pub mod supervisor;

pub use actor::{spawn, SupervisorHandle};
pub use config::{
    default_fatal_patterns, ReconnectPolicy, SupervisorConfig, DEFAULT_FATAL_ERROR_THRESHOLD,
    DEFAULT_PARALLEL_TIMEOUT, DEFAULT_STATISTICS_INTERVAL,
};
pub use error::{Result, SessionError};
pub use events::{EventBus, SessionEvent};
pub use state::ConnectionState;
pub use stats::{CircuitState, CommunicationStats, StatsFormat};
pub use supervisor::ConnectionSupervisor;
