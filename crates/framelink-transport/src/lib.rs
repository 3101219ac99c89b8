//! Transport contract for framelink.
//!
//! Concrete serial, network and wireless drivers live outside this workspace.
//! They plug in by implementing [`Transport`] and are handed to the session
//! layer through an injected [`TransportFactory`]:
//! - [`Transport`]: open/close/write plus readiness queries
//! - [`TransportEvent`]: inbound data, errors and link changes
//! - [`ReadAggregator`]: coalesces small, frequent reads before forwarding
//! - [`MemoryTransport`]: in-process transport for tests and replay tooling

pub mod aggregator;
pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

pub use aggregator::{ReadAggregator, DEFAULT_BUFFER_SIZE, FLUSH_RATIO};
pub use config::{BusType, ConfigValidation, ConnectionConfig};
pub use error::{Result, TransportError};
pub use memory::{MemoryHandle, MemoryTransport, MemoryTransportFactory};
pub use traits::{event_channel, EventReceiver, EventSender, Transport, TransportEvent, TransportFactory};
