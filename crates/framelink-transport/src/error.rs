use crate::config::BusType;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device or socket at the configured address.
    #[error("failed to open {address}: {source}")]
    Open {
        address: String,
        source: std::io::Error,
    },

    /// The transport is not open.
    #[error("transport is not open")]
    NotOpen,

    /// The transport does not accept writes.
    #[error("transport is not writable")]
    NotWritable,

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection configuration was rejected.
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    /// No driver is available for the requested bus.
    #[error("unsupported bus type: {0}")]
    Unsupported(BusType),

    /// The transport has been destroyed.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Build an I/O error from a plain message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(message.into()))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
