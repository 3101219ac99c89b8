use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregator::DEFAULT_BUFFER_SIZE;

/// The physical or logical bus a transport talks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusType {
    Uart,
    Network,
    BluetoothLe,
    Memory,
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusType::Uart => "uart",
            BusType::Network => "network",
            BusType::BluetoothLe => "bluetooth_le",
            BusType::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Typed connection configuration handed to a [`TransportFactory`](crate::TransportFactory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Bus the driver should use.
    pub bus: BusType,
    /// Device path, host:port or peripheral id, depending on the bus.
    pub address: String,
    /// Driver-specific settings (baud rate, protocol, service UUID, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
    /// Read aggregation buffer size in bytes. Default: 8 KiB.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl ConnectionConfig {
    /// Create a configuration with no driver options.
    pub fn new(bus: BusType, address: impl Into<String>) -> Self {
        Self {
            bus,
            address: address.into(),
            options: BTreeMap::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Configuration for the in-memory transport.
    pub fn memory(address: impl Into<String>) -> Self {
        Self::new(BusType::Memory, address)
    }

    /// Attach a driver option.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Override the read aggregation buffer size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Checks shared by every driver.
    pub fn validate_common(&self) -> ConfigValidation {
        let mut errors = Vec::new();
        if self.address.trim().is_empty() {
            errors.push("address must not be empty".to_string());
        }
        if self.buffer_size == 0 {
            errors.push("buffer_size must be greater than zero".to_string());
        }
        ConfigValidation::from_errors(errors)
    }
}

/// Outcome of a configuration check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}
