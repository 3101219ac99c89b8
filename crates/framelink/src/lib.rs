//! Frame extraction and connection supervision for byte streams.
//!
//! framelink turns the raw bytes of a serial, network or wireless link into
//! delimiter-bounded frames, optionally parsing them on a pool of worker
//! threads, and supervises the connection that produces them.
//!
//! # Crate Structure
//!
//! - [`transport`]: Transport contract, read aggregation, in-memory transport
//! - [`frame`]: Delimiter-based frame extraction
//! - [`worker`]: Worker-thread pool for parallel extraction
//! - [`session`]: Connection supervisor, statistics and events

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export worker pool types.
pub mod worker {
    pub use framelink_worker::*;
}

/// Re-export supervisor types.
pub mod session {
    pub use framelink_session::*;
}
