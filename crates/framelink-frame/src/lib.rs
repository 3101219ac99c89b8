//! Frame extraction for continuous byte streams.
//!
//! Bytes arrive in arbitrary chunks; a [`FrameExtractor`] accumulates them
//! and splits out application frames according to one of four
//! [`FrameDetection`] policies:
//! - end delimiter only (`line\n`)
//! - start and end delimiter (`\x02payload\x03`)
//! - start delimiter only (`$a$b`)
//! - no delimiters (pass-through)
//!
//! Delimiters are never part of an emitted frame and empty frames are never
//! emitted. The extractor does no I/O and holds no locks.

pub mod config;
pub mod error;
pub mod extractor;
pub mod frame;

pub use config::{DecoderMethod, FrameConfig, FrameConfigUpdate, FrameDetection};
pub use error::{FrameError, Result};
pub use extractor::FrameExtractor;
pub use frame::RawFrame;
