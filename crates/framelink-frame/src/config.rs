use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// How frame boundaries are located in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameDetection {
    /// Frames end with `finish_sequence`.
    #[default]
    EndDelimiterOnly,
    /// Frames sit between `start_sequence` and `finish_sequence`.
    StartAndEndDelimiter,
    /// Frames begin with `start_sequence` and run up to the next one.
    StartDelimiterOnly,
    /// Every chunk is a frame.
    NoDelimiters,
}

impl fmt::Display for FrameDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameDetection::EndDelimiterOnly => "end-delimiter-only",
            FrameDetection::StartAndEndDelimiter => "start-and-end-delimiter",
            FrameDetection::StartDelimiterOnly => "start-delimiter-only",
            FrameDetection::NoDelimiters => "no-delimiters",
        };
        f.write_str(name)
    }
}

/// How downstream consumers should decode frame payloads.
///
/// Carried through untouched; decoding happens outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderMethod {
    #[default]
    PlainText,
    Hexadecimal,
    Base64,
    Binary,
}

/// Framing policy for one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Sequence that opens a frame. Default: empty.
    #[serde(default)]
    pub start_sequence: Bytes,
    /// Sequence that closes a frame. Default: `\n`.
    #[serde(default = "default_finish_sequence")]
    pub finish_sequence: Bytes,
    /// Boundary detection policy. Default: end delimiter only.
    #[serde(default)]
    pub frame_detection: FrameDetection,
    /// Checksum algorithm name. Opaque to the extractor. Default: `"none"`.
    #[serde(default = "default_checksum")]
    pub checksum_algorithm: String,
    /// Payload decoder. Opaque to the extractor.
    #[serde(default)]
    pub decoder_method: DecoderMethod,
}

fn default_finish_sequence() -> Bytes {
    Bytes::from_static(b"\n")
}

fn default_checksum() -> String {
    "none".to_string()
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            start_sequence: Bytes::new(),
            finish_sequence: default_finish_sequence(),
            frame_detection: FrameDetection::EndDelimiterOnly,
            checksum_algorithm: default_checksum(),
            decoder_method: DecoderMethod::PlainText,
        }
    }
}

impl FrameConfig {
    /// Frames terminated by `finish`.
    pub fn end_delimited(finish: impl Into<Bytes>) -> Self {
        Self {
            finish_sequence: finish.into(),
            frame_detection: FrameDetection::EndDelimiterOnly,
            ..Self::default()
        }
    }

    /// Frames enclosed by `start` and `finish`.
    pub fn start_end_delimited(start: impl Into<Bytes>, finish: impl Into<Bytes>) -> Self {
        Self {
            start_sequence: start.into(),
            finish_sequence: finish.into(),
            frame_detection: FrameDetection::StartAndEndDelimiter,
            ..Self::default()
        }
    }

    /// Frames introduced by `start`.
    pub fn start_delimited(start: impl Into<Bytes>) -> Self {
        Self {
            start_sequence: start.into(),
            finish_sequence: Bytes::new(),
            frame_detection: FrameDetection::StartDelimiterOnly,
            ..Self::default()
        }
    }

    /// Pass-through: every chunk becomes one frame.
    pub fn pass_through() -> Self {
        Self {
            frame_detection: FrameDetection::NoDelimiters,
            ..Self::default()
        }
    }

    /// Check that the delimiters required by the detection policy are present.
    pub fn validate(&self) -> Result<()> {
        let needs_start = matches!(
            self.frame_detection,
            FrameDetection::StartAndEndDelimiter | FrameDetection::StartDelimiterOnly
        );
        let needs_finish = matches!(
            self.frame_detection,
            FrameDetection::StartAndEndDelimiter | FrameDetection::EndDelimiterOnly
        );

        if needs_start && self.start_sequence.is_empty() {
            return Err(FrameError::MissingDelimiter {
                detection: self.frame_detection,
                delimiter: "start",
            });
        }
        if needs_finish && self.finish_sequence.is_empty() {
            return Err(FrameError::MissingDelimiter {
                detection: self.frame_detection,
                delimiter: "finish",
            });
        }
        Ok(())
    }

    /// Return a copy with `update` merged in.
    pub fn merged(&self, update: FrameConfigUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update);
        next
    }

    /// Merge a partial update in place.
    pub fn apply(&mut self, update: FrameConfigUpdate) {
        if let Some(start) = update.start_sequence {
            self.start_sequence = start;
        }
        if let Some(finish) = update.finish_sequence {
            self.finish_sequence = finish;
        }
        if let Some(detection) = update.frame_detection {
            self.frame_detection = detection;
        }
        if let Some(checksum) = update.checksum_algorithm {
            self.checksum_algorithm = checksum;
        }
        if let Some(decoder) = update.decoder_method {
            self.decoder_method = decoder;
        }
    }
}

/// Partial [`FrameConfig`]; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sequence: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_sequence: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_detection: Option<FrameDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder_method: Option<DecoderMethod>,
}

impl From<FrameConfig> for FrameConfigUpdate {
    fn from(config: FrameConfig) -> Self {
        Self {
            start_sequence: Some(config.start_sequence),
            finish_sequence: Some(config.finish_sequence),
            frame_detection: Some(config.frame_detection),
            checksum_algorithm: Some(config.checksum_algorithm),
            decoder_method: Some(config.decoder_method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_newline_terminated() {
        let config = FrameConfig::default();
        assert_eq!(config.finish_sequence.as_ref(), b"\n");
        assert_eq!(config.frame_detection, FrameDetection::EndDelimiterOnly);
        assert_eq!(config.checksum_algorithm, "none");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_requires_policy_delimiters() {
        let mut config = FrameConfig::start_end_delimited(Bytes::from_static(b"\x02"), Bytes::new());
        assert!(matches!(
            config.validate(),
            Err(FrameError::MissingDelimiter {
                delimiter: "finish",
                ..
            })
        ));

        config.frame_detection = FrameDetection::StartDelimiterOnly;
        assert!(config.validate().is_ok());

        config.start_sequence = Bytes::new();
        assert!(matches!(
            config.validate(),
            Err(FrameError::MissingDelimiter {
                delimiter: "start",
                ..
            })
        ));

        config.frame_detection = FrameDetection::NoDelimiters;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_update_keeps_untouched_fields() {
        let config = FrameConfig::default();
        let next = config.merged(FrameConfigUpdate {
            frame_detection: Some(FrameDetection::StartDelimiterOnly),
            start_sequence: Some(Bytes::from_static(b"$")),
            ..FrameConfigUpdate::default()
        });

        assert_eq!(next.frame_detection, FrameDetection::StartDelimiterOnly);
        assert_eq!(next.start_sequence.as_ref(), b"$");
        assert_eq!(next.finish_sequence, config.finish_sequence);
        assert_eq!(next.decoder_method, DecoderMethod::PlainText);
    }

    #[test]
    fn json_config_fills_defaults() {
        let config: FrameConfig =
            serde_json::from_str(r#"{"frame_detection":"no_delimiters"}"#).unwrap();
        assert_eq!(config.frame_detection, FrameDetection::NoDelimiters);
        assert_eq!(config.finish_sequence.as_ref(), b"\n");
        assert_eq!(config.checksum_algorithm, "none");
    }
}
