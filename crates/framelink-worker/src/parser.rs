use std::sync::Arc;

use bytes::Bytes;
use framelink_frame::{FrameConfig, FrameExtractor, RawFrame};

use crate::error::ParseError;
use crate::message::BufferStats;

/// Turns byte chunks into frames inside a worker thread.
///
/// Each worker owns its parser exclusively, so implementations need no
/// internal synchronization. A panic inside a parser is treated as a worker
/// failure: the worker is torn down and replaced.
pub trait FrameParser: Send {
    fn configure(&mut self, config: FrameConfig) -> Result<(), ParseError>;

    fn process(&mut self, data: Bytes) -> Result<Vec<RawFrame>, ParseError>;

    fn reset(&mut self);

    fn stats(&self) -> BufferStats;
}

/// Builds one parser per worker.
pub type ParserFactory = Arc<dyn Fn() -> Box<dyn FrameParser> + Send + Sync>;

/// Default parser backed by a worker-private [`FrameExtractor`].
#[derive(Debug, Default)]
pub struct ExtractorParser {
    extractor: FrameExtractor,
}

impl ExtractorParser {
    pub fn factory() -> ParserFactory {
        Arc::new(|| Box::new(ExtractorParser::default()) as Box<dyn FrameParser>)
    }
}

impl FrameParser for ExtractorParser {
    fn configure(&mut self, config: FrameConfig) -> Result<(), ParseError> {
        self.extractor.set_config(config)?;
        Ok(())
    }

    fn process(&mut self, data: Bytes) -> Result<Vec<RawFrame>, ParseError> {
        Ok(self.extractor.push(&data))
    }

    fn reset(&mut self) {
        self.extractor.reset();
    }

    fn stats(&self) -> BufferStats {
        BufferStats {
            buffered: self.extractor.buffered(),
            frames_emitted: self.extractor.sequence(),
        }
    }
}
