use framelink_frame::FrameExtractor;
use tracing::debug;

use crate::cmd::{read_input, ExtractArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frames, OutputFormat};

pub fn run(args: ExtractArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.framing.frame_config()?;
    let data = read_input(&args.input)?;
    let mut extractor =
        FrameExtractor::new(config).map_err(|err| frame_error("extractor setup failed", err))?;

    let mut frames = Vec::new();
    for chunk in data.chunks(args.chunk_size as usize) {
        frames.extend(extractor.push(chunk));
    }
    if args.flush {
        frames.extend(extractor.finish());
    }
    debug!(
        bytes = data.len(),
        frames = frames.len(),
        retained = extractor.buffered(),
        "extraction finished"
    );

    print_frames(&frames, format);
    Ok(SUCCESS)
}
