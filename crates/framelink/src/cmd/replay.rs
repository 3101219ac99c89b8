use std::sync::Arc;
use std::time::Duration;

use framelink_frame::FrameConfig;
use framelink_session::{ConnectionSupervisor, SessionEvent, SupervisorConfig};
use framelink_transport::{ConnectionConfig, MemoryTransportFactory};
use framelink_worker::PoolConfig;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, warn};

use crate::cmd::{read_input, usage_error, ReplayArgs};
use crate::exit::{io_error, session_error, CliResult, SUCCESS};
use crate::output::{print_frames, print_worker_stats, OutputFormat};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    if args.workers.is_some() && !args.threaded {
        return Err(usage_error("--workers requires --threaded"));
    }
    let frame_config = args.framing.frame_config()?;
    let data = read_input(&args.input)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(replay(args, frame_config, data, format))
}

async fn replay(
    args: ReplayArgs,
    frame_config: FrameConfig,
    data: Vec<u8>,
    format: OutputFormat,
) -> CliResult<i32> {
    let factory = MemoryTransportFactory::new();
    let memory = factory.handle();

    let mut config = SupervisorConfig {
        threaded_extraction: args.threaded,
        ..SupervisorConfig::default()
    }
    .with_frame_config(frame_config);
    if let Some(workers) = args.workers {
        config = config.with_pool(PoolConfig::default().with_workers(workers));
    }
    if let Some(ms) = args.parallel_timeout {
        config = config.with_parallel_timeout(Duration::from_millis(ms));
    }

    let mut supervisor = ConnectionSupervisor::new(Arc::new(factory), config)
        .map_err(|err| session_error("supervisor setup failed", err))?;
    let mut events = supervisor.subscribe();
    supervisor
        .connect(ConnectionConfig::memory("replay"))
        .await
        .map_err(|err| session_error("connect failed", err))?;

    for chunk in data.chunks(args.chunk_size as usize) {
        if !memory.deliver(chunk) {
            warn!("transport closed before end of input");
            break;
        }
        supervisor.pump_transport_events().await;
    }

    let stats = supervisor.tick_statistics();
    let worker_stats = supervisor.worker_stats();
    let frames = collect_frames(&mut events);
    debug!(frames = frames.len(), state = %supervisor.state(), "replay finished");

    print_frames(&frames, format);
    println!("{}", stats.export(args.stats_format.into()).trim_end());
    if args.worker_stats {
        if let Some(worker_stats) = &worker_stats {
            print_worker_stats(worker_stats, format);
        }
    }

    supervisor.destroy().await;
    Ok(SUCCESS)
}

/// Drains queued events, logging warnings and errors along the way.
fn collect_frames(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<framelink_frame::RawFrame> {
    let mut frames = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::FrameReceived(frame) => frames.push(frame),
            SessionEvent::Warning(message) => warn!(%message, "supervisor warning"),
            SessionEvent::Error(message) => error!(%message, "supervisor error"),
            _ => {}
        }
    }
    frames
}
