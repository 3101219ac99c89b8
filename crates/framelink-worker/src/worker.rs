//! Worker thread body.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use framelink_frame::FrameConfig;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::message::{RequestKind, ResponseKind, WorkerId, WorkerRequest, WorkerResponse};
use crate::parser::{FrameParser, ParserFactory};

/// Sent from worker threads to the pool's event pump.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Response {
        worker: WorkerId,
        response: WorkerResponse,
    },
    /// The parser panicked while being built or used; the thread is exiting.
    Failed { worker: WorkerId, message: String },
    /// The thread has exited. Code 0 on a clean stop.
    Exited { worker: WorkerId, code: i32 },
}

pub(crate) struct WorkerThread {
    pub requests: mpsc::UnboundedSender<WorkerRequest>,
    pub handle: JoinHandle<()>,
}

pub(crate) fn spawn(
    id: WorkerId,
    factory: &ParserFactory,
    initial: Option<FrameConfig>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> std::io::Result<WorkerThread> {
    let (requests, rx) = mpsc::unbounded_channel();
    let factory = factory.clone();
    let handle = thread::Builder::new()
        .name(id.to_string())
        .spawn(move || run(id, &factory, initial, rx, events))?;
    Ok(WorkerThread { requests, handle })
}

/// Reports the exit code when the thread body returns.
struct ExitGuard {
    worker: WorkerId,
    code: i32,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.events.send(WorkerEvent::Exited {
            worker: self.worker,
            code: self.code,
        });
    }
}

fn run(
    id: WorkerId,
    factory: &ParserFactory,
    initial: Option<FrameConfig>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut guard = ExitGuard {
        worker: id,
        code: 0,
        events: events.clone(),
    };

    let mut parser = match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
        Ok(parser) => parser,
        Err(payload) => {
            guard.code = 1;
            let message = panic_message(payload.as_ref());
            let _ = events.send(WorkerEvent::Failed {
                worker: id,
                message: format!("parser construction failed: {message}"),
            });
            return;
        }
    };

    if let Some(config) = initial {
        if let Err(err) = parser.configure(config) {
            warn!(worker = %id, error = %err, "initial configuration rejected");
        }
    }

    // Channel closes when the pool drops this worker.
    while let Some(request) = requests.blocking_recv() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| handle(&mut *parser, request.kind)));
        match result {
            Ok(kind) => {
                let response = WorkerResponse {
                    id: request.id,
                    kind,
                };
                if events
                    .send(WorkerEvent::Response {
                        worker: id,
                        response,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(payload) => {
                guard.code = 1;
                let _ = events.send(WorkerEvent::Failed {
                    worker: id,
                    message: panic_message(payload.as_ref()),
                });
                return;
            }
        }
    }
    debug!(worker = %id, "worker stopped");
}

fn handle(parser: &mut dyn FrameParser, kind: RequestKind) -> ResponseKind {
    match kind {
        RequestKind::Configure(config) => match parser.configure(config) {
            Ok(()) => ResponseKind::Configured,
            Err(err) => ResponseKind::Error(err.to_string()),
        },
        RequestKind::ProcessData(data) => match parser.process(data) {
            Ok(frames) => ResponseKind::FrameProcessed(frames),
            Err(err) => ResponseKind::Error(err.to_string()),
        },
        RequestKind::Reset => {
            parser.reset();
            ResponseKind::Reset
        }
        RequestKind::GetStats => ResponseKind::Stats(parser.stats()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
