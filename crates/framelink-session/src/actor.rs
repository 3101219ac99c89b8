//! Runs a [`ConnectionSupervisor`] in its own task.
//!
//! The task owns the supervisor and is the only place its state changes.
//! It multiplexes three sources with `tokio::select!`: commands from
//! [`SupervisorHandle`]s, notifications from the active transport, and the
//! statistics interval.

use bytes::Bytes;
use framelink_frame::FrameConfigUpdate;
use framelink_transport::ConnectionConfig;
use framelink_worker::PoolStats;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ReconnectPolicy;
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::state::ConnectionState;
use crate::stats::{CircuitState, CommunicationStats};
use crate::supervisor::ConnectionSupervisor;

enum Command {
    Connect {
        config: ConnectionConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Write {
        data: Bytes,
        reply: oneshot::Sender<Result<usize>>,
    },
    UpdateFrameConfig {
        update: FrameConfigUpdate,
        reply: oneshot::Sender<Result<()>>,
    },
    ProcessData {
        data: Bytes,
        reply: oneshot::Sender<usize>,
    },
    Reconnect {
        policy: Option<ReconnectPolicy>,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        reply: oneshot::Sender<mpsc::UnboundedReceiver<SessionEvent>>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
    Statistics {
        reply: oneshot::Sender<CommunicationStats>,
    },
    ResetStatistics,
    Circuit {
        reply: oneshot::Sender<CircuitState>,
    },
    SetPaused(bool),
    SetThreadedExtraction(bool),
    ResetWorkers {
        reply: oneshot::Sender<Result<()>>,
    },
    WorkerStats {
        reply: oneshot::Sender<Option<PoolStats>>,
    },
}

/// Cloneable handle to a supervisor task started by [`spawn`].
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

/// Moves `supervisor` into a new task and returns a handle to it.
///
/// Returns the handle and the task's join handle; the task ends after
/// [`SupervisorHandle::shutdown`] or once every handle is dropped, and
/// destroys the supervisor on the way out.
pub fn spawn(supervisor: ConnectionSupervisor) -> (SupervisorHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(supervisor, rx, cancel.clone()));
    (SupervisorHandle { commands, cancel }, task)
}

async fn run(
    mut supervisor: ConnectionSupervisor,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(supervisor.config().statistics_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("supervisor task cancelled");
                break;
            }
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut supervisor, command).await,
                None => {
                    debug!("all supervisor handles dropped");
                    break;
                }
            },
            Some(event) = supervisor.next_transport_event() => {
                supervisor.handle_transport_event(event).await;
            }
            _ = ticker.tick() => {
                supervisor.tick_statistics();
            }
        }
    }

    supervisor.destroy().await;
}

async fn dispatch(supervisor: &mut ConnectionSupervisor, command: Command) {
    match command {
        Command::Connect { config, reply } => {
            let _ = reply.send(supervisor.connect(config).await);
        }
        Command::Disconnect { reply } => {
            let _ = reply.send(supervisor.disconnect().await);
        }
        Command::Write { data, reply } => {
            let _ = reply.send(supervisor.write_data(&data).await);
        }
        Command::UpdateFrameConfig { update, reply } => {
            let _ = reply.send(supervisor.update_frame_config(update).await);
        }
        Command::ProcessData { data, reply } => {
            let _ = reply.send(supervisor.process_incoming_data(data).await);
        }
        Command::Reconnect { policy, reply } => {
            let result = match policy {
                Some(policy) => supervisor.reconnect_with_policy(&policy).await,
                None => supervisor.reconnect().await,
            };
            let _ = reply.send(result);
        }
        Command::Subscribe { reply } => {
            let _ = reply.send(supervisor.subscribe());
        }
        Command::State { reply } => {
            let _ = reply.send(supervisor.state());
        }
        Command::Statistics { reply } => {
            let _ = reply.send(supervisor.statistics());
        }
        Command::ResetStatistics => supervisor.reset_statistics(),
        Command::Circuit { reply } => {
            let _ = reply.send(supervisor.circuit_state());
        }
        Command::SetPaused(paused) => supervisor.set_paused(paused),
        Command::SetThreadedExtraction(enabled) => {
            if let Err(err) = supervisor.set_threaded_extraction(enabled) {
                warn!(error = %err, "threaded extraction unavailable");
            }
        }
        Command::ResetWorkers { reply } => {
            let _ = reply.send(supervisor.reset_workers().await);
        }
        Command::WorkerStats { reply } => {
            let _ = reply.send(supervisor.worker_stats());
        }
    }
}

impl SupervisorHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| SessionError::Destroyed)?;
        rx.await.map_err(|_| SessionError::Destroyed)
    }

    fn notify(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Destroyed)
    }

    pub async fn connect(&self, config: ConnectionConfig) -> Result<()> {
        self.request(|reply| Command::Connect { config, reply })
            .await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await?
    }

    pub async fn write_data(&self, data: impl Into<Bytes>) -> Result<usize> {
        let data = data.into();
        self.request(|reply| Command::Write { data, reply }).await?
    }

    pub async fn update_frame_config(&self, update: FrameConfigUpdate) -> Result<()> {
        self.request(|reply| Command::UpdateFrameConfig { update, reply })
            .await?
    }

    /// Feeds bytes as if they arrived from the transport.
    pub async fn process_incoming_data(&self, data: impl Into<Bytes>) -> Result<usize> {
        let data = data.into();
        self.request(|reply| Command::ProcessData { data, reply })
            .await
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.request(|reply| Command::Reconnect {
            policy: None,
            reply,
        })
        .await?
    }

    pub async fn reconnect_with_policy(&self, policy: ReconnectPolicy) -> Result<()> {
        self.request(|reply| Command::Reconnect {
            policy: Some(policy),
            reply,
        })
        .await?
    }

    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<SessionEvent>> {
        self.request(|reply| Command::Subscribe { reply }).await
    }

    pub async fn state(&self) -> Result<ConnectionState> {
        self.request(|reply| Command::State { reply }).await
    }

    pub async fn statistics(&self) -> Result<CommunicationStats> {
        self.request(|reply| Command::Statistics { reply }).await
    }

    pub fn reset_statistics(&self) -> Result<()> {
        self.notify(Command::ResetStatistics)
    }

    pub async fn circuit_state(&self) -> Result<CircuitState> {
        self.request(|reply| Command::Circuit { reply }).await
    }

    pub fn set_paused(&self, paused: bool) -> Result<()> {
        self.notify(Command::SetPaused(paused))
    }

    pub fn set_threaded_extraction(&self, enabled: bool) -> Result<()> {
        self.notify(Command::SetThreadedExtraction(enabled))
    }

    pub async fn reset_workers(&self) -> Result<()> {
        self.request(|reply| Command::ResetWorkers { reply }).await?
    }

    pub async fn worker_stats(&self) -> Result<Option<PoolStats>> {
        self.request(|reply| Command::WorkerStats { reply }).await
    }

    /// Stops the task. The supervisor is destroyed before it exits.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }
}
