use std::sync::Arc;
use std::time::Duration;

use framelink_session::{
    spawn, ConnectionState, ConnectionSupervisor, SessionError, SessionEvent, SupervisorConfig,
};
use framelink_transport::{ConnectionConfig, MemoryHandle, MemoryTransportFactory};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

fn supervisor(interval: Duration) -> (ConnectionSupervisor, MemoryHandle) {
    let factory = MemoryTransportFactory::new();
    let handle = factory.handle();
    let config = SupervisorConfig::sequential().with_statistics_interval(interval);
    let supervisor = ConnectionSupervisor::new(Arc::new(factory), config).unwrap();
    (supervisor, handle)
}

async fn next_frame(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<u8> {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("event bus closed");
        if let SessionEvent::FrameReceived(frame) = event {
            return frame.data.to_vec();
        }
    }
}

#[tokio::test]
async fn transport_data_reaches_subscribers() {
    let (supervisor, memory) = supervisor(Duration::from_secs(60));
    let (handle, task) = spawn(supervisor);
    let mut rx = handle.subscribe().await.unwrap();

    handle
        .connect(ConnectionConfig::memory("mem://actor"))
        .await
        .unwrap();
    assert_eq!(handle.state().await.unwrap(), ConnectionState::Connected);

    assert!(memory.deliver(b"hello\nworld\n"));
    assert_eq!(next_frame(&mut rx).await, b"hello");
    assert_eq!(next_frame(&mut rx).await, b"world");

    assert_eq!(handle.write_data(&b"ping"[..]).await.unwrap(), 4);
    let stats = handle.statistics().await.unwrap();
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.bytes_sent, 4);

    handle.shutdown();
    task.await.unwrap();
    assert_eq!(memory.destroy_count(), 1);
}

#[tokio::test]
async fn commands_after_shutdown_fail() {
    let (supervisor, _memory) = supervisor(Duration::from_secs(60));
    let (handle, task) = spawn(supervisor);

    handle.shutdown();
    task.await.unwrap();

    assert!(handle.is_shutdown());
    assert!(matches!(
        handle.connect(ConnectionConfig::memory("mem://actor")).await,
        Err(SessionError::Destroyed)
    ));
    assert!(matches!(handle.set_paused(true), Err(SessionError::Destroyed)));
}

#[tokio::test]
async fn dropping_every_handle_stops_the_task() {
    let (supervisor, memory) = supervisor(Duration::from_secs(60));
    let (handle, task) = spawn(supervisor);
    handle
        .connect(ConnectionConfig::memory("mem://actor"))
        .await
        .unwrap();

    drop(handle);
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    assert_eq!(memory.close_count(), 1);
}

#[tokio::test]
async fn statistics_are_published_periodically() {
    let (supervisor, _memory) = supervisor(Duration::from_millis(20));
    let (handle, task) = spawn(supervisor);
    let mut rx = handle.subscribe().await.unwrap();

    let update = timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Some(SessionEvent::StatisticsUpdated(stats)) => return Some(stats),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .unwrap();
    assert!(update.is_some());

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn handle_reports_configuration_errors() {
    let (supervisor, _memory) = supervisor(Duration::from_secs(60));
    let (handle, task) = spawn(supervisor);

    let err = handle
        .connect(ConnectionConfig::memory(""))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Configuration(_)));
    assert!(matches!(
        handle.reconnect().await,
        Err(SessionError::NothingToReconnect)
    ));
    assert_eq!(handle.state().await.unwrap(), ConnectionState::Disconnected);

    handle.shutdown();
    task.await.unwrap();
}
