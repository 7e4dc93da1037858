// crates/autoflow-runtime/tests/channel_test.rs

use autoflow_core::{ChannelError, Command};
use autoflow_runtime::{bounded, control_channel};
use std::time::{Duration, Instant};

#[test]
fn test_try_put_reports_full_at_capacity() {
    let (tx, mut rx) = bounded::<u32>(2, Duration::ZERO);

    assert_eq!(tx.try_put(1), Ok(()));
    assert_eq!(tx.try_put(2), Ok(()));
    assert_eq!(tx.try_put(3), Err(ChannelError::Full));
    assert_eq!(tx.capacity(), 0);

    // FIFO, and the rejected message was never queued.
    assert_eq!(rx.drain(), vec![1, 2]);
    assert_eq!(tx.try_put(4), Ok(()));
}

#[tokio::test]
async fn test_timed_put_gives_up_after_timeout() {
    let (tx, mut rx) = bounded::<u32>(1, Duration::from_millis(20));
    tx.put(1).await.unwrap();

    let started = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(2), tx.put(2))
        .await
        .expect("timed put blocked past its timeout");
    assert_eq!(result, Err(ChannelError::Timeout));
    assert!(started.elapsed() >= Duration::from_millis(20));

    assert_eq!(rx.get().await, Some(1));
    assert_eq!(rx.try_get(), Ok(None));
}

#[tokio::test]
async fn test_timed_put_succeeds_once_space_frees() {
    let (tx, mut rx) = bounded::<u32>(1, Duration::from_secs(2));
    tx.put(1).await.unwrap();

    let consumer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first = rx.get().await;
        let second = rx.get().await;
        (first, second)
    });

    assert_eq!(tx.put(2).await, Ok(()));
    assert_eq!(consumer.await.unwrap(), (Some(1), Some(2)));
}

#[tokio::test]
async fn test_put_after_receiver_dropped_is_closed() {
    let (tx, rx) = bounded::<u32>(4, Duration::from_millis(20));
    drop(rx);

    assert!(tx.is_closed());
    assert_eq!(tx.try_put(1), Err(ChannelError::Closed));
    assert_eq!(tx.put(1).await, Err(ChannelError::Closed));
}

#[test]
fn test_command_queue_is_bounded_too() {
    let (mut endpoint, supervisor) = control_channel(1, Duration::ZERO);

    supervisor.send(Command::Pause).unwrap();
    assert_eq!(supervisor.send(Command::Resume), Err(ChannelError::Full));

    let queued = endpoint.commands.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].command, Command::Pause);
}
