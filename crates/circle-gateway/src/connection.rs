use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::{ConnectionHandle, ConnectionHub, QUEUE_CAPACITY};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Longest a single socket write may stall before the connection is dropped.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive an upgraded, already-authenticated connection until it closes.
///
/// The identity is registered with the hub for as long as the connection is
/// open. Inbound frames are only read to notice liveness; the first read
/// error or close ends the session and removes the entry.
pub async fn handle_connection(
    socket: WebSocket,
    hub: ConnectionHub,
    identity: String,
    write_timeout: Duration,
) {
    let (sender, receiver) = socket.split();

    let (handle, queue) = ConnectionHandle::new(QUEUE_CAPACITY);
    let conn_id = handle.id();
    hub.register(&identity, handle).await;
    info!("{} connected ({})", identity, conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));

    let mut send_task = tokio::spawn(write_loop(
        sender,
        queue,
        write_timeout,
        pong_received.clone(),
    ));
    let mut recv_task = tokio::spawn(read_loop(receiver, pong_received));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister_connection(&identity, conn_id).await;
    info!("{} disconnected ({})", identity, conn_id);
}

/// Forward queued frames to the socket and keep the heartbeat going.
///
/// Returns when the hub drops the queue (a Close frame is sent first), a
/// write fails or stalls past `write_timeout`, or pongs stop arriving.
async fn write_loop<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<String>,
    write_timeout: Duration,
    pong_received: Arc<AtomicBool>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        let frame = tokio::select! {
            next = queue.recv() => match next {
                Some(text) => Message::Text(text.into()),
                None => {
                    debug!("Outbound queue closed, closing socket");
                    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        return;
                    }
                }
                Message::Ping(vec![].into())
            }
        };

        match tokio::time::timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Socket write failed: {}", e);
                return;
            }
            Err(_) => {
                warn!("Socket write stalled for {:?}, dropping connection", write_timeout);
                return;
            }
        }
    }
}

/// Consume inbound frames until the peer closes or errors. Content is ignored.
async fn read_loop<R, E>(mut receiver: R, pong_received: Arc<AtomicBool>)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Pong(_) => pong_received.store(true, Ordering::Release),
            Message::Close(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Records every frame it is given.
    #[derive(Default)]
    struct Recording(Vec<Message>);

    impl Sink<Message> for Recording {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Infallible> {
            self.0.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    /// A sink that never accepts a frame.
    struct Stalled;

    impl Sink<Message> for Stalled {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Infallible> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn queued_frames_are_written_in_order_then_closed() {
        let (tx, rx) = mpsc::channel(8);
        tx.send("one".to_string()).await.unwrap();
        tx.send("two".to_string()).await.unwrap();
        drop(tx);

        let mut written = Recording::default();
        write_loop(
            &mut written,
            rx,
            DEFAULT_WRITE_TIMEOUT,
            Arc::new(AtomicBool::new(true)),
        )
        .await;

        assert_eq!(
            written.0,
            vec![
                Message::Text("one".into()),
                Message::Text("two".into()),
                Message::Close(None),
            ]
        );
    }

    #[tokio::test]
    async fn stalled_write_ends_the_connection() {
        let (tx, rx) = mpsc::channel(8);
        tx.send("stuck".to_string()).await.unwrap();

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            write_loop(
                Stalled,
                rx,
                Duration::from_millis(50),
                Arc::new(AtomicBool::new(true)),
            ),
        )
        .await;
        assert!(finished.is_ok());
        drop(tx);
    }

    #[tokio::test]
    async fn read_loop_ends_on_error_and_records_pongs() {
        let pong = Arc::new(AtomicBool::new(false));
        let frames = futures_util::stream::iter(vec![
            Ok(Message::Text("ignored".into())),
            Ok(Message::Pong(vec![].into())),
            Err("reset by peer"),
            Ok(Message::Text("never read".into())),
        ]);

        read_loop(frames, pong.clone()).await;
        assert!(pong.load(Ordering::Acquire));
    }
}
