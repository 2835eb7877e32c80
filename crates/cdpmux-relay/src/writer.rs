//! Per-socket serialised writer.
//!
//! Every socket gets one writer task fed by a bounded frame queue, so the
//! broker never blocks on a slow peer: senders use `try_send` and a full
//! queue is a terminal condition for the socket, not for the relay.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::mpsc;
use tracing::debug;

/// How long a closing socket gets to drain its queued frames.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Sender half of a socket's write queue.
#[derive(Clone)]
pub(crate) struct SocketSender {
    frames: mpsc::Sender<String>,
    close: mpsc::Sender<(u16, &'static str)>,
}

/// Receiver halves consumed by [`run_writer`].
pub(crate) struct WriterHalves {
    frames: mpsc::Receiver<String>,
    close: mpsc::Receiver<(u16, &'static str)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendError {
    /// The write queue is full; the peer is not keeping up.
    Full,
    /// The writer task is gone.
    Closed,
}

/// Create the queue pair for one socket.
pub(crate) fn socket_channel(capacity: usize) -> (SocketSender, WriterHalves) {
    let (frames_tx, frames_rx) = mpsc::channel(capacity);
    let (close_tx, close_rx) = mpsc::channel(1);
    (
        SocketSender {
            frames: frames_tx,
            close: close_tx,
        },
        WriterHalves {
            frames: frames_rx,
            close: close_rx,
        },
    )
}

impl SocketSender {
    /// Enqueue a frame without blocking.
    pub(crate) fn send(&self, frame: String) -> Result<(), SendError> {
        self.frames.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Request a close. Frames already queued are drained first; repeated
    /// close requests are ignored.
    pub(crate) fn close(&self, code: u16, reason: &'static str) {
        let _ = self.close.try_send((code, reason));
    }
}

#[cfg(test)]
impl WriterHalves {
    pub(crate) async fn recv_frame(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    pub(crate) fn try_recv_frame(&mut self) -> Option<String> {
        self.frames.try_recv().ok()
    }

    pub(crate) fn try_recv_close(&mut self) -> Option<(u16, &'static str)> {
        self.close.try_recv().ok()
    }
}

/// Writer task: forwards queued frames to the socket, and on a close
/// request drains the remaining queue before emitting the close frame.
pub(crate) async fn run_writer(mut sink: SplitSink<WebSocket, Message>, halves: WriterHalves) {
    let WriterHalves {
        mut frames,
        mut close,
    } = halves;

    let close_request = loop {
        tokio::select! {
            requested = close.recv() => break requested,
            frame = frames.recv() => match frame {
                Some(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                None => break None,
            },
        }
    };

    if let Some((code, reason)) = close_request {
        // Stop accepting new frames, flush what is already queued, then
        // close. The grace period bounds how long a dead peer can hold us.
        frames.close();
        let drain = async {
            while let Some(text) = frames.recv().await {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })))
                .await;
        };
        if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
            debug!(code, reason, "Socket close drain timed out");
        }
    }
}
