//! Per-connection outbound queue
//!
//! All frames for one connection funnel through a single bounded channel
//! drained by one writer task, so replies are never interleaved and every
//! sender shares the same backpressure policy: a client that cannot keep up
//! overflows the queue and is closed with policy-violation instead of
//! buffering without bound.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::frames::ServerFrame;

/// Item queued for the writer task
#[derive(Debug)]
pub enum Outgoing {
    Frame(ServerFrame),
    Pong(Vec<u8>),
}

/// Sending half of a connection's outbound queue
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outgoing>,
    overflow: Arc<watch::Sender<bool>>,
}

impl Outbox {
    /// Create a queue with the given high-water mark
    ///
    /// Returns the sender, the receiver for the writer task, and a watch that
    /// flips to `true` when the queue overflows.
    pub fn channel(
        capacity: usize,
    ) -> (Outbox, mpsc::Receiver<Outgoing>, watch::Receiver<bool>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (overflow_tx, overflow_rx) = watch::channel(false);
        (
            Outbox {
                tx,
                overflow: Arc::new(overflow_tx),
            },
            rx,
            overflow_rx,
        )
    }

    /// Queue a reply frame
    pub fn send(&self, frame: ServerFrame) {
        self.push(Outgoing::Frame(frame));
    }

    /// Queue a pong for a client ping
    pub fn pong(&self, payload: Vec<u8>) {
        self.push(Outgoing::Pong(payload));
    }

    fn push(&self, item: Outgoing) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.overflow.send(true);
            }
            // The connection is already gone; nothing left to deliver to.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_drain_in_order() {
        let (outbox, mut rx, _overflow) = Outbox::channel(8);
        outbox.send(ServerFrame::error("first"));
        outbox.send(ServerFrame::error("second"));

        match rx.recv().await.unwrap() {
            Outgoing::Frame(ServerFrame::Error { error }) => assert_eq!(error, "first"),
            other => panic!("unexpected item: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Outgoing::Frame(ServerFrame::Error { error }) => assert_eq!(error, "second"),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overflow_flips_watch() {
        let (outbox, _rx, overflow) = Outbox::channel(2);
        assert!(!*overflow.borrow());

        outbox.send(ServerFrame::error("1"));
        outbox.send(ServerFrame::error("2"));
        // Nothing draining: the high-water mark is hit here.
        outbox.send(ServerFrame::error("3"));

        assert!(*overflow.borrow());
    }
}
