//! The outbound queue: the only channel between the public API (and the
//! receive loop, for batch acks) and the send loop.

use std::sync::Mutex;

use tokio::sync::mpsc;
use wire::V6Frame;

/// Whether the peer is expected to answer a frame. Double-direction frames
/// arm the response watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    SingleDirection,
    DoubleDirection,
}

/// A frame waiting for transmission.
#[derive(Debug)]
pub struct OutboundFrame {
    pub mode: SendMode,
    pub frame: V6Frame,
}

impl OutboundFrame {
    pub fn single(frame: V6Frame) -> OutboundFrame {
        OutboundFrame {
            mode: SendMode::SingleDirection,
            frame,
        }
    }

    pub fn double(frame: V6Frame) -> OutboundFrame {
        OutboundFrame {
            mode: SendMode::DoubleDirection,
            frame,
        }
    }
}

/// Unbounded FIFO; `push` never blocks, `try_pop` returns `None` when
/// empty. Only the send loop pops.
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    rx: Mutex<mpsc::UnboundedReceiver<OutboundFrame>>,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    pub fn new() -> OutboundQueue {
        let (tx, rx) = mpsc::unbounded_channel();
        OutboundQueue {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn push(&self, frame: OutboundFrame) {
        // the receiver lives as long as the queue, so this cannot fail
        let _ = self.tx.send(frame);
    }

    pub fn try_pop(&self) -> Option<OutboundFrame> {
        self.rx
            .lock()
            .expect("outbound queue lock poisoned")
            .try_recv()
            .ok()
    }
}
