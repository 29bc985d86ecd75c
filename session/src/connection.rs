//! Socket ownership and connection lifecycle.
//!
//! The send loop is the only writer, the receive loop the only reader: the
//! write half lives behind a mutex used exclusively by the send loop, the
//! read half is handed to the receive loop through a slot. `reset` drops
//! the write half, clears the handshake state and bumps a watch epoch so a
//! receive loop blocked in `read` lets go of its half.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use anyhow::{bail, Context};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info};
use wire::keys;

use crate::peer::PeerFetcher;

/// Connection lifecycle state. Transitions are monotonic within one
/// connection lifetime; `reset` starts the next lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    NotConnected,
    SockConnected,
    HandshakeConnected,
}

impl ConnStatus {
    fn from_raw(raw: u8) -> ConnStatus {
        match raw {
            1 => ConnStatus::SockConnected,
            2 => ConnStatus::HandshakeConnected,
            _ => ConnStatus::NotConnected,
        }
    }

    fn raw(self) -> u8 {
        match self {
            ConnStatus::NotConnected => 0,
            ConnStatus::SockConnected => 1,
            ConnStatus::HandshakeConnected => 2,
        }
    }
}

pub struct Connection {
    peer_fetcher: Arc<dyn PeerFetcher>,
    response_timeout: i64,

    status: AtomicU8,
    challenge: StdRwLock<String>,
    body_key: StdRwLock<Option<[u8; keys::KEY_LENGTH]>>,

    /// Absolute deadline (epoch millis) for the next expected response;
    /// 0 means no outstanding request.
    next_reset_sock_ts: AtomicI64,

    writer: Mutex<Option<OwnedWriteHalf>>,
    reader_slot: StdMutex<Option<OwnedReadHalf>>,
    reader_ready: Notify,
    reset_epoch: watch::Sender<u64>,
}

impl Connection {
    pub fn new(peer_fetcher: Arc<dyn PeerFetcher>, response_timeout: i64) -> Connection {
        let (reset_epoch, _) = watch::channel(0);
        Connection {
            peer_fetcher,
            response_timeout,
            status: AtomicU8::new(ConnStatus::NotConnected.raw()),
            challenge: StdRwLock::new(String::new()),
            body_key: StdRwLock::new(None),
            next_reset_sock_ts: AtomicI64::new(0),
            writer: Mutex::new(None),
            reader_slot: StdMutex::new(None),
            reader_ready: Notify::new(),
            reset_epoch,
        }
    }

    pub fn status(&self) -> ConnStatus {
        ConnStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    /// Resolves a peer, opens the stream and hands the read half to the
    /// receive loop. `NotConnected -> SockConnected`.
    pub async fn connect(&self) -> anyhow::Result<()> {
        let addr = self.peer_fetcher.fetch_peer().await.context("peer discovery failed")?;
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to {}", addr))?;
        let (read_half, write_half) = stream.into_split();

        *self.writer.lock().await = Some(write_half);
        *self.reader_slot.lock().expect("reader slot lock poisoned") = Some(read_half);
        self.status.store(ConnStatus::SockConnected.raw(), Ordering::Release);
        self.reader_ready.notify_one();

        info!("connected to {}", addr);
        Ok(())
    }

    /// Installs the handshake challenge and derives the body key from it.
    pub fn set_challenge_and_body_key(&self, challenge: &str, security_key: &str) {
        *self.challenge.write().expect("challenge lock poisoned") = challenge.to_string();
        *self.body_key.write().expect("body key lock poisoned") =
            Some(keys::body_key(challenge, security_key));
    }

    /// `SockConnected -> HandshakeConnected`, after a valid CONN response.
    pub fn handshake_connected(&self) {
        self.status.store(ConnStatus::HandshakeConnected.raw(), Ordering::Release);
    }

    pub fn body_key(&self) -> Option<[u8; keys::KEY_LENGTH]> {
        *self.body_key.read().expect("body key lock poisoned")
    }

    pub fn challenge(&self) -> String {
        self.challenge.read().expect("challenge lock poisoned").clone()
    }

    /// Arms the response watchdog if it is not armed already. Called by the
    /// send loop before a double-direction frame goes out.
    pub fn try_arm_watchdog(&self, now: i64) {
        let _ = self.next_reset_sock_ts.compare_exchange(
            0,
            now + self.response_timeout,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Disarms the watchdog. Called by the receive loop after any frame.
    pub fn clear_watchdog(&self) {
        self.next_reset_sock_ts.store(0, Ordering::Release);
    }

    pub fn watchdog_deadline(&self) -> i64 {
        self.next_reset_sock_ts.load(Ordering::Acquire)
    }

    /// Writes the full buffer or fails. Send loop only.
    pub async fn write_all(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => {
                w.write_all(bytes).await?;
                Ok(())
            }
            None => bail!("not connected"),
        }
    }

    /// Blocks until a fresh read half is available and claims it. Receive
    /// loop only.
    pub async fn take_reader(&self) -> OwnedReadHalf {
        loop {
            let notified = self.reader_ready.notified();
            if let Some(reader) = self
                .reader_slot
                .lock()
                .expect("reader slot lock poisoned")
                .take()
            {
                return reader;
            }
            notified.await;
        }
    }

    /// A receiver that fires when the connection is reset. Subscribe right
    /// after claiming a read half; only later resets are visible.
    pub fn subscribe_reset(&self) -> watch::Receiver<u64> {
        self.reset_epoch.subscribe()
    }

    /// Closes the socket and clears the handshake state. The session's
    /// login state is untouched; the next handshake re-binds. Idempotent.
    pub async fn reset(&self) {
        let prev = self.status.swap(ConnStatus::NotConnected.raw(), Ordering::AcqRel);
        *self.challenge.write().expect("challenge lock poisoned") = String::new();
        *self.body_key.write().expect("body key lock poisoned") = None;
        self.next_reset_sock_ts.store(0, Ordering::Release);

        let dropped = self.writer.lock().await.take();
        if let Some(mut writer) = dropped {
            let _ = writer.shutdown().await;
        }
        self.reader_slot
            .lock()
            .expect("reader slot lock poisoned")
            .take();

        self.reset_epoch.send_modify(|epoch| *epoch += 1);

        if ConnStatus::from_raw(prev) != ConnStatus::NotConnected {
            debug!("connection reset");
        }
    }
}
