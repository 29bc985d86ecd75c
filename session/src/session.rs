//! The user session: identity, state machine and the public API. This is
//! where all other parts come together; the actual work happens in the
//! three loops spawned by [`UserSession::start`].

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::now_millis;
use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::delegates::{MessageObserver, StatusObserver, TokenProvider};
use crate::outbound::{OutboundFrame, OutboundQueue};
use crate::peer::PeerFetcher;
use crate::receive_loop::run_receive_loop;
use crate::resource;
use crate::send_loop::run_send_loop;
use crate::timer_loop::run_timer_loop;
use crate::frames;
use crate::token::{parse_token_bundle, Credentials};
use crate::unacked::UnackedTable;

/// User-level session state, distinct from the connection lifecycle: a
/// session is `Online` once a bind succeeded and until the server kicks it
/// (or a bind fails, or the socket resets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Offline,
    Online,
}

/// Everything the loops and the API share. One instance per session,
/// behind an `Arc`.
pub(crate) struct SessionShared {
    pub(crate) app_id: i64,
    pub(crate) app_account: String,
    pub(crate) resource: String,
    pub(crate) udid: String,
    pub(crate) config: SessionConfig,

    status: AtomicU8,
    pub(crate) try_login: AtomicBool,
    credentials: StdRwLock<Option<Credentials>>,

    pub(crate) last_login_ts: AtomicI64,
    pub(crate) last_create_conn_ts: AtomicI64,
    pub(crate) last_ping_ts: AtomicI64,

    pub(crate) conn: Connection,
    pub(crate) queue: OutboundQueue,
    pub(crate) unacked: UnackedTable,
    frame_ids: AtomicU32,

    token_provider: StdRwLock<Option<Arc<dyn TokenProvider>>>,
    status_observer: StdRwLock<Option<Arc<dyn StatusObserver>>>,
    message_observer: StdRwLock<Option<Arc<dyn MessageObserver>>>,
}

impl SessionShared {
    pub(crate) fn user_status(&self) -> UserStatus {
        if self.status.load(Ordering::Acquire) == 1 {
            UserStatus::Online
        } else {
            UserStatus::Offline
        }
    }

    pub(crate) fn set_user_status(&self, status: UserStatus) {
        let raw = match status {
            UserStatus::Offline => 0,
            UserStatus::Online => 1,
        };
        self.status.store(raw, Ordering::Release);
    }

    pub(crate) fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().expect("credentials lock poisoned").clone()
    }

    pub(crate) fn security_key(&self) -> String {
        self.credentials()
            .map(|c| c.security_key)
            .unwrap_or_default()
    }

    pub(crate) fn next_frame_id(&self) -> u32 {
        self.frame_ids.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn message_observer(&self) -> Option<Arc<dyn MessageObserver>> {
        self.message_observer
            .read()
            .expect("message observer lock poisoned")
            .clone()
    }

    /// Resets the socket and drops the session to `Offline` so the next
    /// handshake re-binds. Credentials survive.
    pub(crate) async fn reset_connection(&self) {
        self.set_user_status(UserStatus::Offline);
        self.conn.reset().await;
    }

    /// Fetches and applies a token bundle. `try_login` stays armed until a
    /// bundle parses, so the send loop keeps retrying on failures.
    pub(crate) async fn login(&self) -> bool {
        let provider = self
            .token_provider
            .read()
            .expect("token provider lock poisoned")
            .clone();
        let Some(provider) = provider else {
            error!("{}: login failed, no token provider registered", self.app_account);
            return false;
        };

        self.try_login.store(true, Ordering::Release);
        let Some(bundle) = provider.fetch_token().await else {
            warn!("{}: login failed, token provider returned nothing", self.app_account);
            return false;
        };

        match parse_token_bundle(&bundle) {
            Ok(creds) => {
                *self.credentials.write().expect("credentials lock poisoned") = Some(creds);
                self.try_login.store(false, Ordering::Release);
                true
            }
            Err(e) => {
                warn!("{}: login failed, bad token bundle: {:#}", self.app_account, e);
                false
            }
        }
    }

    pub(crate) async fn notify_status(
        &self,
        online: bool,
        error_type: &str,
        error_reason: &str,
        error_desc: &str,
    ) {
        let observer = self
            .status_observer
            .read()
            .expect("status observer lock poisoned")
            .clone();
        match observer {
            Some(observer) => {
                observer
                    .handle_change(online, error_type, error_reason, error_desc)
                    .await
            }
            None => warn!(
                "{}: status changed to online={} but no status observer is registered",
                self.app_account, online
            ),
        }
    }
}

/// A long-lived client session for one logical user account.
///
/// Construction resolves the stable per-install resource string;
/// [`start`](UserSession::start) spawns the send, receive and timer loops.
/// Delegates should be registered before `start`.
pub struct UserSession {
    shared: Arc<SessionShared>,
    started: AtomicBool,
}

impl UserSession {
    pub fn new(
        app_id: i64,
        app_account: &str,
        peer_fetcher: Arc<dyn PeerFetcher>,
        config: SessionConfig,
    ) -> anyhow::Result<UserSession> {
        config.validate()?;

        let base_dir = match &config.resource_dir {
            Some(dir) => dir.clone(),
            None => resource::default_base_dir()?,
        };
        let key = resource::resource_key(app_id, app_account);
        let resource = resource::synchronize_resource(&base_dir, &key, &resource::random_resource())?;

        let conn = Connection::new(peer_fetcher, config.response_timeout);

        let shared = SessionShared {
            app_id,
            app_account: app_account.to_string(),
            resource,
            udid: Uuid::new_v4().simple().to_string(),
            config,
            status: AtomicU8::new(0),
            try_login: AtomicBool::new(false),
            credentials: StdRwLock::new(None),
            last_login_ts: AtomicI64::new(0),
            last_create_conn_ts: AtomicI64::new(0),
            last_ping_ts: AtomicI64::new(0),
            conn,
            queue: OutboundQueue::new(),
            unacked: UnackedTable::new(),
            frame_ids: AtomicU32::new(1),
            token_provider: StdRwLock::new(None),
            status_observer: StdRwLock::new(None),
            message_observer: StdRwLock::new(None),
        };

        Ok(UserSession {
            shared: Arc::new(shared),
            started: AtomicBool::new(false),
        })
    }

    pub fn register_token_provider(&self, provider: Arc<dyn TokenProvider>) -> &Self {
        *self
            .shared
            .token_provider
            .write()
            .expect("token provider lock poisoned") = Some(provider);
        self
    }

    pub fn register_status_observer(&self, observer: Arc<dyn StatusObserver>) -> &Self {
        *self
            .shared
            .status_observer
            .write()
            .expect("status observer lock poisoned") = Some(observer);
        self
    }

    pub fn register_message_observer(&self, observer: Arc<dyn MessageObserver>) -> &Self {
        *self
            .shared
            .message_observer
            .write()
            .expect("message observer lock poisoned") = Some(observer);
        self
    }

    /// Spawns the send, receive and timer loops. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("{}: session already started", self.shared.app_account);
            return;
        }
        info!("{}: starting session loops", self.shared.app_account);
        tokio::spawn(run_send_loop(self.shared.clone()));
        tokio::spawn(run_receive_loop(self.shared.clone()));
        tokio::spawn(run_timer_loop(self.shared.clone()));
    }

    /// Fetches a token bundle through the registered [`TokenProvider`] and
    /// installs the session identity from it.
    pub async fn login(&self) -> bool {
        self.shared.login().await
    }

    /// Enqueues an UNBIND frame. The session stays `Online` until the
    /// server acknowledges; returns false when already offline.
    pub fn logout(&self) -> bool {
        if self.shared.user_status() == UserStatus::Offline {
            return false;
        }
        match frames::build_unbind_frame(&self.shared) {
            Some(frame) => {
                self.shared.queue.push(OutboundFrame::double(frame));
                true
            }
            None => false,
        }
    }

    /// Sends a user-to-user message and returns its packet id, or `""` for
    /// empty input. The packet is tracked until the server acks it or the
    /// send-timeout surfaces it; it is never retried automatically.
    pub fn send_message(&self, to_account: &str, payload: &[u8]) -> String {
        if to_account.is_empty() || payload.is_empty() {
            return String::new();
        }
        let now = now_millis();
        let (frame, packet) = frames::build_p2p_frame(&self.shared, to_account, payload, now);
        let packet_id = packet.packet_id.clone();

        // record before enqueue, so the ack can never beat the record
        self.shared.unacked.insert(now, packet);
        self.shared.queue.push(OutboundFrame::double(frame));
        packet_id
    }

    /// Sends a user-to-topic message; symmetric to [`send_message`](UserSession::send_message).
    pub fn send_group_message(&self, topic_id: i64, payload: &[u8]) -> String {
        if payload.is_empty() {
            return String::new();
        }
        let now = now_millis();
        let (frame, packet) = frames::build_p2t_frame(&self.shared, topic_id, payload, now);
        let packet_id = packet.packet_id.clone();

        self.shared.unacked.insert(now, packet);
        self.shared.queue.push(OutboundFrame::double(frame));
        packet_id
    }

    pub fn status(&self) -> UserStatus {
        self.shared.user_status()
    }

    pub fn app_account(&self) -> &str {
        &self.shared.app_account
    }

    /// The stable per-install resource string for this account.
    pub fn resource(&self) -> &str {
        &self.shared.resource
    }

    /// Number of sent packets still waiting for a server ack. Useful for
    /// callers implementing their own retry on send-timeouts.
    pub fn pending_ack_count(&self) -> usize {
        self.shared.unacked.len()
    }

    /// Whether a packet is still waiting for its server ack.
    pub fn is_awaiting_ack(&self, packet_id: &str) -> bool {
        self.shared.unacked.contains(packet_id)
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }
}
