//! A long-lived client session for a remote messaging service.
//!
//! One [`UserSession`] represents one logical user account holding a
//! persistent, encrypted, framed TCP session. Three cooperating loops do
//! the work:
//!
//! * the **send loop** drives the connection through handshake and bind,
//!   transmits queued frames and emits pings when idle
//! * the **receive loop** consumes framed bytes and dispatches handshake
//!   responses, bind outcomes, delivered messages, acks and kicks
//! * the **timer loop** resets stalled connections and surfaces packets
//!   that were never acknowledged as send-timeouts
//!
//! The caller supplies three delegates: a [`TokenProvider`] for the signed
//! token bundle, a [`StatusObserver`] for online/offline transitions and a
//! [`MessageObserver`] for delivered messages, acks and timeouts. Peer
//! addresses come from a [`PeerFetcher`], consulted on every reconnect.
//!
//! ```no_run
//! use std::sync::Arc;
//! use session::{SessionConfig, StaticPeer, UserSession};
//!
//! # async fn demo(token_provider: Arc<dyn session::TokenProvider>) -> anyhow::Result<()> {
//! let peer = Arc::new(StaticPeer::new("10.0.0.1:5222".parse()?));
//! let session = UserSession::new(2882303761517613988, "alice", peer, SessionConfig::default())?;
//! session.register_token_provider(token_provider);
//! session.login().await;
//! session.start();
//!
//! let packet_id = session.send_message("bob", b"hello");
//! # let _ = packet_id;
//! # Ok(())
//! # }
//! ```
//!
//! Recovery is built in: peer address changes, token expiry, kicks,
//! response timeouts and I/O failures all funnel into a connection reset
//! followed by a fresh handshake and re-bind, without losing queued or
//! unacknowledged state.

mod clock;
pub mod config;
pub mod connection;
pub mod delegates;
mod frames;
pub mod messages;
pub mod outbound;
pub mod peer;
mod receive_loop;
pub mod resource;
mod send_loop;
pub mod session;
#[cfg(test)]
mod test_util;
mod timer_loop;
pub mod token;
pub mod unacked;

pub use config::SessionConfig;
pub use delegates::{MessageObserver, StatusObserver, TokenProvider};
pub use messages::{P2pMessage, P2tMessage};
pub use peer::{PeerFetcher, StaticPeer};
pub use session::{UserSession, UserStatus};
