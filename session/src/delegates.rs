//! The three caller-provided interfaces of the session engine.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::messages::{P2pMessage, P2tMessage};

/// Supplies the signed token bundle (JSON, see [`crate::token`]). May do
/// network I/O; the session calls it from its own tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn fetch_token(&self) -> Option<String>;
}

/// Notified on every online/offline transition. The error fields are empty
/// on a successful bind and `"kick"` on a server-initiated logout.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusObserver: Send + Sync + 'static {
    async fn handle_change(
        &self,
        online: bool,
        error_type: &str,
        error_reason: &str,
        error_desc: &str,
    );
}

/// Receives delivered messages, server acks and send-timeouts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageObserver: Send + Sync + 'static {
    async fn handle_server_ack(&self, packet_id: &str, sequence: i64, timestamp: i64);

    async fn handle_message(&self, messages: Vec<P2pMessage>);

    async fn handle_group_message(&self, messages: Vec<P2tMessage>);

    async fn handle_send_message_timeout(&self, message: P2pMessage);

    async fn handle_send_group_message_timeout(&self, message: P2tMessage);
}
