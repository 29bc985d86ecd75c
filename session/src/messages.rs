//! Messages as they are handed to the [`MessageObserver`](crate::delegates::MessageObserver):
//! the inner packet fields joined with the sender information from the
//! typed payload.

use bytes::Bytes;
use wire::secmsg::{P2pPayload, P2tPayload, SecPacket};

/// A user-to-user message, delivered or surfaced as a send-timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pMessage {
    pub packet_id: String,
    pub from_account: String,
    pub from_resource: String,
    pub sequence: i64,
    pub timestamp: i64,
    pub body: Bytes,
}

impl P2pMessage {
    /// Joins the inner packet fields with its deserialized P2P payload.
    pub(crate) fn from_packet(packet: &SecPacket) -> anyhow::Result<P2pMessage> {
        let mut buf: &[u8] = &packet.payload;
        let payload = P2pPayload::deser(&mut buf)?;
        Ok(P2pMessage {
            packet_id: packet.packet_id.clone(),
            from_account: payload.from_account,
            from_resource: payload.from_resource,
            sequence: packet.sequence,
            timestamp: packet.timestamp,
            body: payload.body,
        })
    }
}

/// A user-to-topic message, delivered or surfaced as a send-timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2tMessage {
    pub packet_id: String,
    pub from_account: String,
    pub from_resource: String,
    pub topic_id: i64,
    pub sequence: i64,
    pub timestamp: i64,
    pub body: Bytes,
}

impl P2tMessage {
    pub(crate) fn from_packet(packet: &SecPacket) -> anyhow::Result<P2tMessage> {
        let mut buf: &[u8] = &packet.payload;
        let payload = P2tPayload::deser(&mut buf)?;
        Ok(P2tMessage {
            packet_id: packet.packet_id.clone(),
            from_account: payload.from_account,
            from_resource: payload.from_resource,
            topic_id: payload.topic_id,
            sequence: packet.sequence,
            timestamp: packet.timestamp,
            body: payload.body,
        })
    }
}
