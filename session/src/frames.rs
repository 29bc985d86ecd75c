//! Builders for every frame the session emits. Frame ids come from the
//! session's counter; packet ids are fresh random identifiers.

use bytes::{Bytes, BytesMut};
use uuid::Uuid;
use wire::control::{BindRequest, ConnRequest, UnbindRequest};
use wire::secmsg::{CompoundPayload, P2pPayload, P2tPayload, PacketKind, SecPacket, SequenceAckPayload};
use wire::{FrameCmd, V6Frame};

use crate::clock::now_millis;
use crate::session::SessionShared;

/// A fresh random packet id (16 random bytes, hex).
pub(crate) fn new_packet_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn build_conn_frame(s: &SessionShared) -> V6Frame {
    let request = ConnRequest {
        udid: s.udid.clone(),
        app_id: s.app_id,
        resource: s.resource.clone(),
    };
    let mut buf = BytesMut::new();
    request.ser(&mut buf);
    V6Frame::new(FrameCmd::Conn, s.next_frame_id(), buf.freeze())
}

/// `None` until a login has produced credentials.
pub(crate) fn build_bind_frame(s: &SessionShared) -> Option<V6Frame> {
    let creds = s.credentials()?;
    let request = BindRequest {
        uuid: creds.uuid,
        chid: creds.chid,
        app_package: creds.app_package,
        token: creds.token,
        resource: s.resource.clone(),
    };
    let mut buf = BytesMut::new();
    request.ser(&mut buf);
    Some(V6Frame::new(FrameCmd::Bind, s.next_frame_id(), buf.freeze()))
}

pub(crate) fn build_unbind_frame(s: &SessionShared) -> Option<V6Frame> {
    let creds = s.credentials()?;
    let request = UnbindRequest {
        uuid: creds.uuid,
        resource: s.resource.clone(),
    };
    let mut buf = BytesMut::new();
    request.ser(&mut buf);
    Some(V6Frame::new(FrameCmd::Unbind, s.next_frame_id(), buf.freeze()))
}

pub(crate) fn build_ping_frame(s: &SessionShared) -> V6Frame {
    V6Frame::new(FrameCmd::Ping, s.next_frame_id(), Bytes::new())
}

/// The SECMSG frame for a user-to-user message plus the inner packet that
/// goes into the unacked table.
pub(crate) fn build_p2p_frame(
    s: &SessionShared,
    to_account: &str,
    body: &[u8],
    now: i64,
) -> (V6Frame, SecPacket) {
    let payload = P2pPayload {
        from_account: s.app_account.clone(),
        from_resource: s.resource.clone(),
        to_account: to_account.to_string(),
        body: Bytes::copy_from_slice(body),
    };
    let mut buf = BytesMut::new();
    payload.ser(&mut buf);

    let packet = SecPacket {
        packet_id: new_packet_id(),
        kind: PacketKind::P2p,
        sequence: 0,
        timestamp: now,
        payload: buf.freeze(),
    };
    let frame = V6Frame::new(FrameCmd::SecMsg, s.next_frame_id(), packet.to_bytes());
    (frame, packet)
}

/// The SECMSG frame for a user-to-topic message, symmetric to
/// [`build_p2p_frame`].
pub(crate) fn build_p2t_frame(
    s: &SessionShared,
    topic_id: i64,
    body: &[u8],
    now: i64,
) -> (V6Frame, SecPacket) {
    let payload = P2tPayload {
        from_account: s.app_account.clone(),
        from_resource: s.resource.clone(),
        topic_id,
        body: Bytes::copy_from_slice(body),
    };
    let mut buf = BytesMut::new();
    payload.ser(&mut buf);

    let packet = SecPacket {
        packet_id: new_packet_id(),
        kind: PacketKind::P2t,
        sequence: 0,
        timestamp: now,
        payload: buf.freeze(),
    };
    let frame = V6Frame::new(FrameCmd::SecMsg, s.next_frame_id(), packet.to_bytes());
    (frame, packet)
}

/// Acknowledges a delivered compound batch up to its max sequence.
pub(crate) fn build_sequence_ack_frame(s: &SessionShared, batch: &CompoundPayload) -> V6Frame {
    let uuid = s.credentials().map(|c| c.uuid).unwrap_or(0);
    let ack = SequenceAckPayload {
        uuid,
        resource: s.resource.clone(),
        sequence: batch.max_sequence,
    };
    let mut buf = BytesMut::new();
    ack.ser(&mut buf);

    let packet = SecPacket {
        packet_id: new_packet_id(),
        kind: PacketKind::SequenceAck,
        sequence: batch.max_sequence,
        timestamp: now_millis(),
        payload: buf.freeze(),
    };
    V6Frame::new(FrameCmd::SecMsg, s.next_frame_id(), packet.to_bytes())
}
