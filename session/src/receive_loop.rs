//! The receive loop: sole reader of the socket. Reads framed bytes and
//! dispatches by outer command; any framing violation resets the
//! connection and the loop re-attaches to the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use wire::control::{BindResp, ConnResp, ERROR_TOKEN_EXPIRE};
use wire::secmsg::{CompoundPayload, PacketAckPayload, PacketKind, SecPacket};
use wire::{FrameCmd, V6Frame, V6_CRC_LENGTH, V6_HEAD_LENGTH};

use crate::frames;
use crate::messages::{P2pMessage, P2tMessage};
use crate::outbound::OutboundFrame;
use crate::session::{SessionShared, UserStatus};

/// Upper bound for a single frame body; anything bigger means the stream
/// is corrupt or hostile.
const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

enum ReadFailure {
    /// I/O failure on the 8-byte head; retried with a backoff.
    Head,
    /// Anything later: short body/crc read, framing violation, undecodable
    /// frame.
    Frame,
}

pub(crate) async fn run_receive_loop(s: Arc<SessionShared>) {
    info!("starting receive loop");
    loop {
        let mut reader = s.conn.take_reader().await;
        let mut reset_rx = s.conn.subscribe_reset();
        debug!("receive loop attached to a fresh connection");

        loop {
            tokio::select! {
                outcome = read_frame(&mut reader, &s) => match outcome {
                    Ok(frame) => handle_frame(&s, frame).await,
                    Err(failure) => {
                        s.reset_connection().await;
                        if matches!(failure, ReadFailure::Head) {
                            sleep(Duration::from_millis(1000)).await;
                        }
                        break;
                    }
                },
                _ = reset_rx.changed() => break,
            }
        }
    }
}

/// Reads head, body and CRC trailer and reassembles the frame. The
/// watchdog is cleared as soon as a complete frame arrived, before the
/// decode attempt.
async fn read_frame(reader: &mut OwnedReadHalf, s: &SessionShared) -> Result<V6Frame, ReadFailure> {
    let mut head = [0u8; V6_HEAD_LENGTH];
    if let Err(e) = reader.read_exact(&mut head).await {
        error!("head read failed: {}", e);
        return Err(ReadFailure::Head);
    }

    let body_len = match V6Frame::parse_head(&head) {
        Ok(len) => len,
        Err(e) => {
            error!("invalid frame head: {:#}", e);
            return Err(ReadFailure::Frame);
        }
    };
    if body_len > MAX_BODY_LEN {
        error!("frame body of {} bytes exceeds the limit", body_len);
        return Err(ReadFailure::Frame);
    }

    let mut body = vec![0u8; body_len];
    if body_len > 0 {
        if let Err(e) = reader.read_exact(&mut body).await {
            error!("body read failed: {}", e);
            return Err(ReadFailure::Frame);
        }
    }

    let mut crc = [0u8; V6_CRC_LENGTH];
    if let Err(e) = reader.read_exact(&mut crc).await {
        error!("crc read failed: {}", e);
        return Err(ReadFailure::Frame);
    }

    s.conn.clear_watchdog();

    let body_key = s.conn.body_key();
    let security_key = s.security_key();
    match V6Frame::decode(&head, &body, &crc, body_key.as_ref(), &security_key) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            error!("frame parse failed: {:#}", e);
            Err(ReadFailure::Frame)
        }
    }
}

async fn handle_frame(s: &SessionShared, frame: V6Frame) {
    match frame.cmd {
        FrameCmd::Conn => handle_conn_resp(s, &frame).await,
        FrameCmd::Bind => handle_bind_resp(s, &frame).await,
        FrameCmd::SecMsg => handle_sec_msg(s, &frame).await,
        FrameCmd::Kick => {
            info!("kicked by the server");
            s.set_user_status(UserStatus::Offline);
            s.notify_status(false, "kick", "kick", "kick").await;
        }
        FrameCmd::Ping | FrameCmd::Unbind => {}
    }
}

async fn handle_conn_resp(s: &SessionShared, frame: &V6Frame) {
    let mut buf: &[u8] = &frame.payload;
    match ConnResp::deser(&mut buf) {
        Ok(resp) => {
            s.conn.set_challenge_and_body_key(&resp.challenge, &s.security_key());
            s.conn.handshake_connected();
            debug!("handshake complete");
        }
        Err(e) => {
            error!("unparsable CONN response: {:#}", e);
            s.reset_connection().await;
        }
    }
}

async fn handle_bind_resp(s: &SessionShared, frame: &V6Frame) {
    let mut buf: &[u8] = &frame.payload;
    let resp = match BindResp::deser(&mut buf) {
        Ok(resp) => resp,
        Err(e) => {
            warn!("unparsable BIND response: {:#}", e);
            return;
        }
    };

    if resp.result {
        s.set_user_status(UserStatus::Online);
        s.last_login_ts.store(0, std::sync::atomic::Ordering::Release);
        debug!("bind succeeded, session is online");
    } else if resp.error_type == ERROR_TOKEN_EXPIRE {
        warn!("token expired, refreshing");
        s.login().await;
    } else {
        s.set_user_status(UserStatus::Offline);
        warn!("bind failed: {} / {}", resp.error_type, resp.error_reason);
    }

    s.notify_status(resp.result, &resp.error_type, &resp.error_reason, &resp.error_desc)
        .await;
}

async fn handle_sec_msg(s: &SessionShared, frame: &V6Frame) {
    let mut buf: &[u8] = &frame.payload;
    let packet = match SecPacket::deser(&mut buf) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("unparsable inner packet: {:#}", e);
            return;
        }
    };

    match packet.kind {
        PacketKind::PacketAck => handle_packet_ack(s, &packet).await,
        PacketKind::Compound => handle_compound(s, &packet).await,
        _ => {}
    }
}

async fn handle_packet_ack(s: &SessionShared, packet: &SecPacket) {
    let mut buf: &[u8] = &packet.payload;
    let ack = match PacketAckPayload::deser(&mut buf) {
        Ok(ack) => ack,
        Err(e) => {
            warn!("unparsable packet ack: {:#}", e);
            return;
        }
    };

    if let Some(observer) = s.message_observer() {
        observer
            .handle_server_ack(&ack.packet_id, ack.sequence, ack.timestamp)
            .await;
    }
    if s.unacked.remove(&ack.packet_id).is_none() {
        // already timed out, or a duplicate ack
        warn!("ack for unknown packet {}", ack.packet_id);
    }
}

async fn handle_compound(s: &SessionShared, packet: &SecPacket) {
    let mut buf: &[u8] = &packet.payload;
    let batch = match CompoundPayload::deser(&mut buf) {
        Ok(batch) => batch,
        Err(e) => {
            warn!("unparsable compound batch: {:#}", e);
            return;
        }
    };

    if batch.resource != s.resource {
        warn!(
            "compound batch for resource {} does not match ours ({}), discarding",
            batch.resource, s.resource
        );
        return;
    }

    // acknowledge the batch before dispatching it
    let ack_frame = frames::build_sequence_ack_frame(s, &batch);
    s.queue.push(OutboundFrame::single(ack_frame));

    let mut p2p_batch = Vec::new();
    let mut p2t_batch = Vec::new();
    for inner in &batch.packets {
        match inner.kind {
            PacketKind::P2p => match P2pMessage::from_packet(inner) {
                Ok(message) => p2p_batch.push(message),
                Err(e) => warn!("skipping undecodable p2p packet {}: {:#}", inner.packet_id, e),
            },
            PacketKind::P2t => match P2tMessage::from_packet(inner) {
                Ok(message) => p2t_batch.push(message),
                Err(e) => warn!("skipping undecodable p2t packet {}: {:#}", inner.packet_id, e),
            },
            _ => {}
        }
    }

    let Some(observer) = s.message_observer() else {
        warn!("received {} messages but no message observer is registered", batch.packets.len());
        return;
    };
    if !p2p_batch.is_empty() {
        observer.handle_message(p2p_batch).await;
    }
    if !p2t_batch.is_empty() {
        observer.handle_group_message(p2t_batch).await;
    }
}
