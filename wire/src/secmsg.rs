//! The inner packet model carried by SECMSG frames.
//!
//! A SECMSG payload is always a [`SecPacket`]; its own payload is one of
//! the typed structures below, selected by [`PacketKind`].

use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::buf::{put_bytes, put_str, try_get_bytes, try_get_str};

/// Inner packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PacketKind {
    /// User-to-user message, acknowledged by the server per packet.
    P2p = 1,
    /// User-to-topic message, acknowledged by the server per packet.
    P2t = 2,
    /// Server acknowledgement for a previously sent P2P / P2T packet.
    PacketAck = 3,
    /// A delivered batch of inner packets.
    Compound = 4,
    /// Client acknowledgement for a received compound batch.
    SequenceAck = 5,
}

/// The structured message inside a SECMSG body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecPacket {
    pub packet_id: String,
    pub kind: PacketKind,
    pub sequence: i64,
    pub timestamp: i64,
    pub payload: Bytes,
}

impl SecPacket {
    pub fn ser(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.packet_id);
        buf.put_u8(self.kind.into());
        buf.put_i64(self.sequence);
        buf.put_i64(self.timestamp);
        put_bytes(buf, &self.payload);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<SecPacket> {
        let packet_id = try_get_str(buf)?;
        let raw_kind = buf.try_get_u8()?;
        let kind = PacketKind::try_from(raw_kind).map_err(|_| anyhow!("unknown packet kind {}", raw_kind))?;
        Ok(SecPacket {
            packet_id,
            kind,
            sequence: buf.try_get_i64()?,
            timestamp: buf.try_get_i64()?,
            payload: try_get_bytes(buf)?,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = bytes::BytesMut::new();
        self.ser(&mut buf);
        buf.freeze()
    }
}

/// Payload of a [`PacketKind::P2p`] packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pPayload {
    pub from_account: String,
    pub from_resource: String,
    pub to_account: String,
    pub body: Bytes,
}

impl P2pPayload {
    pub fn ser(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.from_account);
        put_str(buf, &self.from_resource);
        put_str(buf, &self.to_account);
        put_bytes(buf, &self.body);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<P2pPayload> {
        Ok(P2pPayload {
            from_account: try_get_str(buf)?,
            from_resource: try_get_str(buf)?,
            to_account: try_get_str(buf)?,
            body: try_get_bytes(buf)?,
        })
    }
}

/// Payload of a [`PacketKind::P2t`] packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2tPayload {
    pub from_account: String,
    pub from_resource: String,
    pub topic_id: i64,
    pub body: Bytes,
}

impl P2tPayload {
    pub fn ser(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.from_account);
        put_str(buf, &self.from_resource);
        buf.put_i64(self.topic_id);
        put_bytes(buf, &self.body);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<P2tPayload> {
        Ok(P2tPayload {
            from_account: try_get_str(buf)?,
            from_resource: try_get_str(buf)?,
            topic_id: buf.try_get_i64()?,
            body: try_get_bytes(buf)?,
        })
    }
}

/// Payload of a [`PacketKind::PacketAck`] packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketAckPayload {
    pub packet_id: String,
    pub sequence: i64,
    pub timestamp: i64,
}

impl PacketAckPayload {
    pub fn ser(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.packet_id);
        buf.put_i64(self.sequence);
        buf.put_i64(self.timestamp);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PacketAckPayload> {
        Ok(PacketAckPayload {
            packet_id: try_get_str(buf)?,
            sequence: buf.try_get_i64()?,
            timestamp: buf.try_get_i64()?,
        })
    }
}

/// Payload of a [`PacketKind::Compound`] packet: a batch of inner packets
/// addressed to one client endpoint (identified by its resource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundPayload {
    pub resource: String,
    pub max_sequence: i64,
    pub packets: Vec<SecPacket>,
}

impl CompoundPayload {
    pub fn ser(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.resource);
        buf.put_i64(self.max_sequence);
        buf.put_u16(self.packets.len() as u16);
        for packet in &self.packets {
            packet.ser(buf);
        }
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<CompoundPayload> {
        let resource = try_get_str(buf)?;
        let max_sequence = buf.try_get_i64()?;
        let count = buf.try_get_u16()? as usize;
        let mut packets = Vec::with_capacity(count);
        for _ in 0..count {
            packets.push(SecPacket::deser(buf)?);
        }
        if buf.has_remaining() {
            bail!("{} trailing bytes after compound batch", buf.remaining());
        }
        Ok(CompoundPayload {
            resource,
            max_sequence,
            packets,
        })
    }
}

/// Payload of a [`PacketKind::SequenceAck`] packet, acknowledging a
/// compound batch up to `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceAckPayload {
    pub uuid: i64,
    pub resource: String,
    pub sequence: i64,
}

impl SequenceAckPayload {
    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.uuid);
        put_str(buf, &self.resource);
        buf.put_i64(self.sequence);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<SequenceAckPayload> {
        Ok(SequenceAckPayload {
            uuid: buf.try_get_i64()?,
            resource: try_get_str(buf)?,
            sequence: buf.try_get_i64()?,
        })
    }
}
