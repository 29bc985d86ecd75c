//! The outer V6 frame envelope.

use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::Crc;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::keys;

pub const MAGIC: u16 = 0xC2FE;
pub const V6_VERSION: u16 = 6;

/// magic + version + bodyLen
pub const V6_HEAD_LENGTH: usize = 8;
pub const V6_CRC_LENGTH: usize = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Outer frame command, fixed by the remote service's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameCmd {
    Conn = 1,
    Bind = 2,
    Unbind = 3,
    SecMsg = 4,
    Ping = 5,
    Kick = 6,
}

/// A single frame as the session engine sees it: command, frame id and the
/// (plaintext) payload. Ciphering happens on encode / decode only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V6Frame {
    pub cmd: FrameCmd,
    pub id: u32,
    pub payload: Bytes,
}

impl V6Frame {
    pub fn new(cmd: FrameCmd, id: u32, payload: Bytes) -> V6Frame {
        V6Frame { cmd, id, payload }
    }

    /// Serializes the frame for the wire: body assembly, payload and body
    /// ciphering, head and CRC trailer.
    ///
    /// `body_key` is absent until the handshake challenge is known (i.e. for
    /// the CONN exchange itself); an empty `security_key` leaves the payload
    /// plaintext.
    pub fn encode(&self, body_key: Option<&[u8; keys::KEY_LENGTH]>, security_key: &str) -> BytesMut {
        let mut payload = self.payload.to_vec();
        if !security_key.is_empty() {
            keys::apply_keystream(&keys::payload_key(security_key, self.id), &mut payload);
        }

        let mut body = BytesMut::with_capacity(9 + payload.len());
        body.put_u8(self.cmd.into());
        body.put_u32(self.id);
        body.put_u32(payload.len() as u32);
        body.put_slice(&payload);
        if let Some(key) = body_key {
            keys::apply_keystream(key, body.as_mut());
        }

        let mut out = BytesMut::with_capacity(V6_HEAD_LENGTH + body.len() + V6_CRC_LENGTH);
        out.put_u16(MAGIC);
        out.put_u16(V6_VERSION);
        out.put_i32(body.len() as i32);
        out.put_slice(&body);

        let mut digest = CRC32.digest();
        digest.update(out.as_ref());
        out.put_u32(digest.finalize());
        out
    }

    /// Validates a frame head and returns the body length.
    pub fn parse_head(head: &[u8]) -> anyhow::Result<usize> {
        let mut buf = head;
        if buf.remaining() < V6_HEAD_LENGTH {
            bail!("frame head too short: {} bytes", buf.remaining());
        }
        let magic = buf.get_u16();
        if magic != MAGIC {
            bail!("bad magic: {:#06x}", magic);
        }
        let version = buf.get_u16();
        if version != V6_VERSION {
            bail!("unsupported protocol version {}", version);
        }
        let body_len = buf.get_i32();
        if body_len < 0 {
            bail!("negative body length {}", body_len);
        }
        Ok(body_len as usize)
    }

    /// Reassembles a frame from the three wire segments the reader collects
    /// (head, body, CRC trailer), verifying the checksum and undoing both
    /// cipher layers.
    pub fn decode(
        head: &[u8],
        body: &[u8],
        crc: &[u8],
        body_key: Option<&[u8; keys::KEY_LENGTH]>,
        security_key: &str,
    ) -> anyhow::Result<V6Frame> {
        let body_len = Self::parse_head(head)?;
        if body_len != body.len() {
            bail!("body length mismatch: head says {}, got {}", body_len, body.len());
        }
        if crc.len() != V6_CRC_LENGTH {
            bail!("crc trailer has {} bytes", crc.len());
        }

        let mut digest = CRC32.digest();
        digest.update(head);
        digest.update(body);
        let expected = digest.finalize();
        let actual = u32::from_be_bytes(crc.try_into()?);
        if expected != actual {
            bail!("checksum mismatch: expected {:#010x}, got {:#010x}", expected, actual);
        }

        let mut body = body.to_vec();
        if let Some(key) = body_key {
            keys::apply_keystream(key, &mut body);
        }

        let mut buf: &[u8] = body.as_ref();
        let raw_cmd = buf.try_get_u8()?;
        let cmd = FrameCmd::try_from(raw_cmd).map_err(|_| anyhow!("unknown frame command {}", raw_cmd))?;
        let id = buf.try_get_u32()?;
        let payload_len = buf.try_get_u32()? as usize;
        if buf.remaining() != payload_len {
            bail!("payload length mismatch: header says {}, got {}", payload_len, buf.remaining());
        }

        let mut payload = buf.to_vec();
        if !security_key.is_empty() {
            keys::apply_keystream(&keys::payload_key(security_key, id), &mut payload);
        }

        Ok(V6Frame {
            cmd,
            id,
            payload: Bytes::from(payload),
        })
    }
}
