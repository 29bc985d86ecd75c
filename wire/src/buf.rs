//! Length-prefixed helpers shared by the control and secure-message codecs.

use anyhow::bail;
use bytes::{Buf, BufMut, Bytes};

/// Writes a string as u16 length + UTF-8 bytes.
pub fn put_str(buf: &mut impl BufMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

pub fn try_get_str(buf: &mut impl Buf) -> anyhow::Result<String> {
    let len = buf.try_get_u16()? as usize;
    if buf.remaining() < len {
        bail!("string of length {} exceeds remaining buffer ({})", len, buf.remaining());
    }
    let raw = buf.copy_to_bytes(len);
    Ok(String::from_utf8(raw.to_vec())?)
}

/// Writes a byte blob as u32 length + bytes.
pub fn put_bytes(buf: &mut impl BufMut, b: &[u8]) {
    buf.put_u32(b.len() as u32);
    buf.put_slice(b);
}

pub fn try_get_bytes(buf: &mut impl Buf) -> anyhow::Result<Bytes> {
    let len = buf.try_get_u32()? as usize;
    if buf.remaining() < len {
        bail!("blob of length {} exceeds remaining buffer ({})", len, buf.remaining());
    }
    Ok(buf.copy_to_bytes(len))
}
