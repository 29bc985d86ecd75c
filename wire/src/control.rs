//! Handshake and bind control payloads (CONN / BIND / UNBIND).
//!
//! PING and KICK frames carry no payload and have no representation here.

use bytes::{Buf, BufMut};

use crate::buf::{put_str, try_get_str};

/// Bind failure cause that triggers an automatic token refresh.
pub const ERROR_TOKEN_EXPIRE: &str = "TOKEN_EXPIRE";

/// Handshake request, the first frame on every fresh socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnRequest {
    pub udid: String,
    pub app_id: i64,
    pub resource: String,
}

impl ConnRequest {
    pub fn ser(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.udid);
        buf.put_i64(self.app_id);
        put_str(buf, &self.resource);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<ConnRequest> {
        Ok(ConnRequest {
            udid: try_get_str(buf)?,
            app_id: buf.try_get_i64()?,
            resource: try_get_str(buf)?,
        })
    }
}

/// Handshake response carrying the challenge that seeds the body key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnResp {
    pub challenge: String,
}

impl ConnResp {
    pub fn ser(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.challenge);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<ConnResp> {
        Ok(ConnResp {
            challenge: try_get_str(buf)?,
        })
    }
}

/// Application-level login above the TCP handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub uuid: i64,
    pub chid: f64,
    pub app_package: String,
    pub token: String,
    pub resource: String,
}

impl BindRequest {
    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.uuid);
        buf.put_f64(self.chid);
        put_str(buf, &self.app_package);
        put_str(buf, &self.token);
        put_str(buf, &self.resource);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<BindRequest> {
        Ok(BindRequest {
            uuid: buf.try_get_i64()?,
            chid: buf.try_get_f64()?,
            app_package: try_get_str(buf)?,
            token: try_get_str(buf)?,
            resource: try_get_str(buf)?,
        })
    }
}

/// Bind outcome. The error fields are empty on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResp {
    pub result: bool,
    pub error_type: String,
    pub error_reason: String,
    pub error_desc: String,
}

impl BindResp {
    pub fn ok() -> BindResp {
        BindResp {
            result: true,
            error_type: String::new(),
            error_reason: String::new(),
            error_desc: String::new(),
        }
    }

    pub fn failure(error_type: &str, error_reason: &str, error_desc: &str) -> BindResp {
        BindResp {
            result: false,
            error_type: error_type.to_string(),
            error_reason: error_reason.to_string(),
            error_desc: error_desc.to_string(),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.result as u8);
        put_str(buf, &self.error_type);
        put_str(buf, &self.error_reason);
        put_str(buf, &self.error_desc);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<BindResp> {
        Ok(BindResp {
            result: buf.try_get_u8()? != 0,
            error_type: try_get_str(buf)?,
            error_reason: try_get_str(buf)?,
            error_desc: try_get_str(buf)?,
        })
    }
}

/// Application-level logout request. The session stays `Online` until the
/// server responds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindRequest {
    pub uuid: i64,
    pub resource: String,
}

impl UnbindRequest {
    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.uuid);
        put_str(buf, &self.resource);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<UnbindRequest> {
        Ok(UnbindRequest {
            uuid: buf.try_get_i64()?,
            resource: try_get_str(buf)?,
        })
    }
}
