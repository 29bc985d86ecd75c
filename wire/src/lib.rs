//! Codec and framing for the V6 client protocol.
//!
//! Everything the session engine puts on (or takes off) the wire goes
//! through this crate: the outer frame envelope, the per-packet key
//! schedule, the handshake / bind control payloads and the secure-message
//! inner packets.
//!
//! ## Outer frame
//!
//! All numbers in network byte order (BE):
//! ```ascii
//! 0:  magic (u16) - fixed protocol constant
//! 2:  version (u16) - fixed protocol constant
//! 4:  bodyLen (i32)
//! 8:  body (bodyLen bytes) - RC4-ciphered with the body key once the
//!      handshake challenge is known, plaintext before that
//! *:  crc (u32) - CRC-32 over everything preceding it
//! ```
//!
//! A magic or version mismatch, a negative bodyLen or a checksum failure is
//! a protocol violation; the caller is expected to reset the connection.
//!
//! ## Body
//!
//! The body plaintext is:
//! ```ascii
//! 0: cmd (u8) - CONN / BIND / UNBIND / SECMSG / PING / KICK
//! 1: frame id (u32) - per-session counter, feeds the payload key
//! 5: payloadLen (u32)
//! 9: payload (payloadLen bytes) - RC4-ciphered with the payload key when
//!     a security key is installed, plaintext otherwise
//! ```
//!
//! ## Key schedule
//!
//! Two RC4 keys, both derived through pure functions in [`keys`]:
//! * the *body key* is fixed per connection, derived from the handshake
//!   challenge and the account security key
//! * the *payload key* is derived per frame from the security key and the
//!   frame id
//!
//! Both ends derive through the same functions, so a frame is decodable by
//! whoever holds the challenge and the security key.

pub mod buf;
pub mod control;
pub mod frame;
pub mod keys;
pub mod secmsg;

pub use frame::{FrameCmd, V6Frame, MAGIC, V6_CRC_LENGTH, V6_HEAD_LENGTH, V6_VERSION};
