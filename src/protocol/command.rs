//! Control-channel commands and wire encoding
//!
//! The control protocol is a sequence of little-endian frames. Every frame
//! starts with a 32-bit opcode; `GetFormat` and `StartPlay` replies carry an
//! opcode-specific payload:
//!
//! ```text
//! Client                                   Server
//!   |------- GET_FORMAT (u32 = 1) -------->|
//!   |<------ u32 = 1, u32 = len, bytes ----|
//!   |------- START_PLAY (u32 = 2) -------->|
//!   |<------ u32 = 2, u32 = id ------------|
//!   |<------ HEARTBEAT (u32 = 3) --------->|   (either direction, no payload)
//! ```
//!
//! A datagram containing a single little-endian `u32` session id registers
//! the sender's endpoint for audio delivery.

use bytes::{BufMut, Bytes, BytesMut};

/// A control-channel opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request the audio format descriptor
    GetFormat,
    /// Request a play session; the reply carries the session id
    StartPlay,
    /// Zero-payload liveness message
    Heartbeat,
}

impl Command {
    /// Size of an encoded opcode in bytes
    pub const WIRE_SIZE: usize = 4;

    /// Decode a raw opcode; unknown values are a protocol violation
    pub fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Command::GetFormat),
            2 => Some(Command::StartPlay),
            3 => Some(Command::Heartbeat),
            _ => None,
        }
    }

    /// Encode this opcode as its wire value
    pub fn to_wire(self) -> u32 {
        match self {
            Command::GetFormat => 1,
            Command::StartPlay => 2,
            Command::Heartbeat => 3,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::GetFormat => "GET_FORMAT",
            Command::StartPlay => "START_PLAY",
            Command::Heartbeat => "HEARTBEAT",
        };
        f.write_str(name)
    }
}

/// Build the `GET_FORMAT` reply: opcode, payload length, payload
pub fn encode_format_reply(descriptor: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + descriptor.len());
    buf.put_u32_le(Command::GetFormat.to_wire());
    buf.put_u32_le(descriptor.len() as u32);
    buf.put_slice(descriptor);
    buf.freeze()
}

/// Build the `START_PLAY` reply: opcode, session id
pub fn encode_play_reply(id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u32_le(Command::StartPlay.to_wire());
    buf.put_u32_le(id);
    buf.freeze()
}

/// Build a bare `HEARTBEAT` frame
pub fn encode_heartbeat() -> Bytes {
    let mut buf = BytesMut::with_capacity(Command::WIRE_SIZE);
    buf.put_u32_le(Command::Heartbeat.to_wire());
    buf.freeze()
}

/// Parse a registration datagram
///
/// A valid registration is exactly one little-endian `u32`; anything else
/// is ignored by the caller.
pub fn decode_registration(datagram: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = datagram.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for cmd in [Command::GetFormat, Command::StartPlay, Command::Heartbeat] {
            assert_eq!(Command::from_wire(cmd.to_wire()), Some(cmd));
        }
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        assert_eq!(Command::from_wire(0), None);
        assert_eq!(Command::from_wire(99), None);
    }

    #[test]
    fn test_format_reply_layout() {
        let descriptor = [0xAA, 0xBB, 0xCC];
        let reply = encode_format_reply(&descriptor);

        assert_eq!(&reply[0..4], &[1, 0, 0, 0]);
        assert_eq!(&reply[4..8], &[3, 0, 0, 0]);
        assert_eq!(&reply[8..], &descriptor);
    }

    #[test]
    fn test_format_reply_length_matches_payload() {
        // Length field must equal the byte count that follows, up to the
        // descriptor size limit.
        let descriptor = vec![0x5A; crate::protocol::MAX_AUDIO_FORMAT_SIZE];
        let reply = encode_format_reply(&descriptor);

        let len = u32::from_le_bytes(reply[4..8].try_into().unwrap()) as usize;
        assert_eq!(len, descriptor.len());
        assert_eq!(reply.len(), 8 + len);
    }

    #[test]
    fn test_play_reply_layout() {
        let reply = encode_play_reply(1);
        assert_eq!(&reply[..], &[2, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_heartbeat_layout() {
        assert_eq!(&encode_heartbeat()[..], &[3, 0, 0, 0]);
    }

    #[test]
    fn test_registration_decode() {
        assert_eq!(decode_registration(&[7, 0, 0, 0]), Some(7));
        assert_eq!(decode_registration(&[1, 0, 0]), None);
        assert_eq!(decode_registration(&[1, 0, 0, 0, 0]), None);
        assert_eq!(decode_registration(&[]), None);
    }
}
