//! Audio format description
//!
//! The capture collaborator fixes the PCM layout once at startup; clients
//! learn it either as a compact binary descriptor over the control channel
//! or as a JSON document on the WebSocket channel.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// PCM sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    /// 32-bit floating-point PCM
    F32,
    /// 8-bit integer PCM
    S8,
    /// 16-bit integer PCM
    S16,
    /// 24-bit integer PCM
    S24,
    /// 32-bit integer PCM
    S32,
}

impl SampleEncoding {
    /// All encodings, in CLI listing order
    pub const ALL: [SampleEncoding; 5] = [
        SampleEncoding::F32,
        SampleEncoding::S8,
        SampleEncoding::S16,
        SampleEncoding::S24,
        SampleEncoding::S32,
    ];

    /// Bits per sample for this encoding
    pub fn bits_per_sample(self) -> u32 {
        match self {
            SampleEncoding::F32 | SampleEncoding::S32 => 32,
            SampleEncoding::S24 => 24,
            SampleEncoding::S16 => 16,
            SampleEncoding::S8 => 8,
        }
    }

    /// Bytes per sample for this encoding
    pub fn bytes_per_sample(self) -> usize {
        (self.bits_per_sample() / 8) as usize
    }

    /// Human-readable description for the CLI encoding table
    pub fn description(self) -> &'static str {
        match self {
            SampleEncoding::F32 => "32 bit floating-point PCM",
            SampleEncoding::S8 => "8 bit integer PCM",
            SampleEncoding::S16 => "16 bit integer PCM",
            SampleEncoding::S24 => "24 bit integer PCM",
            SampleEncoding::S32 => "32 bit integer PCM",
        }
    }

    fn tag(self) -> u32 {
        match self {
            SampleEncoding::F32 => 1,
            SampleEncoding::S8 => 2,
            SampleEncoding::S16 => 3,
            SampleEncoding::S24 => 4,
            SampleEncoding::S32 => 5,
        }
    }

    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(SampleEncoding::F32),
            2 => Some(SampleEncoding::S8),
            3 => Some(SampleEncoding::S16),
            4 => Some(SampleEncoding::S24),
            5 => Some(SampleEncoding::S32),
            _ => None,
        }
    }
}

impl std::fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SampleEncoding::F32 => "f32",
            SampleEncoding::S8 => "s8",
            SampleEncoding::S16 => "s16",
            SampleEncoding::S24 => "s24",
            SampleEncoding::S32 => "s32",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for SampleEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f32" => Ok(SampleEncoding::F32),
            "s8" => Ok(SampleEncoding::S8),
            "s16" => Ok(SampleEncoding::S16),
            "s24" => Ok(SampleEncoding::S24),
            "s32" => Ok(SampleEncoding::S32),
            other => Err(format!("unknown encoding '{other}'")),
        }
    }
}

/// Negotiated PCM stream layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: SampleEncoding,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Byte width of one sample across all channels
    ///
    /// Datagram segmentation never splits a block-align boundary.
    pub fn block_align(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channels as usize
    }

    /// Encode the 12-byte little-endian wire descriptor
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(12);
        buf.put_u32_le(self.encoding.tag());
        buf.put_u32_le(self.channels as u32);
        buf.put_u32_le(self.sample_rate);
        buf.freeze()
    }

    /// Decode a wire descriptor produced by [`encode`](Self::encode)
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != 12 {
            return None;
        }
        let encoding = SampleEncoding::from_tag(u32::from_le_bytes(buf[0..4].try_into().ok()?))?;
        let channels = u32::from_le_bytes(buf[4..8].try_into().ok()?);
        if channels == 0 || channels > u16::MAX as u32 {
            return None;
        }
        let sample_rate = u32::from_le_bytes(buf[8..12].try_into().ok()?);

        Some(Self {
            encoding,
            channels: channels as u16,
            sample_rate,
        })
    }

    /// Render the JSON format document sent as the first WebSocket frame
    pub fn to_json_document(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct FormatDocument {
            r#type: &'static str,
            encoding: SampleEncoding,
            channels: u16,
            sample_rate: u32,
            bits_per_sample: u32,
        }

        let document = FormatDocument {
            r#type: "format",
            encoding: self.encoding,
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.encoding.bits_per_sample(),
        };

        // Serialization of a plain struct cannot fail.
        serde_json::to_string(&document).expect("format document serialization")
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}ch {}Hz",
            self.encoding, self.channels, self.sample_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_align() {
        let format = AudioFormat {
            encoding: SampleEncoding::S16,
            channels: 2,
            sample_rate: 48000,
        };
        assert_eq!(format.block_align(), 4);

        let format = AudioFormat {
            encoding: SampleEncoding::F32,
            channels: 8,
            sample_rate: 44100,
        };
        assert_eq!(format.block_align(), 32);
    }

    #[test]
    fn test_descriptor_round_trip() {
        let format = AudioFormat {
            encoding: SampleEncoding::S24,
            channels: 6,
            sample_rate: 96000,
        };

        let wire = format.encode();
        assert_eq!(wire.len(), 12);
        assert_eq!(AudioFormat::decode(&wire), Some(format));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(AudioFormat::decode(&[]), None);
        assert_eq!(AudioFormat::decode(&[0; 11]), None);
        // Unknown encoding tag
        assert_eq!(
            AudioFormat::decode(&[9, 0, 0, 0, 2, 0, 0, 0, 0x44, 0xAC, 0, 0]),
            None
        );
        // Zero channels
        assert_eq!(
            AudioFormat::decode(&[3, 0, 0, 0, 0, 0, 0, 0, 0x44, 0xAC, 0, 0]),
            None
        );
    }

    #[test]
    fn test_json_document_shape() {
        let format = AudioFormat {
            encoding: SampleEncoding::S16,
            channels: 2,
            sample_rate: 48000,
        };

        assert_eq!(
            format.to_json_document(),
            r#"{"type":"format","encoding":"s16","channels":2,"sampleRate":48000,"bitsPerSample":16}"#
        );
    }

    #[test]
    fn test_encoding_parse_and_display() {
        for encoding in SampleEncoding::ALL {
            let parsed: SampleEncoding = encoding.to_string().parse().unwrap();
            assert_eq!(parsed, encoding);
        }
        assert!("pcm".parse::<SampleEncoding>().is_err());
    }
}
