//! Frame Protocol
//!
//! Length-prefixed JSON with a CRC32 of the payload.
//!
//! ```text
//! +----------------+----------------+------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)      |
//! | big-endian u32 | CRC32, BE      | InboundFrame / OutboundFrame |
//! +----------------+----------------+------------------------------+
//! ```
//!
//! Length covers the payload only. The length is checked against
//! [`MAX_FRAME_SIZE`] before the payload is buffered.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Maximum payload size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Length + checksum
const HEADER_SIZE: usize = 8;

/// Initial decoder buffer capacity
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Encode a message as one frame
///
/// # Errors
///
/// Returns [`TransportError::Serialization`] if the message cannot be
/// serialized, or [`TransportError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: json.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    // Bounded by MAX_FRAME_SIZE above
    let len = json.len() as u32;
    let mut buf = Vec::with_capacity(HEADER_SIZE + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&crc32fast::hash(&json).to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Stateless frame encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameEncoder;

impl FrameEncoder {
    /// Create an encoder
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode a message as one frame
    ///
    /// # Errors
    ///
    /// See [`encode`].
    pub fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, TransportError> {
        encode(msg)
    }
}

/// Incremental frame decoder
///
/// Feed bytes with [`push`](Self::push) as they arrive and pull complete
/// messages with [`decode`](Self::decode).
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        if self.read_pos > MIN_BUFFER_CAPACITY && self.read_pos > self.buffer.len() / 2 {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet consumed
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    fn header(&self) -> Option<(usize, u32)> {
        let header = self.buffer.get(self.read_pos..self.read_pos + HEADER_SIZE)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        Some((len, checksum))
    }

    /// Decode the next complete frame, if any
    ///
    /// A frame that fails its checksum or does not parse is consumed, so the
    /// caller can log it and keep decoding. An oversized length cannot be
    /// skipped safely; after [`TransportError::FrameTooLarge`] the stream
    /// should be dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FrameTooLarge`],
    /// [`TransportError::ChecksumMismatch`] or
    /// [`TransportError::Serialization`].
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let Some((len, expected)) = self.header() else {
            return Ok(None);
        };

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if self.available() < HEADER_SIZE + len {
            return Ok(None);
        }

        let start = self.read_pos + HEADER_SIZE;
        let end = start + len;
        self.read_pos = end;

        let payload = &self.buffer[start..end];
        let actual = crc32fast::hash(payload);
        if actual != expected {
            return Err(TransportError::ChecksumMismatch { expected, actual });
        }

        Ok(Some(serde_json::from_slice(payload)?))
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}

/// Read until one complete frame is decoded
///
/// Cancel-safe: bytes already read stay in `decoder`.
///
/// # Errors
///
/// Returns [`TransportError::ConnectionClosed`] on EOF, any decode error, or
/// [`TransportError::Io`].
pub async fn read_frame<T, R>(reader: &mut R, decoder: &mut FrameDecoder) -> Result<T, TransportError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        if let Some(msg) = decoder.decode()? {
            return Ok(msg);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        decoder.push(&buf[..n]);
    }
}

/// Encode and write one frame
///
/// # Errors
///
/// Returns any encode error or [`TransportError::Io`].
pub async fn write_frame<T, W>(writer: &mut W, msg: &T) -> Result<(), TransportError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InboundFrame, Topic};

    fn raw_frame(payload: &[u8], checksum: u32) -> Vec<u8> {
        let mut buf = (payload.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    fn status() -> InboundFrame {
        InboundFrame::Status
    }

    #[test]
    fn test_header_layout() {
        let encoded = encode(&status()).unwrap();
        let len = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        assert_eq!(len, encoded.len() - HEADER_SIZE);

        let crc = u32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(crc, crc32fast::hash(&encoded[HEADER_SIZE..]));
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let frame = InboundFrame::Navigation {
            state: "planning".to_string(),
        };
        let encoded = encode(&frame).unwrap();

        let mut decoder = FrameDecoder::new();
        for (i, byte) in encoded.iter().enumerate() {
            decoder.push(std::slice::from_ref(byte));
            let decoded: Option<InboundFrame> = decoder.decode().unwrap();
            if i + 1 < encoded.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded, Some(frame.clone()));
            }
        }
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let subscribe = InboundFrame::Subscribe {
            topics: vec![Topic::Render],
        };
        let mut bytes = encode(&subscribe).unwrap();
        bytes.extend(encode(&status()).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert_eq!(decoder.decode::<InboundFrame>().unwrap(), Some(subscribe));
        assert_eq!(decoder.decode::<InboundFrame>().unwrap(), Some(status()));
        assert_eq!(decoder.decode::<InboundFrame>().unwrap(), None);
    }

    #[test]
    fn test_encode_too_large() {
        let frame = InboundFrame::Control {
            command: "set-status".to_string(),
            argument: Some("x".repeat(MAX_FRAME_SIZE)),
        };
        assert!(matches!(
            encode(&frame),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_oversized_length_rejected_before_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes());
        decoder.push(&[0u8; 4]);

        let result: Result<Option<InboundFrame>, _> = decoder.decode();
        assert!(matches!(
            result,
            Err(TransportError::FrameTooLarge { size, .. }) if size == MAX_FRAME_SIZE + 1
        ));
    }

    #[test]
    fn test_corrupt_frame_is_skipped() {
        let payload = br#"{"channel":"status"}"#;
        let mut decoder = FrameDecoder::new();
        decoder.push(&raw_frame(payload, 0xDEAD_BEEF));
        decoder.push(&encode(&status()).unwrap());

        let result: Result<Option<InboundFrame>, _> = decoder.decode();
        assert!(matches!(
            result,
            Err(TransportError::ChecksumMismatch {
                expected: 0xDEAD_BEEF,
                ..
            })
        ));
        assert_eq!(decoder.decode::<InboundFrame>().unwrap(), Some(status()));
    }

    #[test]
    fn test_invalid_json_is_skipped() {
        let payload = b"not json";
        let mut decoder = FrameDecoder::new();
        decoder.push(&raw_frame(payload, crc32fast::hash(payload)));
        decoder.push(&encode(&status()).unwrap());

        let result: Result<Option<InboundFrame>, _> = decoder.decode();
        assert!(matches!(result, Err(TransportError::Serialization(_))));
        assert_eq!(decoder.decode::<InboundFrame>().unwrap(), Some(status()));
    }

    #[tokio::test]
    async fn test_read_write_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, &status()).await.unwrap();
        let mut decoder = FrameDecoder::new();
        let frame: InboundFrame = read_frame(&mut server, &mut decoder).await.unwrap();
        assert_eq!(frame, status());

        drop(client);
        let result: Result<InboundFrame, _> = read_frame(&mut server, &mut decoder).await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }
}
