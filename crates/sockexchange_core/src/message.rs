//! Message envelopes and the ordered-field payload codec.
//!
//! Payloads are a flat sequence of primitive fields that producer and consumer
//! agree on per channel. Fields are read strictly in the order they were
//! written; there is no schema and no random access.
//!
//! ## Field Encoding
//!
//! All integers are big-endian:
//!
//! | Field    | Layout                               |
//! |----------|--------------------------------------|
//! | string   | `u16` byte length, then UTF-8 bytes  |
//! | integer  | `i32`                                |
//! | bytes    | `i32` length, then raw bytes         |

use crate::error::ExchangeError;
use std::sync::Arc;

/// An inbound message tagged with the channel it was published on.
///
/// The payload bytes are shared; cloning a message is cheap and every call to
/// [`ReceivedMessage::data_input`] starts a fresh cursor at the first field, so
/// one consumer's partial read never affects another's.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    channel: String,
    server_name: String,
    payload: Arc<[u8]>,
}

impl ReceivedMessage {
    /// Creates a message from its channel, originating server and raw payload.
    pub fn new(channel: impl Into<String>, server_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            channel: channel.into(),
            server_name: server_name.into(),
            payload: Arc::from(payload),
        }
    }

    /// Channel the message was published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Name of the backend server the message came from.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns a new reader positioned at the first payload field.
    pub fn data_input(&self) -> MessageReader<'_> {
        MessageReader::new(&self.payload)
    }
}

/// Sequential reader over an encoded payload.
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], ExchangeError> {
        if self.remaining() < len {
            return Err(ExchangeError::MalformedPayload(format!(
                "need {} bytes for {} at offset {}, only {} left",
                len,
                what,
                self.position,
                self.remaining()
            )));
        }

        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_utf(&mut self) -> Result<String, ExchangeError> {
        let header = self.take(2, "string length")?;
        let len = u16::from_be_bytes([header[0], header[1]]) as usize;
        let bytes = self.take(len, "string body")?;

        String::from_utf8(bytes.to_vec())
            .map_err(|e| ExchangeError::MalformedPayload(format!("invalid UTF-8 string: {e}")))
    }

    /// Reads a 32-bit signed integer.
    pub fn read_int(&mut self) -> Result<i32, ExchangeError> {
        let bytes = self.take(4, "integer")?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a length-prefixed block of raw bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, ExchangeError> {
        let len = self.read_int()?;
        if len < 0 {
            return Err(ExchangeError::MalformedPayload(format!(
                "negative byte block length {len}"
            )));
        }

        Ok(self.take(len as usize, "byte block")?.to_vec())
    }
}

/// Builder for encoded payloads.
#[derive(Debug, Default, Clone)]
pub struct MessageWriter {
    buffer: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a length-prefixed UTF-8 string.
    ///
    /// Fails when the encoded string is longer than `u16::MAX` bytes.
    pub fn write_utf(&mut self, value: &str) -> Result<&mut Self, ExchangeError> {
        let len = u16::try_from(value.len()).map_err(|_| ExchangeError::PayloadTooLarge(value.len()))?;
        self.buffer.extend_from_slice(&len.to_be_bytes());
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(self)
    }

    /// Appends a 32-bit signed integer.
    pub fn write_int(&mut self, value: i32) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Appends a length-prefixed block of raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<&mut Self, ExchangeError> {
        let len = i32::try_from(value.len()).map_err(|_| ExchangeError::PayloadTooLarge(value.len()))?;
        self.write_int(len);
        self.buffer.extend_from_slice(value);
        Ok(self)
    }

    /// Length of the payload written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        let mut writer = MessageWriter::new();
        writer.write_utf("lobby").unwrap();
        writer.write_int(2);
        writer.write_utf("alice").unwrap();
        writer.write_utf("bob").unwrap();
        writer.write_bytes(&[0xde, 0xad]).unwrap();
        writer.into_bytes()
    }

    #[test]
    fn test_fields_read_in_write_order() {
        let message = ReceivedMessage::new("MovePlayers", "hub", sample_payload());
        let mut input = message.data_input();

        assert_eq!(input.read_utf().unwrap(), "lobby");
        assert_eq!(input.read_int().unwrap(), 2);
        assert_eq!(input.read_utf().unwrap(), "alice");
        assert_eq!(input.read_utf().unwrap(), "bob");
        assert_eq!(input.read_bytes().unwrap(), vec![0xde, 0xad]);
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_readers_are_independent() {
        let message = ReceivedMessage::new("MovePlayers", "hub", sample_payload());

        let mut first = message.data_input();
        assert_eq!(first.read_utf().unwrap(), "lobby");
        assert_eq!(first.read_int().unwrap(), 2);

        // A second cursor starts from the beginning regardless of the first
        let copy = message.clone();
        let mut second = copy.data_input();
        assert_eq!(second.read_utf().unwrap(), "lobby");
        assert_eq!(first.read_utf().unwrap(), "alice");
    }

    #[test]
    fn test_reading_past_end_is_malformed() {
        let mut writer = MessageWriter::new();
        writer.write_int(7);
        let message = ReceivedMessage::new("chat", "hub", writer.into_bytes());

        let mut input = message.data_input();
        assert_eq!(input.read_int().unwrap(), 7);
        let err = input.read_utf().unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedPayload(_)));
    }

    #[test]
    fn test_truncated_string_body() {
        // Declares 10 bytes but only carries 3
        let payload = vec![0x00, 0x0a, b'a', b'b', b'c'];
        let message = ReceivedMessage::new("chat", "hub", payload);

        assert!(message.data_input().read_utf().is_err());
    }

    #[test]
    fn test_negative_byte_block_length() {
        let mut writer = MessageWriter::new();
        writer.write_int(-1);
        let message = ReceivedMessage::new("chat", "hub", writer.into_bytes());

        assert!(message.data_input().read_bytes().is_err());
    }

    #[test]
    fn test_oversized_string_rejected() {
        let huge = "x".repeat(u16::MAX as usize + 1);
        let mut writer = MessageWriter::new();

        assert!(matches!(
            writer.write_utf(&huge),
            Err(ExchangeError::PayloadTooLarge(_))
        ));
        assert!(writer.is_empty());
    }
}
