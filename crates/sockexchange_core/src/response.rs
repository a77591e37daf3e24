//! Correlated response envelopes.

use crate::error::ExchangeError;
use crate::message::MessageReader;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome tag carried by a [`ResponseMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseStatus {
    Ok,
    Error,
    /// Synthesized by the registry sweep when no reply arrived in time
    TimedOut,
    ServerNotFound,
    ServerOffline,
    /// Synthesized when a caller gives up on a request explicitly
    Cancelled,
}

impl ResponseStatus {
    /// Single-byte wire code for this status.
    pub fn code(self) -> u8 {
        match self {
            ResponseStatus::Ok => 0,
            ResponseStatus::Error => 1,
            ResponseStatus::TimedOut => 2,
            ResponseStatus::ServerNotFound => 3,
            ResponseStatus::ServerOffline => 4,
            ResponseStatus::Cancelled => 5,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, ExchangeError> {
        match code {
            0 => Ok(ResponseStatus::Ok),
            1 => Ok(ResponseStatus::Error),
            2 => Ok(ResponseStatus::TimedOut),
            3 => Ok(ResponseStatus::ServerNotFound),
            4 => Ok(ResponseStatus::ServerOffline),
            5 => Ok(ResponseStatus::Cancelled),
            other => Err(ExchangeError::UnknownStatus(other)),
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResponseStatus::Ok
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseStatus::Ok => "OK",
            ResponseStatus::Error => "ERROR",
            ResponseStatus::TimedOut => "TIMED_OUT",
            ResponseStatus::ServerNotFound => "SERVER_NOT_FOUND",
            ResponseStatus::ServerOffline => "SERVER_OFFLINE",
            ResponseStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// A reply delivered to the callback of a pending expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    status: ResponseStatus,
    payload: Option<Vec<u8>>,
}

impl ResponseMessage {
    /// A response carrying only a status.
    pub fn new(status: ResponseStatus) -> Self {
        Self { status, payload: None }
    }

    /// A response carrying a status and an encoded payload.
    ///
    /// An empty payload is stored as no payload, matching the wire form where
    /// both are a bare status byte.
    pub fn with_payload(status: ResponseStatus, payload: Vec<u8>) -> Self {
        Self {
            status,
            payload: (!payload.is_empty()).then_some(payload),
        }
    }

    pub fn timed_out() -> Self {
        Self::new(ResponseStatus::TimedOut)
    }

    pub fn cancelled() -> Self {
        Self::new(ResponseStatus::Cancelled)
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Reader over the payload; empty when the response carries none.
    pub fn data_input(&self) -> MessageReader<'_> {
        MessageReader::new(self.payload.as_deref().unwrap_or(&[]))
    }

    /// Decodes a response from its wire form: status byte followed by payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ExchangeError> {
        let (&code, rest) = bytes
            .split_first()
            .ok_or_else(|| ExchangeError::MalformedPayload("empty response".to_string()))?;
        let status = ResponseStatus::from_code(code)?;

        Ok(Self::with_payload(status, rest.to_vec()))
    }

    /// Encodes the response to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.as_ref().map_or(0, Vec::len));
        out.push(self.status.code());
        if let Some(payload) = &self.payload {
            out.extend_from_slice(payload);
        }
        out
    }
}
