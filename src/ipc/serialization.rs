//! msgpack serialization for the engine protocol.
//!
//! Wire format: back-to-back msgpack values with no length prefix. Each
//! message is the two-element array `[code, body]`, where `body` is a map of
//! named fields.

use rmpv::Value;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::ipc::codes::MessageCode;

/// Encode one message, with struct fields written as named map entries.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(message)?)
}

/// Convert a decoded value into a typed one.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(rmp_serde::from_slice(&encode(value)?)?)
}

/// A protocol message: type code plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub code: MessageCode,
    pub body: Value,
}

impl Envelope {
    /// Build a message from any serializable body.
    pub fn new<T: Serialize>(code: MessageCode, body: &T) -> Result<Self> {
        let bytes = encode(body)?;
        Ok(Self {
            code,
            body: rmpv::decode::read_value(&mut bytes.as_slice())?,
        })
    }

    /// Parse a decoded `[code, body]` value.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut items = match value {
            Value::Array(items) if items.len() == 2 => items,
            other => {
                return Err(Error::InvalidMessage(format!(
                    "expected [code, body], got {}",
                    other
                )))
            }
        };

        let body = items.pop().unwrap_or(Value::Nil);
        let code = items
            .pop()
            .and_then(|c| c.as_u64())
            .and_then(|c| u8::try_from(c).ok())
            .ok_or_else(|| Error::InvalidMessage("message code is not a byte".into()))?;

        Ok(Self {
            code: MessageCode::try_from(code)?,
            body,
        })
    }

    /// Deserialize the body into a typed value.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T> {
        from_value(&self.body)
    }

    /// Look up a field of a map body by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body
            .as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (self.code.code(), &self.body).serialize(serializer)
    }
}

/// Messages decoded from one receive buffer, in arrival order.
///
/// Decoding is lazy. A truncated or malformed value yields one error and
/// ends the sequence.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    buf: Vec<u8>,
    pos: usize,
    failed: bool,
}

impl Messages {
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// True when nothing is left to decode.
    pub fn is_empty(&self) -> bool {
        self.failed || self.pos >= self.buf.len()
    }

    /// Bytes not yet decoded.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    /// Decode each message into `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> impl Iterator<Item = Result<T>> {
        self.map(|value| value.and_then(|v| from_value(&v)))
    }

    /// Decode each message as an [`Envelope`].
    pub fn envelopes(self) -> impl Iterator<Item = Result<Envelope>> {
        self.map(|value| value.and_then(Envelope::from_value))
    }
}

impl Iterator for Messages {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() {
            return None;
        }

        let mut cursor = &self.buf[self.pos..];
        let before = cursor.len();
        match rmpv::decode::read_value(&mut cursor) {
            Ok(value) => {
                self.pos += before - cursor.len();
                Some(Ok(value))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e.into()))
            }
        }
    }
}
