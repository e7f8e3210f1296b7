//! Bencode value type

use std::collections::BTreeMap;

use crate::error::{Result, TorrentError};

/// Bencode dictionary, ordered by raw key bytes
pub type Dictionary = BTreeMap<Vec<u8>, Value>;

/// A decoded bencode value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    ByteString(Vec<u8>),
    List(Vec<Value>),
    Dictionary(Dictionary),
}

impl Value {
    /// Decode a value starting at the first byte. Trailing bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Value> {
        let (value, end) = super::decode(data, 0)?;
        if end != data.len() {
            tracing::trace!("Ignoring {} trailing bytes after bencode value", data.len() - end);
        }
        Ok(value)
    }

    /// Encode this value in canonical form
    pub fn to_bytes(&self) -> Vec<u8> {
        super::encode(self)
    }

    /// Human-readable name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::ByteString(_) => "byte string",
            Value::List(_) => "list",
            Value::Dictionary(_) => "dictionary",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteString(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string contents, if they are valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key.as_bytes()))
    }

    /// Require this value to be a dictionary
    pub fn expect_dict(&self, context: &str) -> Result<&Dictionary> {
        self.as_dict()
            .ok_or_else(|| TorrentError::type_mismatch(context, "dictionary", self.kind()))
    }

    /// Render as JSON. Byte strings become (lossy) UTF-8 strings and
    /// dictionary keys keep their sorted order.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::ByteString(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Dictionary(dict) => {
                let map = dict
                    .iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(map)
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::ByteString(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::ByteString(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Dictionary> for Value {
    fn from(d: Dictionary) -> Self {
        Value::Dictionary(d)
    }
}
