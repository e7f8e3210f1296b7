//! Canonical bencode encoder

use bytes::{BufMut, BytesMut};

use super::value::Value;

/// Encode a value. Dictionary keys are emitted in byte-lexicographic order.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.to_vec()
}

/// Append the encoding of `value` to `buf`
pub fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        Value::ByteString(bytes) => put_byte_string(buf, bytes),
        Value::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        Value::Dictionary(dict) => {
            buf.put_u8(b'd');
            // BTreeMap iterates in key order
            for (key, item) in dict {
                put_byte_string(buf, key);
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_byte_string(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}
