//! Recursive-descent bencode decoder
//!
//! Every function takes the input and a start offset and returns the decoded
//! value together with the offset just past the consumed token, so callers can
//! resume parsing where the value ended.

use tracing::trace;

use super::value::{Dictionary, Value};
use crate::error::{Result, TorrentError};

/// Maximum nesting of lists and dictionaries
pub const MAX_DEPTH: usize = 256;

/// Decode one value from `data` starting at `start`.
///
/// Returns the value and the offset immediately following it.
pub fn decode(data: &[u8], start: usize) -> Result<(Value, usize)> {
    decode_value(data, start, 0)
}

fn decode_value(data: &[u8], start: usize, depth: usize) -> Result<(Value, usize)> {
    let byte = *data
        .get(start)
        .ok_or_else(|| TorrentError::malformed_input(format!("unexpected end of input at offset {}", start)))?;

    match byte {
        b'i' => decode_integer(data, start),
        b'0'..=b'9' => decode_byte_string(data, start),
        b'l' | b'd' => {
            if depth >= MAX_DEPTH {
                return Err(TorrentError::malformed_input(format!(
                    "nesting deeper than {} levels at offset {}",
                    MAX_DEPTH, start
                )));
            }
            if byte == b'l' {
                decode_list(data, start, depth + 1)
            } else {
                decode_dictionary(data, start, depth + 1)
            }
        }
        other => Err(TorrentError::malformed_input(format!(
            "unexpected byte 0x{:02x} at offset {}",
            other, start
        ))),
    }
}

fn decode_integer(data: &[u8], start: usize) -> Result<(Value, usize)> {
    let body_start = start + 1;
    let end = data[body_start..]
        .iter()
        .position(|&b| b == b'e')
        .map(|p| body_start + p)
        .ok_or_else(|| TorrentError::malformed_input(format!("unterminated integer at offset {}", start)))?;

    let digits = &data[body_start..end];
    let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.iter().all(u8::is_ascii_digit) {
        return Err(TorrentError::malformed_input_with_source(
            format!("invalid integer at offset {}", start),
            String::from_utf8_lossy(digits).into_owned(),
        ));
    }

    // ASCII digits with an optional sign are valid UTF-8
    let text = std::str::from_utf8(digits).map_err(|e| {
        TorrentError::malformed_input_with_source(format!("invalid integer at offset {}", start), e.to_string())
    })?;
    let value = text.parse::<i64>().map_err(|e| {
        TorrentError::malformed_input_with_source(format!("integer out of range at offset {}", start), e.to_string())
    })?;

    Ok((Value::Integer(value), end + 1))
}

fn decode_byte_string(data: &[u8], start: usize) -> Result<(Value, usize)> {
    let colon = data[start..]
        .iter()
        .position(|&b| !b.is_ascii_digit())
        .map(|p| start + p)
        .filter(|&i| data[i] == b':')
        .ok_or_else(|| TorrentError::malformed_input(format!("missing ':' in byte string at offset {}", start)))?;

    let length = std::str::from_utf8(&data[start..colon])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| TorrentError::malformed_input(format!("invalid byte string length at offset {}", start)))?;

    let body_start = colon + 1;
    let available = data.len() - body_start;
    if available < length {
        return Err(TorrentError::malformed_input(format!(
            "byte string at offset {} declares {} bytes but only {} remain",
            start, length, available
        )));
    }

    let end = body_start + length;
    Ok((Value::ByteString(data[body_start..end].to_vec()), end))
}

fn decode_list(data: &[u8], start: usize, depth: usize) -> Result<(Value, usize)> {
    let mut items = Vec::new();
    let mut cursor = start + 1;

    loop {
        match data.get(cursor) {
            Some(b'e') => return Ok((Value::List(items), cursor + 1)),
            Some(_) => {
                let (item, next) = decode_value(data, cursor, depth)?;
                items.push(item);
                cursor = next;
            }
            None => {
                return Err(TorrentError::malformed_input(format!("unterminated list at offset {}", start)));
            }
        }
    }
}

fn decode_dictionary(data: &[u8], start: usize, depth: usize) -> Result<(Value, usize)> {
    let mut dict = Dictionary::new();
    let mut cursor = start + 1;

    loop {
        match data.get(cursor) {
            Some(b'e') => return Ok((Value::Dictionary(dict), cursor + 1)),
            Some(_) => {
                let (key, after_key) = decode_value(data, cursor, depth)?;
                let key = match key {
                    Value::ByteString(k) => k,
                    other => {
                        return Err(TorrentError::type_mismatch(
                            format!("dictionary key at offset {}", cursor),
                            "byte string",
                            other.kind(),
                        ));
                    }
                };

                let (value, next) = decode_value(data, after_key, depth)?;
                if dict.contains_key(&key) {
                    return Err(TorrentError::malformed_input(format!(
                        "duplicate dictionary key '{}' at offset {}",
                        String::from_utf8_lossy(&key),
                        cursor
                    )));
                }
                trace!("Decoded dictionary key '{}'", String::from_utf8_lossy(&key));
                dict.insert(key, value);
                cursor = next;
            }
            None => {
                return Err(TorrentError::malformed_input(format!("unterminated dictionary at offset {}", start)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode;

    fn decode_all(data: &[u8]) -> Result<Value> {
        let (value, end) = decode(data, 0)?;
        assert_eq!(end, data.len());
        Ok(value)
    }

    fn is_malformed(result: Result<(Value, usize)>) -> bool {
        matches!(result, Err(TorrentError::MalformedInput { .. }))
    }

    #[test]
    fn test_decode_byte_string() {
        assert_eq!(decode_all(b"4:spam").unwrap(), Value::from("spam"));
        assert_eq!(decode_all(b"0:").unwrap(), Value::ByteString(Vec::new()));
    }

    #[test]
    fn test_decode_binary_byte_string() {
        let data = [b'3', b':', 0x00, 0xff, 0x13];
        assert_eq!(decode_all(&data).unwrap(), Value::ByteString(vec![0x00, 0xff, 0x13]));
    }

    #[test]
    fn test_decode_integer() {
        assert_eq!(decode_all(b"i52e").unwrap(), Value::Integer(52));
        assert_eq!(decode_all(b"i-52e").unwrap(), Value::Integer(-52));
        assert_eq!(decode_all(b"i0e").unwrap(), Value::Integer(0));
        assert_eq!(
            decode_all(b"i9223372036854775807e").unwrap(),
            Value::Integer(i64::MAX)
        );
    }

    #[test]
    fn test_decode_list() {
        assert_eq!(
            decode_all(b"l4:spami52ee").unwrap(),
            Value::List(vec![Value::from("spam"), Value::Integer(52)])
        );
        assert_eq!(decode_all(b"le").unwrap(), Value::List(Vec::new()));
    }

    #[test]
    fn test_decode_dictionary() {
        let value = decode_all(b"d3:cow3:moo4:spam4:eggse").unwrap();
        assert_eq!(value.get("cow"), Some(&Value::from("moo")));
        assert_eq!(value.get("spam"), Some(&Value::from("eggs")));
        assert_eq!(value.as_dict().unwrap().len(), 2);
    }

    #[test]
    fn test_decode_nested() {
        let value = decode_all(b"d4:listl1:ai1eee").unwrap();
        assert_eq!(
            value.get("list"),
            Some(&Value::List(vec![Value::from("a"), Value::Integer(1)]))
        );
    }

    #[test]
    fn test_decode_returns_end_offset() {
        let data = b"i1e4:spamXYZ";
        let (first, next) = decode(data, 0).unwrap();
        assert_eq!(first, Value::Integer(1));
        assert_eq!(next, 3);
        let (second, end) = decode(data, next).unwrap();
        assert_eq!(second, Value::from("spam"));
        assert_eq!(end, 9);
    }

    #[test]
    fn test_decode_truncated_byte_string() {
        assert!(is_malformed(decode(b"5:ab", 0)));
    }

    #[test]
    fn test_decode_unterminated_integer() {
        assert!(is_malformed(decode(b"i5x", 0)));
        assert!(is_malformed(decode(b"i52", 0)));
    }

    #[test]
    fn test_decode_invalid_integers() {
        assert!(is_malformed(decode(b"ie", 0)));
        assert!(is_malformed(decode(b"i-e", 0)));
        assert!(is_malformed(decode(b"i1-2e", 0)));
        assert!(is_malformed(decode(b"i99999999999999999999e", 0)));
    }

    #[test]
    fn test_decode_missing_colon() {
        assert!(is_malformed(decode(b"4spam", 0)));
        assert!(is_malformed(decode(b"12", 0)));
    }

    #[test]
    fn test_decode_bad_leading_byte() {
        assert!(is_malformed(decode(b"x", 0)));
        assert!(is_malformed(decode(b"", 0)));
        assert!(is_malformed(decode(b"i1e", 3)));
    }

    #[test]
    fn test_decode_unterminated_containers() {
        assert!(is_malformed(decode(b"l4:spam", 0)));
        assert!(is_malformed(decode(b"d3:cow3:moo", 0)));
        assert!(is_malformed(decode(b"d3:cowe", 0)));
    }

    #[test]
    fn test_decode_non_string_key() {
        let result = decode(b"di1e3:mooe", 0);
        assert!(matches!(result, Err(TorrentError::TypeMismatch { .. })));
    }

    #[test]
    fn test_decode_duplicate_key() {
        assert!(is_malformed(decode(b"d1:ai1e1:ai2ee", 0)));
    }

    #[test]
    fn test_decode_unsorted_keys_accepted() {
        let value = decode_all(b"d4:spam4:eggs3:cow3:mooe").unwrap();
        assert_eq!(encode(&value), b"d3:cow3:moo4:spam4:eggse".to_vec());
    }

    #[test]
    fn test_decode_depth_limit() {
        let mut deep = vec![b'l'; MAX_DEPTH + 1];
        deep.extend(vec![b'e'; MAX_DEPTH + 1]);
        assert!(is_malformed(decode(&deep, 0)));

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(vec![b'e'; MAX_DEPTH]);
        assert!(decode(&ok, 0).is_ok());
    }

    #[test]
    fn test_round_trip() {
        let mut info = Dictionary::new();
        info.insert(b"length".to_vec(), Value::Integer(-7));
        info.insert(b"pieces".to_vec(), Value::ByteString(vec![0, 1, 2, 255]));
        info.insert(
            b"nested".to_vec(),
            Value::List(vec![Value::List(Vec::new()), Value::Dictionary(Dictionary::new())]),
        );
        let value = Value::Dictionary(info);

        let (decoded, end) = decode(&encode(&value), 0).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(end, encode(&value).len());
    }
}
