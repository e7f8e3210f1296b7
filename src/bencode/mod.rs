//! Bencode codec
//!
//! Decodes and encodes the bencode format used by `.torrent` files and
//! tracker responses. Dictionaries keep their keys sorted so that encoding
//! is always canonical.

pub mod decode;
pub mod encode;
pub mod value;

pub use decode::{decode, MAX_DEPTH};
pub use encode::encode;
pub use value::{Dictionary, Value};
