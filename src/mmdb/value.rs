//! MaxMind DB data section types and their encoding.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Type numbers of the data section encoding.
mod type_num {
    pub const UTF8_STRING: u8 = 2;
    pub const UINT16: u8 = 5;
    pub const UINT32: u8 = 6;
    pub const MAP: u8 = 7;
    pub const UINT64: u8 = 9;
    pub const ARRAY: u8 = 11;
    pub const BOOLEAN: u8 = 14;
}

/// Largest payload size expressible in a control byte sequence.
const MAX_SIZE: usize = 65_821 + 0x00ff_ffff;

/// A value stored in the data section.
///
/// Maps use a `BTreeMap` so the same value always encodes to the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Map(BTreeMap<String, Value>),
    String(String),
    Bool(bool),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Array(Vec<Value>),
}

impl Value {
    /// Build a map from key/value pairs.
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Append the encoded value to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Value::Map(map) => {
                write_control(buf, type_num::MAP, map.len())?;
                for (key, value) in map {
                    write_string(buf, key)?;
                    value.encode(buf)?;
                }
            }
            Value::String(s) => write_string(buf, s)?,
            Value::Bool(b) => write_control(buf, type_num::BOOLEAN, *b as usize)?,
            Value::Uint16(v) => write_uint(buf, type_num::UINT16, &v.to_be_bytes())?,
            Value::Uint32(v) => write_uint(buf, type_num::UINT32, &v.to_be_bytes())?,
            Value::Uint64(v) => write_uint(buf, type_num::UINT64, &v.to_be_bytes())?,
            Value::Array(items) => {
                write_control(buf, type_num::ARRAY, items.len())?;
                for item in items {
                    item.encode(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    write_control(buf, type_num::UTF8_STRING, s.len())?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Write an unsigned integer with leading zero bytes stripped.
fn write_uint(buf: &mut Vec<u8>, type_num: u8, be_bytes: &[u8]) -> Result<()> {
    let skip = be_bytes.iter().take_while(|b| **b == 0).count();
    let significant = &be_bytes[skip..];
    write_control(buf, type_num, significant.len())?;
    buf.extend_from_slice(significant);
    Ok(())
}

/// Write the control byte, the extended type byte and the size extension.
fn write_control(buf: &mut Vec<u8>, type_num: u8, size: usize) -> Result<()> {
    if size > MAX_SIZE {
        return Err(Error::Writer(format!(
            "data value too large: {} elements/bytes",
            size
        )));
    }

    let (size_bits, extension): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };

    if type_num <= 7 {
        buf.push((type_num << 5) | size_bits);
    } else {
        buf.push(size_bits);
        buf.push(type_num - 7);
    }
    buf.extend_from_slice(&extension);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_short_string() {
        let bytes = Value::from("US").to_bytes().unwrap();
        assert_eq!(bytes, vec![0x42, b'U', b'S']);
    }

    #[test]
    fn test_encode_size_extensions() {
        let s = "a".repeat(29);
        let bytes = Value::from(s.as_str()).to_bytes().unwrap();
        assert_eq!(&bytes[..2], &[0x5d, 0x00]);
        assert_eq!(bytes.len(), 2 + 29);

        let s = "a".repeat(300);
        let bytes = Value::from(s.as_str()).to_bytes().unwrap();
        assert_eq!(&bytes[..3], &[0x5e, 0x00, 15]);

        let s = "a".repeat(70_000);
        let bytes = Value::from(s.as_str()).to_bytes().unwrap();
        let rest = 70_000 - 65_821;
        assert_eq!(
            &bytes[..4],
            &[0x5f, (rest >> 16) as u8, (rest >> 8) as u8, rest as u8]
        );
    }

    #[test]
    fn test_encode_extended_types() {
        assert_eq!(Value::Bool(true).to_bytes().unwrap(), vec![0x01, 0x07]);
        assert_eq!(Value::Bool(false).to_bytes().unwrap(), vec![0x00, 0x07]);
        assert_eq!(
            Value::Uint64(1_700_000_000).to_bytes().unwrap(),
            vec![0x04, 0x02, 0x65, 0x53, 0xf1, 0x00]
        );
        assert_eq!(
            Value::Array(vec![Value::from("en")]).to_bytes().unwrap(),
            vec![0x01, 0x04, 0x42, b'e', b'n']
        );
    }

    #[test]
    fn test_encode_integers() {
        assert_eq!(Value::Uint16(0).to_bytes().unwrap(), vec![0xa0]);
        assert_eq!(Value::Uint16(28).to_bytes().unwrap(), vec![0xa1, 28]);
        assert_eq!(
            Value::Uint32(0x0102).to_bytes().unwrap(),
            vec![0xc2, 0x01, 0x02]
        );
    }

    #[test]
    fn test_encode_nested_map() {
        let record = Value::map([("country", Value::map([("iso_code", Value::from("US"))]))]);
        let bytes = record.to_bytes().unwrap();

        let mut expected = vec![0xe1, 0x47];
        expected.extend_from_slice(b"country");
        expected.extend_from_slice(&[0xe1, 0x48]);
        expected.extend_from_slice(b"iso_code");
        expected.extend_from_slice(&[0x42, b'U', b'S']);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_map_encoding_is_order_independent() {
        let a = Value::map([("b", Value::Uint16(1)), ("a", Value::Uint16(2))]);
        let b = Value::map([("a", Value::Uint16(2)), ("b", Value::Uint16(1))]);
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }
}
