//! PDF object serialization.
//!
//! Serializes generic [`Object`] values to their byte representation.
//! Dictionaries are written in insertion order so custom keys keep their
//! source position. When a [`CryptInfo`] and an owning reference are given,
//! strings and stream payloads are encrypted on the way out.

use crate::crypt::CryptInfo;
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectId};
use crate::scanner::is_regular_char;
use std::io::Write;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer;

struct Encrypting<'a> {
    crypt: &'a CryptInfo,
    owner: ObjectId,
}

impl ObjectSerializer {
    /// Create a new object serializer.
    pub fn new() -> Self {
        Self
    }

    /// Serialize a value.
    ///
    /// `owner` is the reference of the indirect object the value belongs to;
    /// encryption only happens when both `owner` and `crypt` are present.
    pub fn serialize(
        &self,
        obj: &Object,
        owner: Option<ObjectId>,
        crypt: Option<&CryptInfo>,
    ) -> Result<Vec<u8>> {
        let encrypting = match (crypt, owner) {
            (Some(crypt), Some(owner)) => Some(Encrypting { crypt, owner }),
            _ => None,
        };
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj, encrypting.as_ref())?;
        Ok(buf)
    }

    /// Serialize a value to a string (for debugging and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        let mut buf = Vec::new();
        match self.write_object(&mut buf, obj, None) {
            Ok(()) => String::from_utf8_lossy(&buf).to_string(),
            Err(e) => format!("<unserializable: {}>", e),
        }
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\r\n{object}\r\nendobj\r\n`
    pub fn serialize_indirect(
        &self,
        id: ObjectId,
        obj: &Object,
        crypt: Option<&CryptInfo>,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        write!(buf, "{} {} obj\r\n", id.id, id.generation)?;
        buf.extend_from_slice(&self.serialize(obj, Some(id), crypt)?);
        buf.extend_from_slice(b"\r\nendobj\r\n");
        Ok(buf)
    }

    fn write_object<W: Write>(&self, w: &mut W, obj: &Object, enc: Option<&Encrypting<'_>>) -> Result<()> {
        match obj {
            Object::Null => write!(w, "null")?,
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" })?,
            Object::Integer(i) => write!(w, "{}", i)?,
            Object::Real(r) => self.write_real(w, *r)?,
            Object::String(s) => match enc {
                Some(enc) => {
                    let encrypted = enc.crypt.encrypt_string(s, enc.owner)?;
                    self.write_string(w, &encrypted)?
                },
                None => self.write_string(w, s)?,
            },
            Object::Name(n) => self.write_name(w, n)?,
            Object::Array(arr) => self.write_array(w, arr, enc)?,
            Object::Dictionary(dict) => self.write_dictionary(w, dict, enc)?,
            Object::Stream { dict, data } => self.write_stream(w, dict, data, enc)?,
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.generation)?,
        }
        Ok(())
    }

    /// Write a real number with appropriate precision.
    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> std::io::Result<()> {
        if value.fract() == 0.0 {
            write!(w, "{}", value as i64)
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            match trimmed {
                "-0" | "" => write!(w, "0"),
                _ => write!(w, "{}", trimmed),
            }
        }
    }

    /// Write a PDF string.
    ///
    /// Uses literal string syntax `(...)` with proper escaping,
    /// or hex string syntax `<...>` for binary data.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> std::io::Result<()> {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            write!(w, "(")?;
            for &byte in data {
                match byte {
                    b'(' => write!(w, "\\(")?,
                    b')' => write!(w, "\\)")?,
                    b'\\' => write!(w, "\\\\")?,
                    b'\n' => write!(w, "\\n")?,
                    b'\r' => write!(w, "\\r")?,
                    b'\t' => write!(w, "\\t")?,
                    _ => w.write_all(&[byte])?,
                }
            }
            write!(w, ")")
        } else {
            write!(w, "<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            write!(w, ">")
        }
    }

    /// Write a PDF name.
    ///
    /// The stored leading slash is written once. Existing `#xx` escapes are
    /// kept as they are; other bytes outside the regular printable range
    /// are escaped.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> std::io::Result<()> {
        write!(w, "/")?;
        for byte in name.strip_prefix('/').unwrap_or(name).bytes() {
            if (0x21..=0x7E).contains(&byte) && is_regular_char(byte) {
                w.write_all(&[byte])?;
            } else {
                write!(w, "#{:02X}", byte)?;
            }
        }
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object], enc: Option<&Encrypting<'_>>) -> Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj, enc)?;
        }
        write!(w, "]")?;
        Ok(())
    }

    fn write_dictionary<W: Write>(
        &self,
        w: &mut W,
        dict: &Dictionary,
        enc: Option<&Encrypting<'_>>,
    ) -> Result<()> {
        write!(w, "<<")?;
        for (key, value) in dict {
            write!(w, " ")?;
            self.write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, value, enc)?;
        }
        write!(w, " >>")?;
        Ok(())
    }

    fn write_stream<W: Write>(
        &self,
        w: &mut W,
        dict: &Dictionary,
        data: &[u8],
        enc: Option<&Encrypting<'_>>,
    ) -> Result<()> {
        let payload = match enc {
            Some(enc) => enc.crypt.encrypt_stream(data, enc.owner)?,
            None => data.to_vec(),
        };
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("/Length".to_string(), Object::Integer(payload.len() as i64));

        self.write_dictionary(w, &dict_with_length, enc)?;
        w.write_all(b"\r\nstream\r\n")?;
        w.write_all(&payload)?;
        w.write_all(b"\r\nendstream")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::DataCryptor;
    use std::sync::Arc;

    struct Rot1;

    impl DataCryptor for Rot1 {
        fn encrypt(&self, data: &[u8], _reference: ObjectId) -> Result<Vec<u8>> {
            Ok(data.iter().map(|b| b.wrapping_add(1)).collect())
        }

        fn decrypt(&self, data: &[u8], _reference: ObjectId) -> Result<Vec<u8>> {
            Ok(data.iter().map(|b| b.wrapping_sub(1)).collect())
        }
    }

    fn s(obj: &Object) -> String {
        ObjectSerializer::new().serialize_to_string(obj)
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(s(&Object::Null), "null");
        assert_eq!(s(&Object::Boolean(true)), "true");
        assert_eq!(s(&Object::Integer(-123)), "-123");
        assert_eq!(s(&Object::Real(3.14258)), "3.14258");
        assert_eq!(s(&Object::Real(1.0)), "1");
        assert_eq!(s(&Object::Real(0.5)), "0.5");
    }

    #[test]
    fn test_serialize_string() {
        assert_eq!(s(&Object::String(b"Test (parens)".to_vec())), "(Test \\(parens\\))");
        assert_eq!(s(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_serialize_name_keeps_single_slash() {
        assert_eq!(s(&Object::Name("/Type".into())), "/Type");
        assert_eq!(s(&Object::Name("/A#20B".into())), "/A#20B");
        assert_eq!(s(&Object::Name("/Name With Space".into())), "/Name#20With#20Space");
    }

    #[test]
    fn test_serialize_dictionary_in_insertion_order() {
        let mut dict = Dictionary::new();
        dict.insert("/Type".into(), Object::name("Page"));
        dict.insert("/Count".into(), Object::Integer(1));
        dict.insert("/Kids".into(), Object::Array(vec![Object::Reference(ObjectId::new(4, 0))]));
        assert_eq!(s(&Object::Dictionary(dict)), "<< /Type /Page /Count 1 /Kids [4 0 R] >>");
    }

    #[test]
    fn test_serialize_indirect_layout() {
        let bytes = ObjectSerializer::new()
            .serialize_indirect(ObjectId::new(7, 2), &Object::Integer(42), None)
            .unwrap();
        assert_eq!(bytes, b"7 2 obj\r\n42\r\nendobj\r\n");
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let mut dict = Dictionary::new();
        dict.insert("/Length".into(), Object::Integer(999));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"stream data"),
        };
        assert_eq!(s(&stream), "<< /Length 11 >>\r\nstream\r\nstream data\r\nendstream");
    }

    #[test]
    fn test_encryption_applies_to_owner_only() {
        let crypt = CryptInfo {
            reference: Some(ObjectId::new(9, 0)),
            string_cryptor: Some(Arc::new(Rot1)),
            stream_cryptor: Some(Arc::new(Rot1)),
        };
        let serializer = ObjectSerializer::new();
        let value = Object::String(b"abc".to_vec());
        let out = serializer.serialize(&value, Some(ObjectId::new(3, 0)), Some(&crypt)).unwrap();
        assert_eq!(out, b"(bcd)");
        let plain = serializer.serialize(&value, Some(ObjectId::new(9, 0)), Some(&crypt)).unwrap();
        assert_eq!(plain, b"(abc)");
        let no_owner = serializer.serialize(&value, None, Some(&crypt)).unwrap();
        assert_eq!(no_owner, b"(abc)");
    }
}
