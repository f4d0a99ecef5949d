//! The deserializer.
//!
//! This maps the manifest format into the serde data model. The format
//! is line-oriented, so the deserializer is little more than a cursor
//! that repeatedly splits off `Key: Value` lines: keys are everything
//! before the first colon, values everything after it to the end of
//! the line.

use serde::de::{DeserializeSeed, IntoDeserializer, MapAccess, Visitor};
use serde::{de, forward_to_deserialize_any};

use super::{Error, Result};

/// The main deserializer.
///
/// Only a top-level map (or struct) can be deserialized from a
/// manifest; it doubles as its own [`MapAccess`].
pub struct Deserializer<'de> {
    input: &'de str,
}

/// Deserializer for the value part of one line.
pub struct ValueDeserializer<'a, 'de: 'a>(&'a mut Deserializer<'de>);

impl<'de> Deserializer<'de> {
    pub fn from_str(input: &'de str) -> Self {
        Deserializer { input }
    }

    /// Skips blank space, including newlines.
    fn skip_blank(&mut self) {
        self.input = self
            .input
            .trim_start_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'));
    }

    /// Returns everything up to the end of the current line without
    /// consuming it.
    fn peek_line(&self) -> &'de str {
        match self.input.find(['\r', '\n']) {
            Some(eol) => &self.input[..eol],
            None => self.input,
        }
    }

    /// Consumes and returns the rest of the current line.
    fn take_line(&mut self) -> &'de str {
        let line = self.peek_line();
        self.input = &self.input[line.len()..];
        line
    }

    /// Consumes the key of the current line, leaving the cursor on the
    /// colon.
    fn take_key(&mut self) -> Result<&'de str> {
        let line = self.peek_line();
        let colon = line.find(':').ok_or(Error::ExpectedColon)?;

        let key = &line[..colon];
        self.input = &self.input[colon..];
        Ok(key)
    }

    /// Consumes the colon after a key, plus the blank space that
    /// conventionally follows it.
    fn take_colon(&mut self) -> Result<()> {
        match self.input.strip_prefix(':') {
            Some(rest) => {
                self.input = rest;
                self.skip_blank();
                Ok(())
            }
            None if self.input.is_empty() => Err(Error::UnexpectedEof),
            None => Err(Error::ExpectedColon),
        }
    }

    /// Parses a decimal integer value.
    ///
    /// The fields using this are all sizes, so a sign is rejected
    /// outright rather than parsed and range-checked.
    fn parse_unsigned(&mut self) -> Result<u64> {
        let line = self.peek_line();

        if line.starts_with('-') || line.starts_with('+') {
            return Err(Error::NotANonNegativeInteger(line.to_string()));
        }

        let end = line
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(line.len());
        if end == 0 {
            return Err(Error::ExpectedInteger);
        }
        let digits = &line[..end];

        let mut value: u64 = 0;
        for digit in digits.bytes() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit - b'0')))
                .ok_or(Error::ExpectedInteger)?;
        }

        self.input = &self.input[digits.len()..];
        Ok(value)
    }

    /// Parses a `1`/`0` boolean value.
    fn parse_bool(&mut self) -> Result<bool> {
        let value = match self.input.as_bytes().first() {
            Some(b'1') => true,
            Some(b'0') => false,
            _ => return Err(Error::ExpectedBoolean),
        };

        self.input = &self.input[1..];
        Ok(value)
    }
}

impl<'de, 'a> de::Deserializer<'de> for &'a mut Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        // top level must be a map
        self.deserialize_map(visitor)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char
        bytes byte_buf option unit unit_struct newtype_struct seq tuple tuple_struct
        enum ignored_any
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(self)
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.skip_blank();
        visitor.visit_borrowed_str(self.take_key()?)
    }

    // Keys are the only strings ever read at the top level.
    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_identifier(visitor)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_identifier(visitor)
    }
}

impl<'de> MapAccess<'de> for Deserializer<'de> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        self.skip_blank();

        if self.input.is_empty() {
            return Ok(None);
        }

        seed.deserialize(&mut *self).map(Some)
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        self.take_colon()?;
        seed.deserialize(&mut ValueDeserializer(self))
    }
}

/// Generates rejections for value types the format cannot carry.
macro_rules! unsupported_value {
    ($($method:ident => $err:expr,)*) => {
        $(
            fn $method<V>(self, _visitor: V) -> Result<V::Value>
            where
                V: Visitor<'de>,
            {
                Err($err)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for &'a mut ValueDeserializer<'a, 'de> {
    type Error = Error;

    unsupported_value! {
        deserialize_i8 => Error::Unsupported("Signed integer"),
        deserialize_i16 => Error::Unsupported("Signed integer"),
        deserialize_i32 => Error::Unsupported("Signed integer"),
        deserialize_i64 => Error::Unsupported("Signed integer"),
        deserialize_f32 => Error::FloatUnsupported,
        deserialize_f64 => Error::FloatUnsupported,
        deserialize_char => Error::Unsupported("Char"),
        deserialize_bytes => Error::Unsupported("Byte sequence"),
        deserialize_byte_buf => Error::Unsupported("Byte buffer"),
        deserialize_unit => Error::Unsupported("Unit"),
        deserialize_seq => Error::Unsupported("Sequence"),
        deserialize_map => Error::NestedMapUnsupported,
        deserialize_identifier => Error::Unexpected("Identifier"),
    }

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_bool(self.0.parse_bool()?)
    }

    fn deserialize_u8<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let value = self.0.parse_unsigned()?;
        visitor.visit_u8(value.try_into().map_err(|_| Error::ExpectedInteger)?)
    }

    fn deserialize_u16<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let value = self.0.parse_unsigned()?;
        visitor.visit_u16(value.try_into().map_err(|_| Error::ExpectedInteger)?)
    }

    fn deserialize_u32<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let value = self.0.parse_unsigned()?;
        visitor.visit_u32(value.try_into().map_err(|_| Error::ExpectedInteger)?)
    }

    fn deserialize_u64<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_u64(self.0.parse_unsigned()?)
    }

    // only accepted in maps
    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_str(self.0.take_line().trim_start())
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        // in this format, if a key exists, then it must be Some
        visitor.visit_some(self)
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(self.0.take_line().into_deserializer())
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_any(visitor)
    }
}
