//! The serializer.
//!
//! This maps the serde data model back into the manifest format. Only
//! flat maps and structs with line-representable values are accepted;
//! everything else is rejected rather than silently mangled.

use serde::ser::{self, Impossible, Serialize};

use super::{Error, Result};

/// The main serializer.
pub struct Serializer {
    output: String,
}

/// Serializer for values, producing the right-hand side of one line.
struct ValueSerializer;

/// Serializer for map entries.
pub struct MapSerializer<'a> {
    ser: &'a mut Serializer,
    key: Option<String>,
}

/// Serializer for struct fields.
pub struct StructSerializer<'a> {
    ser: &'a mut Serializer,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn write_line(&mut self, key: &str, value: &str) {
        self.output.push_str(key);
        self.output.push_str(": ");
        self.output.push_str(value);
        self.output.push('\n');
    }
}

fn value_to_string<T>(value: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    value.serialize(ValueSerializer)
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Impossible<(), Error>;
    type SerializeTuple = Impossible<(), Error>;
    type SerializeTupleStruct = Impossible<(), Error>;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = MapSerializer<'a>;
    type SerializeStruct = StructSerializer<'a>;
    type SerializeStructVariant = Impossible<(), Error>;

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(MapSerializer {
            ser: self,
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Ok(StructSerializer { ser: self })
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<()> {
        Err(Error::Unexpected("top-level boolean"))
    }

    fn serialize_i8(self, _v: i8) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_i16(self, _v: i16) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_i32(self, _v: i32) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_i64(self, _v: i64) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_u8(self, _v: u8) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_u16(self, _v: u16) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_u32(self, _v: u32) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_u64(self, _v: u64) -> Result<()> {
        Err(Error::Unexpected("top-level integer"))
    }

    fn serialize_f32(self, _v: f32) -> Result<()> {
        Err(Error::FloatUnsupported)
    }

    fn serialize_f64(self, _v: f64) -> Result<()> {
        Err(Error::FloatUnsupported)
    }

    fn serialize_char(self, _v: char) -> Result<()> {
        Err(Error::Unexpected("top-level character"))
    }

    fn serialize_str(self, _v: &str) -> Result<()> {
        Err(Error::Unexpected("top-level string"))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<()> {
        Err(Error::Unsupported("Byte sequence"))
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::NoneUnsupported)
    }

    fn serialize_some<T>(self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        Err(Error::Unsupported("Unit"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Err(Error::Unsupported("Unit"))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<()> {
        Err(Error::Unexpected("top-level enum"))
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        Err(Error::Unsupported("Enum variant with data"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::Unsupported("Enum variant with data"))
    }
}

impl<'a> ser::SerializeMap for MapSerializer<'a> {
    type Ok = ();
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.key = Some(value_to_string(key)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self.key.take().ok_or(Error::Unexpected("value without key"))?;
        let value = value_to_string(value)?;
        self.ser.write_line(&key, &value);
        Ok(())
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for StructSerializer<'a> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value = value_to_string(value)?;
        self.ser.write_line(key, &value);
        Ok(())
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::Serializer for ValueSerializer {
    type Ok = String;
    type Error = Error;

    type SerializeSeq = Impossible<String, Error>;
    type SerializeTuple = Impossible<String, Error>;
    type SerializeTupleStruct = Impossible<String, Error>;
    type SerializeTupleVariant = Impossible<String, Error>;
    type SerializeMap = Impossible<String, Error>;
    type SerializeStruct = Impossible<String, Error>;
    type SerializeStructVariant = Impossible<String, Error>;

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_owned())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_bool(self, v: bool) -> Result<String> {
        Ok(if v { "1" } else { "0" }.to_owned())
    }

    fn serialize_u8(self, v: u8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, _v: i8) -> Result<String> {
        Err(Error::Unsupported("Signed integer"))
    }

    fn serialize_i16(self, _v: i16) -> Result<String> {
        Err(Error::Unsupported("Signed integer"))
    }

    fn serialize_i32(self, _v: i32) -> Result<String> {
        Err(Error::Unsupported("Signed integer"))
    }

    fn serialize_i64(self, _v: i64) -> Result<String> {
        Err(Error::Unsupported("Signed integer"))
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(Error::FloatUnsupported)
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(Error::FloatUnsupported)
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(Error::Unsupported("Byte sequence"))
    }

    fn serialize_none(self) -> Result<String> {
        Err(Error::NoneUnsupported)
    }

    fn serialize_some<T>(self, value: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(Error::Unsupported("Unit"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(Error::Unsupported("Unit"))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_owned())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        Err(Error::Unsupported("Enum variant with data"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::Unsupported("Sequence"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::NestedMapUnsupported)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(Error::NestedMapUnsupported)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::NestedMapUnsupported)
    }
}
