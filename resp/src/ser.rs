use bytes::Bytes;
use serde::{ser, ser::Impossible, Serialize};

use crate::{Arg, Error, Result};

/// Render any serde-serializable scalar as a command [`Arg`].
///
/// The escape hatch for values that carry their own byte representation.
/// Only scalar shapes are accepted: sequences, maps, structs and enum
/// variants fail with [`Error::UnsupportedArgumentType`] naming the shape,
/// before any bytes reach the transport.
#[tracing::instrument(level = "trace", skip_all, err)]
pub fn to_arg<T>(value: &T) -> Result<Arg>
where
	T: Serialize + ?Sized,
{
	value.serialize(ArgSerializer)
}

struct ArgSerializer;

impl ser::Serializer for ArgSerializer {
	type Ok = Arg;
	type Error = Error;

	type SerializeSeq = Impossible<Arg, Error>;
	type SerializeTuple = Impossible<Arg, Error>;
	type SerializeTupleStruct = Impossible<Arg, Error>;
	type SerializeTupleVariant = Impossible<Arg, Error>;
	type SerializeMap = Impossible<Arg, Error>;
	type SerializeStruct = Impossible<Arg, Error>;
	type SerializeStructVariant = Impossible<Arg, Error>;

	fn serialize_bool(self, v: bool) -> Result<Arg> {
		Ok(Arg::Bool(v))
	}

	fn serialize_i8(self, v: i8) -> Result<Arg> {
		Ok(Arg::Int(v.into()))
	}

	fn serialize_i16(self, v: i16) -> Result<Arg> {
		Ok(Arg::Int(v.into()))
	}

	fn serialize_i32(self, v: i32) -> Result<Arg> {
		Ok(Arg::Int(v.into()))
	}

	fn serialize_i64(self, v: i64) -> Result<Arg> {
		Ok(Arg::Int(v))
	}

	fn serialize_u8(self, v: u8) -> Result<Arg> {
		Ok(Arg::Uint(v.into()))
	}

	fn serialize_u16(self, v: u16) -> Result<Arg> {
		Ok(Arg::Uint(v.into()))
	}

	fn serialize_u32(self, v: u32) -> Result<Arg> {
		Ok(Arg::Uint(v.into()))
	}

	fn serialize_u64(self, v: u64) -> Result<Arg> {
		Ok(Arg::Uint(v))
	}

	fn serialize_f32(self, v: f32) -> Result<Arg> {
		Ok(Arg::Float(v.into()))
	}

	fn serialize_f64(self, v: f64) -> Result<Arg> {
		Ok(Arg::Float(v))
	}

	fn serialize_char(self, v: char) -> Result<Arg> {
		Ok(Arg::Str(v.to_string()))
	}

	fn serialize_str(self, v: &str) -> Result<Arg> {
		Ok(Arg::Str(v.to_owned()))
	}

	fn serialize_bytes(self, v: &[u8]) -> Result<Arg> {
		Ok(Arg::Bytes(Bytes::copy_from_slice(v)))
	}

	// Absent values encode as the empty string, the convention the server's
	// argument parser already accepts.
	fn serialize_none(self) -> Result<Arg> {
		Ok(Arg::Str(String::new()))
	}

	fn serialize_some<T>(self, value: &T) -> Result<Arg>
	where
		T: Serialize + ?Sized,
	{
		value.serialize(self)
	}

	fn serialize_unit(self) -> Result<Arg> {
		Ok(Arg::Str(String::new()))
	}

	fn serialize_unit_struct(self, _name: &'static str) -> Result<Arg> {
		self.serialize_unit()
	}

	fn serialize_unit_variant(
		self,
		_name: &'static str,
		_variant_index: u32,
		variant: &'static str,
	) -> Result<Arg> {
		self.serialize_str(variant)
	}

	fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Arg>
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
	) -> Result<Arg>
	where
		T: Serialize + ?Sized,
	{
		Err(Error::UnsupportedArgumentType("newtype variant"))
	}

	fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
		Err(Error::UnsupportedArgumentType("sequence"))
	}

	fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
		Err(Error::UnsupportedArgumentType("tuple"))
	}

	fn serialize_tuple_struct(
		self,
		_name: &'static str,
		_len: usize,
	) -> Result<Self::SerializeTupleStruct> {
		Err(Error::UnsupportedArgumentType("tuple struct"))
	}

	fn serialize_tuple_variant(
		self,
		_name: &'static str,
		_variant_index: u32,
		_variant: &'static str,
		_len: usize,
	) -> Result<Self::SerializeTupleVariant> {
		Err(Error::UnsupportedArgumentType("tuple variant"))
	}

	fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
		Err(Error::UnsupportedArgumentType("map"))
	}

	fn serialize_struct(
		self,
		name: &'static str,
		_len: usize,
	) -> Result<Self::SerializeStruct> {
		Err(Error::UnsupportedArgumentType(name))
	}

	fn serialize_struct_variant(
		self,
		name: &'static str,
		_variant_index: u32,
		_variant: &'static str,
		_len: usize,
	) -> Result<Self::SerializeStructVariant> {
		Err(Error::UnsupportedArgumentType(name))
	}
}

#[cfg(test)]
mod test {
	use serde::Serialize;

	use super::to_arg;
	use crate::{Arg, Error};

	#[test]
	fn scalars() {
		assert_eq!(to_arg("hi").unwrap(), Arg::Str("hi".to_owned()));
		assert_eq!(to_arg(&5i32).unwrap(), Arg::Int(5));
		assert_eq!(to_arg(&true).unwrap(), Arg::Bool(true));
		assert_eq!(to_arg(&2.5f64).unwrap(), Arg::Float(2.5));
	}

	#[test]
	fn newtypes_unwrap() {
		#[derive(Serialize)]
		struct UserId(u64);

		assert_eq!(to_arg(&UserId(7)).unwrap(), Arg::Uint(7));
	}

	#[test]
	fn none_is_empty_string() {
		assert_eq!(to_arg(&None::<i32>).unwrap(), Arg::Str(String::new()));
	}

	#[test]
	fn compound_shapes_are_rejected() {
		#[derive(Serialize)]
		struct Point {
			x: i32,
			y: i32,
		}

		let err = to_arg(&Point { x: 1, y: 2 }).unwrap_err();
		assert!(matches!(err, Error::UnsupportedArgumentType("Point")));

		let err = to_arg(&vec![1, 2, 3]).unwrap_err();
		assert!(matches!(err, Error::UnsupportedArgumentType("sequence")));
	}
}
