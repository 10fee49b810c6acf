use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;

/// A decoded RESP reply. Read the server's command documentation for details
/// on which shape to expect for a given command.
///
/// Sets and pushes are structurally identical to arrays and decode to
/// [`Value::Array`]. Map key order is irrelevant, so a pair list is kept
/// rather than a hash map (reply values are not hashable).
///
/// Top-level nil and server-error replies surface as the
/// [`Nil`](crate::Error::Nil) and [`Server`](crate::Error::Server) error
/// variants; the [`Value::Nil`] and [`Value::Error`] variants exist because
/// individual elements of an aggregate reply can legitimately be absent or
/// carry a per-element error without invalidating the whole reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Nil,
	Error(String),
	Status(String),
	Bulk(Bytes),
	Int(i64),
	Double(f64),
	Bool(bool),
	BigNumber(BigInt),
	Array(Vec<Value>),
	Map(Vec<(Value, Value)>),
}

impl Value {
	/// Convenience method to create a [Value::Status].
	pub fn status<T>(str: &T) -> Self
	where
		T: AsRef<str> + ?Sized,
	{
		Self::Status(str.as_ref().to_owned())
	}

	/// Convenience method to create a [Value::Bulk].
	pub fn bulk<T>(bytes: &T) -> Self
	where
		T: AsRef<[u8]> + ?Sized,
	{
		Self::Bulk(Bytes::copy_from_slice(bytes.as_ref()))
	}
}

impl PartialEq<str> for Value {
	fn eq(&self, other: &str) -> bool {
		match self {
			Value::Status(str) => str == other,
			Value::Bulk(bytes) => bytes.as_ref() == other.as_bytes(),
			_ => false,
		}
	}
}

impl PartialEq<&str> for Value {
	fn eq(&self, other: &&str) -> bool {
		self == *other
	}
}

impl PartialEq<[u8]> for Value {
	fn eq(&self, other: &[u8]) -> bool {
		matches!(self, Value::Bulk(bytes) if bytes.as_ref() == other)
	}
}

impl<const N: usize> PartialEq<[u8; N]> for Value {
	fn eq(&self, other: &[u8; N]) -> bool {
		matches!(self, Value::Bulk(bytes) if bytes.as_ref() == other)
	}
}

impl PartialEq<i64> for Value {
	fn eq(&self, other: &i64) -> bool {
		matches!(self, Value::Int(i) if i == other)
	}
}

/// A command argument. The closed set of scalars the writer knows how to
/// render as a bulk string.
///
/// Anything else goes through [`to_arg`](crate::to_arg), which accepts any
/// serde-serializable scalar and rejects compound shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
	Str(String),
	Bytes(Bytes),
	Int(i64),
	Uint(u64),
	Float(f64),
	Bool(bool),
	/// Rendered as RFC 3339 with nanosecond precision.
	Time(DateTime<Utc>),
	/// Rendered as whole nanoseconds.
	Duration(Duration),
	Ip(IpAddr),
}

impl From<&str> for Arg {
	fn from(str: &str) -> Self {
		Arg::Str(str.to_owned())
	}
}

impl From<String> for Arg {
	fn from(str: String) -> Self {
		Arg::Str(str)
	}
}

impl From<&[u8]> for Arg {
	fn from(bytes: &[u8]) -> Self {
		Arg::Bytes(Bytes::copy_from_slice(bytes))
	}
}

impl From<Vec<u8>> for Arg {
	fn from(bytes: Vec<u8>) -> Self {
		Arg::Bytes(bytes.into())
	}
}

impl From<Bytes> for Arg {
	fn from(bytes: Bytes) -> Self {
		Arg::Bytes(bytes)
	}
}

macro_rules! arg_from_int {
	($($int:ty),*) => {
		$(impl From<$int> for Arg {
			fn from(int: $int) -> Self {
				Arg::Int(int as i64)
			}
		})*
	};
}

macro_rules! arg_from_uint {
	($($int:ty),*) => {
		$(impl From<$int> for Arg {
			fn from(int: $int) -> Self {
				Arg::Uint(int as u64)
			}
		})*
	};
}

arg_from_int!(i8, i16, i32, i64, isize);
arg_from_uint!(u8, u16, u32, u64, usize);

impl From<f32> for Arg {
	fn from(f: f32) -> Self {
		Arg::Float(f as f64)
	}
}

impl From<f64> for Arg {
	fn from(f: f64) -> Self {
		Arg::Float(f)
	}
}

impl From<bool> for Arg {
	fn from(b: bool) -> Self {
		Arg::Bool(b)
	}
}

impl From<DateTime<Utc>> for Arg {
	fn from(ts: DateTime<Utc>) -> Self {
		Arg::Time(ts)
	}
}

impl From<SystemTime> for Arg {
	fn from(ts: SystemTime) -> Self {
		Arg::Time(ts.into())
	}
}

impl From<Duration> for Arg {
	fn from(dur: Duration) -> Self {
		Arg::Duration(dur)
	}
}

impl From<IpAddr> for Arg {
	fn from(ip: IpAddr) -> Self {
		Arg::Ip(ip)
	}
}

impl From<Ipv4Addr> for Arg {
	fn from(ip: Ipv4Addr) -> Self {
		Arg::Ip(ip.into())
	}
}

impl From<Ipv6Addr> for Arg {
	fn from(ip: Ipv6Addr) -> Self {
		Arg::Ip(ip.into())
	}
}

/// Macro to simplify building an argument list.
///
/// Changes:
/// ```rust
/// # use redpool_resp::Arg;
/// vec![Arg::from("SET"), Arg::from("key"), Arg::from(1)];
/// ```
/// into
/// ```rust
/// # use redpool_resp::args;
/// args!["SET", "key", 1];
/// ```
#[macro_export]
macro_rules! args {
	($($items:expr),* $(,)?) => {
		vec![$($crate::Arg::from($items)),*]
	};
}
