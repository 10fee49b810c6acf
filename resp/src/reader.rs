use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use num_bigint::BigInt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::{Error, Result, Value};

/// Reply type tags, one byte each. `!` (blob error), `=` (verbatim string)
/// and `|` (attribute) are reserved by the protocol but not produced by the
/// command surface this codec is exercised against.
pub mod tag {
	pub const STATUS: u8 = b'+';
	pub const ERROR: u8 = b'-';
	pub const BULK: u8 = b'$';
	pub const INT: u8 = b':';
	pub const NIL: u8 = b'_';
	pub const DOUBLE: u8 = b',';
	pub const BOOL: u8 = b'#';
	pub const BLOB_ERROR: u8 = b'!';
	pub const VERBATIM: u8 = b'=';
	pub const BIG_NUMBER: u8 = b'(';
	pub const ARRAY: u8 = b'*';
	pub const MAP: u8 = b'%';
	pub const SET: u8 = b'~';
	pub const ATTRIBUTE: u8 = b'|';
	pub const PUSH: u8 = b'>';
}

/// Decodes one RESP reply at a time from a buffered byte stream.
///
/// The reader is stateless between calls: each [`read`](Reader::read) decodes
/// exactly one value by recursive descent. It must only ever be driven by one
/// caller at a time per connection; the pool's lease discipline enforces
/// that, not this type.
#[derive(Debug)]
pub struct Reader<R> {
	rd: BufReader<R>,
}

impl<R> Reader<R>
where
	R: AsyncRead + Send + Unpin,
{
	pub fn new(rd: R) -> Self {
		Self {
			rd: BufReader::new(rd),
		}
	}

	/// Bytes that have been read off the transport but not yet consumed by a
	/// decode. Non-empty after a successful [`read`](Reader::read) means the
	/// stream carries data no request asked for.
	pub fn buffered(&self) -> &[u8] {
		self.rd.buffer()
	}

	pub fn get_mut(&mut self) -> &mut BufReader<R> {
		&mut self.rd
	}

	/// Read one reply value.
	///
	/// Nil and server-error replies are returned as [`Error::Nil`] and
	/// [`Error::Server`]; both leave the stream synchronized.
	#[tracing::instrument(level = "trace", skip_all, err)]
	pub async fn read(&mut self) -> Result<Value> {
		self.read_value().await
	}

	// Recursion for aggregate replies passes through this boxed future;
	// `async fn` cannot recurse directly.
	fn read_value(&mut self) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
		Box::pin(async move {
			let line = self.read_line().await?;

			match line[0] {
				tag::NIL => Err(Error::Nil),
				tag::ERROR => Err(Error::Server(
					String::from_utf8_lossy(&line[1..]).into_owned(),
				)),
				tag::STATUS => Ok(Value::Status(
					String::from_utf8_lossy(&line[1..]).into_owned(),
				)),
				tag::INT => Ok(Value::Int(parse_int(&line[1..])?)),
				tag::DOUBLE => Ok(Value::Double(parse_float(&line[1..])?)),
				tag::BOOL => match &line[1..] {
					b"t" => Ok(Value::Bool(true)),
					b"f" => Ok(Value::Bool(false)),
					_ => Err(Error::UnexpectedData),
				},
				// Unparsable input yields a zero big number without an
				// error, preserving the behavior callers already rely on.
				tag::BIG_NUMBER => Ok(Value::BigNumber(
					BigInt::parse_bytes(&line[1..], 10).unwrap_or_default(),
				)),
				tag::BULK => {
					let len = parse_int(&line[1..])?;
					if len < 0 {
						return Err(Error::Nil);
					}
					self.read_bulk(len as usize).await
				}
				tag::ARRAY | tag::SET | tag::PUSH => {
					let len = parse_int(&line[1..])?;
					if len < 0 {
						return Err(Error::Nil);
					}
					self.read_sequence(len as usize).await
				}
				tag::MAP => {
					let len = parse_int(&line[1..])?;
					if len < 0 {
						return Err(Error::Nil);
					}
					self.read_map(len as usize).await
				}
				other => Err(Error::UnknownReplyType(other)),
			}
		})
	}

	/// Read one CRLF-terminated line, excluding the terminator. `read_until`
	/// grows its output as needed, so a line longer than the buffered window
	/// is reassembled without corrupting already-scanned bytes.
	async fn read_line(&mut self) -> Result<Vec<u8>> {
		let mut line = Vec::new();
		let n = self.rd.read_until(b'\n', &mut line).await?;
		if n == 0 {
			return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
		}
		// A valid line is a type tag, at least zero payload bytes and CRLF;
		// anything shorter than three bytes cannot carry a tag.
		if line.len() <= 2 || !line.ends_with(b"\r\n") {
			return Err(Error::MalformedReply(line));
		}
		line.truncate(line.len() - 2);
		Ok(line)
	}

	/// Read a bulk-string payload of the declared length plus its trailing
	/// CRLF, looping until the transport has delivered every byte.
	async fn read_bulk(&mut self, len: usize) -> Result<Value> {
		let mut buf = vec![0u8; len + 2];
		self.rd.read_exact(&mut buf).await?;
		if !buf.ends_with(b"\r\n") {
			return Err(Error::MalformedReply(buf));
		}
		buf.truncate(len);
		Ok(Value::Bulk(Bytes::from(buf)))
	}

	/// Decode `len` elements. A nil or server-error element is recorded at
	/// its position and decoding continues; any other failure aborts.
	async fn read_sequence(&mut self, len: usize) -> Result<Value> {
		let mut items = Vec::with_capacity(len);
		for _ in 0..len {
			match self.read_value().await {
				Ok(value) => items.push(value),
				Err(Error::Nil) => items.push(Value::Nil),
				Err(Error::Server(msg)) => items.push(Value::Error(msg)),
				Err(err) => return Err(err),
			}
		}
		Ok(Value::Array(items))
	}

	/// Decode `len` key/value pairs. Values get the same nil/error tolerance
	/// as sequence elements; a key that fails to decode, including to the
	/// nil sentinel, aborts the whole map.
	async fn read_map(&mut self, len: usize) -> Result<Value> {
		let mut pairs = Vec::with_capacity(len);
		for _ in 0..len {
			let key = self.read_value().await?;
			let value = match self.read_value().await {
				Ok(value) => value,
				Err(Error::Nil) => Value::Nil,
				Err(Error::Server(msg)) => Value::Error(msg),
				Err(err) => return Err(err),
			};
			pairs.push((key, value));
		}
		Ok(Value::Map(pairs))
	}
}

fn parse_int(bytes: &[u8]) -> Result<i64> {
	let str =
		std::str::from_utf8(bytes).map_err(|_| Error::MalformedReply(bytes.to_vec()))?;
	Ok(str.parse()?)
}

fn parse_float(bytes: &[u8]) -> Result<f64> {
	let str =
		std::str::from_utf8(bytes).map_err(|_| Error::MalformedReply(bytes.to_vec()))?;
	Ok(str.parse()?)
}
