use thiserror::Error;

/// An error produced while encoding or decoding RESP.
///
/// [`Error::Nil`] and [`Error::Server`] are wire-level outcomes rather than
/// failures: the stream stays synchronized and the connection they arrived on
/// remains usable. Everything else either broke the transport or left the
/// stream position untrustworthy.
#[derive(Debug, Error)]
pub enum Error {
	/// The distinguished nil reply (`_\r\n`, or a RESP2 null bulk/array).
	/// Callers treat a missing key as this sentinel, never as a transport
	/// failure.
	#[error("nil reply")]
	Nil,
	/// An error reported by the server (`-` tag).
	#[error("server error: {0}")]
	Server(String),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	/// A reply line that does not end in CRLF or carries no payload.
	#[error("malformed reply: {0:?}")]
	MalformedReply(Vec<u8>),
	/// Well-framed bytes that make no sense where they appeared.
	#[error("unexpected data in reply")]
	UnexpectedData,
	/// A leading type tag outside the RESP table.
	#[error("unknown reply type: {0:#04x}")]
	UnknownReplyType(u8),
	#[error("invalid integer in reply: {0}")]
	ParseInt(#[from] std::num::ParseIntError),
	#[error("invalid float in reply: {0}")]
	ParseFloat(#[from] std::num::ParseFloatError),
	/// A value that has no command-argument encoding. This is a programming
	/// error and is reported before any bytes reach the transport.
	#[error("cannot encode {0} as a command argument")]
	UnsupportedArgumentType(&'static str),
	/// Custom message raised by a serde implementation during argument
	/// serialization.
	#[error("serialize error: {0}")]
	Serialize(String),
}

impl Error {
	/// Whether this is the nil-reply sentinel.
	pub fn is_nil(&self) -> bool {
		matches!(self, Self::Nil)
	}

	/// Whether this is an error the server reported as part of a reply.
	pub fn is_server(&self) -> bool {
		matches!(self, Self::Server(_))
	}

	/// Whether the stream position can no longer be trusted. A connection
	/// that produced such an error must be discarded, not reused.
	pub fn is_protocol(&self) -> bool {
		matches!(
			self,
			Self::MalformedReply(_)
				| Self::UnexpectedData
				| Self::UnknownReplyType(_)
				| Self::ParseInt(_)
				| Self::ParseFloat(_)
		)
	}
}

impl serde::ser::Error for Error {
	fn custom<T>(msg: T) -> Self
	where
		T: std::fmt::Display,
	{
		Self::Serialize(msg.to_string())
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
