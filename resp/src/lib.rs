//! A RESP wire codec.
//!
//! The server's reply protocol is self-describing: every value starts with a
//! one-byte type tag, scalar values are a single CRLF-terminated line, and
//! aggregate values announce an element count and nest recursively. Commands
//! travel in the opposite direction as a flat array of bulk strings.
//!
//! [`Reader`] decodes one reply [`Value`] from a buffered stream; [`Writer`]
//! encodes an ordered list of [`Arg`]s as one command frame. Neither knows
//! anything about pooling or specific commands.

pub use error::{Error, Result};
pub use reader::{tag, Reader};
pub use ser::to_arg;
pub use value::{Arg, Value};

/// RESP errors.
mod error;
/// Reply decoding.
mod reader;
/// Command-argument serialization via serde.
pub mod ser;
/// Reply values and command arguments.
mod value;
/// Command encoding.
mod writer;

pub use writer::Writer;
