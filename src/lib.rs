//! A pooled client for a RESP key-value server.
//!
//! The interesting parts live in two places: [`pool`], a bounded,
//! health-checked connection pool with atomic capacity accounting and dial
//! retry/backoff, and the [`resp`] codec crate, which encodes command
//! arguments and decodes arbitrary reply values. [`Client`] is thin glue
//! that leases a connection, drives one write/read exchange and returns it.
//!
//! ```no_run
//! # async fn example() -> redpool::Result<()> {
//! let client = redpool::Client::connect("localhost:6379")?;
//!
//! client.set("key", "value", Some(std::time::Duration::from_secs(1))).await?;
//! let value = client.get("key").await?;
//! assert_eq!(value.as_deref(), Some(&b"value"[..]));
//! # Ok(())
//! # }
//! ```

/// The command dispatcher and the minimal typed command surface.
pub mod client;
/// A single pooled connection: transport stream, codec halves, lifecycle
/// bookkeeping.
pub mod connection;
/// Client configuration and its documented defaults.
pub mod options;
/// The bounded, health-checked connection pool.
pub mod pool;

pub use client::Client;
pub use connection::{BoxedTransport, ConnKind, Connection, Transport};
pub use options::Options;
pub use pool::{Dialer, Pool, PoolConfig, PooledConn};
pub use resp;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	/// Codec-level outcomes pass through verbatim so callers can tell
	/// "server said no" from "network broke".
	#[error(transparent)]
	Resp(#[from] resp::Error),
	/// The acquire deadline elapsed before a connection became available.
	#[error("deadline exceeded while waiting for a connection")]
	DeadlineExceeded,
	/// No capacity left to dial a new connection. Recovered internally by
	/// the acquire loop's backoff; callers only see it through
	/// [`Pool::try_acquire`](crate::Pool::try_acquire)-style paths.
	#[error("connection pool exhausted")]
	PoolExhausted,
	#[error("pool is closed")]
	PoolClosed,
	/// Fatal at construction time, never at request time.
	#[error("invalid configuration: {0}")]
	Config(&'static str),
	#[error("unexpected reply: expected {expected}, got {found:?}")]
	UnexpectedReply {
		expected: &'static str,
		found: resp::Value,
	},
}

impl Error {
	/// Whether this is the nil-reply sentinel (e.g. a `GET` of a missing
	/// key).
	pub fn is_nil(&self) -> bool {
		matches!(self, Self::Resp(err) if err.is_nil())
	}

	/// Whether the server reported this error as part of a reply.
	pub fn is_server(&self) -> bool {
		matches!(self, Self::Resp(err) if err.is_server())
	}
}

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
