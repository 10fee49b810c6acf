use std::future::poll_fn;
use std::pin::Pin;
use std::task::Poll;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use resp::{Arg, Value};

/// Transport stream the client can drive. Blanket-implemented; the dialer
/// may hand back plain TCP, TLS-wrapped streams, in-memory pipes, anything.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedTransport = Box<dyn Transport>;

/// What the connection's slot meant to the pool when it was dialed. Governs
/// the pool's accounting when the connection is later discarded: losing a
/// persistent connection triggers a replenish dial, losing a backup or
/// temporary one does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
	/// Within the configured minimum idle count.
	Persistent,
	/// Within the configured maximum idle count.
	Backup,
	/// A burst allocation beyond the idle targets.
	Temporary,
}

/// One established connection: exclusively owned by either the pool's free
/// list or the caller currently holding the lease, never both.
pub struct Connection {
	reader: resp::Reader<tokio::io::ReadHalf<BoxedTransport>>,
	writer: resp::Writer<tokio::io::WriteHalf<BoxedTransport>>,
	kind: ConnKind,
	created_at: Instant,
	used_at: Instant,
	broken: bool,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("kind", &self.kind)
			.field("created_at", &self.created_at)
			.field("used_at", &self.used_at)
			.field("broken", &self.broken)
			.finish_non_exhaustive()
	}
}

impl Connection {
	pub fn new(stream: BoxedTransport, kind: ConnKind) -> Self {
		let (rd, wr) = tokio::io::split(stream);
		let now = Instant::now();
		Self {
			reader: resp::Reader::new(rd),
			writer: resp::Writer::new(wr),
			kind,
			created_at: now,
			used_at: now,
			broken: false,
		}
	}

	pub fn kind(&self) -> ConnKind {
		self.kind
	}

	pub fn created_at(&self) -> Instant {
		self.created_at
	}

	pub fn used_at(&self) -> Instant {
		self.used_at
	}

	/// Flag the connection so the pool will close it instead of reusing it.
	/// Used by callers that time out mid-exchange and can no longer vouch
	/// for the stream position.
	pub fn mark_broken(&mut self) {
		self.broken = true;
	}

	pub fn is_broken(&self) -> bool {
		self.broken
	}

	/// Encode one command and flush it. Any failure leaves the buffered
	/// writer in an unknown state, so the connection is marked broken.
	pub async fn write_command(&mut self, args: &[Arg]) -> resp::Result<()> {
		let result = match self.writer.write_command(args).await {
			Ok(()) => self.writer.flush().await,
			Err(err) => Err(err),
		};

		match result {
			Ok(()) => {
				self.used_at = Instant::now();
				Ok(())
			}
			Err(err) => {
				self.broken = true;
				Err(err)
			}
		}
	}

	/// Decode one reply. Nil and server-error outcomes leave the connection
	/// healthy; protocol or I/O failures mark it broken, as do stale bytes
	/// left in the read buffer after a complete reply (the stream position
	/// is then no longer trustworthy).
	pub async fn read_reply(&mut self) -> resp::Result<Value> {
		let result = self.reader.read().await;
		self.used_at = Instant::now();

		match result {
			Ok(value) => {
				if !self.reader.buffered().is_empty() {
					self.broken = true;
					return Err(resp::Error::UnexpectedData);
				}
				Ok(value)
			}
			Err(err) if err.is_nil() || err.is_server() => {
				if !self.reader.buffered().is_empty() {
					self.broken = true;
				}
				Err(err)
			}
			Err(err) => {
				self.broken = true;
				Err(err)
			}
		}
	}

	/// Whether the connection has outlived its configured lifetime or sat
	/// idle past the configured idle limit.
	pub fn expired(&self, max_idle_time: Duration, max_lifetime: Duration) -> bool {
		self.created_at.elapsed() >= max_lifetime || self.used_at.elapsed() >= max_idle_time
	}

	/// Liveness probe: poll a one-byte read exactly once without blocking.
	/// Would-block means the peer is presumably alive. A zero-byte read
	/// means the peer half-closed the stream; data or an error means the
	/// stream cannot be reused either way.
	pub async fn probe(&mut self) -> bool {
		let mut buf = [0u8; 1];
		let reader = self.reader.get_mut();

		poll_fn(|cx| {
			let mut read_buf = ReadBuf::new(&mut buf);
			match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
				Poll::Pending => Poll::Ready(true),
				Poll::Ready(Ok(())) if read_buf.filled().is_empty() => {
					trace!("probe: peer closed the connection");
					Poll::Ready(false)
				}
				Poll::Ready(Ok(())) => {
					trace!("probe: unexpected data on idle connection");
					Poll::Ready(false)
				}
				Poll::Ready(Err(err)) => {
					trace!(%err, "probe: read failed");
					Poll::Ready(false)
				}
			}
		})
		.await
	}

	/// Close the transport. Dropping the halves shuts the stream down; the
	/// explicit name keeps the pool's bookkeeping sites readable.
	pub fn close(self) {
		trace!(kind = ?self.kind, "closing connection");
	}
}
