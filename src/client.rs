use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tracing::trace;

use resp::{args, Arg, Value};

use crate::{Error, Options, Pool, Result};

/// The dispatcher: leases a connection, drives one write/read exchange and
/// returns it. One in-flight command per leased connection, no pipelining;
/// the write fully flushes before the matching read begins.
pub struct Client {
	pool: Pool,
	read_timeout: Duration,
	write_timeout: Duration,
}

impl Client {
	pub fn new(opts: Options) -> Result<Self> {
		let opts = opts.init();
		let pool = Pool::new(opts.pool_config())?;
		Ok(Self {
			pool,
			read_timeout: opts.read_timeout,
			write_timeout: opts.write_timeout,
		})
	}

	/// Connect to `addr` with default options.
	pub fn connect(addr: impl Into<String>) -> Result<Self> {
		Self::new(Options {
			addr: addr.into(),
			..Options::default()
		})
	}

	pub fn pool(&self) -> &Pool {
		&self.pool
	}

	pub async fn close(&self) {
		self.pool.close().await
	}

	/// `SET key value`, optionally with an expiry. Sub-second or non-whole-
	/// second expiries are sent with millisecond precision (`PX`), whole
	/// seconds as `EX`.
	pub async fn set(
		&self,
		key: &str,
		value: impl Into<Arg>,
		expiry: Option<Duration>,
	) -> Result<String> {
		let mut cmd = args!["SET", key];
		cmd.push(value.into());
		if let Some(ttl) = expiry {
			if use_precise(ttl) {
				cmd.extend(args!["PX", format_ms(ttl)]);
			} else {
				cmd.extend(args!["EX", format_sec(ttl)]);
			}
		}
		self.dispatch(cmd, Expect::Status).await?.into_status()
	}

	/// `GET key`. A missing key is `None`, never an error.
	pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
		match self.dispatch(args!["GET", key], Expect::Bulk).await {
			Ok(reply) => Ok(Some(reply.into_bulk()?)),
			Err(err) if err.is_nil() => Ok(None),
			Err(err) => Err(err),
		}
	}

	/// Send an arbitrary command and return the raw reply value. Nil and
	/// server-error replies surface as their [`resp::Error`] variants.
	pub async fn command(&self, args: Vec<Arg>) -> Result<Value> {
		Ok(self.dispatch(args, Expect::Any).await?.into_value())
	}

	async fn dispatch(&self, args: Vec<Arg>, expect: Expect) -> Result<Reply> {
		trace!(cmd = ?args.first(), "dispatching command");
		let (write_timeout, read_timeout) = (self.write_timeout, self.read_timeout);

		let value = self
			.pool
			.with_conn(move |conn| {
				Box::pin(async move {
					match timeout(write_timeout, conn.write_command(&args)).await {
						Ok(result) => result?,
						Err(_) => {
							conn.mark_broken();
							return Err(timed_out("write"));
						}
					}
					match timeout(read_timeout, conn.read_reply()).await {
						Ok(result) => Ok(result?),
						Err(_) => {
							conn.mark_broken();
							Err(timed_out("read"))
						}
					}
				})
			})
			.await?;

		expect.decode(value)
	}
}

/// The closed set of reply shapes the command surface expects. Each command
/// names its shape up front; the dispatcher converts by tag rather than
/// through an open decoding trait.
#[derive(Debug, Clone, Copy)]
enum Expect {
	Status,
	Bulk,
	Any,
}

impl Expect {
	fn decode(self, found: Value) -> Result<Reply> {
		match (self, found) {
			(Expect::Status, Value::Status(str)) => Ok(Reply::Status(str)),
			(Expect::Bulk, Value::Bulk(bytes)) => Ok(Reply::Bulk(bytes)),
			(Expect::Any, value) => Ok(Reply::Value(value)),
			(expect, found) => Err(Error::UnexpectedReply {
				expected: expect.name(),
				found,
			}),
		}
	}

	fn name(self) -> &'static str {
		match self {
			Expect::Status => "status",
			Expect::Bulk => "bulk string",
			Expect::Any => "any",
		}
	}
}

#[derive(Debug)]
enum Reply {
	Status(String),
	Bulk(Bytes),
	Value(Value),
}

impl Reply {
	fn into_value(self) -> Value {
		match self {
			Reply::Status(str) => Value::Status(str),
			Reply::Bulk(bytes) => Value::Bulk(bytes),
			Reply::Value(value) => value,
		}
	}

	fn into_status(self) -> Result<String> {
		match self {
			Reply::Status(str) => Ok(str),
			other => Err(Error::UnexpectedReply {
				expected: "status",
				found: other.into_value(),
			}),
		}
	}

	fn into_bulk(self) -> Result<Bytes> {
		match self {
			Reply::Bulk(bytes) => Ok(bytes),
			other => Err(Error::UnexpectedReply {
				expected: "bulk string",
				found: other.into_value(),
			}),
		}
	}
}

fn timed_out(op: &str) -> Error {
	Error::Io(io::Error::new(
		io::ErrorKind::TimedOut,
		format!("{op} timed out"),
	))
}

/// Whether an expiry needs millisecond precision.
fn use_precise(dur: Duration) -> bool {
	dur < Duration::from_secs(1) || dur.subsec_nanos() != 0
}

/// Expiry in whole milliseconds; a positive duration under one millisecond
/// rounds up so it never silently becomes "no expiry".
fn format_ms(dur: Duration) -> i64 {
	if !dur.is_zero() && dur < Duration::from_millis(1) {
		return 1;
	}
	dur.as_millis() as i64
}

/// Expiry in whole seconds, with the same round-up rule.
fn format_sec(dur: Duration) -> i64 {
	if !dur.is_zero() && dur < Duration::from_secs(1) {
		return 1;
	}
	dur.as_secs() as i64
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use resp::Value;

	use super::{format_ms, format_sec, use_precise, Expect};
	use crate::Error;

	#[test]
	fn precise_expiries() {
		assert!(use_precise(Duration::from_millis(500)));
		assert!(use_precise(Duration::from_millis(1500)));
		assert!(!use_precise(Duration::from_secs(1)));
		assert!(!use_precise(Duration::from_secs(30)));
	}

	#[test]
	fn expiry_formatting() {
		assert_eq!(format_ms(Duration::from_millis(1500)), 1500);
		assert_eq!(format_ms(Duration::from_micros(10)), 1);
		assert_eq!(format_sec(Duration::from_secs(30)), 30);
		assert_eq!(format_sec(Duration::from_millis(10)), 1);
	}

	#[test]
	fn reply_shape_mismatch() {
		let err = Expect::Status.decode(Value::Int(3)).unwrap_err();
		assert!(matches!(
			err,
			Error::UnexpectedReply {
				expected: "status",
				found: Value::Int(3),
			}
		));
	}

	#[test]
	fn reply_shape_match() {
		let reply = Expect::Bulk.decode(Value::bulk(b"v")).unwrap();
		assert_eq!(reply.into_bulk().unwrap().as_ref(), b"v");
	}
}
