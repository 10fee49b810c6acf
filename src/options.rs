use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::connection::BoxedTransport;
use crate::pool::{Dialer, PoolConfig};

pub(crate) mod defaults {
	use std::time::Duration;

	pub const ADDR: &str = "localhost:6379";
	pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
	pub const READ_TIMEOUT: Duration = Duration::from_secs(3);
	pub const CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(30 * 60);
	pub const CONN_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
	pub const MAX_RETRIES: u32 = 3;
	pub const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(8);
	pub const MAX_RETRY_BACKOFF: Duration = Duration::from_millis(512);

	/// Ten connections per core, the convention inherited from the server's
	/// reference clients.
	pub fn pool_size() -> usize {
		10 * std::thread::available_parallelism()
			.map(usize::from)
			.unwrap_or(1)
	}
}

/// Client configuration. Zero values mean "use the documented default";
/// [`Client::new`](crate::Client::new) applies them before the pool is
/// constructed, so a default-constructed `Options` is fully usable.
#[derive(Clone, Default)]
pub struct Options {
	/// `host:port` address. Default `localhost:6379`.
	pub addr: String,
	/// Creates new transport streams; takes priority over `addr` when set.
	/// Wrap TLS here if the deployment needs it.
	pub dialer: Option<Dialer>,
	/// Maximum number of connections. Default is 10 per core.
	pub pool_size: usize,
	/// Idle connections dialed eagerly and kept replenished. Default 0.
	pub min_idle: usize,
	/// Maximum number of idle connections. Default is `pool_size`.
	pub max_idle: usize,
	/// Idle time after which a connection is retired. Default 30 minutes.
	pub conn_max_idle_time: Duration,
	/// Age at which a connection is retired. Default 1 hour.
	pub conn_max_lifetime: Duration,
	/// Timeout for establishing new connections. Default 5 seconds.
	pub dial_timeout: Duration,
	/// Timeout for one reply read. Default 3 seconds.
	pub read_timeout: Duration,
	/// Timeout for one command write. Default is `read_timeout`.
	pub write_timeout: Duration,
	/// How long to wait for a connection when all are busy. Default is
	/// `read_timeout` + 1 second.
	pub pool_timeout: Duration,
	/// Dial retries before giving up. Default 3.
	pub max_retries: u32,
	/// Minimum backoff between retries. Default 8 milliseconds.
	pub min_retry_backoff: Duration,
	/// Maximum backoff between retries. Default 512 milliseconds.
	pub max_retry_backoff: Duration,
}

impl Options {
	/// Apply documented defaults to every unset field.
	pub(crate) fn init(mut self) -> Self {
		if self.addr.is_empty() {
			self.addr = defaults::ADDR.to_owned();
		}
		if self.dial_timeout.is_zero() {
			self.dial_timeout = defaults::DIAL_TIMEOUT;
		}
		if self.read_timeout.is_zero() {
			self.read_timeout = defaults::READ_TIMEOUT;
		}
		if self.write_timeout.is_zero() {
			self.write_timeout = self.read_timeout;
		}
		if self.pool_timeout.is_zero() {
			self.pool_timeout = self.read_timeout + Duration::from_secs(1);
		}
		if self.pool_size == 0 {
			self.pool_size = defaults::pool_size();
		}
		if self.min_idle > self.pool_size {
			self.min_idle = self.pool_size;
		}
		if self.max_idle == 0 || self.max_idle > self.pool_size {
			self.max_idle = self.pool_size;
		}
		if self.conn_max_idle_time.is_zero() {
			self.conn_max_idle_time = defaults::CONN_MAX_IDLE_TIME;
		}
		if self.conn_max_lifetime.is_zero() {
			self.conn_max_lifetime = defaults::CONN_MAX_LIFETIME;
		}
		if self.max_retries == 0 {
			self.max_retries = defaults::MAX_RETRIES;
		}
		if self.min_retry_backoff.is_zero() {
			self.min_retry_backoff = defaults::MIN_RETRY_BACKOFF;
		}
		if self.max_retry_backoff.is_zero() {
			self.max_retry_backoff = defaults::MAX_RETRY_BACKOFF;
		}
		if self.dialer.is_none() {
			self.dialer = Some(self.tcp_dialer());
		}
		self
	}

	pub(crate) fn pool_config(&self) -> PoolConfig {
		PoolConfig {
			dialer: self.dialer.clone(),
			pool_size: self.pool_size,
			min_idle: self.min_idle,
			max_idle: self.max_idle,
			max_idle_time: self.conn_max_idle_time,
			max_lifetime: self.conn_max_lifetime,
			acquire_timeout: self.pool_timeout,
			max_retries: self.max_retries,
			min_retry_backoff: self.min_retry_backoff,
			max_retry_backoff: self.max_retry_backoff,
		}
	}

	fn tcp_dialer(&self) -> Dialer {
		let addr = self.addr.clone();
		let dial_timeout = self.dial_timeout;

		Arc::new(move || -> futures::future::BoxFuture<'static, std::io::Result<BoxedTransport>> {
			let addr = addr.clone();
			Box::pin(async move {
				let stream = tokio::time::timeout(dial_timeout, TcpStream::connect(&addr))
					.await
					.map_err(|_| {
						std::io::Error::new(std::io::ErrorKind::TimedOut, "dial timed out")
					})??;
				stream.set_nodelay(true)?;
				Ok(Box::new(stream) as BoxedTransport)
			})
		})
	}
}

#[cfg(test)]
mod test {
	use super::{defaults, Options};

	#[test]
	fn zero_values_get_defaults() {
		let opts = Options::default().init();

		assert_eq!(opts.addr, "localhost:6379");
		assert_eq!(opts.read_timeout, defaults::READ_TIMEOUT);
		assert_eq!(opts.write_timeout, opts.read_timeout);
		assert_eq!(
			opts.pool_timeout,
			opts.read_timeout + std::time::Duration::from_secs(1)
		);
		assert_eq!(opts.max_idle, opts.pool_size);
		assert_eq!(opts.max_retries, 3);
		assert!(opts.dialer.is_some());
	}

	#[test]
	fn idle_counts_clamp_to_pool_size() {
		let opts = Options {
			pool_size: 4,
			min_idle: 10,
			max_idle: 10,
			..Default::default()
		}
		.init();

		assert_eq!(opts.min_idle, 4);
		assert_eq!(opts.max_idle, 4);
	}
}
