use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam::queue::ArrayQueue;
use futures::future::BoxFuture;
use rand::Rng;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::connection::{BoxedTransport, ConnKind, Connection};
use crate::options::defaults;
use crate::{Error, Result};

/// Dials one transport stream. Supplied by configuration; the pool never
/// constructs connections itself and is transport-agnostic.
pub type Dialer =
	Arc<dyn Fn() -> BoxFuture<'static, std::io::Result<BoxedTransport>> + Send + Sync>;

/// Pool configuration. [`Options`](crate::Options) fills this in from the
/// client-level settings; tests and embedders can build it directly.
#[derive(Clone)]
pub struct PoolConfig {
	/// Required. [`Pool::new`] fails if unset.
	pub dialer: Option<Dialer>,
	/// Upper bound on connections that exist at once, leased or idle.
	pub pool_size: usize,
	/// Number of connections dialed eagerly at construction and replenished
	/// when lost.
	pub min_idle: usize,
	/// Connections up to this count are tagged [`ConnKind::Backup`]; beyond
	/// it they are burst allocations.
	pub max_idle: usize,
	/// Idle duration after which a connection is retired.
	pub max_idle_time: Duration,
	/// Age at which a connection is retired.
	pub max_lifetime: Duration,
	/// How long [`Pool::acquire`] waits before giving up.
	pub acquire_timeout: Duration,
	/// Dial attempts beyond the first before a dial error is surfaced.
	pub max_retries: u32,
	pub min_retry_backoff: Duration,
	pub max_retry_backoff: Duration,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			dialer: None,
			pool_size: defaults::pool_size(),
			min_idle: 0,
			max_idle: defaults::pool_size(),
			max_idle_time: defaults::CONN_MAX_IDLE_TIME,
			max_lifetime: defaults::CONN_MAX_LIFETIME,
			acquire_timeout: defaults::READ_TIMEOUT + Duration::from_secs(1),
			max_retries: defaults::MAX_RETRIES,
			min_retry_backoff: defaults::MIN_RETRY_BACKOFF,
			max_retry_backoff: defaults::MAX_RETRY_BACKOFF,
		}
	}
}

struct Inner {
	dialer: Dialer,
	cfg: PoolConfig,
	/// Bounded free list. Push never blocks; overflow closes the connection
	/// instead of stalling the releasing caller.
	idle: ArrayQueue<Connection>,
	/// Remaining dialable slots. Checked-and-decremented before every dial
	/// and incremented on every close, so concurrent acquirers never
	/// collectively dial past `pool_size` even though no lock is held
	/// across the dial itself.
	budget: AtomicI64,
	closed: AtomicBool,
	/// Warm-up and replenish dials, kept joinable so teardown cannot leak
	/// tasks.
	tasks: Mutex<JoinSet<()>>,
}

/// A bounded, health-checked connection pool.
///
/// Cheap to clone; all clones share one state. Construct inside a Tokio
/// runtime: warm-up dials are spawned immediately.
#[derive(Clone)]
pub struct Pool {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for Pool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pool")
			.field("idle", &self.inner.idle.len())
			.field("budget", &self.inner.budget)
			.field("closed", &self.inner.closed)
			.finish_non_exhaustive()
	}
}

impl Pool {
	/// Build the pool and fire off up to `min_idle` warm-up dials. Warm-up
	/// failures are logged, never surfaced: construction only fails on bad
	/// configuration.
	pub fn new(cfg: PoolConfig) -> Result<Self> {
		let dialer = cfg
			.dialer
			.clone()
			.ok_or(Error::Config("pool dialer is unset"))?;
		if cfg.pool_size == 0 {
			return Err(Error::Config("pool size must be non-zero"));
		}

		let pool = Self {
			inner: Arc::new(Inner {
				dialer,
				idle: ArrayQueue::new(cfg.pool_size),
				budget: AtomicI64::new(cfg.pool_size as i64),
				closed: AtomicBool::new(false),
				tasks: Mutex::new(JoinSet::new()),
				cfg,
			}),
		};

		let warm = pool.inner.cfg.min_idle.min(pool.inner.cfg.pool_size);
		for _ in 0..warm {
			pool.spawn_background_dial();
		}

		Ok(pool)
	}

	/// Lease a healthy connection.
	///
	/// Pops the free list first, discarding connections that fail the
	/// health check; dials when the size budget allows; otherwise backs off
	/// and retries until the acquire deadline. The deadline is checked on
	/// every iteration and takes priority over further retries.
	pub async fn acquire(&self) -> Result<PooledConn> {
		let deadline = Instant::now() + self.inner.cfg.acquire_timeout;
		let mut wait = self
			.inner
			.cfg
			.min_retry_backoff
			.max(Duration::from_millis(1));

		loop {
			if self.inner.closed.load(Ordering::Acquire) {
				return Err(Error::PoolClosed);
			}
			if Instant::now() >= deadline {
				return Err(Error::DeadlineExceeded);
			}

			match self.try_acquire_inner().await {
				Ok(conn) => return Ok(PooledConn::new(self.clone(), conn)),
				Err(Error::PoolExhausted) => {}
				Err(err) => return Err(err),
			}

			// Every slot is leased out: wait for a release, bounded by
			// the deadline.
			let remaining = deadline.saturating_duration_since(Instant::now());
			tokio::time::sleep(wait.min(remaining)).await;
			wait = (wait * 2).min(self.inner.cfg.max_retry_backoff.max(wait));
		}
	}

	/// Non-blocking variant of [`acquire`](Pool::acquire): fails with
	/// [`Error::PoolExhausted`] instead of waiting.
	pub async fn try_acquire(&self) -> Result<PooledConn> {
		if self.inner.closed.load(Ordering::Acquire) {
			return Err(Error::PoolClosed);
		}
		let conn = self.try_acquire_inner().await?;
		Ok(PooledConn::new(self.clone(), conn))
	}

	async fn try_acquire_inner(&self) -> Result<Connection> {
		while let Some(mut conn) = self.inner.idle.pop() {
			if self.healthy(&mut conn).await {
				return Ok(conn);
			}
			self.discard(conn);
		}
		self.try_dial().await
	}

	/// Return a leased connection. Health is re-validated: unhealthy
	/// connections are closed and their slot returned to the size budget so
	/// a future acquire may dial a replacement.
	pub async fn release(&self, mut conn: Connection) {
		if self.inner.closed.load(Ordering::Acquire) {
			conn.close();
			self.release_slot();
			return;
		}

		if self.healthy(&mut conn).await {
			self.park(conn);
		} else {
			self.discard(conn);
		}
	}

	/// Acquire, run `fn`, release, on every exit path. An unwind inside
	/// `fn` releases through the guard's `Drop`.
	pub async fn with_conn<T, F>(&self, f: F) -> Result<T>
	where
		F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T>>,
	{
		let mut leased = self.acquire().await?;
		let result = f(&mut *leased).await;
		leased.release().await;
		result
	}

	/// Tear the pool down: abort and join background dials, then drain and
	/// close the free list. In-flight leases drain as they are released.
	pub async fn close(&self) {
		self.inner.closed.store(true, Ordering::Release);

		let mut tasks = {
			let mut guard = self
				.inner
				.tasks
				.lock()
				.unwrap_or_else(PoisonError::into_inner);
			std::mem::take(&mut *guard)
		};
		tasks.shutdown().await;

		while let Some(conn) = self.inner.idle.pop() {
			conn.close();
			self.release_slot();
		}
		debug!("pool closed");
	}

	pub fn idle_count(&self) -> usize {
		self.inner.idle.len()
	}

	pub fn capacity(&self) -> usize {
		self.inner.cfg.pool_size
	}

	/// Age, idle and liveness checks, applied both before a connection is
	/// handed out and when it comes back. A connection that fails here is
	/// never returned to circulation.
	async fn healthy(&self, conn: &mut Connection) -> bool {
		if conn.is_broken() {
			debug!("health: connection marked broken");
			return false;
		}
		if conn.expired(self.inner.cfg.max_idle_time, self.inner.cfg.max_lifetime) {
			debug!(kind = ?conn.kind(), "health: connection expired");
			return false;
		}
		conn.probe().await
	}

	/// Dial one connection if the size budget allows it.
	async fn try_dial(&self) -> Result<Connection> {
		let Some(total) = self.reserve_slot() else {
			return Err(Error::PoolExhausted);
		};
		let kind = self.kind_for(total);

		match self.dial_with_retry().await {
			Ok(stream) => {
				debug!(?kind, total, "dialed new connection");
				Ok(Connection::new(stream, kind))
			}
			Err(err) => {
				self.release_slot();
				Err(Error::Io(err))
			}
		}
	}

	async fn dial_with_retry(&self) -> std::io::Result<BoxedTransport> {
		let mut attempt = 0u32;
		loop {
			match (self.inner.dialer)().await {
				Ok(stream) => return Ok(stream),
				Err(err) if attempt < self.inner.cfg.max_retries => {
					let backoff = retry_backoff(
						attempt,
						self.inner.cfg.min_retry_backoff,
						self.inner.cfg.max_retry_backoff,
					);
					warn!(%err, attempt, ?backoff, "dial failed, retrying");
					tokio::time::sleep(backoff).await;
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}

	/// Atomically claim a dial slot. Returns the total number of
	/// connections that exist once this dial completes, or `None` when the
	/// budget is spent.
	fn reserve_slot(&self) -> Option<i64> {
		let prev = self.inner.budget.fetch_sub(1, Ordering::AcqRel);
		if prev <= 0 {
			self.inner.budget.fetch_add(1, Ordering::AcqRel);
			return None;
		}
		Some(self.inner.cfg.pool_size as i64 - (prev - 1))
	}

	fn release_slot(&self) {
		self.inner.budget.fetch_add(1, Ordering::AcqRel);
	}

	fn kind_for(&self, total: i64) -> ConnKind {
		if total <= self.inner.cfg.min_idle as i64 {
			ConnKind::Persistent
		} else if total <= self.inner.cfg.max_idle as i64 {
			ConnKind::Backup
		} else {
			ConnKind::Temporary
		}
	}

	/// Push a healthy connection back onto the free list without blocking;
	/// a momentarily full list closes the connection instead.
	fn park(&self, conn: Connection) {
		if let Err(conn) = self.inner.idle.push(conn) {
			debug!("free list full, dropping released connection");
			conn.close();
			self.release_slot();
		}
	}

	/// Close an unhealthy connection and adjust accounting: its slot goes
	/// back to the size budget, and a lost persistent connection triggers a
	/// replenish dial.
	fn discard(&self, conn: Connection) {
		let kind = conn.kind();
		conn.close();
		self.release_slot();
		debug!(?kind, "discarded connection");

		if kind == ConnKind::Persistent && !self.inner.closed.load(Ordering::Acquire) {
			self.spawn_background_dial();
		}
	}

	/// Fire-and-forget dial into the free list, tracked in the join set so
	/// [`close`](Pool::close) can reap it. Failures are logged only;
	/// warm-up never fails pool construction.
	fn spawn_background_dial(&self) {
		let pool = self.clone();
		let mut tasks = self
			.inner
			.tasks
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		tasks.spawn(async move {
			match pool.try_dial().await {
				Ok(conn) => pool.park(conn),
				Err(Error::PoolExhausted) => {}
				Err(err) => warn!(%err, "background dial failed"),
			}
		});
	}
}

/// Exponential backoff between `min` and `max` with full jitter.
fn retry_backoff(attempt: u32, min: Duration, max: Duration) -> Duration {
	if min.is_zero() {
		return Duration::ZERO;
	}
	let cap = min.saturating_mul(1u32 << attempt.min(16)).min(max).max(min);
	let nanos = rand::thread_rng().gen_range(min.as_nanos() as u64..=cap.as_nanos() as u64);
	Duration::from_nanos(nanos)
}

/// A leased connection. Dereferences to [`Connection`]; returning it to the
/// pool happens through [`release`](PooledConn::release) or, if the guard is
/// dropped (including during an unwind), through a spawned release task.
pub struct PooledConn {
	conn: Option<Connection>,
	pool: Pool,
}

impl std::fmt::Debug for PooledConn {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PooledConn")
			.field("conn", &self.conn)
			.finish_non_exhaustive()
	}
}

impl PooledConn {
	fn new(pool: Pool, conn: Connection) -> Self {
		Self {
			conn: Some(conn),
			pool,
		}
	}

	/// Return the connection to the pool, completing the release health
	/// check before resolving.
	pub async fn release(mut self) {
		if let Some(conn) = self.conn.take() {
			self.pool.release(conn).await;
		}
	}
}

impl Deref for PooledConn {
	type Target = Connection;

	fn deref(&self) -> &Connection {
		// Invariant: `conn` is only vacated by `release`, which consumes
		// the guard, and by `Drop`.
		self.conn.as_ref().expect("connection already released")
	}
}

impl DerefMut for PooledConn {
	fn deref_mut(&mut self) -> &mut Connection {
		self.conn.as_mut().expect("connection already released")
	}
}

impl Drop for PooledConn {
	fn drop(&mut self) {
		if let Some(conn) = self.conn.take() {
			let pool = self.pool.clone();
			match tokio::runtime::Handle::try_current() {
				Ok(handle) => {
					handle.spawn(async move { pool.release(conn).await });
				}
				// No runtime to run the release health check on.
				Err(_) => {
					conn.close();
					pool.release_slot();
				}
			}
		}
	}
}
