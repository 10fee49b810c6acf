use std::time::{Duration, Instant};

use test_log::test;

use redpool::{Error, Pool, PoolConfig};

use crate::common::TestServer;

mod common;

fn small_pool_config(server: &TestServer, pool_size: usize) -> PoolConfig {
	PoolConfig {
		dialer: Some(server.dialer()),
		pool_size,
		acquire_timeout: Duration::from_millis(200),
		..PoolConfig::default()
	}
}

#[test]
fn dialer_is_required() {
	let err = Pool::new(PoolConfig::default()).unwrap_err();
	assert!(matches!(err, Error::Config(_)));
}

#[test(tokio::test)]
async fn reuses_released_connections() {
	let server = TestServer::new();
	let pool = Pool::new(small_pool_config(&server, 2)).unwrap();

	for _ in 0..5 {
		let conn = pool.acquire().await.unwrap();
		conn.release().await;
	}

	assert_eq!(server.dials(), 1);
	assert_eq!(pool.idle_count(), 1);
}

#[test(tokio::test)]
async fn acquire_blocks_at_capacity() {
	let server = TestServer::new();
	let pool = Pool::new(small_pool_config(&server, 1)).unwrap();

	let held = pool.acquire().await.unwrap();

	let started = Instant::now();
	let err = pool.acquire().await.unwrap_err();
	assert!(matches!(err, Error::DeadlineExceeded), "{err:?}");
	assert!(started.elapsed() >= Duration::from_millis(200));

	held.release().await;
	let conn = pool.acquire().await.unwrap();
	conn.release().await;
	assert_eq!(server.dials(), 1);
}

#[test(tokio::test)]
async fn acquire_unblocks_on_release() {
	let server = TestServer::new();
	let pool = Pool::new(PoolConfig {
		acquire_timeout: Duration::from_secs(2),
		..small_pool_config(&server, 1)
	})
	.unwrap();

	let held = pool.acquire().await.unwrap();
	let releaser = tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		held.release().await;
	});

	let started = Instant::now();
	let conn = pool.acquire().await.unwrap();
	assert!(started.elapsed() >= Duration::from_millis(50));
	assert_eq!(server.dials(), 1);

	conn.release().await;
	releaser.await.unwrap();
}

#[test(tokio::test)]
async fn expired_connection_is_replaced() {
	let server = TestServer::new();
	let pool = Pool::new(PoolConfig {
		max_lifetime: Duration::from_millis(50),
		..small_pool_config(&server, 1)
	})
	.unwrap();

	let conn = pool.acquire().await.unwrap();
	conn.release().await;
	assert_eq!(server.dials(), 1);

	tokio::time::sleep(Duration::from_millis(80)).await;

	// The idle connection is past its lifetime; acquire must discard it
	// and hand out a freshly dialed one.
	let conn = pool.acquire().await.unwrap();
	conn.release().await;
	assert_eq!(server.dials(), 2);
}

#[test(tokio::test)]
async fn broken_connection_is_not_reused() {
	let server = TestServer::new();
	let pool = Pool::new(small_pool_config(&server, 2)).unwrap();

	let mut conn = pool.acquire().await.unwrap();
	conn.mark_broken();
	conn.release().await;

	assert_eq!(pool.idle_count(), 0);
	let conn = pool.acquire().await.unwrap();
	conn.release().await;
	assert_eq!(server.dials(), 2);
}

#[test(tokio::test)]
async fn with_conn_releases_on_failure() {
	let server = TestServer::new();
	let pool = Pool::new(small_pool_config(&server, 2)).unwrap();

	pool.with_conn(|_conn| Box::pin(async { Ok(()) }))
		.await
		.unwrap();
	assert_eq!(pool.idle_count(), 1);

	let err = pool
		.with_conn(|_conn| Box::pin(async { Err::<(), Error>(Error::Config("boom")) }))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::Config("boom")));

	// The lease went back to the free list despite the failure.
	assert_eq!(pool.idle_count(), 1);
	assert_eq!(server.dials(), 1);
}

#[test(tokio::test)]
async fn warm_up_dials_min_idle() {
	let server = TestServer::new();
	let pool = Pool::new(PoolConfig {
		min_idle: 2,
		..small_pool_config(&server, 4)
	})
	.unwrap();

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(pool.idle_count(), 2);
	assert_eq!(server.dials(), 2);
}

#[test(tokio::test)]
async fn lost_persistent_connection_is_replenished() {
	let server = TestServer::new();
	let pool = Pool::new(PoolConfig {
		min_idle: 1,
		..small_pool_config(&server, 2)
	})
	.unwrap();

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(pool.idle_count(), 1);

	let mut conn = pool.acquire().await.unwrap();
	conn.mark_broken();
	conn.release().await;

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(pool.idle_count(), 1);
	assert_eq!(server.dials(), 2);
}

#[test(tokio::test)]
async fn concurrent_acquires_respect_pool_size() {
	let server = TestServer::new();
	let pool = Pool::new(PoolConfig {
		acquire_timeout: Duration::from_secs(5),
		..small_pool_config(&server, 4)
	})
	.unwrap();

	let mut workers = Vec::new();
	for _ in 0..16 {
		let pool = pool.clone();
		workers.push(tokio::spawn(async move {
			for _ in 0..10 {
				let conn = pool.acquire().await.unwrap();
				tokio::task::yield_now().await;
				conn.release().await;
			}
		}));
	}
	for worker in workers {
		worker.await.unwrap();
	}

	assert!(server.dials() <= 4, "dialed {} connections", server.dials());
}

#[test(tokio::test)]
async fn try_acquire_fails_fast_when_exhausted() {
	let server = TestServer::new();
	let pool = Pool::new(small_pool_config(&server, 1)).unwrap();

	let held = pool.try_acquire().await.unwrap();
	let err = pool.try_acquire().await.unwrap_err();
	assert!(matches!(err, Error::PoolExhausted));
	held.release().await;
}

#[test(tokio::test)]
async fn close_drains_the_pool() {
	let server = TestServer::new();
	let pool = Pool::new(PoolConfig {
		min_idle: 2,
		..small_pool_config(&server, 4)
	})
	.unwrap();

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(pool.idle_count(), 2);

	pool.close().await;
	assert_eq!(pool.idle_count(), 0);
	assert!(matches!(
		pool.acquire().await.unwrap_err(),
		Error::PoolClosed
	));
}
