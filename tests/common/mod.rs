#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;

use redpool::resp::{self, Value};
use redpool::{BoxedTransport, Dialer};

struct Entry {
	value: Bytes,
	expires_at: Option<Instant>,
}

type Store = Arc<Mutex<HashMap<String, Entry>>>;

/// An in-process RESP server. Every dial opens a fresh duplex pipe served by
/// its own task; all pipes share one key space.
pub struct TestServer {
	store: Store,
	dials: Arc<AtomicUsize>,
}

impl TestServer {
	pub fn new() -> Self {
		Self {
			store: Arc::new(Mutex::new(HashMap::new())),
			dials: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// How many connections have been dialed so far.
	pub fn dials(&self) -> usize {
		self.dials.load(Ordering::SeqCst)
	}

	pub fn dialer(&self) -> Dialer {
		let store = self.store.clone();
		let dials = self.dials.clone();

		Arc::new(move || -> BoxFuture<'static, io::Result<BoxedTransport>> {
			let store = store.clone();
			let dials = dials.clone();
			Box::pin(async move {
				dials.fetch_add(1, Ordering::SeqCst);
				let (client, server) = tokio::io::duplex(16 * 1024);
				tokio::spawn(serve(server, store));
				Ok(Box::new(client) as BoxedTransport)
			})
		})
	}
}

async fn serve(stream: tokio::io::DuplexStream, store: Store) {
	let (rd, mut wr) = tokio::io::split(stream);
	let mut reader = resp::Reader::new(rd);

	loop {
		let cmd = match reader.read().await {
			Ok(Value::Array(items)) => items,
			// Peer hung up or sent garbage; either way this session is over.
			_ => return,
		};

		let mut parts = cmd.into_iter().map(|item| match item {
			Value::Bulk(bytes) => bytes,
			_ => Bytes::new(),
		});
		let name = parts.next().unwrap_or_default().to_ascii_uppercase();

		let reply = match name.as_slice() {
			b"PING" => match parts.next() {
				Some(msg) => bulk_reply(&msg),
				None => b"+PONG\r\n".to_vec(),
			},
			b"SET" => handle_set(parts.collect(), &store),
			b"GET" => handle_get(parts.next(), &store),
			_ => b"-ERR unknown command\r\n".to_vec(),
		};

		if wr.write_all(&reply).await.is_err() {
			return;
		}
	}
}

fn handle_set(args: Vec<Bytes>, store: &Store) -> Vec<u8> {
	if args.len() < 2 {
		return b"-ERR wrong number of arguments for 'set' command\r\n".to_vec();
	}
	let key = String::from_utf8_lossy(&args[0]).into_owned();
	let value = args[1].clone();

	let expires_at = match args.get(2).map(|unit| unit.to_ascii_uppercase()) {
		None => None,
		Some(unit) => {
			let amount = args
				.get(3)
				.and_then(|n| std::str::from_utf8(n).ok())
				.and_then(|n| n.parse::<u64>().ok());
			match (unit.as_slice(), amount) {
				(b"EX", Some(secs)) => Some(Instant::now() + Duration::from_secs(secs)),
				(b"PX", Some(ms)) => Some(Instant::now() + Duration::from_millis(ms)),
				_ => return b"-ERR syntax error\r\n".to_vec(),
			}
		}
	};

	store
		.lock()
		.unwrap()
		.insert(key, Entry { value, expires_at });
	b"+OK\r\n".to_vec()
}

fn handle_get(key: Option<Bytes>, store: &Store) -> Vec<u8> {
	let Some(key) = key else {
		return b"-ERR wrong number of arguments for 'get' command\r\n".to_vec();
	};
	let key = String::from_utf8_lossy(&key).into_owned();

	let mut store = store.lock().unwrap();
	let expired = matches!(
		store.get(&key),
		Some(entry) if entry.expires_at.map_or(false, |at| Instant::now() >= at)
	);
	if expired {
		store.remove(&key);
		return b"_\r\n".to_vec();
	}
	match store.get(&key) {
		Some(entry) => bulk_reply(&entry.value),
		None => b"_\r\n".to_vec(),
	}
}

fn bulk_reply(bytes: &[u8]) -> Vec<u8> {
	let mut out = format!("${}\r\n", bytes.len()).into_bytes();
	out.extend_from_slice(bytes);
	out.extend_from_slice(b"\r\n");
	out
}
