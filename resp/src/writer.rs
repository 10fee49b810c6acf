use chrono::SecondsFormat;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::{reader::tag, Arg, Result};

/// Encodes commands as RESP array-of-bulk-string frames.
///
/// Writes accumulate in an internal buffer; callers must
/// [`flush`](Writer::flush) after a successful sequence of writes. Buffering
/// keeps a multi-argument command to one syscall.
#[derive(Debug)]
pub struct Writer<W> {
	wr: BufWriter<W>,
}

impl<W> Writer<W>
where
	W: AsyncWrite + Send + Unpin,
{
	pub fn new(wr: W) -> Self {
		Self {
			wr: BufWriter::new(wr),
		}
	}

	/// Encode one command: a `*<n>` header followed by every argument as a
	/// bulk string.
	#[tracing::instrument(level = "trace", skip_all, err)]
	pub async fn write_command(&mut self, args: &[Arg]) -> Result<()> {
		self.write_header(tag::ARRAY, args.len() as i64).await?;
		for arg in args {
			self.write_arg(arg).await?;
		}
		Ok(())
	}

	/// Flush buffered frames to the transport.
	pub async fn flush(&mut self) -> Result<()> {
		self.wr.flush().await?;
		Ok(())
	}

	pub fn get_ref(&self) -> &W {
		self.wr.get_ref()
	}

	pub fn get_mut(&mut self) -> &mut BufWriter<W> {
		&mut self.wr
	}

	/// Unwrap the underlying transport, discarding unflushed bytes.
	pub fn into_inner(self) -> W {
		self.wr.into_inner()
	}

	async fn write_arg(&mut self, arg: &Arg) -> Result<()> {
		match arg {
			Arg::Str(str) => self.write_bulk(str.as_bytes()).await,
			Arg::Bytes(bytes) => self.write_bulk(bytes).await,
			Arg::Int(int) => self.write_bulk(int.to_string().as_bytes()).await,
			Arg::Uint(int) => self.write_bulk(int.to_string().as_bytes()).await,
			// `Display` for floats is the shortest representation that
			// round-trips, matching the server's convention.
			Arg::Float(f) => self.write_bulk(f.to_string().as_bytes()).await,
			// Booleans travel as integers, not as the native RESP boolean:
			// the server's command arguments are always bulk strings.
			Arg::Bool(b) => self.write_bulk(if *b { b"1" } else { b"0" }).await,
			Arg::Time(ts) => {
				let formatted = ts.to_rfc3339_opts(SecondsFormat::AutoSi, true);
				self.write_bulk(formatted.as_bytes()).await
			}
			Arg::Duration(dur) => {
				self.write_bulk(dur.as_nanos().to_string().as_bytes()).await
			}
			Arg::Ip(ip) => self.write_bulk(ip.to_string().as_bytes()).await,
		}
	}

	async fn write_bulk(&mut self, bytes: &[u8]) -> Result<()> {
		self.write_header(tag::BULK, bytes.len() as i64).await?;
		self.wr.write_all(bytes).await?;
		self.wr.write_all(b"\r\n").await?;
		Ok(())
	}

	async fn write_header(&mut self, tag: u8, len: i64) -> Result<()> {
		self.wr.write_all(&[tag]).await?;
		self.wr.write_all(len.to_string().as_bytes()).await?;
		self.wr.write_all(b"\r\n").await?;
		Ok(())
	}
}
