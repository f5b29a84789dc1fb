//! Download through an external command-line tool (curl-compatible flags).

// std
use std::process::Stdio;
// crates.io
use tokio::{
	io::{AsyncRead, AsyncReadExt},
	process::Command,
	sync::oneshot,
	time::{self, Instant},
};
// self
use crate::{
	_prelude::*,
	download::{StopSignal, TransferPublisher, TransferStats, progress},
	error::DownloadError,
};

/// Shared sink for the downloader's progress output.
#[derive(Clone, Debug, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);
impl OutputBuffer {
	/// Appends raw output.
	pub fn push(&self, bytes: &[u8]) {
		self.0.lock().extend_from_slice(bytes);
	}

	/// Drains everything captured so far as lossy UTF-8.
	pub fn flush(&self) -> String {
		let bytes = std::mem::take(&mut *self.0.lock());

		String::from_utf8_lossy(&bytes).into_owned()
	}
}

/// Runs `program -L --progress-bar --fail -o <destination> <url>` and reports its progress.
///
/// The child is awaited on its own task so the progress ticker and process exit race safely. A
/// stop request, or dropping this future, kills the child and still reaps it.
pub(super) async fn fetch(
	program: &str,
	url: &Url,
	destination: &Path,
	stop: &StopSignal,
	interval: std::time::Duration,
	publisher: &TransferPublisher,
) -> Result<TransferStats> {
	let tool_err = |message: String| DownloadError::ExternalTool { message };
	let mut child = Command::new(program)
		.args(["-L", "--progress-bar", "--fail", "-o"])
		.arg(destination)
		.arg(url.as_str())
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::piped())
		.kill_on_drop(true)
		.spawn()
		.map_err(|e| tool_err(format!("cannot start `{program}`: {e}")))?;
	let stderr = child.stderr.take().ok_or_else(|| tool_err("stderr was not captured".into()))?;
	let buffer = OutputBuffer::default();
	let reader = tokio::spawn(capture(stderr, buffer.clone()));
	let (kill_tx, kill_rx) = oneshot::channel::<()>();
	let mut waiter = tokio::spawn(async move {
		tokio::select! {
			status = child.wait() => status.map(Some),
			_ = kill_rx => child.kill().await.map(|()| None),
		}
	});
	let mut ticker = time::interval_at(Instant::now() + interval, interval);
	let mut kill_tx = Some(kill_tx);
	let mut stopped = None;
	let joined = loop {
		tokio::select! {
			biased;
			joined = &mut waiter => break joined,
			reason = stop.wait(), if kill_tx.is_some() => {
				if let Some(tx) = kill_tx.take() {
					let _ = tx.send(());
				}

				stopped = Some(reason);
			},
			_ = ticker.tick() => {
				if let Some(percentage) = progress::parse_percentage(&buffer.flush()) {
					publisher.progress(progress::ProgressSample::percentage(percentage));
				}
			},
		}
	};
	let _ = reader.await;
	let exit = joined
		.map_err(|e| tool_err(format!("wait task failed: {e}")))?
		.map_err(|e| tool_err(format!("cannot wait for `{program}`: {e}")))?;

	if let Some(reason) = stopped {
		return Err(Error::Cancelled(reason));
	}

	match exit {
		Some(status) if status.success() => {},
		other => {
			return Err(DownloadError::ExternalExit { code: other.and_then(|s| s.code()) }.into());
		},
	}

	let downloaded = tokio::fs::metadata(destination)
		.await
		.map_err(|source| DownloadError::Io { path: destination.to_path_buf(), source })?
		.len();

	Ok(TransferStats { downloaded, total_size: Some(downloaded) })
}

async fn capture<R>(mut output: R, buffer: OutputBuffer)
where
	R: AsyncRead + Unpin,
{
	let mut chunk = [0; 1024];

	while let Ok(read) = output.read(&mut chunk).await {
		if read == 0 {
			break;
		}

		buffer.push(&chunk[..read]);
	}
}
