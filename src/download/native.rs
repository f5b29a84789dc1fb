//! Streaming download through reqwest.

// crates.io
use tokio::{
	fs::File,
	io::{AsyncWriteExt, BufWriter},
	time::Instant,
};
// self
use crate::{
	_prelude::*,
	download::{StopSignal, TransferPublisher, TransferStats, progress::ProgressSampler},
	error::DownloadError,
};

const WRITE_BUFFER: usize = 64 * 1024;

/// Streams `url` into `destination`, checking for a stop request before every read.
pub(super) async fn fetch(
	http: &ReqwestClient,
	url: &Url,
	destination: &Path,
	stop: &StopSignal,
	interval: std::time::Duration,
	publisher: &TransferPublisher,
) -> Result<TransferStats> {
	let mut response = tokio::select! {
		biased;
		reason = stop.wait() => return Err(Error::Cancelled(reason)),
		response = http.get(url.clone()).send() => response?,
	};
	let status = response.status();

	if status.as_u16() >= 400 {
		return Err(DownloadError::BadStatus {
			status: status.as_u16(),
			reason: status.canonical_reason().unwrap_or_default().into(),
		}
		.into());
	}

	let total_size = response.content_length().filter(|len| *len > 0);

	if total_size.is_none() {
		publisher.warn(format!("Unknown file size for {}", publisher.source));
	}

	let io_err = |source| DownloadError::Io { path: destination.to_path_buf(), source };
	let file = File::create(destination).await.map_err(io_err)?;
	let mut writer = BufWriter::with_capacity(WRITE_BUFFER, file);
	let mut sampler = ProgressSampler::new(total_size, interval, Instant::now());

	loop {
		let chunk = tokio::select! {
			biased;
			reason = stop.wait() => return Err(Error::Cancelled(reason)),
			chunk = response.chunk() => chunk?,
		};
		let Some(chunk) = chunk else { break };

		writer.write_all(&chunk).await.map_err(io_err)?;

		if let Some(sample) = sampler.observe(chunk.len() as u64, Instant::now()) {
			publisher.progress(sample);
		}
	}

	writer.flush().await.map_err(io_err)?;

	Ok(TransferStats { downloaded: sampler.downloaded(), total_size })
}
