//! Download engine: resolves the destination, runs the selected backend, verifies the checksum,
//! and publishes every state change to the notification hub and the relay.
//!
//! A transfer moves through `IN_PROGRESS* -> COMPLETE | ERROR | STOPPED`. Cancellation and
//! deadline expiry always end in `STOPPED`; a checksum mismatch ends in `ERROR` with the file
//! left on disk.

pub mod checksum;
pub mod policy;
pub mod progress;

mod external;
mod native;

pub use checksum::{sha256_file, sha256_verify};
pub use external::OutputBuffer;
pub use policy::{Backend, Platform, choose_backend, tool_available};
pub use progress::{ProgressSample, ProgressSampler, parse_percentage};

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	config::NetConfig,
	error::{CancelReason, ConfigError, DownloadError},
	notify::{NotificationHub, TransferNotification, TransferStatus},
	obs::{self, TransferSpan},
	relay::{Relay, RelayEvent, RelayLevel},
};

const DEFAULT_CALLBACK_INTERVAL: Duration = Duration::seconds(2);

/// Caller input describing one file transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadFileConfig {
	/// Source URL.
	pub url: String,
	/// Directory receiving the file; created when missing.
	pub destination_folder: PathBuf,
	/// File name; derived from the URL path when unset or empty.
	pub output_file_name: Option<String>,
	/// Expected hex SHA-256 digest of the finished file.
	pub checksum: Option<String>,
	/// Wait for the transfer to finish; otherwise return as soon as it starts.
	pub blocking: bool,
	/// Deadline for the whole transfer.
	pub timeout: Option<Duration>,
}
impl DownloadFileConfig {
	/// Creates a blocking download of `url` into `destination_folder`.
	pub fn new(url: impl Into<String>, destination_folder: impl Into<PathBuf>) -> Self {
		Self {
			url: url.into(),
			destination_folder: destination_folder.into(),
			output_file_name: None,
			checksum: None,
			blocking: true,
			timeout: None,
		}
	}

	/// Overrides the derived file name.
	pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
		self.output_file_name = Some(name.into());

		self
	}

	/// Requires the finished file to hash to `checksum`.
	pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
		self.checksum = Some(checksum.into());

		self
	}

	/// Chooses between waiting for completion and returning immediately.
	pub fn with_blocking(mut self, blocking: bool) -> Self {
		self.blocking = blocking;

		self
	}

	/// Bounds the whole transfer.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

/// Returns the percent-decoded last non-empty path segment of `url`.
pub fn derive_filename(url: &Url) -> Result<String, ConfigError> {
	let invalid = || ConfigError::InvalidFileName { url: url.to_string() };
	let segment = url
		.path_segments()
		.and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
		.ok_or_else(invalid)?;
	let name = urlencoding::decode(segment).map_err(|_| invalid())?;

	if matches!(name.as_ref(), "." | "..") || name.contains(['/', '\\']) {
		return Err(invalid());
	}

	Ok(name.into_owned())
}

/// Runs file transfers with the backend chosen when the service was built.
#[derive(Clone)]
pub struct DownloadEngine(Arc<EngineInner>);
impl DownloadEngine {
	/// Creates an engine publishing through `hub` and `relay`.
	pub fn new(
		http: ReqwestClient,
		hub: NotificationHub,
		relay: Arc<dyn Relay>,
		net: &NetConfig,
		backend: Backend,
	) -> Self {
		let interval = if net.download_callback_interval.is_positive() {
			net.download_callback_interval
		} else {
			DEFAULT_CALLBACK_INTERVAL
		};

		Self(Arc::new(EngineInner {
			http,
			hub,
			relay,
			net: net.clone(),
			backend,
			interval: interval.unsigned_abs(),
		}))
	}

	/// Backend used for every transfer.
	pub fn backend(&self) -> Backend {
		self.0.backend
	}

	/// Downloads `config.url` and returns the destination path.
	///
	/// Non-blocking transfers run on a spawned task; their outcome is only observable through the
	/// hub and the relay. Invalid input fails before any notification is published.
	pub async fn download_file(
		&self,
		config: DownloadFileConfig,
		cancel: CancellationToken,
	) -> Result<PathBuf> {
		let url = Url::parse(&config.url)
			.map_err(|source| ConfigError::InvalidUrl { url: config.url.clone(), source })?;

		self.0.net.check_domain(&url)?;

		let name = match config.output_file_name.filter(|n| !n.trim().is_empty()) {
			Some(name) => name,
			None => derive_filename(&url)?,
		};
		let destination = config.destination_folder.join(name);
		let stop = StopSignal::new(cancel, config.timeout);
		let publisher = TransferPublisher {
			hub: self.0.hub.clone(),
			relay: self.0.relay.clone(),
			source: config.url,
			destination: destination.clone(),
		};
		let checksum = config.checksum.filter(|c| !c.trim().is_empty());

		if config.blocking {
			self.run(url, checksum, stop, publisher).await?;
		} else {
			let engine = self.clone();

			tokio::spawn(async move {
				let _ = engine.run(url, checksum, stop, publisher).await;
			});
		}

		Ok(destination)
	}

	async fn run(
		&self,
		url: Url,
		checksum: Option<String>,
		stop: StopSignal,
		publisher: TransferPublisher,
	) -> Result<()> {
		let backend = self.0.backend;
		let span = TransferSpan::new(&publisher.source, backend);
		let result =
			span.instrument(self.transfer(&url, checksum.as_deref(), &stop, &publisher)).await;
		let notification = match &result {
			Ok(stats) => publisher
				.notification(TransferStatus::Complete)
				.with_percentage(100.)
				.with_bytes(stats.downloaded, stats.total_size)
				.with_message("Download complete"),
			Err(err) => {
				let status = if err.is_cancelled() {
					TransferStatus::Stopped
				} else {
					TransferStatus::Error
				};
				let notification = publisher.notification(status).with_message(err.to_string());

				if matches!(err, Error::Download(DownloadError::ChecksumMismatch { .. })) {
					notification.with_percentage(100.)
				} else {
					notification
				}
			},
		};

		span.finish(notification.status, notification.downloaded);
		obs::record_transfer(backend, notification.status, notification.downloaded);
		publisher.publish(notification);

		result.map(|_| ())
	}

	async fn transfer(
		&self,
		url: &Url,
		checksum: Option<&str>,
		stop: &StopSignal,
		publisher: &TransferPublisher,
	) -> Result<TransferStats> {
		let destination = &publisher.destination;

		if let Some(parent) = destination.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|source| DownloadError::Io { path: parent.to_path_buf(), source })?;
		}

		publisher.publish(
			publisher
				.notification(TransferStatus::InProgress)
				.with_message(format!("Downloading via {} backend", self.0.backend)),
		);

		let stats = match self.0.backend {
			Backend::Native => {
				native::fetch(&self.0.http, url, destination, stop, self.0.interval, publisher)
					.await?
			},
			Backend::External => {
				let program = self.0.net.external_downloader.as_str();

				external::fetch(program, url, destination, stop, self.0.interval, publisher)
					.await?
			},
		};

		if let Some(expected) = checksum {
			checksum::sha256_verify(destination, expected).await?;
		}

		Ok(stats)
	}
}
impl Debug for DownloadEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DownloadEngine")
			.field("backend", &self.0.backend)
			.field("interval", &self.0.interval)
			.finish()
	}
}

struct EngineInner {
	http: ReqwestClient,
	hub: NotificationHub,
	relay: Arc<dyn Relay>,
	net: NetConfig,
	backend: Backend,
	interval: std::time::Duration,
}

#[derive(Clone, Copy, Debug, Default)]
struct TransferStats {
	downloaded: u64,
	total_size: Option<u64>,
}

/// Caller cancellation plus an optional deadline.
#[derive(Clone, Debug)]
struct StopSignal {
	cancel: CancellationToken,
	deadline: Option<Instant>,
}
impl StopSignal {
	/// Starts the deadline clock now; a negative timeout has already elapsed.
	fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
		let deadline = timeout.map(|t| Instant::now() + t.max(Duration::ZERO).unsigned_abs());

		Self { cancel, deadline }
	}

	/// Resolves once the transfer must stop.
	async fn wait(&self) -> CancelReason {
		match self.deadline {
			Some(deadline) => tokio::select! {
				_ = self.cancel.cancelled() => CancelReason::Cancelled,
				_ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
			},
			None => {
				self.cancel.cancelled().await;

				CancelReason::Cancelled
			},
		}
	}
}

/// Publishes notifications of one transfer to the hub and mirrors them to the relay.
#[derive(Clone)]
struct TransferPublisher {
	hub: NotificationHub,
	relay: Arc<dyn Relay>,
	source: String,
	destination: PathBuf,
}
impl TransferPublisher {
	fn notification(&self, status: TransferStatus) -> TransferNotification {
		TransferNotification::new(self.source.clone(), self.destination.clone(), status)
	}

	fn progress(&self, sample: ProgressSample) {
		self.publish(
			self.notification(TransferStatus::InProgress)
				.with_percentage(sample.percentage)
				.with_bytes(sample.downloaded, sample.total_size)
				.with_rate(sample.speed, sample.eta),
		);
	}

	fn warn(&self, message: impl Into<String>) {
		self.relay.emit(RelayLevel::Warn, RelayEvent::log(message));
	}

	fn publish(&self, notification: TransferNotification) {
		let report = self.hub.publish(&notification);

		obs::record_delivery(&report);
		let level = match notification.status {
			TransferStatus::InProgress => RelayLevel::Debug,
			TransferStatus::Complete | TransferStatus::Stopped => RelayLevel::Info,
			TransferStatus::Error => RelayLevel::Error,
		};

		if report.disconnected > 0 {
			self.warn(format!(
				"Disconnected {} slow subscriber(s) of {}",
				report.disconnected, self.source
			));
		}

		self.relay.emit(level, RelayEvent::Transfer(notification));
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::relay::MemoryRelay;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Fixture URL should parse.")
	}

	#[test]
	fn derive_filename_decodes_the_last_segment() {
		let name = derive_filename(&url("https://h/a/b/hello%20world.zip"))
			.expect("Name should be derived.");

		assert_eq!(name, "hello world.zip");
		assert_eq!(
			derive_filename(&url("https://h/dir/file.tar.gz/")).expect("Slash should be ignored."),
			"file.tar.gz"
		);
		assert_eq!(
			derive_filename(&url("https://h/a+b.txt?x=1")).expect("Query is ignored."),
			"a+b.txt"
		);
	}

	#[test]
	fn derive_filename_rejects_unusable_paths() {
		for raw in ["https://h/", "https://h/a/%2e%2e", "https://h/a/x%2Fy"] {
			let err = derive_filename(&url(raw)).expect_err("Path has no usable file name.");

			assert!(matches!(err, ConfigError::InvalidFileName { .. }), "{raw}");
		}
	}

	#[tokio::test]
	async fn stop_signal_reports_deadline_and_cancellation() {
		let cancel = CancellationToken::new();
		let deadline = StopSignal { cancel: cancel.clone(), deadline: Some(Instant::now()) };

		assert_eq!(deadline.wait().await, CancelReason::DeadlineExceeded);

		let stop = StopSignal { cancel: cancel.clone(), deadline: None };

		cancel.cancel();

		assert_eq!(stop.wait().await, CancelReason::Cancelled);
	}

	#[tokio::test]
	async fn negative_timeout_is_already_past() {
		let stop = StopSignal::new(CancellationToken::new(), Some(Duration::hours(-1)));
		let reason = tokio::time::timeout(std::time::Duration::from_secs(1), stop.wait())
			.await
			.expect("A negative timeout must not become a future deadline.");

		assert_eq!(reason, CancelReason::DeadlineExceeded);
	}

	#[tokio::test]
	async fn invalid_input_fails_before_publishing() {
		let hub = NotificationHub::default();
		let relay = Arc::new(MemoryRelay::default());
		let net = NetConfig::default().with_domains(Vec::new(), vec!["blocked.test".into()]);
		let engine = DownloadEngine::new(
			ReqwestClient::new(),
			hub.clone(),
			relay.clone(),
			&net,
			Backend::Native,
		);
		let blocked = engine
			.download_file(
				DownloadFileConfig::new("https://cdn.blocked.test/file.bin", "/tmp"),
				CancellationToken::new(),
			)
			.await
			.expect_err("Blocked hosts must be rejected.");
		let nameless = engine
			.download_file(
				DownloadFileConfig::new("https://ok.test/", "/tmp"),
				CancellationToken::new(),
			)
			.await
			.expect_err("URL without a file name must be rejected.");

		assert!(matches!(blocked, Error::Config(ConfigError::DomainNotPermitted { .. })));
		assert!(matches!(nameless, Error::Config(ConfigError::InvalidFileName { .. })));
		assert!(hub.transfer_states().is_empty());
		assert!(relay.events().is_empty());
	}
}
