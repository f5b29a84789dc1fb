//! Throttled progress sampling and downloader output parsing.

// crates.io
use tokio::time::Instant;
// self
use crate::_prelude::*;

/// Progress figures computed at one sampling point.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSample {
	/// Bytes received so far.
	pub downloaded: u64,
	/// Announced size, if any.
	pub total_size: Option<u64>,
	/// Completion in `[0, 100]`; zero when the size is unknown.
	pub percentage: f64,
	/// Bytes per second since the previous sample.
	pub speed: Option<f64>,
	/// Remaining time at the current speed.
	pub eta: Option<Duration>,
}
impl ProgressSample {
	/// Sample carrying only a percentage, as reported by an external tool.
	pub fn percentage(percentage: f64) -> Self {
		Self {
			downloaded: 0,
			total_size: None,
			percentage: percentage.clamp(0., 100.),
			speed: None,
			eta: None,
		}
	}
}

/// Counts bytes on every read and yields a sample at most once per interval.
#[derive(Debug)]
pub struct ProgressSampler {
	total_size: Option<u64>,
	interval: std::time::Duration,
	downloaded: u64,
	last_at: Instant,
	last_bytes: u64,
}
impl ProgressSampler {
	/// Starts sampling at `now`.
	pub fn new(total_size: Option<u64>, interval: std::time::Duration, now: Instant) -> Self {
		Self {
			total_size: total_size.filter(|t| *t > 0),
			interval,
			downloaded: 0,
			last_at: now,
			last_bytes: 0,
		}
	}

	/// Bytes observed so far.
	pub fn downloaded(&self) -> u64 {
		self.downloaded
	}

	/// Records `read` new bytes; returns a sample when the interval has elapsed.
	pub fn observe(&mut self, read: u64, now: Instant) -> Option<ProgressSample> {
		self.downloaded = self.downloaded.saturating_add(read);

		let elapsed = now.saturating_duration_since(self.last_at);

		if elapsed < self.interval || elapsed.is_zero() {
			return None;
		}

		let speed = (self.downloaded - self.last_bytes) as f64 / elapsed.as_secs_f64();
		let percentage = self
			.total_size
			.map_or(0., |total| (self.downloaded as f64 / total as f64 * 100.).min(100.));
		// Unrepresentable estimates are reported as unknown.
		let eta = self.total_size.filter(|_| speed > 0.).and_then(|total| {
			let remaining = total.saturating_sub(self.downloaded) as f64;

			Duration::checked_seconds_f64(remaining / speed)
		});

		self.last_at = now;
		self.last_bytes = self.downloaded;

		Some(ProgressSample {
			downloaded: self.downloaded,
			total_size: self.total_size,
			percentage,
			speed: Some(speed),
			eta,
		})
	}
}

/// Extracts the last `NN.N%` token from downloader output, clamped to `[0, 100]`.
pub fn parse_percentage(output: &str) -> Option<f64> {
	output
		.split(|c: char| c.is_whitespace() || c == '\r')
		.rev()
		.filter_map(|token| token.strip_suffix('%'))
		.find_map(|number| number.trim_start_matches('#').parse::<f64>().ok())
		.filter(|p| p.is_finite())
		.map(|p| p.clamp(0., 100.))
}
