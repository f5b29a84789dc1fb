//! Retry controller: delay policies, error classification, and the attempt loop.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	obs,
	relay::{Relay, RelayEvent, RelayLevel},
	request::{RequestConfig, Response},
};

const RETRY_AFTER_CAP: Duration = Duration::seconds(60);

/// Computes the wait before a retry attempt.
pub trait DelayPolicy
where
	Self: Send + Sync + Debug,
{
	/// Returns the delay preceding `attempt` (1 for the first retry) of `task`.
	fn delay(&self, task: &str, attempt: u32) -> Duration;
}

/// Fixed delay between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantDelay {
	/// Wait applied before every retry.
	pub period: Duration,
}
impl ConstantDelay {
	/// Creates a constant delay policy.
	pub const fn new(period: Duration) -> Self {
		Self { period }
	}
}
impl Default for ConstantDelay {
	fn default() -> Self {
		Self::new(Duration::SECOND)
	}
}
impl DelayPolicy for ConstantDelay {
	fn delay(&self, _task: &str, _attempt: u32) -> Duration {
		self.period
	}
}

/// Exponential backoff: `min(base * 2^attempt, cap)` plus uniform jitter in `[0, jitter)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
	/// Delay before doubling.
	pub base: Duration,
	/// Upper bound on the exponential component.
	pub cap: Duration,
	/// Upper bound (exclusive) of the random jitter.
	pub jitter: Duration,
}
impl Default for ExponentialBackoff {
	fn default() -> Self {
		Self { base: Duration::seconds(2), cap: Duration::seconds(10), jitter: Duration::SECOND }
	}
}
impl DelayPolicy for ExponentialBackoff {
	fn delay(&self, _task: &str, attempt: u32) -> Duration {
		let factor = 2f64.powi(attempt.min(32) as i32);
		let exp = (self.base.as_seconds_f64() * factor).min(self.cap.as_seconds_f64()).max(0.);
		let jitter = self.jitter.as_seconds_f64();
		let jitter = if jitter > 0. { rand::rng().random_range(0.0..jitter) } else { 0. };

		Duration::seconds_f64(exp + jitter)
	}
}

/// Decides whether a failed attempt may be retried.
pub trait RetryClassifier
where
	Self: Send + Sync,
{
	/// Returns `true` when `error` should trigger another attempt.
	fn is_retryable(&self, error: &Error) -> bool;
}

/// Classification based on [`ErrorKind::is_retryable`](crate::error::ErrorKind::is_retryable).
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;
impl RetryClassifier for DefaultClassifier {
	fn is_retryable(&self, error: &Error) -> bool {
		error.kind().is_retryable()
	}
}

/// Drives `attempt` until it succeeds, fails fatally, or the retry budget runs out.
///
/// Server error statuses count as retryable outcomes; exhausting the budget on one yields
/// [`Error::RetriesExhausted`] wrapping an [`Error::Server`] that carries the final response.
pub async fn run<F, Fut>(
	config: &RequestConfig,
	relay: &dyn Relay,
	mut attempt: F,
) -> Result<Response>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Response>>,
{
	let task = config.task_name();
	let fallback = ConstantDelay::default();
	let delay = config.delay.as_deref().map_or(&fallback as &dyn DelayPolicy, |d| d);
	let classifier =
		config.classifier.as_deref().map_or(&DefaultClassifier as &dyn RetryClassifier, |c| c);
	let total = config.max_retries.saturating_add(1);
	let mut server_hint = None;
	let mut n = 0;

	loop {
		if n > 0 {
			let wait = server_hint.take().unwrap_or_else(|| delay.delay(task, n));

			obs::record_retry(&config.client_ref);
			tokio::time::sleep(wait.max(Duration::ZERO).unsigned_abs()).await;
		}

		n += 1;

		let exhausted = n >= total;

		match attempt().await {
			Ok(response) if response.is_server_error() => {
				relay.emit(
					RelayLevel::Warn,
					RelayEvent::log(format!(
						"{task}: attempt {n} of {total} returned status {}",
						response.status
					)),
				);

				if exhausted {
					let status = response.status;

					return Err(Error::RetriesExhausted {
						attempts: n,
						last: Box::new(Error::Server { status, response: Box::new(response) }),
					});
				}

				server_hint = response.retry_after().map(|hint| hint.min(RETRY_AFTER_CAP));
			},
			Ok(response) => return Ok(response),
			Err(err) if classifier.is_retryable(&err) => {
				relay.emit(
					RelayLevel::Warn,
					RelayEvent::log(format!("{task}: attempt {n} of {total} failed: {err}")),
				);

				if exhausted {
					return Err(Error::RetriesExhausted { attempts: n, last: Box::new(err) });
				}
			},
			Err(err) => return Err(err),
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::{
		error::{ConfigError, TransientError},
		relay::MemoryRelay,
	};

	fn instant_config(max_retries: u32) -> RequestConfig {
		RequestConfig::default()
			.with_max_retries(max_retries)
			.with_delay(Some(Arc::new(ConstantDelay::new(Duration::ZERO))))
	}

	#[test]
	fn exponential_backoff_stays_within_bounds() {
		let backoff = ExponentialBackoff::default();

		for _ in 0..32 {
			let first = backoff.delay("t", 0);
			let capped = backoff.delay("t", 6);

			assert!(first >= Duration::seconds(2) && first < Duration::seconds(3));
			assert!(capped >= Duration::seconds(10) && capped < Duration::seconds(11));
		}
	}

	#[test]
	fn backoff_without_jitter_is_deterministic() {
		let backoff = ExponentialBackoff { jitter: Duration::ZERO, ..Default::default() };

		assert_eq!(backoff.delay("t", 1), Duration::seconds(4));
		assert_eq!(backoff.delay("t", 2), Duration::seconds(8));
		assert_eq!(backoff.delay("t", 3), Duration::seconds(10));
	}

	#[tokio::test]
	async fn transient_failures_consume_exactly_the_budget() {
		let relay = MemoryRelay::default();
		let calls = AtomicU32::new(0);
		let result = run(&instant_config(2), &relay, || {
			calls.fetch_add(1, Ordering::Relaxed);

			async { Err(TransientError::Timeout { operation: "t".into() }.into()) }
		})
		.await;
		let err = result.expect_err("Persistent timeouts should exhaust retries.");

		assert_eq!(calls.load(Ordering::Relaxed), 3);
		assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
		assert_eq!(relay.count(RelayLevel::Warn), 3);
	}

	#[tokio::test]
	async fn server_errors_surface_last_response() {
		let relay = MemoryRelay::default();
		let calls = AtomicU32::new(0);
		let result = run(&instant_config(1), &relay, || {
			let n = calls.fetch_add(1, Ordering::Relaxed);

			async move { Ok(Response::new(500 + n as u16, Vec::new())) }
		})
		.await;
		let err = result.expect_err("Persistent 5xx should exhaust retries.");

		assert_eq!(calls.load(Ordering::Relaxed), 2);
		assert_eq!(err.response().map(|r| r.status), Some(501));
	}

	#[tokio::test]
	async fn client_errors_and_fatal_errors_are_not_retried() {
		let relay = MemoryRelay::default();
		let calls = AtomicU32::new(0);
		let response = run(&instant_config(5), &relay, || {
			calls.fetch_add(1, Ordering::Relaxed);

			async { Ok(Response::new(404, Vec::new())) }
		})
		.await
		.expect("4xx responses should be returned as-is.");

		assert_eq!(response.status, 404);
		assert_eq!(calls.load(Ordering::Relaxed), 1);

		let err = run(&instant_config(5), &relay, || {
			calls.fetch_add(1, Ordering::Relaxed);

			async { Err(ConfigError::MissingPayload.into()) }
		})
		.await
		.expect_err("Config errors should fail immediately.");

		assert!(matches!(err, Error::Config(ConfigError::MissingPayload)));
		assert_eq!(calls.load(Ordering::Relaxed), 2);
	}

	#[tokio::test]
	async fn recovers_after_transient_failure() {
		let relay = MemoryRelay::default();
		let calls = AtomicU32::new(0);
		let response = run(&instant_config(3), &relay, || {
			let n = calls.fetch_add(1, Ordering::Relaxed);

			async move {
				if n == 0 {
					Err(TransientError::Timeout { operation: "t".into() }.into())
				} else {
					Ok(Response::new(200, b"ok".to_vec()))
				}
			}
		})
		.await
		.expect("Second attempt should succeed.");

		assert_eq!(response.text(), "ok");
		assert_eq!(calls.load(Ordering::Relaxed), 2);
	}

	#[tokio::test]
	async fn negative_delay_retries_without_waiting() {
		let relay = MemoryRelay::default();
		let calls = AtomicU32::new(0);
		let config = RequestConfig::default()
			.with_max_retries(1)
			.with_delay(Some(Arc::new(ConstantDelay::new(Duration::hours(-1)))));
		let attempts = run(&config, &relay, || {
			calls.fetch_add(1, Ordering::Relaxed);

			async { Ok(Response::new(503, Vec::new())) }
		});
		let err = tokio::time::timeout(std::time::Duration::from_secs(1), attempts)
			.await
			.expect("A negative delay must not turn into a long sleep.")
			.expect_err("Persistent 5xx should exhaust retries.");

		assert_eq!(calls.load(Ordering::Relaxed), 2);
		assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));
	}

	#[tokio::test]
	async fn custom_classifier_overrides_policy() {
		struct Never;
		impl RetryClassifier for Never {
			fn is_retryable(&self, _error: &Error) -> bool {
				false
			}
		}

		let relay = MemoryRelay::default();
		let calls = AtomicU32::new(0);
		let config = instant_config(4).with_classifier(Arc::new(Never));
		let err = run(&config, &relay, || {
			calls.fetch_add(1, Ordering::Relaxed);

			async { Err(TransientError::Timeout { operation: "t".into() }.into()) }
		})
		.await
		.expect_err("Classifier should stop retries.");

		assert!(matches!(err, Error::Transient(_)));
		assert_eq!(calls.load(Ordering::Relaxed), 1);
	}
}
