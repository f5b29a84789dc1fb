//! Optional observability for request attempts, transfers, and notification fan-out.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to wrap every request attempt in a `netrun.request` span (`client`, `task`,
//!   `result`) and every download in a `netrun.transfer` span (`url`, `backend`, `status`,
//!   `bytes`). The trailing fields are recorded when the operation ends.
//! - Enable `metrics` to maintain these counters:
//!   - `netrun_requests_total{client, result}`, where `result` is `ok` or an error kind;
//!   - `netrun_retries_total{client}`;
//!   - `netrun_transfers_total{backend, status}` and `netrun_transfer_bytes_total{backend}`;
//!   - `netrun_notifications_total{delivery}` with `delivered`, `queued`, `dropped`, or
//!     `disconnected`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Labels a finished attempt: `ok`, or the [`ErrorKind`](crate::error::ErrorKind) of the failure.
pub fn result_label<T>(result: &Result<T>) -> &'static str {
	match result {
		Ok(_) => "ok",
		Err(e) => e.kind().as_str(),
	}
}
