// self
use crate::{
	_prelude::*,
	download::Backend,
	notify::{PublishReport, TransferStatus},
};

/// Counts one finished request attempt against `client`.
pub fn record_request<T>(client: &str, result: &Result<T>) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"netrun_requests_total",
			"client" => client.to_owned(),
			"result" => super::result_label(result)
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (client, result);
	}
}

/// Counts one retry scheduled for `client`.
pub fn record_retry(client: &str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("netrun_retries_total", "client" => client.to_owned()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = client;
	}
}

/// Counts a transfer reaching `status` and the bytes it wrote.
pub fn record_transfer(backend: Backend, status: TransferStatus, bytes: u64) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"netrun_transfers_total",
			"backend" => backend.as_str(),
			"status" => status.as_str()
		)
		.increment(1);
		metrics::counter!("netrun_transfer_bytes_total", "backend" => backend.as_str())
			.increment(bytes);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (backend, status, bytes);
	}
}

/// Adds the per-subscriber results of one publish to the delivery counters.
pub fn record_delivery(report: &PublishReport) {
	#[cfg(feature = "metrics")]
	{
		let outcomes = [
			("delivered", report.delivered),
			("queued", report.queued),
			("dropped", report.dropped),
			("disconnected", report.disconnected),
		];

		for (delivery, count) in outcomes.into_iter().filter(|(_, n)| *n > 0) {
			metrics::counter!("netrun_notifications_total", "delivery" => delivery)
				.increment(count as u64);
		}
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = report;
	}
}
