// self
use crate::{_prelude::*, download::Backend, notify::TransferStatus};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// `netrun.request` span around one attempt dispatched to a client.
#[derive(Clone, Debug)]
pub struct RequestSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RequestSpan {
	/// Opens the span for `client` running `task`.
	pub fn new(client: &str, task: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"netrun.request",
				client,
				task,
				result = tracing::field::Empty
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (client, task);

			Self {}
		}
	}

	/// Runs `fut` inside the span.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			attach(&self.span, fut)
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Records how the attempt ended.
	pub fn finish<T>(&self, result: &Result<T>) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("result", super::result_label(result));
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = result;
		}
	}
}

/// `netrun.transfer` span covering one download up to its terminal state.
#[derive(Clone, Debug)]
pub struct TransferSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl TransferSpan {
	/// Opens the span for `url` fetched through `backend`.
	pub fn new(url: &str, backend: Backend) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"netrun.transfer",
				url,
				backend = backend.as_str(),
				status = tracing::field::Empty,
				bytes = tracing::field::Empty
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (url, backend);

			Self {}
		}
	}

	/// Runs `fut` inside the span.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			attach(&self.span, fut)
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Records the terminal status and the bytes written.
	pub fn finish(&self, status: TransferStatus, bytes: u64) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("status", status.as_str());
			self.span.record("bytes", bytes);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (status, bytes);
		}
	}
}

#[cfg(feature = "tracing")]
fn attach<Fut>(span: &tracing::Span, fut: Fut) -> InstrumentedOp<Fut>
where
	Fut: Future,
{
	use tracing::Instrument;

	fut.instrument(span.clone())
}
