//! Log relay: the host-supplied sink that receives runtime log lines and transfer events.
//!
//! A relay is mandatory; [`NetService`](crate::service::NetService) refuses to start without one.
//! Enable the `tracing` feature to use [`TracingRelay`], which forwards everything to the
//! `tracing` macros under the `netrun` target.

// std
use std::collections::VecDeque;
// self
use crate::{_prelude::*, notify::TransferNotification};

/// Severity attached to each relayed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelayLevel {
	/// Verbose diagnostics.
	Debug,
	/// Normal lifecycle events.
	Info,
	/// Recoverable problems.
	Warn,
	/// Failures surfaced to the caller.
	Error,
}

/// Payload forwarded through the relay.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayEvent {
	/// Free-form log line.
	Log {
		/// Rendered message.
		message: String,
	},
	/// Transfer state change mirrored from the notification hub.
	Transfer(TransferNotification),
}
impl RelayEvent {
	/// Builds a log line event.
	pub fn log(message: impl Into<String>) -> Self {
		Self::Log { message: message.into() }
	}
}
impl Display for RelayEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Log { message } => f.write_str(message),
			Self::Transfer(n) => write!(
				f,
				"{} {} -> {} ({:.1}%) {}",
				n.status,
				n.source,
				n.destination.display(),
				n.percentage,
				n.message
			),
		}
	}
}

/// Sink for runtime log lines and transfer events.
pub trait Relay
where
	Self: Send + Sync,
{
	/// Receives one event; must not block.
	fn emit(&self, level: RelayLevel, event: RelayEvent);
}

/// Relay that forwards events to `tracing`.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingRelay;
#[cfg(feature = "tracing")]
impl Relay for TracingRelay {
	fn emit(&self, level: RelayLevel, event: RelayEvent) {
		match level {
			RelayLevel::Debug => tracing::debug!(target: "netrun", "{event}"),
			RelayLevel::Info => tracing::info!(target: "netrun", "{event}"),
			RelayLevel::Warn => tracing::warn!(target: "netrun", "{event}"),
			RelayLevel::Error => tracing::error!(target: "netrun", "{event}"),
		}
	}
}

/// Events kept by [`MemoryRelay::default`].
pub const MEMORY_RELAY_CAPACITY: usize = 4_096;

/// Relay that keeps the most recent events in memory for tests and polling hosts.
///
/// Once `capacity` events are held, each new event evicts the oldest one.
#[derive(Debug)]
pub struct MemoryRelay {
	events: Mutex<VecDeque<(RelayLevel, RelayEvent)>>,
	capacity: usize,
}
impl MemoryRelay {
	/// Keeps at most `capacity` events; zero is treated as one.
	pub fn with_capacity(capacity: usize) -> Self {
		let capacity = capacity.max(1);

		Self { events: Mutex::new(VecDeque::with_capacity(capacity.min(64))), capacity }
	}

	/// Returns a copy of the retained events, oldest first.
	pub fn events(&self) -> Vec<(RelayLevel, RelayEvent)> {
		self.events.lock().iter().cloned().collect()
	}

	/// Counts retained events at `level`.
	pub fn count(&self, level: RelayLevel) -> usize {
		self.events.lock().iter().filter(|(l, _)| *l == level).count()
	}

	/// Returns the retained transfer events in arrival order.
	pub fn transfers(&self) -> Vec<TransferNotification> {
		self.events
			.lock()
			.iter()
			.filter_map(|(_, event)| match event {
				RelayEvent::Transfer(n) => Some(n.clone()),
				RelayEvent::Log { .. } => None,
			})
			.collect()
	}
}
impl Default for MemoryRelay {
	fn default() -> Self {
		Self::with_capacity(MEMORY_RELAY_CAPACITY)
	}
}
impl Relay for MemoryRelay {
	fn emit(&self, level: RelayLevel, event: RelayEvent) {
		let mut events = self.events.lock();

		if events.len() == self.capacity {
			events.pop_front();
		}

		events.push_back((level, event));
	}
}
