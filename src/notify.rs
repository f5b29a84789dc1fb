//! Notification hub: per-URL fan-out of transfer state changes.
//!
//! Every subscriber owns a bounded channel of [`SUBSCRIBER_BUFFER`] notifications. Publishing
//! never blocks:
//!
//! - progress updates use a non-blocking send and are dropped for subscribers whose buffer is full;
//! - terminal updates ([`TransferStatus::is_terminal`]) fall back to a per-subscriber forwarding
//!   task with a bounded queue of [`OVERFLOW_DEPTH`] entries, and a subscriber whose queue also
//!   overflows is disconnected so it observes end-of-stream rather than a stale state.

// std
use std::sync::{
	Weak,
	atomic::{AtomicU64, Ordering},
};
// crates.io
use tokio::{
	runtime::Handle,
	sync::mpsc::{self, error::TrySendError},
};
// self
use crate::_prelude::*;

/// Capacity of each subscriber channel.
pub const SUBSCRIBER_BUFFER: usize = 10;
/// Capacity of the per-subscriber queue holding terminal notifications that did not fit.
pub const OVERFLOW_DEPTH: usize = 16;

/// Receiving half handed to subscribers.
pub type TransferReceiver = mpsc::Receiver<TransferNotification>;

/// Lifecycle state of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
	/// Bytes are flowing.
	InProgress,
	/// Transfer finished and passed verification.
	Complete,
	/// Transfer failed.
	Error,
	/// Transfer was cancelled or hit its deadline.
	Stopped,
}
impl TransferStatus {
	/// Returns `true` for statuses that end a transfer.
	pub const fn is_terminal(self) -> bool {
		!matches!(self, Self::InProgress)
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::InProgress => "IN_PROGRESS",
			Self::Complete => "COMPLETE",
			Self::Error => "ERROR",
			Self::Stopped => "STOPPED",
		}
	}
}
impl Display for TransferStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Snapshot of a transfer published to subscribers and the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferNotification {
	/// Source URL; subscribers are keyed by it.
	pub source: String,
	/// Destination file path; transfer state is keyed by it.
	pub destination: PathBuf,
	/// Lifecycle state.
	pub status: TransferStatus,
	/// Completion in `[0, 100]`.
	pub percentage: f64,
	/// Expected size in bytes, when the upstream announced one.
	pub total_size: Option<u64>,
	/// Bytes written so far.
	pub downloaded: u64,
	/// Average throughput in bytes per second.
	pub speed: Option<f64>,
	/// Estimated time remaining.
	pub eta: Option<Duration>,
	/// Human-readable detail.
	pub message: String,
}
impl TransferNotification {
	/// Creates a notification with zeroed progress.
	pub fn new(
		source: impl Into<String>,
		destination: impl Into<PathBuf>,
		status: TransferStatus,
	) -> Self {
		Self {
			source: source.into(),
			destination: destination.into(),
			status,
			percentage: 0.,
			total_size: None,
			downloaded: 0,
			speed: None,
			eta: None,
			message: String::new(),
		}
	}

	/// Sets the completion percentage, clamped to `[0, 100]`.
	pub fn with_percentage(mut self, percentage: f64) -> Self {
		self.percentage = percentage.clamp(0., 100.);

		self
	}

	/// Sets the byte counters.
	pub fn with_bytes(mut self, downloaded: u64, total_size: Option<u64>) -> Self {
		self.downloaded = downloaded;
		self.total_size = total_size;

		self
	}

	/// Sets throughput and remaining-time estimates.
	pub fn with_rate(mut self, speed: Option<f64>, eta: Option<Duration>) -> Self {
		self.speed = speed;
		self.eta = eta;

		self
	}

	/// Sets the detail message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = message.into();

		self
	}
}

/// Outcome counters of a single [`NotificationHub::publish`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
	/// Sent directly into a subscriber channel.
	pub delivered: usize,
	/// Parked in a subscriber's forwarding queue.
	pub queued: usize,
	/// Progress updates skipped because the subscriber was behind.
	pub dropped: usize,
	/// Subscribers removed because their forwarding queue overflowed.
	pub disconnected: usize,
}

/// Per-URL fan-out of transfer notifications plus the latest state per destination.
#[derive(Clone, Debug, Default)]
pub struct NotificationHub(Arc<HubInner>);
impl NotificationHub {
	/// Registers a subscriber for `source` and returns its receiver and handle.
	pub fn subscribe(&self, source: impl Into<String>) -> (TransferReceiver, Subscription) {
		let source = source.into();
		let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
		let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
		let subscriber = Arc::new(Subscriber { id, tx, overflow: Mutex::new(None) });

		self.0.listeners.lock().entry(source.clone()).or_default().push(subscriber);

		(rx, Subscription { hub: Arc::downgrade(&self.0), source, id })
	}

	/// Removes every subscriber of `source`, closing their channels.
	pub fn close_listeners(&self, source: &str) -> usize {
		self.0.listeners.lock().remove(source).map_or(0, |subscribers| subscribers.len())
	}

	/// Returns the number of live subscribers for `source`.
	pub fn listener_count(&self, source: &str) -> usize {
		self.0.listeners.lock().get(source).map_or(0, Vec::len)
	}

	/// Records `notification` as the latest state and fans it out without blocking.
	pub fn publish(&self, notification: &TransferNotification) -> PublishReport {
		self.0.states.write().insert(notification.destination.clone(), notification.clone());

		let subscribers =
			self.0.listeners.lock().get(&notification.source).cloned().unwrap_or_default();
		let mut report = PublishReport::default();
		let mut overflowed = Vec::new();

		for subscriber in subscribers {
			if !notification.status.is_terminal() {
				match subscriber.tx.try_send(notification.clone()) {
					Ok(()) => report.delivered += 1,
					Err(TrySendError::Full(_)) => report.dropped += 1,
					Err(TrySendError::Closed(_)) => {},
				}

				continue;
			}

			match subscriber.deliver(notification.clone()) {
				Delivery::Sent => report.delivered += 1,
				Delivery::Queued => report.queued += 1,
				Delivery::Closed => {},
				Delivery::Overflowed => overflowed.push(subscriber.id),
			}
		}

		if !overflowed.is_empty() {
			report.disconnected = self.0.remove(&notification.source, &overflowed);
		}

		report
	}

	/// Returns the latest notification recorded for `destination`.
	pub fn transfer_state(&self, destination: &Path) -> Option<TransferNotification> {
		self.0.states.read().get(destination).cloned()
	}

	/// Returns the latest notification of every destination seen so far.
	pub fn transfer_states(&self) -> HashMap<PathBuf, TransferNotification> {
		self.0.states.read().clone()
	}
}

/// Handle that removes one subscriber from the hub.
#[derive(Debug)]
pub struct Subscription {
	hub: Weak<HubInner>,
	source: String,
	id: u64,
}
impl Subscription {
	/// Source URL the subscription listens to.
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Removes the subscriber and closes its channel.
	pub fn unsubscribe(self) {
		if let Some(hub) = self.hub.upgrade() {
			hub.remove(&self.source, &[self.id]);
		}
	}
}

#[derive(Debug, Default)]
struct HubInner {
	next_id: AtomicU64,
	listeners: Mutex<HashMap<String, Vec<Arc<Subscriber>>>>,
	states: RwLock<HashMap<PathBuf, TransferNotification>>,
}
impl HubInner {
	fn remove(&self, source: &str, ids: &[u64]) -> usize {
		let mut listeners = self.listeners.lock();
		let Some(subscribers) = listeners.get_mut(source) else { return 0 };
		let before = subscribers.len();

		subscribers.retain(|s| !ids.contains(&s.id));

		let removed = before - subscribers.len();

		if subscribers.is_empty() {
			listeners.remove(source);
		}

		removed
	}
}

#[derive(Debug)]
struct Subscriber {
	id: u64,
	tx: mpsc::Sender<TransferNotification>,
	overflow: Mutex<Option<mpsc::Sender<TransferNotification>>>,
}
impl Subscriber {
	fn deliver(&self, notification: TransferNotification) -> Delivery {
		let mut overflow = self.overflow.lock();
		// Once a forwarding queue exists every terminal update goes through it to keep order.
		let notification = if overflow.is_some() {
			notification
		} else {
			match self.tx.try_send(notification) {
				Ok(()) => return Delivery::Sent,
				Err(TrySendError::Closed(_)) => return Delivery::Closed,
				Err(TrySendError::Full(n)) => n,
			}
		};
		let queue = match overflow.as_ref() {
			Some(queue) => queue.clone(),
			None => {
				let Ok(runtime) = Handle::try_current() else { return Delivery::Overflowed };
				let (queue, pending) = mpsc::channel(OVERFLOW_DEPTH);

				runtime.spawn(forward(self.tx.clone(), pending));

				overflow.insert(queue).clone()
			},
		};

		match queue.try_send(notification) {
			Ok(()) => Delivery::Queued,
			Err(TrySendError::Full(_)) => Delivery::Overflowed,
			Err(TrySendError::Closed(_)) => Delivery::Closed,
		}
	}
}

enum Delivery {
	Sent,
	Queued,
	Closed,
	Overflowed,
}

async fn forward(
	tx: mpsc::Sender<TransferNotification>,
	mut pending: mpsc::Receiver<TransferNotification>,
) {
	while let Some(notification) = pending.recv().await {
		if tx.send(notification).await.is_err() {
			break;
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const URL: &str = "https://example.com/file.bin";

	fn progress(pct: f64) -> TransferNotification {
		TransferNotification::new(URL, "/tmp/file.bin", TransferStatus::InProgress)
			.with_percentage(pct)
	}

	fn terminal(status: TransferStatus) -> TransferNotification {
		TransferNotification::new(URL, "/tmp/file.bin", status).with_percentage(100.)
	}

	#[tokio::test]
	async fn unsubscribe_closes_channel() {
		let hub = NotificationHub::default();
		let (mut rx, subscription) = hub.subscribe(URL);

		hub.publish(&progress(10.));
		subscription.unsubscribe();

		assert_eq!(rx.recv().await.map(|n| n.percentage), Some(10.));
		assert!(rx.recv().await.is_none());
		assert_eq!(hub.listener_count(URL), 0);
	}

	#[tokio::test]
	async fn progress_is_dropped_for_slow_subscribers() {
		let hub = NotificationHub::default();
		let (_rx, _subscription) = hub.subscribe(URL);

		for i in 0..SUBSCRIBER_BUFFER {
			assert_eq!(hub.publish(&progress(i as f64)).delivered, 1);
		}

		let report = hub.publish(&progress(99.));

		assert_eq!(report, PublishReport { dropped: 1, ..Default::default() });
	}

	#[tokio::test]
	async fn terminal_reaches_every_subscriber_even_when_full() {
		let hub = NotificationHub::default();
		let mut receivers: Vec<_> = (0..3).map(|_| hub.subscribe(URL)).collect();

		for i in 0..SUBSCRIBER_BUFFER {
			hub.publish(&progress(i as f64));
		}

		let report = hub.publish(&terminal(TransferStatus::Complete));

		assert_eq!(report.queued, 3);

		for (rx, _) in &mut receivers {
			let mut last = None;

			while let Some(n) = rx.recv().await {
				let done = n.status.is_terminal();

				last = Some(n);

				if done {
					break;
				}
			}

			assert_eq!(last.map(|n| n.status), Some(TransferStatus::Complete));
		}
	}

	#[tokio::test]
	async fn overflowing_forward_queue_disconnects_subscriber() {
		let hub = NotificationHub::default();
		let (mut rx, _subscription) = hub.subscribe(URL);

		for i in 0..SUBSCRIBER_BUFFER {
			hub.publish(&progress(i as f64));
		}
		for _ in 0..OVERFLOW_DEPTH {
			assert_eq!(hub.publish(&terminal(TransferStatus::Error)).queued, 1);
		}

		let report = hub.publish(&terminal(TransferStatus::Stopped));

		assert_eq!(report.disconnected, 1);
		assert_eq!(hub.listener_count(URL), 0);

		let mut received = 0;

		while rx.recv().await.is_some() {
			received += 1;
		}

		assert_eq!(received, SUBSCRIBER_BUFFER + OVERFLOW_DEPTH);
	}

	#[test]
	fn full_subscriber_without_runtime_is_disconnected() {
		let hub = NotificationHub::default();
		let (_rx, _subscription) = hub.subscribe(URL);

		for i in 0..SUBSCRIBER_BUFFER {
			hub.publish(&progress(i as f64));
		}

		assert_eq!(hub.publish(&terminal(TransferStatus::Complete)).disconnected, 1);
	}

	#[tokio::test]
	async fn close_listeners_ends_every_stream() {
		let hub = NotificationHub::default();
		let (mut first, _a) = hub.subscribe(URL);
		let (mut second, _b) = hub.subscribe(URL);
		let (_other, _c) = hub.subscribe("https://example.com/other");

		assert_eq!(hub.close_listeners(URL), 2);
		assert!(first.recv().await.is_none());
		assert!(second.recv().await.is_none());
		assert_eq!(hub.listener_count("https://example.com/other"), 1);
	}

	#[test]
	fn latest_state_is_keyed_by_destination() {
		let hub = NotificationHub::default();

		hub.publish(&progress(40.));
		hub.publish(&terminal(TransferStatus::Complete));
		hub.publish(
			&TransferNotification::new(URL, "/tmp/copy.bin", TransferStatus::InProgress)
				.with_percentage(5.),
		);

		let states = hub.transfer_states();

		assert_eq!(states.len(), 2);
		assert_eq!(
			hub.transfer_state(Path::new("/tmp/file.bin")).map(|n| n.status),
			Some(TransferStatus::Complete)
		);
	}
}
