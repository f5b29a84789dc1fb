#![allow(dead_code)]

// std
use std::sync::Arc;
// self
use netrun::{
	config::NetConfig,
	download::Platform,
	notify::{TransferNotification, TransferReceiver},
	relay::MemoryRelay,
	service::{NetService, NetServiceBuilder},
};

pub const HELLO_BODY: &str = "hello world\n";
pub const HELLO_DIGEST: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

/// Builder pinned to a platform without backend forcing and wired to a recording relay.
pub fn builder(config: NetConfig) -> (NetServiceBuilder, Arc<MemoryRelay>) {
	let relay = Arc::new(MemoryRelay::default());
	let builder = NetService::builder(config).relay(relay.clone()).platform(Platform::Linux);

	(builder, relay)
}

pub fn service(config: NetConfig) -> (NetService, Arc<MemoryRelay>) {
	let (builder, relay) = builder(config);

	(builder.build().expect("Test service should build."), relay)
}

/// Collects notifications until a terminal one arrives or the channel closes.
pub async fn collect_until_terminal(rx: &mut TransferReceiver) -> Vec<TransferNotification> {
	let mut seen = Vec::new();

	loop {
		let next = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
			.await
			.expect("Terminal notification should arrive within ten seconds.");
		let Some(notification) = next else { break };
		let done = notification.status.is_terminal();

		seen.push(notification);

		if done {
			break;
		}
	}

	seen
}
