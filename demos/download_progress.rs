//! Demonstrates a verified download whose progress is streamed to a subscriber of its URL.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use time::Duration;
// self
use netrun::{
	CancellationToken,
	config::NetConfig,
	download::DownloadFileConfig,
	relay::TracingRelay,
	service::NetService,
};

const PAYLOAD: &[u8] = b"hello world\n";
const DIGEST: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let _file_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/files/hello.txt");
			then.status(200).body(PAYLOAD);
		})
		.await;
	let folder = tempfile::tempdir()?;
	let config =
		NetConfig::default().with_download_callback_interval(Duration::milliseconds(50));
	let service = NetService::builder(config).relay(Arc::new(TracingRelay)).build()?;
	let url = server.url("/files/hello.txt");
	let (mut updates, _subscription) = service.subscribe(url.as_str());
	let download = DownloadFileConfig::new(url.as_str(), folder.path())
		.with_checksum(DIGEST)
		.with_blocking(false);
	let destination = service.download_file(download, CancellationToken::new()).await?;

	println!(
		"Downloading {url} into {} with the {} backend.",
		destination.display(),
		service.backend()
	);

	while let Some(update) = updates.recv().await {
		println!("{:>11} {:>5.1}% {}", update.status, update.percentage, update.message);

		if update.status.is_terminal() {
			break;
		}
	}

	Ok(())
}
