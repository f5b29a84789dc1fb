mod common;

// crates.io
use httpmock::prelude::*;
use time::Duration;
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::TcpListener,
};
// self
use netrun::{
	CancellationToken,
	config::NetConfig,
	download::{Backend, DownloadFileConfig, tool_available},
	error::{CancelReason, DownloadError, Error},
	notify::TransferStatus,
};

/// Serves an endless body in 1 KiB chunks every 20 ms and returns its URL.
async fn slow_server() -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Listener should bind.");
	let addr = listener.local_addr().expect("Listener should have an address.");

	tokio::spawn(async move {
		while let Ok((mut socket, _)) = listener.accept().await {
			tokio::spawn(async move {
				let mut request = [0; 1024];
				let _ = socket.read(&mut request).await;
				let head = "HTTP/1.1 200 OK\r\nContent-Length: 104857600\r\n\r\n";

				if socket.write_all(head.as_bytes()).await.is_err() {
					return;
				}

				let chunk = [b'x'; 1024];

				loop {
					if socket.write_all(&chunk).await.is_err() {
						break;
					}

					tokio::time::sleep(std::time::Duration::from_millis(20)).await;
				}
			});
		}
	});

	format!("http://{addr}/stream.bin")
}

fn fast_progress() -> NetConfig {
	NetConfig::default().with_download_callback_interval(Duration::milliseconds(10))
}

#[tokio::test]
async fn matching_checksum_completes_with_identical_file() {
	let server = MockServer::start_async().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let (service, relay) = common::service(NetConfig::default());
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/files/hello.txt");
			then.status(200).body(common::HELLO_BODY);
		})
		.await;
	let url = server.url("/files/hello.txt");
	let (mut rx, _subscription) = service.subscribe(url.clone());
	let path = service
		.download_file(
			DownloadFileConfig::new(url, dir.path().join("nested"))
				.with_checksum(common::HELLO_DIGEST),
			CancellationToken::new(),
		)
		.await
		.expect("Download should complete.");
	let seen = common::collect_until_terminal(&mut rx).await;
	let last = seen.last().expect("At least one notification should arrive.");

	assert_eq!(service.backend(), Backend::Native);
	assert!(path.ends_with("nested/hello.txt"));
	assert_eq!(
		tokio::fs::read_to_string(&path).await.expect("File should exist."),
		common::HELLO_BODY
	);
	assert_eq!(last.status, TransferStatus::Complete);
	assert_eq!(last.percentage, 100.);
	assert_eq!(last.downloaded, common::HELLO_BODY.len() as u64);
	assert_eq!(
		service.transfer_state(&path).map(|n| n.status),
		Some(TransferStatus::Complete)
	);
	assert_eq!(relay.transfers().last().map(|n| n.status), Some(TransferStatus::Complete));

	mock.assert_async().await;
}

#[tokio::test]
async fn checksum_mismatch_is_an_error_and_keeps_the_file() {
	let server = MockServer::start_async().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let (service, _) = common::service(NetConfig::default());

	server
		.mock_async(|when, then| {
			when.method(GET).path("/hello.txt");
			then.status(200).body(common::HELLO_BODY);
		})
		.await;

	let url = server.url("/hello.txt");
	let (mut rx, _subscription) = service.subscribe(url.clone());
	let err = service
		.download_file(
			DownloadFileConfig::new(url, dir.path()).with_checksum("00".repeat(32)),
			CancellationToken::new(),
		)
		.await
		.expect_err("Digest mismatch must fail.");
	let seen = common::collect_until_terminal(&mut rx).await;
	let last = seen.last().expect("Terminal notification should arrive.");

	assert!(matches!(err, Error::Download(DownloadError::ChecksumMismatch { .. })));
	assert_eq!(last.status, TransferStatus::Error);
	assert_eq!(last.percentage, 100.);
	assert!(dir.path().join("hello.txt").exists());
}

#[tokio::test]
async fn bad_status_is_an_error() {
	let server = MockServer::start_async().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let (service, _) = common::service(NetConfig::default());

	server
		.mock_async(|when, then| {
			when.method(GET).path("/missing.zip");
			then.status(404);
		})
		.await;

	let url = server.url("/missing.zip");
	let (mut rx, _subscription) = service.subscribe(url.clone());
	let err = service
		.download_file(DownloadFileConfig::new(url, dir.path()), CancellationToken::new())
		.await
		.expect_err("404 must fail.");
	let seen = common::collect_until_terminal(&mut rx).await;
	let last = seen.last().expect("Terminal notification should arrive.");

	assert!(matches!(err, Error::Download(DownloadError::BadStatus { status: 404, .. })));
	assert_eq!(last.status, TransferStatus::Error);
	assert!(last.message.contains("404"));
	assert!(!dir.path().join("missing.zip").exists());
}

#[tokio::test]
async fn cancellation_after_progress_stops_the_transfer() {
	let url = slow_server().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let (service, relay) = common::service(fast_progress());
	let (mut rx, _subscription) = service.subscribe(url.clone());
	let cancel = CancellationToken::new();
	let transfer = tokio::spawn({
		let service = service.clone();
		let config = DownloadFileConfig::new(url, dir.path());
		let cancel = cancel.clone();

		async move { service.download_file(config, cancel).await }
	});

	loop {
		let notification = rx.recv().await.expect("Progress should arrive before cancelling.");

		assert_eq!(notification.status, TransferStatus::InProgress);

		if notification.downloaded > 0 {
			break;
		}
	}

	cancel.cancel();

	let err = transfer
		.await
		.expect("Transfer task should not panic.")
		.expect_err("Cancelled transfer must fail.");
	let seen = common::collect_until_terminal(&mut rx).await;
	let statuses: Vec<_> = relay.transfers().into_iter().map(|n| n.status).collect();

	assert!(matches!(err, Error::Cancelled(CancelReason::Cancelled)));
	assert_eq!(seen.last().map(|n| n.status), Some(TransferStatus::Stopped));
	assert!(!statuses.contains(&TransferStatus::Complete));
	assert!(!statuses.contains(&TransferStatus::Error));
}

#[tokio::test]
async fn deadline_stops_the_transfer() {
	let url = slow_server().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let (service, _) = common::service(fast_progress());
	let (mut rx, _subscription) = service.subscribe(url.clone());
	let err = service
		.download_file(
			DownloadFileConfig::new(url, dir.path()).with_timeout(Duration::milliseconds(150)),
			CancellationToken::new(),
		)
		.await
		.expect_err("Deadline must stop the transfer.");
	let seen = common::collect_until_terminal(&mut rx).await;

	assert!(matches!(err, Error::Cancelled(CancelReason::DeadlineExceeded)));
	assert_eq!(seen.last().map(|n| n.status), Some(TransferStatus::Stopped));
}

#[tokio::test]
async fn non_blocking_download_reports_through_the_hub() {
	let server = MockServer::start_async().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let (service, _) = common::service(NetConfig::default());

	server
		.mock_async(|when, then| {
			when.method(GET).path("/background.bin");
			then.status(200).body(common::HELLO_BODY);
		})
		.await;

	let url = server.url("/background.bin");
	let (mut first, _a) = service.subscribe(url.clone());
	let (mut second, _b) = service.subscribe(url.clone());
	let path = service
		.download_file(
			DownloadFileConfig::new(url, dir.path())
				.with_file_name("renamed.bin")
				.with_blocking(false),
			CancellationToken::new(),
		)
		.await
		.expect("Non-blocking download should start.");

	assert_eq!(path, dir.path().join("renamed.bin"));

	for rx in [&mut first, &mut second] {
		let seen = common::collect_until_terminal(rx).await;

		assert_eq!(seen.last().map(|n| n.status), Some(TransferStatus::Complete));
	}

	assert!(service.state().transfers.contains_key(&path));
}

#[tokio::test]
async fn external_backend_downloads_and_reports_failures() {
	if !tool_available("curl") {
		return;
	}

	let server = MockServer::start_async().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let (builder, _) = common::builder(NetConfig::default().with_prefer_external_downloader(true));
	let service = builder.build().expect("Service should build.");

	server
		.mock_async(|when, then| {
			when.method(GET).path("/curl.txt");
			then.status(200).body(common::HELLO_BODY);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/gone.txt");
			then.status(404);
		})
		.await;

	assert_eq!(service.backend(), Backend::External);

	let path = service
		.download_file(
			DownloadFileConfig::new(server.url("/curl.txt"), dir.path())
				.with_checksum(common::HELLO_DIGEST),
			CancellationToken::new(),
		)
		.await
		.expect("curl download should complete.");

	assert_eq!(
		tokio::fs::read_to_string(&path).await.expect("File should exist."),
		common::HELLO_BODY
	);

	let err = service
		.download_file(
			DownloadFileConfig::new(server.url("/gone.txt"), dir.path()),
			CancellationToken::new(),
		)
		.await
		.expect_err("curl must fail on 404.");

	assert!(matches!(err, Error::Download(DownloadError::ExternalExit { code: Some(22) })));
}

#[tokio::test]
async fn cancelling_the_external_backend_kills_the_tool() {
	if !tool_available("curl") {
		return;
	}

	let url = slow_server().await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let destination = dir.path().join("stream.bin");
	let (builder, relay) =
		common::builder(fast_progress().with_prefer_external_downloader(true));
	let service = builder.build().expect("Service should build.");
	let (mut rx, _subscription) = service.subscribe(url.clone());
	let cancel = CancellationToken::new();
	let transfer = tokio::spawn({
		let service = service.clone();
		let config = DownloadFileConfig::new(url, dir.path());
		let cancel = cancel.clone();

		async move { service.download_file(config, cancel).await }
	});

	assert_eq!(service.backend(), Backend::External);

	for _ in 0..250 {
		let written = tokio::fs::metadata(&destination).await.map(|m| m.len()).unwrap_or(0);

		if written > 0 {
			break;
		}

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	}

	cancel.cancel();

	let err = transfer
		.await
		.expect("Transfer task should not panic.")
		.expect_err("Cancelled transfer must fail.");
	let seen = common::collect_until_terminal(&mut rx).await;
	let statuses: Vec<_> = relay.transfers().into_iter().map(|n| n.status).collect();

	assert!(matches!(err, Error::Cancelled(CancelReason::Cancelled)));
	assert_eq!(seen.last().map(|n| n.status), Some(TransferStatus::Stopped));
	assert!(!statuses.contains(&TransferStatus::Complete));
	assert!(!statuses.contains(&TransferStatus::Error));

	let size = tokio::fs::metadata(&destination).await.map(|m| m.len()).unwrap_or(0);

	tokio::time::sleep(std::time::Duration::from_millis(200)).await;

	assert_eq!(
		tokio::fs::metadata(&destination).await.map(|m| m.len()).unwrap_or(0),
		size,
		"Killed tool must stop writing."
	);
}
