//! Demonstrates registering an object-store client and driving it through the shared request
//! pipeline with retries.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
// self
use netrun::{
	client::object::{MemoryObjectStore, ObjectClient, ObjectOperation, ObjectRequestConfig},
	config::NetConfig,
	relay::TracingRelay,
	request::RequestConfig,
	service::NetService,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let service =
		NetService::builder(NetConfig::default()).relay(Arc::new(TracingRelay)).build()?;

	service.register_client(Arc::new(ObjectClient::new(
		"assets",
		Arc::new(MemoryObjectStore::default()),
	)));

	for (key, body) in [("logos/dark.svg", "<svg/>"), ("logos/light.svg", "<svg></svg>")] {
		let put = ObjectRequestConfig::new(ObjectOperation::Put, "static", key)
			.with_body(body, "image/svg+xml");

		service.request_with_retry(&RequestConfig::new(put).with_client_ref("assets")).await?;
	}

	let list = ObjectRequestConfig::new(ObjectOperation::List, "static", "").with_prefix("logos/");
	let keys = service
		.request_json::<Vec<String>>(&RequestConfig::new(list).with_client_ref("assets"), false)
		.await?;

	println!("Stored keys: {:?}.", keys.value.unwrap_or_default());

	let get = ObjectRequestConfig::new(ObjectOperation::Get, "static", "logos/dark.svg");
	let response = service.request_once(&RequestConfig::new(get).with_client_ref("assets")).await?;

	println!("logos/dark.svg ({}): {}", response.status, response.text());

	Ok(())
}
