//! Demonstrates an authenticated JSON request: the default client fetches a client-credentials
//! token once, attaches it as a bearer credential, and decodes the response body.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
// self
use netrun::{
	auth::ClientCredentialsSource,
	client::http::{HttpClientConfig, HttpRequestConfig},
	config::NetConfig,
	relay::TracingRelay,
	reqwest::Client,
	request::RequestConfig,
	service::NetService,
	url::Url,
};

#[derive(Debug, Deserialize)]
struct Profile {
	name: String,
	plan: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let profile_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/me").header("authorization", "Bearer demo-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"name\":\"acme\",\"plan\":\"team\"}");
		})
		.await;
	let source = ClientCredentialsSource::new(
		&Url::parse(&server.url("/token"))?,
		"demo-client",
		Some("super-secret".into()),
		Client::new(),
	)?
	.with_scopes(["profile.read"]);
	let service = NetService::builder(NetConfig::default())
		.relay(Arc::new(TracingRelay))
		.default_client(HttpClientConfig::default().with_token_source(Arc::new(source)))
		.build()?;
	let request = RequestConfig::new(HttpRequestConfig::get(server.url("/me")))
		.with_task_name("fetch profile");

	for _ in 0..2 {
		let decoded = service.request_json::<Profile>(&request, true).await?;

		if let Some(profile) = decoded.value {
			println!("Profile {} is on the {} plan.", profile.name, profile.plan);
		}
	}

	token_mock.assert_calls_async(1).await;
	profile_mock.assert_calls_async(2).await;

	Ok(())
}
