//! Composition root: owns the configuration, relay, client registry, notification hub, and
//! download engine, and exposes every request and transfer entry point.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	client::{
		ClientRegistry, NetClient,
		http::{self, BodyMap, HttpClient, HttpClientConfig, HttpRequestConfig},
	},
	config::NetConfig,
	download::{self, Backend, DownloadEngine, DownloadFileConfig, Platform},
	error::{ConfigError, TransientError},
	notify::{NotificationHub, Subscription, TransferNotification, TransferReceiver},
	obs::{self, RequestSpan},
	relay::{Relay, RelayEvent, RelayLevel},
	request::{DEFAULT_CLIENT_REF, Decoded, RequestConfig, Response},
	retry,
};

/// Snapshot of the service configuration and every known transfer.
#[derive(Clone, Debug, Serialize)]
pub struct NetState {
	/// Configuration the service was built with.
	pub config: NetConfig,
	/// Download backend in use.
	pub backend: Backend,
	/// Registered client references.
	pub clients: Vec<String>,
	/// Latest notification per destination.
	pub transfers: HashMap<PathBuf, TransferNotification>,
}

/// Builder for [`NetService`].
pub struct NetServiceBuilder {
	config: NetConfig,
	relay: Option<Arc<dyn Relay>>,
	platform: Platform,
	default_client: HttpClientConfig,
}
impl NetServiceBuilder {
	/// Sets the mandatory log relay.
	pub fn relay(mut self, relay: Arc<dyn Relay>) -> Self {
		self.relay = Some(relay);

		self
	}

	/// Overrides the detected platform used for backend selection.
	pub fn platform(mut self, platform: Platform) -> Self {
		self.platform = platform;

		self
	}

	/// Configures credentials and middlewares of the `default` HTTP client.
	pub fn default_client(mut self, config: HttpClientConfig) -> Self {
		self.default_client = config;

		self
	}

	/// Validates the configuration, selects the download backend, and registers the default
	/// HTTP client.
	pub fn build(self) -> Result<NetService> {
		let Self { config, relay, platform, default_client } = self;
		let relay = relay.ok_or(ConfigError::MissingRelay)?;
		let wants_external = config.prefer_external_downloader || platform.forces_external();
		let available = wants_external && download::tool_available(&config.external_downloader);
		let backend =
			download::choose_backend(config.prefer_external_downloader, platform, available);

		if wants_external && backend == Backend::Native {
			relay.emit(
				RelayLevel::Warn,
				RelayEvent::log(format!(
					"External downloader `{}` is unavailable; using the native backend",
					config.external_downloader
				)),
			);
		}

		let registry = ClientRegistry::default();
		let client =
			HttpClient::new(DEFAULT_CLIENT_REF, &config, default_client)?.with_relay(relay.clone());

		registry.register(DEFAULT_CLIENT_REF, Arc::new(client));

		let download_http = ReqwestClient::builder()
			.user_agent(config.user_agent.as_str())
			.build()
			.map_err(ConfigError::http_client_build)?;
		let hub = NotificationHub::default();
		let downloads =
			DownloadEngine::new(download_http, hub.clone(), relay.clone(), &config, backend);

		relay.emit(
			RelayLevel::Debug,
			RelayEvent::log(format!("Network service ready with the {backend} download backend")),
		);

		Ok(NetService(Arc::new(ServiceInner { config, relay, registry, hub, downloads })))
	}
}
impl Debug for NetServiceBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NetServiceBuilder")
			.field("config", &self.config)
			.field("relay_set", &self.relay.is_some())
			.field("platform", &self.platform)
			.field("default_client", &self.default_client)
			.finish()
	}
}

/// Networking runtime handle; clones share the same clients, hub, and transfers.
#[derive(Clone)]
pub struct NetService(Arc<ServiceInner>);
impl NetService {
	/// Starts building a service for `config`.
	pub fn builder(config: NetConfig) -> NetServiceBuilder {
		NetServiceBuilder {
			config,
			relay: None,
			platform: Platform::current(),
			default_client: HttpClientConfig::default(),
		}
	}

	/// Configuration the service was built with.
	pub fn config(&self) -> &NetConfig {
		&self.0.config
	}

	/// Relay receiving runtime events.
	pub fn relay(&self) -> &Arc<dyn Relay> {
		&self.0.relay
	}

	/// Client registry.
	pub fn registry(&self) -> &ClientRegistry {
		&self.0.registry
	}

	/// Notification hub shared with the download engine.
	pub fn hub(&self) -> &NotificationHub {
		&self.0.hub
	}

	/// Download backend selected at build time.
	pub fn backend(&self) -> Backend {
		self.0.downloads.backend()
	}

	/// Registers `client` under its own reference, returning the client it replaced.
	pub fn register_client(&self, client: Arc<dyn NetClient>) -> Option<Arc<dyn NetClient>> {
		let client_ref = client.client_ref().to_owned();

		self.0.registry.register(client_ref, client)
	}

	/// Executes exactly one attempt of `config`.
	///
	/// The target client must be registered and accept the payload kind; the per-attempt
	/// timeout maps to [`TransientError::Timeout`].
	pub async fn request_once(&self, config: &RequestConfig) -> Result<Response> {
		if config.client_ref.is_empty() {
			return Err(ConfigError::MissingClientRef.into());
		}

		let payload = config.payload.as_ref().ok_or(ConfigError::MissingPayload)?;
		let client = self.0.registry.get(&config.client_ref)?;

		if client.kind() != payload.kind() {
			return Err(ConfigError::ClientKindMismatch {
				client_ref: config.client_ref.clone(),
				client_kind: client.kind().to_string(),
				request_kind: payload.kind().to_string(),
			}
			.into());
		}

		let task = config.task_name();
		let span = RequestSpan::new(&config.client_ref, task);
		let result = span
			.instrument(async {
				let attempt = client.process_request(config);

				match config.timeout.filter(|t| t.is_positive()) {
					Some(timeout) => tokio::time::timeout(timeout.unsigned_abs(), attempt)
						.await
						.unwrap_or_else(|_| {
							Err(TransientError::Timeout { operation: task.into() }.into())
						}),
					None => attempt.await,
				}
			})
			.await;

		span.finish(&result);
		obs::record_request(&config.client_ref, &result);

		result
	}

	/// Executes `config` under its retry budget and delay policy.
	pub async fn request_with_retry(&self, config: &RequestConfig) -> Result<Response> {
		retry::run(config, self.0.relay.as_ref(), || self.request_once(config)).await
	}

	/// Executes `config` and decodes a non-empty body as JSON.
	pub async fn request_json<T>(
		&self,
		config: &RequestConfig,
		with_retry: bool,
	) -> Result<Decoded<T>>
	where
		T: DeserializeOwned,
	{
		let response = self.dispatch(config, with_retry).await?;

		if response.body.iter().all(u8::is_ascii_whitespace) {
			return Ok(Decoded { response, value: None });
		}

		match response.json() {
			Ok(value) => Ok(Decoded { response, value: Some(value) }),
			Err(source) => Err(Error::Decode { source, response: Box::new(response) }),
		}
	}

	/// Sends a `GET` through the `default` client.
	pub async fn get(&self, url: &str, with_retry: bool) -> Result<Response> {
		let config =
			RequestConfig::new(HttpRequestConfig::get(url)).with_task_name(format!("GET {url}"));

		self.dispatch(&config, with_retry).await
	}

	/// Sends a JSON `POST` through the `default` client.
	pub async fn post(&self, url: &str, body: BodyMap, with_retry: bool) -> Result<Response> {
		let template =
			HttpRequestConfig::post(url).with_body(body).with_body_type(http::JSON);
		let config = RequestConfig::new(template).with_task_name(format!("POST {url}"));

		self.dispatch(&config, with_retry).await
	}

	/// Downloads a file; see [`DownloadEngine::download_file`].
	pub async fn download_file(
		&self,
		config: DownloadFileConfig,
		cancel: CancellationToken,
	) -> Result<PathBuf> {
		self.0.downloads.download_file(config, cancel).await
	}

	/// Subscribes to the transfers of `source`.
	pub fn subscribe(&self, source: impl Into<String>) -> (TransferReceiver, Subscription) {
		self.0.hub.subscribe(source)
	}

	/// Disconnects every subscriber of `source`.
	pub fn close_transfer_listeners(&self, source: &str) -> usize {
		self.0.hub.close_listeners(source)
	}

	/// Latest notification for `destination`.
	pub fn transfer_state(&self, destination: &Path) -> Option<TransferNotification> {
		self.0.hub.transfer_state(destination)
	}

	/// Latest notification of every destination.
	pub fn transfer_states(&self) -> HashMap<PathBuf, TransferNotification> {
		self.0.hub.transfer_states()
	}

	/// Configuration, backend, clients, and transfer states in one snapshot.
	pub fn state(&self) -> NetState {
		NetState {
			config: self.0.config.clone(),
			backend: self.backend(),
			clients: self.0.registry.refs(),
			transfers: self.transfer_states(),
		}
	}

	async fn dispatch(&self, config: &RequestConfig, with_retry: bool) -> Result<Response> {
		if with_retry {
			self.request_with_retry(config).await
		} else {
			self.request_once(config).await
		}
	}
}
impl Debug for NetService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NetService")
			.field("config", &self.0.config)
			.field("registry", &self.0.registry)
			.field("downloads", &self.0.downloads)
			.finish()
	}
}

struct ServiceInner {
	config: NetConfig,
	relay: Arc<dyn Relay>,
	registry: ClientRegistry,
	hub: NotificationHub,
	downloads: DownloadEngine,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedClient, build_test_service},
		client::{
			ClientFuture,
			object::{ObjectOperation, ObjectRequestConfig},
		},
		relay::MemoryRelay,
		request::ClientKind,
		retry::ConstantDelay,
	};

	struct StalledClient;
	impl NetClient for StalledClient {
		fn client_ref(&self) -> &str {
			"stalled"
		}

		fn kind(&self) -> ClientKind {
			ClientKind::Http
		}

		fn process_request<'a>(&'a self, _request: &'a RequestConfig) -> ClientFuture<'a> {
			Box::pin(async {
				tokio::time::sleep(std::time::Duration::from_secs(30)).await;

				Ok(Response::default())
			})
		}
	}

	fn http_config(client_ref: &str) -> RequestConfig {
		RequestConfig::new(HttpRequestConfig::get("http://127.0.0.1:1/"))
			.with_client_ref(client_ref)
			.with_delay(Some(Arc::new(ConstantDelay::new(Duration::ZERO))))
	}

	#[test]
	fn build_requires_a_relay() {
		let err =
			NetService::builder(NetConfig::default()).build().expect_err("Relay is mandatory.");

		assert!(matches!(err, Error::Config(ConfigError::MissingRelay)));
	}

	#[test]
	fn unavailable_external_tool_falls_back_with_a_warning() {
		let relay = Arc::new(MemoryRelay::default());
		let config = NetConfig {
			external_downloader: "netrun-missing-downloader".into(),
			..NetConfig::default()
		};
		let service = NetService::builder(config)
			.relay(relay.clone())
			.platform(Platform::MacOs)
			.build()
			.expect("Service should build.");

		assert_eq!(service.backend(), Backend::Native);
		assert_eq!(relay.count(RelayLevel::Warn), 1);
		assert_eq!(service.state().clients, [DEFAULT_CLIENT_REF]);
	}

	#[tokio::test]
	async fn request_once_rejects_invalid_configs_without_calling_clients() {
		let (service, _) = build_test_service(NetConfig::default());
		let store = Arc::new(ScriptedClient::new("store", ClientKind::ObjectStore, || {
			Ok(Response::new(200, Vec::new()))
		}));

		service.register_client(store.clone());

		let missing_ref = service.request_once(&http_config("")).await;
		let missing_payload =
			service.request_once(&RequestConfig { payload: None, ..http_config("store") }).await;
		let unknown = service.request_once(&http_config("nope")).await;
		let mismatch = service.request_once(&http_config("store")).await;

		assert!(matches!(missing_ref, Err(Error::Config(ConfigError::MissingClientRef))));
		assert!(matches!(missing_payload, Err(Error::Config(ConfigError::MissingPayload))));
		assert!(matches!(unknown, Err(Error::Config(ConfigError::UnknownClient { .. }))));
		assert!(matches!(mismatch, Err(Error::Config(ConfigError::ClientKindMismatch { .. }))));
		assert_eq!(store.calls(), 0);
	}

	#[tokio::test]
	async fn retry_returns_the_last_server_response() {
		let (service, relay) = build_test_service(NetConfig::default());
		let flaky = Arc::new(ScriptedClient::new("flaky", ClientKind::Http, || {
			Ok(Response::new(503, b"busy".to_vec()))
		}));

		service.register_client(flaky.clone());

		let err = service
			.request_with_retry(&http_config("flaky").with_max_retries(2))
			.await
			.expect_err("Every attempt fails.");

		assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
		assert_eq!(err.response().map(|r| r.status), Some(503));
		assert_eq!(flaky.calls(), 3);
		assert_eq!(relay.count(RelayLevel::Warn), 3);
	}

	#[tokio::test]
	async fn per_attempt_timeout_is_transient() {
		let (service, _) = build_test_service(NetConfig::default());

		service.register_client(Arc::new(StalledClient));

		let err = service
			.request_once(
				&http_config("stalled")
					.with_timeout(Some(Duration::milliseconds(20)))
					.with_task_name("slow"),
			)
			.await
			.expect_err("Stalled client must time out.");

		assert!(matches!(
			err,
			Error::Transient(TransientError::Timeout { ref operation }) if operation == "slow"
		));
	}

	#[tokio::test]
	async fn request_json_decodes_or_keeps_the_response() {
		#[derive(Debug, Deserialize, PartialEq)]
		struct Count {
			n: u32,
		}

		let (service, _) = build_test_service(NetConfig::default());
		let client = Arc::new(
			ScriptedClient::new("json", ClientKind::Http, || Ok(Response::new(204, Vec::new())))
				.with_script(vec![
					Ok(Response::new(200, br#"{"n":7}"#.to_vec())),
					Ok(Response::new(200, br#"{"n":"seven"}"#.to_vec())),
				]),
		);

		service.register_client(client);

		let config = http_config("json");
		let decoded =
			service.request_json::<Count>(&config, false).await.expect("Body should decode.");
		let err = service
			.request_json::<Count>(&config, false)
			.await
			.expect_err("Mistyped body must fail to decode.");
		let empty =
			service.request_json::<Count>(&config, false).await.expect("Empty body should pass.");

		assert_eq!(decoded.value, Some(Count { n: 7 }));
		assert!(matches!(err, Error::Decode { ref response, .. } if response.status == 200));
		assert!(empty.value.is_none());
		assert_eq!(empty.response.status, 204);
	}

	#[tokio::test]
	async fn object_payloads_reach_object_clients() {
		let (service, _) = build_test_service(NetConfig::default());
		let store = Arc::new(ScriptedClient::new("objects", ClientKind::ObjectStore, || {
			Ok(Response::new(200, b"payload".to_vec()))
		}));

		service.register_client(store.clone());

		let template = ObjectRequestConfig::new(ObjectOperation::Get, "bucket", "key");
		let config = RequestConfig::new(template).with_client_ref("objects");
		let response = service.request_once(&config).await.expect("Object request should succeed.");

		assert_eq!(response.body, b"payload");
		assert_eq!(store.calls(), 1);
	}
}
