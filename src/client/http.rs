//! Authenticated HTTP client built on reqwest.
//!
//! Each attempt runs the same pipeline:
//!
//! 1. materialize a fresh [`HttpRequest`] from the template;
//! 2. run the middlewares in order (any error aborts before network I/O);
//! 3. make sure the token is valid, then attach it (overriding any middleware-set value);
//! 4. encode the body, enforce the domain filter, and send;
//! 5. buffer the response, merge `Set-Cookie` values into the token, and map 401 to
//!    [`Error::Unauthorized`].

pub mod body;
pub mod middleware;
pub mod request;

pub use body::{FORM, JSON, prepare_body};
pub use middleware::*;
pub use request::*;

// crates.io
use reqwest::{
	Method,
	header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE},
};
// self
use crate::{
	_prelude::*,
	auth::{AuthProvider, DEFAULT_REFRESH_BUFFER, TokenInfo, TokenSource, TokenStore},
	client::{ClientFuture, NetClient},
	config::NetConfig,
	error::ConfigError,
	relay::Relay,
	request::{ClientKind, RequestConfig, RequestPayload, Response},
};

const MAX_IDLE_PER_HOST: usize = 50;
const IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(90);

/// Credential and middleware settings of an [`HttpClient`].
#[derive(Clone)]
pub struct HttpClientConfig {
	/// OAuth token source; wins over `auth_provider`.
	pub token_source: Option<Arc<dyn TokenSource>>,
	/// Custom credential provider.
	pub auth_provider: Option<Arc<dyn AuthProvider>>,
	/// Initial credential.
	pub token: Option<TokenInfo>,
	/// Margin before expiry at which tokens are refreshed.
	pub refresh_buffer: Duration,
	/// Middlewares run in order on every attempt.
	pub middlewares: Vec<Arc<dyn HttpMiddleware>>,
}
impl HttpClientConfig {
	/// Uses an OAuth token source.
	pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
		self.token_source = Some(source);

		self
	}

	/// Uses a custom credential provider.
	pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
		self.auth_provider = Some(provider);

		self
	}

	/// Seeds the initial credential.
	pub fn with_token(mut self, token: TokenInfo) -> Self {
		self.token = Some(token);

		self
	}

	/// Sets the refresh margin.
	pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
		self.refresh_buffer = buffer;

		self
	}

	/// Appends a middleware.
	pub fn with_middleware(mut self, middleware: Arc<dyn HttpMiddleware>) -> Self {
		self.middlewares.push(middleware);

		self
	}
}
impl Default for HttpClientConfig {
	fn default() -> Self {
		Self {
			token_source: None,
			auth_provider: None,
			token: None,
			refresh_buffer: DEFAULT_REFRESH_BUFFER,
			middlewares: Vec::new(),
		}
	}
}
impl Debug for HttpClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpClientConfig")
			.field("token_source", &self.token_source.is_some())
			.field("auth_provider", &self.auth_provider.is_some())
			.field("token", &self.token)
			.field("refresh_buffer", &self.refresh_buffer)
			.field("middlewares", &self.middlewares.len())
			.finish()
	}
}

/// HTTP client with a token store, middleware chain, and domain filter.
pub struct HttpClient {
	client_ref: String,
	http: ReqwestClient,
	net: NetConfig,
	tokens: TokenStore,
	middlewares: Vec<Arc<dyn HttpMiddleware>>,
}
impl HttpClient {
	/// Builds a client with its own reqwest connection pool configured from `net`.
	pub fn new(
		client_ref: impl Into<String>,
		net: &NetConfig,
		config: HttpClientConfig,
	) -> Result<Self> {
		Ok(Self::with_reqwest(client_ref, build_reqwest(net)?, net, config))
	}

	/// Builds a client on top of an existing reqwest client.
	pub fn with_reqwest(
		client_ref: impl Into<String>,
		http: ReqwestClient,
		net: &NetConfig,
		config: HttpClientConfig,
	) -> Self {
		let mut tokens =
			TokenStore::new(config.refresh_buffer, config.token_source, config.auth_provider);

		if let Some(token) = config.token {
			tokens = tokens.with_token(token);
		}

		Self {
			client_ref: client_ref.into(),
			http,
			net: net.clone(),
			tokens,
			middlewares: config.middlewares,
		}
	}

	/// Reports credential refreshes through `relay`.
	pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
		self.tokens = self.tokens.with_relay(relay);

		self
	}

	/// Token store backing this client.
	pub fn tokens(&self) -> &TokenStore {
		&self.tokens
	}

	/// Executes one attempt of `template`.
	pub async fn execute(&self, template: &HttpRequestConfig) -> Result<Response> {
		let mut request = template.new_request();

		for middleware in &self.middlewares {
			middleware.handle(&mut request).map_err(Error::middleware)?;
		}

		self.tokens.ensure_token().await?;
		self.tokens.attach(&mut request);

		let (body, content_type) = request.finalize_body()?;
		let url = Url::parse(&request.url)
			.map_err(|source| ConfigError::InvalidUrl { url: request.url.clone(), source })?;

		self.net.check_domain(&url)?;

		let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
			.map_err(|_| ConfigError::InvalidMethod { method: request.method.clone() })?;
		let mut headers = header_map(self.net.extra_headers.iter())?;

		// Request headers replace configured defaults of the same name.
		headers.extend(header_map(request.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))?);

		if !content_type.is_empty() && !headers.contains_key(CONTENT_TYPE) {
			headers.insert(CONTENT_TYPE, header_value(CONTENT_TYPE.as_str(), &content_type)?);
		}

		let mut builder = self.http.request(method, url).headers(headers);

		if !body.is_empty() {
			builder = builder.body(body);
		}

		let upstream = builder.send().await?;
		let status = upstream.status().as_u16();
		let headers = upstream.headers().clone();
		let body = upstream.bytes().await?.to_vec();

		self.tokens
			.capture_cookies(headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()));

		let response = Response { status, headers, body };

		if status == 401 {
			return Err(Error::Unauthorized { url: request.url, response: Box::new(response) });
		}

		Ok(response)
	}
}
impl Debug for HttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpClient")
			.field("client_ref", &self.client_ref)
			.field("tokens", &self.tokens)
			.field("middlewares", &self.middlewares.len())
			.finish()
	}
}
impl NetClient for HttpClient {
	fn client_ref(&self) -> &str {
		&self.client_ref
	}

	fn kind(&self) -> ClientKind {
		ClientKind::Http
	}

	fn process_request<'a>(&'a self, request: &'a RequestConfig) -> ClientFuture<'a> {
		Box::pin(async move {
			match &request.payload {
				Some(RequestPayload::Http(template)) => self.execute(template).await,
				Some(other) => Err(ConfigError::ClientKindMismatch {
					client_ref: self.client_ref.clone(),
					client_kind: ClientKind::Http.to_string(),
					request_kind: other.kind().to_string(),
				}
				.into()),
				None => Err(ConfigError::MissingPayload.into()),
			}
		})
	}
}

/// Builds the pooled reqwest client used by HTTP clients.
pub fn build_reqwest(net: &NetConfig) -> Result<ReqwestClient> {
	let mut builder = ReqwestClient::builder()
		.user_agent(net.user_agent.as_str())
		.pool_max_idle_per_host(MAX_IDLE_PER_HOST)
		.pool_idle_timeout(IDLE_TIMEOUT);

	if net.request_timeout.is_positive() {
		builder = builder.timeout(net.request_timeout.unsigned_abs());
	}

	builder.build().map_err(|e| ConfigError::http_client_build(e).into())
}

fn header_map<'a, I>(pairs: I) -> Result<HeaderMap, ConfigError>
where
	I: IntoIterator<Item = (&'a str, &'a str)>,
{
	let mut headers = HeaderMap::new();

	for (name, value) in pairs {
		let header = HeaderName::from_bytes(name.as_bytes())
			.map_err(|_| ConfigError::InvalidHeader { name: name.into() })?;

		headers.insert(header, header_value(name, value)?);
	}

	Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
	HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader { name: name.into() })
}
