//! Credential sources: custom auth providers and OAuth token sources.
//!
//! Both traits return boxed futures so implementors can be stored as `Arc<dyn _>` inside
//! clients. [`ClientCredentialsSource`] is the built-in OAuth source; it drives the
//! `oauth2` crate over the runtime's reqwest client.

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	HttpRequest, HttpResponse, Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
// self
use crate::{_prelude::*, auth::TokenInfo, error::ConfigError};

/// Boxed future returned by credential sources.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + 'a + Send>>;

type TokenEndpointClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Custom credential provider used when no OAuth token source is configured.
pub trait AuthProvider
where
	Self: Send + Sync,
{
	/// Obtains a fresh credential from scratch.
	fn authenticate(&self) -> AuthFuture<'_, TokenInfo>;

	/// Renews `current`; the store falls back to [`authenticate`](Self::authenticate) on failure.
	fn refresh<'a>(&'a self, current: &'a TokenInfo) -> AuthFuture<'a, TokenInfo>;
}

/// Token produced by an OAuth token source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthToken {
	/// Access token value.
	pub access_token: String,
	/// Scheme reported by the authorization server.
	pub token_type: String,
	/// Absolute expiry, when the server reported a lifetime.
	pub expiry: Option<OffsetDateTime>,
}

/// OAuth token source; takes precedence over any [`AuthProvider`].
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Returns a currently valid token.
	fn token(&self) -> AuthFuture<'_, OAuthToken>;
}

/// OAuth 2.0 client-credentials grant backed by the `oauth2` crate.
#[derive(Clone)]
pub struct ClientCredentialsSource {
	client: TokenEndpointClient,
	http: OAuthHttpHandle,
	scopes: Vec<String>,
}
impl ClientCredentialsSource {
	/// Builds a source for `token_endpoint` authenticating as `client_id`.
	pub fn new(
		token_endpoint: &Url,
		client_id: impl Into<String>,
		client_secret: Option<String>,
		http: ReqwestClient,
	) -> Result<Self> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidTokenEndpoint { source })?;
		let mut client = BasicClient::new(ClientId::new(client_id.into())).set_token_uri(token_url);

		if let Some(secret) = client_secret {
			client = client.set_client_secret(ClientSecret::new(secret));
		}

		Ok(Self { client, http: OAuthHttpHandle(http), scopes: Vec::new() })
	}

	/// Requests the given scopes with every token.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Sends the client secret in the request body instead of HTTP basic authentication.
	pub fn with_secret_in_body(mut self) -> Self {
		self.client = self.client.set_auth_type(AuthType::RequestBody);

		self
	}
}
impl Debug for ClientCredentialsSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsSource")
			.field("client_id", &self.client.client_id().as_str())
			.field("scopes", &self.scopes)
			.finish()
	}
}
impl TokenSource for ClientCredentialsSource {
	fn token(&self) -> AuthFuture<'_, OAuthToken> {
		Box::pin(async move {
			let mut request = self.client.exchange_client_credentials();

			for scope in &self.scopes {
				request = request.add_scope(Scope::new(scope.clone()));
			}

			let response = request.request_async(&self.http).await?;

			Ok(OAuthToken {
				access_token: response.access_token().secret().to_owned(),
				token_type: response.token_type().as_ref().to_owned(),
				expiry: response.expires_in().map(|ttl| OffsetDateTime::now_utc() + ttl),
			})
		})
	}
}

/// [`AsyncHttpClient`] adapter that lets `oauth2` run over the runtime's reqwest client.
#[derive(Clone)]
struct OAuthHttpHandle(ReqwestClient);
impl<'c> AsyncHttpClient<'c> for OAuthHttpHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			let response = self
				.0
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut converted =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}
