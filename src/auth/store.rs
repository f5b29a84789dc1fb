//! Per-client token store: validity checks, single-flight refresh, and header attachment.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{AuthProvider, Cookie, TokenInfo, TokenSecret, TokenSource, normalize_token_type},
	client::http::HttpRequest,
	error::AuthError,
	relay::{Relay, RelayEvent, RelayLevel},
};

/// Default margin subtracted from the expiry before a token counts as expired.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::seconds(30);

/// Thread-safe counters for refresh activity.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refreshes that reached a credential source.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that produced a token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refreshes.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	fn record(&self, ok: bool) {
		let counter = if ok { &self.success } else { &self.failure };

		counter.fetch_add(1, Ordering::Relaxed);
	}
}

/// Credential state of one client.
///
/// Reads take a shared lock; refreshes are serialized by an async guard so concurrent callers
/// observing an expired token trigger at most one call to the credential source. A failed
/// refresh leaves the previous token untouched.
pub struct TokenStore {
	token: RwLock<TokenInfo>,
	refresh_guard: AsyncMutex<()>,
	refresh_buffer: Duration,
	token_source: Option<Arc<dyn TokenSource>>,
	auth_provider: Option<Arc<dyn AuthProvider>>,
	relay: Option<Arc<dyn Relay>>,
	metrics: RefreshMetrics,
}
impl TokenStore {
	/// Creates a store; the token source wins when both sources are supplied.
	pub fn new(
		refresh_buffer: Duration,
		token_source: Option<Arc<dyn TokenSource>>,
		auth_provider: Option<Arc<dyn AuthProvider>>,
	) -> Self {
		Self {
			token: RwLock::new(TokenInfo::default()),
			refresh_guard: AsyncMutex::new(()),
			refresh_buffer,
			token_source,
			auth_provider,
			relay: None,
			metrics: RefreshMetrics::default(),
		}
	}

	/// Creates a store without any credential source.
	pub fn anonymous() -> Self {
		Self::new(DEFAULT_REFRESH_BUFFER, None, None)
	}

	/// Seeds the store with an initial token.
	pub fn with_token(self, token: TokenInfo) -> Self {
		*self.token.write() = token;

		self
	}

	/// Reports refresh outcomes through `relay`.
	pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
		self.relay = Some(relay);

		self
	}

	/// Returns a copy of the current token.
	pub fn snapshot(&self) -> TokenInfo {
		self.token.read().clone()
	}

	/// Returns refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns `true` when the current token is usable.
	pub fn is_valid(&self) -> bool {
		!self.token.read().is_expired(self.refresh_buffer)
	}

	/// Makes sure a usable token is present, refreshing when needed.
	pub async fn ensure_token(&self) -> Result<()> {
		if !self.has_source() || self.is_valid() {
			return Ok(());
		}

		self.refresh().await
	}

	/// Refreshes the token unless a concurrent caller already did.
	pub async fn refresh(&self) -> Result<()> {
		let _singleflight = self.refresh_guard.lock().await;

		if self.is_valid() || !self.has_source() {
			return Ok(());
		}

		self.metrics.record_attempt();

		let outcome = self.fetch().await;

		self.metrics.record(outcome.is_ok());

		if let Some(relay) = &self.relay {
			let via = self.source_label();

			match &outcome {
				Ok(_) => relay.emit(
					RelayLevel::Info,
					RelayEvent::log(format!("Credentials refreshed via {via}")),
				),
				Err(e) => relay.emit(
					RelayLevel::Error,
					RelayEvent::log(format!("Credential refresh via {via} failed: {e}")),
				),
			}
		}

		*self.token.write() = outcome?;

		Ok(())
	}

	/// Applies the credential to `request`: `Authorization` when an access token is present,
	/// otherwise `Cookie` when cookies are present.
	pub fn attach(&self, request: &mut HttpRequest) {
		let token = self.token.read();

		if let Some(authorization) = token.authorization_header() {
			request.set_header("Authorization", authorization);
		} else if let Some(cookies) = token.cookie_header() {
			request.set_header("Cookie", cookies);
		}
	}

	/// Merges `Set-Cookie` header values into the token, replacing cookies by name.
	pub fn capture_cookies<'a, I>(&self, set_cookie: I) -> usize
	where
		I: IntoIterator<Item = &'a str>,
	{
		let cookies: Vec<_> = set_cookie.into_iter().filter_map(Cookie::parse_set_cookie).collect();

		if cookies.is_empty() {
			return 0;
		}

		let mut token = self.token.write();
		let captured = cookies.len();

		cookies.into_iter().for_each(|cookie| token.upsert_cookie(cookie));

		captured
	}

	fn source_label(&self) -> &'static str {
		if self.token_source.is_some() { "token source" } else { "auth provider" }
	}

	fn has_source(&self) -> bool {
		self.token_source.is_some() || self.auth_provider.is_some()
	}

	async fn fetch(&self) -> Result<TokenInfo> {
		if let Some(source) = &self.token_source {
			let fresh = source.token().await.map_err(|source| AuthError::TokenSource { source })?;
			// OAuth tokens keep the cookies captured so far.
			let cookies = self.token.read().cookies.clone();

			return Ok(TokenInfo {
				access_token: TokenSecret::new(fresh.access_token),
				token_type: normalize_token_type(&fresh.token_type),
				expiry: fresh.expiry,
				cookies,
			});
		}

		let Some(provider) = &self.auth_provider else { return Ok(self.snapshot()) };
		let current = self.snapshot();
		let fresh = if current.has_credential() {
			match provider.refresh(&current).await {
				Ok(token) => Ok(token),
				Err(_) => provider.authenticate().await,
			}
		} else {
			provider.authenticate().await
		};
		let mut fresh = fresh.map_err(|source| AuthError::Provider { source })?;

		fresh.token_type = normalize_token_type(&fresh.token_type);

		Ok(fresh)
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("token", &*self.token.read())
			.field("refresh_buffer", &self.refresh_buffer)
			.field("token_source", &self.token_source.is_some())
			.field("auth_provider", &self.auth_provider.is_some())
			.field("relay", &self.relay.is_some())
			.finish()
	}
}
