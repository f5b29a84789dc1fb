//! Token and cookie models plus the expiry arithmetic shared by every credential source.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::_prelude::*;

/// Redacted secret wrapper keeping credential material out of logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when no secret is present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Session cookie captured from `Set-Cookie` headers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
	/// Cookie name; unique within a token.
	pub name: String,
	/// Cookie value.
	pub value: String,
}
impl Cookie {
	/// Creates a cookie.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into() }
	}

	/// Extracts the leading `name=value` pair of a `Set-Cookie` header value.
	pub fn parse_set_cookie(header: &str) -> Option<Self> {
		let pair = header.split(';').next()?;
		let (name, value) = pair.split_once('=')?;
		let name = name.trim();

		if name.is_empty() {
			return None;
		}

		Some(Self::new(name, value.trim().trim_matches('"')))
	}
}
impl Debug for Cookie {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Cookie").field("name", &self.name).field("value", &"<redacted>").finish()
	}
}

/// Credential state attached to outgoing requests.
///
/// A token is usable when it carries an access token or at least one cookie and has not
/// reached its expiry (minus the caller's refresh buffer). A missing expiry means the token
/// never expires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
	/// Access token; empty when the credential is cookie-only.
	pub access_token: TokenSecret,
	/// Authorization scheme, normalized via [`normalize_token_type`].
	pub token_type: String,
	/// Absolute expiry; `None` never expires.
	pub expiry: Option<OffsetDateTime>,
	/// Session cookies in capture order.
	pub cookies: Vec<Cookie>,
}
impl TokenInfo {
	/// Builds a bearer token without expiry.
	pub fn bearer(token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(token),
			token_type: "Bearer".into(),
			..Default::default()
		}
	}

	/// Builds HTTP basic credentials from a user name and password.
	pub fn basic(user: &str, password: &str) -> Self {
		Self {
			access_token: TokenSecret::new(STANDARD.encode(format!("{user}:{password}"))),
			token_type: "Basic".into(),
			..Default::default()
		}
	}

	/// Sets the absolute expiry.
	pub fn with_expiry(mut self, expiry: OffsetDateTime) -> Self {
		self.expiry = Some(expiry);

		self
	}

	/// Adds or replaces a cookie.
	pub fn with_cookie(mut self, cookie: Cookie) -> Self {
		self.upsert_cookie(cookie);

		self
	}

	/// Returns `true` when the token carries an access token or a cookie.
	pub fn has_credential(&self) -> bool {
		!self.access_token.is_empty() || !self.cookies.is_empty()
	}

	/// Checks expiry against the current clock.
	pub fn is_expired(&self, buffer: Duration) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc(), buffer)
	}

	/// Returns `true` when the token has no credential or `now >= expiry - buffer`.
	pub fn is_expired_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		if !self.has_credential() {
			return true;
		}

		match self.expiry {
			Some(expiry) => now >= expiry - buffer,
			None => false,
		}
	}

	/// Renders the `Authorization` value, if an access token is present.
	pub fn authorization_header(&self) -> Option<String> {
		if self.access_token.is_empty() {
			return None;
		}

		Some(format!("{} {}", normalize_token_type(&self.token_type), self.access_token.expose()))
	}

	/// Renders the `Cookie` value, if any cookie is present.
	pub fn cookie_header(&self) -> Option<String> {
		if self.cookies.is_empty() {
			return None;
		}

		Some(
			self.cookies
				.iter()
				.map(|c| format!("{}={}", c.name, c.value))
				.collect::<Vec<_>>()
				.join("; "),
		)
	}

	/// Inserts `cookie`, replacing the value of an existing cookie with the same name.
	pub fn upsert_cookie(&mut self, cookie: Cookie) {
		match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
			Some(existing) => existing.value = cookie.value,
			None => self.cookies.push(cookie),
		}
	}
}

/// Canonicalizes the authorization scheme: `bearer`/`basic` in any case become `Bearer`/`Basic`,
/// an empty scheme becomes `Bearer`, and anything else is kept verbatim.
pub fn normalize_token_type(token_type: &str) -> String {
	let trimmed = token_type.trim();

	if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("bearer") {
		"Bearer".into()
	} else if trimmed.eq_ignore_ascii_case("basic") {
		"Basic".into()
	} else {
		trimmed.into()
	}
}
