//! HTTP request templates and the mutable per-attempt request seen by middlewares.

// self
use crate::{_prelude::*, client::http::body};

/// Structured JSON object used as a request body.
pub type BodyMap = serde_json::Map<String, serde_json::Value>;

/// Reusable HTTP request description stored in a [`RequestConfig`](crate::request::RequestConfig).
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequestConfig {
	/// HTTP method.
	pub method: String,
	/// Target URL.
	pub url: String,
	/// Structured body encoded according to `body_type`.
	pub body: Option<BodyMap>,
	/// `application/json` or `application/x-www-form-urlencoded`.
	pub body_type: String,
	/// Request headers.
	pub headers: BTreeMap<String, String>,
}
impl HttpRequestConfig {
	/// Creates a template with a JSON body type and no body.
	pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			method: method.into(),
			url: url.into(),
			body: None,
			body_type: body::JSON.into(),
			headers: BTreeMap::new(),
		}
	}

	/// Creates a `GET` template.
	pub fn get(url: impl Into<String>) -> Self {
		Self::new("GET", url)
	}

	/// Creates a `POST` template.
	pub fn post(url: impl Into<String>) -> Self {
		Self::new("POST", url)
	}

	/// Sets the structured body.
	pub fn with_body(mut self, body: BodyMap) -> Self {
		self.body = Some(body);

		self
	}

	/// Sets the body encoding.
	pub fn with_body_type(mut self, body_type: impl Into<String>) -> Self {
		self.body_type = body_type.into();

		self
	}

	/// Adds a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Produces an independent request for one attempt.
	pub fn new_request(&self) -> HttpRequest {
		HttpRequest {
			method: self.method.clone(),
			url: self.url.clone(),
			body: self.body.clone(),
			body_type: self.body_type.clone(),
			headers: self.headers.clone(),
			body_bytes: None,
			content_type: None,
		}
	}
}
impl Default for HttpRequestConfig {
	fn default() -> Self {
		Self::get("")
	}
}

/// Request materialized for one attempt; middlewares may rewrite any field.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: String,
	/// Target URL.
	pub url: String,
	/// Structured body.
	pub body: Option<BodyMap>,
	/// Body encoding.
	pub body_type: String,
	/// Request headers; names are unique ignoring ASCII case.
	pub headers: BTreeMap<String, String>,
	/// Pre-encoded body; wins over `body` when present.
	pub body_bytes: Option<Vec<u8>>,
	/// Explicit content type; wins over the derived one.
	pub content_type: Option<String>,
}
impl HttpRequest {
	/// Creates a bodiless request.
	pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
		HttpRequestConfig::new(method, url).new_request()
	}

	/// Returns the header value for `name`, ignoring ASCII case.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
	}

	/// Sets a header, replacing any existing value whose name differs only in case.
	pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();

		self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
		self.headers.insert(name, value.into());
	}

	/// Sets a pre-encoded body and its content type.
	pub fn set_body_bytes(&mut self, bytes: Vec<u8>, content_type: impl Into<String>) {
		self.body_bytes = Some(bytes);
		self.content_type = Some(content_type.into());
	}

	/// Encodes the structured body unless raw bytes are already present.
	///
	/// Returns the final body and content type; an explicit content type always wins.
	pub fn finalize_body(&mut self) -> Result<(Vec<u8>, String)> {
		let (bytes, derived) = match self.body_bytes.take() {
			Some(bytes) => (bytes, String::new()),
			None => body::prepare_body(self.body.as_ref(), &self.body_type)?,
		};
		let content_type = self.content_type.clone().filter(|c| !c.is_empty()).unwrap_or(derived);

		self.body_bytes = Some(bytes.clone());
		self.content_type = Some(content_type.clone());

		Ok((bytes, content_type))
	}
}
