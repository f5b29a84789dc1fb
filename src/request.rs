//! Request templates, payload variants, and the captured response model.

// crates.io
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	client::{http::HttpRequestConfig, object::ObjectRequestConfig},
	retry::{DelayPolicy, ExponentialBackoff, RetryClassifier},
};

/// Client reference used when a request does not name one.
pub const DEFAULT_CLIENT_REF: &str = "default";
/// Task name used when a request does not name one.
pub const DEFAULT_TASK_NAME: &str = "http_request";

const DEFAULT_TIMEOUT: Duration = Duration::seconds(20);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Capability tag shared by clients and payloads so the executor can reject mismatches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClientKind {
	/// HTTP client.
	Http,
	/// Object-store client.
	ObjectStore,
	/// Application-defined client kind.
	Custom(String),
}
impl Display for ClientKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Http => f.write_str("http"),
			Self::ObjectStore => f.write_str("object-store"),
			Self::Custom(kind) => f.write_str(kind),
		}
	}
}

/// Client-specific request description.
#[derive(Clone, Debug)]
pub enum RequestPayload {
	/// Request for an HTTP client.
	Http(HttpRequestConfig),
	/// Request for an object-store client.
	Object(ObjectRequestConfig),
	/// Opaque request for an application-defined client.
	Custom {
		/// Kind tag that must match the target client.
		kind: String,
		/// Arbitrary payload interpreted by the client.
		body: serde_json::Value,
	},
}
impl RequestPayload {
	/// Returns the client kind able to execute this payload.
	pub fn kind(&self) -> ClientKind {
		match self {
			Self::Http(_) => ClientKind::Http,
			Self::Object(_) => ClientKind::ObjectStore,
			Self::Custom { kind, .. } => ClientKind::Custom(kind.clone()),
		}
	}
}
impl From<HttpRequestConfig> for RequestPayload {
	fn from(value: HttpRequestConfig) -> Self {
		Self::Http(value)
	}
}
impl From<ObjectRequestConfig> for RequestPayload {
	fn from(value: ObjectRequestConfig) -> Self {
		Self::Object(value)
	}
}

/// Template describing a single logical request and its retry budget.
///
/// [`RequestConfig::default`] targets the `default` client with a 20 second timeout, three
/// retries, and exponential backoff.
#[derive(Clone)]
pub struct RequestConfig {
	/// Registered client reference that executes the request.
	pub client_ref: String,
	/// Client-specific payload.
	pub payload: Option<RequestPayload>,
	/// Per-attempt timeout; `None` disables the timeout.
	pub timeout: Option<Duration>,
	/// Additional attempts after the first one.
	pub max_retries: u32,
	/// Delay policy between attempts; constant one second when unset.
	pub delay: Option<Arc<dyn DelayPolicy>>,
	/// Task label used in logs and timeouts.
	pub task_name: String,
	/// Overrides the default retryable-error classification.
	pub classifier: Option<Arc<dyn RetryClassifier>>,
}
impl RequestConfig {
	/// Builds the default template carrying `payload`.
	pub fn new(payload: impl Into<RequestPayload>) -> Self {
		Self { payload: Some(payload.into()), ..Default::default() }
	}

	/// Targets a different registered client.
	pub fn with_client_ref(mut self, client_ref: impl Into<String>) -> Self {
		self.client_ref = client_ref.into();

		self
	}

	/// Sets or clears the per-attempt timeout.
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;

		self
	}

	/// Sets the number of retries after the first attempt.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Sets or clears the delay policy.
	pub fn with_delay(mut self, delay: Option<Arc<dyn DelayPolicy>>) -> Self {
		self.delay = delay;

		self
	}

	/// Sets the task label.
	pub fn with_task_name(mut self, task_name: impl Into<String>) -> Self {
		self.task_name = task_name.into();

		self
	}

	/// Installs a custom retry classifier.
	pub fn with_classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
		self.classifier = Some(classifier);

		self
	}

	/// Returns the task label, falling back to the default name when empty.
	pub fn task_name(&self) -> &str {
		if self.task_name.is_empty() { DEFAULT_TASK_NAME } else { &self.task_name }
	}
}
impl Default for RequestConfig {
	fn default() -> Self {
		Self {
			client_ref: DEFAULT_CLIENT_REF.into(),
			payload: None,
			timeout: Some(DEFAULT_TIMEOUT),
			max_retries: DEFAULT_MAX_RETRIES,
			delay: Some(Arc::new(ExponentialBackoff::default())),
			task_name: DEFAULT_TASK_NAME.into(),
			classifier: None,
		}
	}
}
impl Debug for RequestConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestConfig")
			.field("client_ref", &self.client_ref)
			.field("payload", &self.payload)
			.field("timeout", &self.timeout)
			.field("max_retries", &self.max_retries)
			.field("delay", &self.delay)
			.field("task_name", &self.task_name)
			.field("classifier", &self.classifier.as_ref().map(|_| "<custom>"))
			.finish()
	}
}

/// Fully buffered upstream response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
	/// HTTP status code (object-store clients use HTTP semantics as well).
	pub status: u16,
	/// Multi-valued response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl Response {
	/// Builds a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for 5xx statuses.
	pub fn is_server_error(&self) -> bool {
		self.status >= 500
	}

	/// Returns every value recorded for `name`, in arrival order.
	pub fn header_values(&self, name: &str) -> Vec<&str> {
		self.headers.get_all(name).iter().filter_map(|v| v.to_str().ok()).collect()
	}

	/// Returns the body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
	}

	/// Parses the `Retry-After` header into a relative delay.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(&self.headers)
	}
}

/// Response paired with its optionally decoded JSON body.
#[derive(Clone, Debug)]
pub struct Decoded<T> {
	/// Raw response.
	pub response: Response,
	/// Decoded body; `None` when the body was empty.
	pub value: Option<T>,
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::header::HeaderValue;
	// self
	use super::*;

	#[test]
	fn default_template_matches_documented_values() {
		let config = RequestConfig::default();

		assert_eq!(config.client_ref, DEFAULT_CLIENT_REF);
		assert_eq!(config.timeout, Some(Duration::seconds(20)));
		assert_eq!(config.max_retries, 3);
		assert!(config.delay.is_some());
		assert!(config.payload.is_none());
	}

	#[test]
	fn empty_task_name_falls_back() {
		let config = RequestConfig::default().with_task_name("");

		assert_eq!(config.task_name(), DEFAULT_TASK_NAME);
	}

	#[test]
	fn payload_kind_tracks_variant() {
		let custom = RequestPayload::Custom { kind: "queue".into(), body: serde_json::Value::Null };

		let http = RequestPayload::from(HttpRequestConfig::get("http://x"));

		assert_eq!(http.kind(), ClientKind::Http);
		assert_eq!(custom.kind(), ClientKind::Custom("queue".into()));
	}

	#[test]
	fn json_decode_reports_path() {
		#[derive(Debug, Deserialize)]
		struct Body {
			#[allow(dead_code)]
			count: u32,
		}

		let response = Response::new(200, br#"{"count":"many"}"#.to_vec());
		let err = response.json::<Body>().expect_err("String count should fail to decode.");

		assert_eq!(err.path().to_string(), "count");
	}

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut response = Response::new(503, Vec::new());

		response.headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

		assert_eq!(response.retry_after(), Some(Duration::seconds(7)));
		assert_eq!(response.header_values("retry-after"), ["7"]);
	}
}
