//! Request middlewares run in registration order before credentials are attached.
//!
//! Any middleware error aborts the request before it reaches the network.

// self
use crate::{
	_prelude::*,
	client::http::{BodyMap, HttpRequest},
	relay::{Relay, RelayEvent, RelayLevel},
};

/// Hook that may rewrite or reject an outgoing request.
pub trait HttpMiddleware
where
	Self: Send + Sync,
{
	/// Inspects or mutates `request`; returning an error aborts it.
	fn handle(&self, request: &mut HttpRequest) -> Result<(), BoxError>;
}
impl<F> HttpMiddleware for F
where
	F: Fn(&mut HttpRequest) -> Result<(), BoxError> + Send + Sync,
{
	fn handle(&self, request: &mut HttpRequest) -> Result<(), BoxError> {
		self(request)
	}
}

/// Sets a fixed header set on every request.
#[derive(Clone, Debug, Default)]
pub struct StaticHeaders(BTreeMap<String, String>);
impl StaticHeaders {
	/// Adds a header to the set.
	pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.0.insert(name.into(), value.into());

		self
	}
}
impl HttpMiddleware for StaticHeaders {
	fn handle(&self, request: &mut HttpRequest) -> Result<(), BoxError> {
		for (name, value) in &self.0 {
			request.set_header(name.as_str(), value.as_str());
		}

		Ok(())
	}
}

/// Writes `METHOD url` for every request to a relay at debug level.
#[derive(Clone)]
pub struct RelayLogger(Arc<dyn Relay>);
impl RelayLogger {
	/// Logs through `relay`.
	pub fn new(relay: Arc<dyn Relay>) -> Self {
		Self(relay)
	}
}
impl HttpMiddleware for RelayLogger {
	fn handle(&self, request: &mut HttpRequest) -> Result<(), BoxError> {
		let line = format!("{} {}", request.method, request.url);

		self.0.emit(RelayLevel::Debug, RelayEvent::log(line));

		Ok(())
	}
}

/// Adds a field to the structured body and discards any pre-encoded body.
#[derive(Clone, Debug)]
pub struct InjectField {
	key: String,
	value: serde_json::Value,
}
impl InjectField {
	/// Injects `key` with `value`.
	pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		Self { key: key.into(), value: value.into() }
	}
}
impl HttpMiddleware for InjectField {
	fn handle(&self, request: &mut HttpRequest) -> Result<(), BoxError> {
		request.body.get_or_insert_with(BodyMap::new).insert(self.key.clone(), self.value.clone());
		request.body_bytes = None;
		request.content_type = None;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::relay::MemoryRelay;

	#[test]
	fn static_headers_override_case_insensitively() {
		let mut request = HttpRequest::new("GET", "https://example.com");

		request.set_header("x-api-key", "old");
		StaticHeaders::default()
			.with("X-Api-Key", "new")
			.handle(&mut request)
			.expect("Static headers never fail.");

		assert_eq!(request.headers.len(), 1);
		assert_eq!(request.header("x-api-key"), Some("new"));
	}

	#[test]
	fn inject_field_resets_encoded_body() {
		let mut request = HttpRequest::new("POST", "https://example.com");

		request.set_body_bytes(b"stale".to_vec(), "text/plain");
		InjectField::new("tenant", "acme").handle(&mut request).expect("Injection never fails.");

		let (bytes, content_type) = request.finalize_body().expect("Body should finalize.");

		assert_eq!(bytes, br#"{"tenant":"acme"}"#);
		assert_eq!(content_type, "application/json");
	}

	#[test]
	fn closures_and_relay_logger_act_as_middlewares() {
		let relay = Arc::new(MemoryRelay::default());
		let logger = RelayLogger::new(relay.clone());
		let reject = |_: &mut HttpRequest| -> Result<(), BoxError> { Err("blocked".into()) };
		let mut request = HttpRequest::new("DELETE", "https://example.com/item");

		logger.handle(&mut request).expect("Logger never fails.");

		assert!(reject.handle(&mut request).is_err());
		assert_eq!(relay.events()[0].1.to_string(), "DELETE https://example.com/item");
	}
}
