//! Object-store client: bucket/key operations mapped onto the shared response model.
//!
//! Backends implement [`ObjectStoreBackend`]; the client validates requests, runs its
//! middlewares, and translates results into [`Response`]s: `get` returns the object body (404
//! when absent), `list` returns a JSON array of keys, and `put`/`delete` return an empty 200.

// self
use crate::{
	_prelude::*,
	client::{ClientFuture, NetClient},
	error::{ConfigError, TransportError},
	request::{ClientKind, RequestConfig, RequestPayload, Response},
};

/// Boxed future returned by object-store backends.
pub type ObjectFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + 'a + Send>>;

/// Object-store operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectOperation {
	/// Fetch one object.
	Get,
	/// Store one object.
	Put,
	/// Remove one object.
	Delete,
	/// List keys under a prefix.
	List,
}
impl ObjectOperation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "get",
			Self::Put => "put",
			Self::Delete => "delete",
			Self::List => "list",
		}
	}
}

/// Reusable object-store request description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRequestConfig {
	/// Operation to perform.
	pub operation: ObjectOperation,
	/// Target bucket.
	pub bucket: String,
	/// Object key; required except for `list`.
	pub key: String,
	/// Object body for `put`.
	pub body: Vec<u8>,
	/// Key prefix for `list`.
	pub prefix: String,
	/// Content type stored with `put`.
	pub content_type: String,
	/// Backend-specific options.
	pub extra: BTreeMap<String, String>,
	/// Request headers forwarded to the backend.
	pub headers: BTreeMap<String, String>,
}
impl ObjectRequestConfig {
	/// Creates a request for `operation` on `bucket`/`key`.
	pub fn new(
		operation: ObjectOperation,
		bucket: impl Into<String>,
		key: impl Into<String>,
	) -> Self {
		Self {
			operation,
			bucket: bucket.into(),
			key: key.into(),
			body: Vec::new(),
			prefix: String::new(),
			content_type: String::new(),
			extra: BTreeMap::new(),
			headers: BTreeMap::new(),
		}
	}

	/// Sets the object body and its content type.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
		self.body = body.into();
		self.content_type = content_type.into();

		self
	}

	/// Sets the listing prefix.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = prefix.into();

		self
	}

	/// Produces an independent request for one attempt.
	pub fn new_request(&self) -> ObjectRequest {
		ObjectRequest(self.clone())
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.bucket.is_empty() {
			return Err(ConfigError::InvalidObjectRequest { reason: "bucket is required" });
		}
		if self.operation != ObjectOperation::List && self.key.is_empty() {
			return Err(ConfigError::InvalidObjectRequest { reason: "key is required" });
		}

		Ok(())
	}
}

/// Request materialized for one attempt; middlewares may rewrite any field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRequest(pub ObjectRequestConfig);

/// Hook that may rewrite or reject an object-store request.
pub trait ObjectMiddleware
where
	Self: Send + Sync,
{
	/// Inspects or mutates `request`; returning an error aborts it.
	fn handle(&self, request: &mut ObjectRequest) -> Result<(), BoxError>;
}
impl<F> ObjectMiddleware for F
where
	F: Fn(&mut ObjectRequest) -> Result<(), BoxError> + Send + Sync,
{
	fn handle(&self, request: &mut ObjectRequest) -> Result<(), BoxError> {
		self(request)
	}
}

/// Stored object returned by [`ObjectStoreBackend::get`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredObject {
	/// Object bytes.
	pub body: Vec<u8>,
	/// Content type recorded at upload time.
	pub content_type: String,
}

/// Storage service behind an [`ObjectClient`].
pub trait ObjectStoreBackend
where
	Self: Send + Sync,
{
	/// Returns the object, or `None` when it does not exist.
	fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> ObjectFuture<'a, Option<StoredObject>>;

	/// Stores or replaces an object.
	fn put<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
		object: StoredObject,
	) -> ObjectFuture<'a, ()>;

	/// Removes an object; removing a missing object succeeds.
	fn delete<'a>(&'a self, bucket: &'a str, key: &'a str) -> ObjectFuture<'a, ()>;

	/// Lists keys starting with `prefix`, sorted.
	fn list<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> ObjectFuture<'a, Vec<String>>;
}

type ObjectMap = Arc<RwLock<BTreeMap<(String, String), StoredObject>>>;

/// Thread-safe in-process backend for local development and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryObjectStore(ObjectMap);
impl ObjectStoreBackend for MemoryObjectStore {
	fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> ObjectFuture<'a, Option<StoredObject>> {
		let object = self.0.read().get(&(bucket.to_owned(), key.to_owned())).cloned();

		Box::pin(async move { Ok(object) })
	}

	fn put<'a>(
		&'a self,
		bucket: &'a str,
		key: &'a str,
		object: StoredObject,
	) -> ObjectFuture<'a, ()> {
		self.0.write().insert((bucket.to_owned(), key.to_owned()), object);

		Box::pin(async { Ok(()) })
	}

	fn delete<'a>(&'a self, bucket: &'a str, key: &'a str) -> ObjectFuture<'a, ()> {
		self.0.write().remove(&(bucket.to_owned(), key.to_owned()));

		Box::pin(async { Ok(()) })
	}

	fn list<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> ObjectFuture<'a, Vec<String>> {
		let keys = self
			.0
			.read()
			.keys()
			.filter(|(b, k)| b == bucket && k.starts_with(prefix))
			.map(|(_, k)| k.clone())
			.collect();

		Box::pin(async move { Ok(keys) })
	}
}

/// Client that executes [`ObjectRequestConfig`] payloads against a backend.
pub struct ObjectClient {
	client_ref: String,
	backend: Arc<dyn ObjectStoreBackend>,
	middlewares: Vec<Arc<dyn ObjectMiddleware>>,
}
impl ObjectClient {
	/// Creates a client over `backend`.
	pub fn new(client_ref: impl Into<String>, backend: Arc<dyn ObjectStoreBackend>) -> Self {
		Self { client_ref: client_ref.into(), backend, middlewares: Vec::new() }
	}

	/// Appends a middleware.
	pub fn with_middleware(mut self, middleware: Arc<dyn ObjectMiddleware>) -> Self {
		self.middlewares.push(middleware);

		self
	}

	/// Executes one attempt of `template`.
	pub async fn execute(&self, template: &ObjectRequestConfig) -> Result<Response> {
		let mut request = template.new_request();

		for middleware in &self.middlewares {
			middleware.handle(&mut request).map_err(Error::middleware)?;
		}

		let ObjectRequest(request) = request;

		request.validate()?;

		let operation = request.operation;
		let backend_err = |source: BoxError| {
			Error::from(TransportError::ObjectStore { operation: operation.as_str(), source })
		};

		match operation {
			ObjectOperation::Get => {
				let object =
					self.backend.get(&request.bucket, &request.key).await.map_err(backend_err)?;

				Ok(match object {
					Some(object) => {
						let mut response = Response::new(200, object.body);

						if !object.content_type.is_empty()
							&& let Ok(value) = object.content_type.parse()
						{
							response.headers.insert(reqwest::header::CONTENT_TYPE, value);
						}

						response
					},
					None => Response::new(404, Vec::new()),
				})
			},
			ObjectOperation::Put => {
				let object =
					StoredObject { body: request.body, content_type: request.content_type };

				self.backend.put(&request.bucket, &request.key, object).await.map_err(backend_err)?;

				Ok(Response::new(200, Vec::new()))
			},
			ObjectOperation::Delete => {
				self.backend.delete(&request.bucket, &request.key).await.map_err(backend_err)?;

				Ok(Response::new(200, Vec::new()))
			},
			ObjectOperation::List => {
				let keys =
					self.backend.list(&request.bucket, &request.prefix).await.map_err(backend_err)?;
				let body = serde_json::to_vec(&keys).map_err(ConfigError::from)?;

				Ok(Response::new(200, body))
			},
		}
	}
}
impl NetClient for ObjectClient {
	fn client_ref(&self) -> &str {
		&self.client_ref
	}

	fn kind(&self) -> ClientKind {
		ClientKind::ObjectStore
	}

	fn process_request<'a>(&'a self, request: &'a RequestConfig) -> ClientFuture<'a> {
		Box::pin(async move {
			match &request.payload {
				Some(RequestPayload::Object(template)) => self.execute(template).await,
				Some(other) => Err(ConfigError::ClientKindMismatch {
					client_ref: self.client_ref.clone(),
					client_kind: ClientKind::ObjectStore.to_string(),
					request_kind: other.kind().to_string(),
				}
				.into()),
				None => Err(ConfigError::MissingPayload.into()),
			}
		})
	}
}
