//! Network clients and the registry that resolves them by reference.

pub mod http;
pub mod object;

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	request::{ClientKind, RequestConfig, Response},
};

/// Boxed future returned by [`NetClient::process_request`].
pub type ClientFuture<'a> = Pin<Box<dyn Future<Output = Result<Response>> + 'a + Send>>;

/// A client able to execute one kind of request payload.
pub trait NetClient
where
	Self: Send + Sync,
{
	/// Reference under which the client is usually registered.
	fn client_ref(&self) -> &str;

	/// Payload kind the client accepts.
	fn kind(&self) -> ClientKind;

	/// Executes a single attempt of `request`.
	fn process_request<'a>(&'a self, request: &'a RequestConfig) -> ClientFuture<'a>;
}

/// Name-to-client map shared by the service; registering an existing name replaces the client.
#[derive(Clone, Default)]
pub struct ClientRegistry(Arc<RwLock<HashMap<String, Arc<dyn NetClient>>>>);
impl ClientRegistry {
	/// Registers `client` under `client_ref`, returning the client it replaced.
	pub fn register(
		&self,
		client_ref: impl Into<String>,
		client: Arc<dyn NetClient>,
	) -> Option<Arc<dyn NetClient>> {
		self.0.write().insert(client_ref.into(), client)
	}

	/// Resolves `client_ref`.
	pub fn get(&self, client_ref: &str) -> Result<Arc<dyn NetClient>, ConfigError> {
		self.0
			.read()
			.get(client_ref)
			.cloned()
			.ok_or_else(|| ConfigError::UnknownClient { client_ref: client_ref.into() })
	}

	/// Returns the registered references in sorted order.
	pub fn refs(&self) -> Vec<String> {
		let mut refs: Vec<_> = self.0.read().keys().cloned().collect();

		refs.sort();

		refs
	}
}
impl Debug for ClientRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ClientRegistry").field(&self.refs()).finish()
	}
}
