//! Client-side networking runtime: authenticated requests with token lifecycle management,
//! retry policies for flaky upstreams, and observable file downloads whose progress fans out to
//! per-URL subscribers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod notify;
pub mod obs;
pub mod relay;
pub mod request;
pub mod retry;
pub mod service;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		client::{ClientFuture, NetClient},
		config::NetConfig,
		download::Platform,
		relay::MemoryRelay,
		request::{ClientKind, RequestConfig, Response},
		service::NetService,
	};

	/// Builds a [`NetService`] wired to a recording relay so tests can assert on log output.
	pub fn build_test_service(config: NetConfig) -> (NetService, Arc<MemoryRelay>) {
		let relay = Arc::new(MemoryRelay::default());
		let service = NetService::builder(config)
			.relay(relay.clone())
			.platform(Platform::Linux)
			.build()
			.expect("Test service should build with a relay attached.");

		(service, relay)
	}

	/// Scripted [`NetClient`] that replays canned outcomes and counts invocations.
	pub struct ScriptedClient {
		client_ref: String,
		kind: ClientKind,
		script: Mutex<Vec<Result<Response>>>,
		fallback: Box<dyn Fn() -> Result<Response> + Send + Sync>,
		calls: Mutex<usize>,
	}
	impl ScriptedClient {
		/// Creates a client that answers every call with `fallback` once the script runs dry.
		pub fn new(
			client_ref: impl Into<String>,
			kind: ClientKind,
			fallback: impl Fn() -> Result<Response> + Send + Sync + 'static,
		) -> Self {
			Self {
				client_ref: client_ref.into(),
				kind,
				script: Mutex::new(Vec::new()),
				fallback: Box::new(fallback),
				calls: Mutex::new(0),
			}
		}

		/// Queues outcomes that are replayed in order before falling back.
		pub fn with_script(self, outcomes: Vec<Result<Response>>) -> Self {
			let mut outcomes = outcomes;

			outcomes.reverse();
			*self.script.lock() = outcomes;

			self
		}

		/// Returns how many times the client has been invoked.
		pub fn calls(&self) -> usize {
			*self.calls.lock()
		}
	}
	impl NetClient for ScriptedClient {
		fn client_ref(&self) -> &str {
			&self.client_ref
		}

		fn kind(&self) -> ClientKind {
			self.kind.clone()
		}

		fn process_request<'a>(&'a self, _request: &'a RequestConfig) -> ClientFuture<'a> {
			*self.calls.lock() += 1;

			let outcome = self.script.lock().pop().unwrap_or_else(|| (self.fallback)());

			Box::pin(async move { outcome })
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		path::{Path, PathBuf},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{BoxError, Error, Result};
}

pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tempfile as _};
