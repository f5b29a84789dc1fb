//! Runtime-wide error types shared by the resolver, executor, retry controller, and downloads.

// self
use crate::{_prelude::*, request::Response};

/// Runtime-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used at trait seams where implementors bring their own failure types.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical runtime error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration or request-shape problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; safe to retry.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, IO).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Credential acquisition failed.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// A middleware rejected the request before it reached the network.
	#[error("Middleware aborted the request.")]
	Middleware {
		/// Failure reported by the middleware.
		#[source]
		source: BoxError,
	},
	/// Upstream rejected the credentials with HTTP 401.
	#[error("Request to {url} was rejected as unauthorized.")]
	Unauthorized {
		/// Target URL of the rejected request.
		url: String,
		/// Full response returned by the upstream.
		response: Box<Response>,
	},
	/// Upstream answered with a server error status.
	#[error("Server responded with status {status}.")]
	Server {
		/// HTTP status code.
		status: u16,
		/// Full response returned by the upstream.
		response: Box<Response>,
	},
	/// Response body could not be decoded into the requested type.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured decoding failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// Full response whose body failed to decode.
		response: Box<Response>,
	},
	/// Download-specific failure.
	#[error(transparent)]
	Download(#[from] DownloadError),
	/// Operation was interrupted by cancellation or a deadline.
	#[error("Operation stopped: {0}.")]
	Cancelled(CancelReason),
	/// Retry budget exhausted; wraps the final failure.
	#[error("Request failed after {attempts} attempts.")]
	RetriesExhausted {
		/// Number of attempts performed.
		attempts: u32,
		/// Failure observed on the final attempt.
		#[source]
		last: Box<Error>,
	},
}
impl Error {
	/// Classifies the error for retry and reporting decisions.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Config(_) => ErrorKind::Config,
			Self::Transient(_) => ErrorKind::Transient,
			Self::Transport(_) => ErrorKind::Transport,
			Self::Auth(_) => ErrorKind::Auth,
			Self::Middleware { .. } => ErrorKind::Middleware,
			Self::Unauthorized { .. } => ErrorKind::Unauthorized,
			Self::Server { .. } => ErrorKind::Server,
			Self::Decode { .. } => ErrorKind::Decode,
			Self::Download(_) => ErrorKind::Download,
			Self::Cancelled(_) => ErrorKind::Cancelled,
			Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
		}
	}

	/// Returns the upstream response carried by the error, if any.
	pub fn response(&self) -> Option<&Response> {
		match self {
			Self::Unauthorized { response, .. }
			| Self::Server { response, .. }
			| Self::Decode { response, .. } => Some(response),
			Self::RetriesExhausted { last, .. } => last.response(),
			_ => None,
		}
	}

	/// Returns `true` when the operation was stopped by cancellation or a deadline.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled(_))
	}

	pub(crate) fn middleware(src: BoxError) -> Self {
		Self::Middleware { source: src }
	}
}
impl From<ReqwestError> for Error {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			let operation = e.url().map(ToString::to_string).unwrap_or_default();

			TransientError::Timeout { operation }.into()
		} else if e.is_connect() {
			TransientError::connect(e).into()
		} else if e.is_builder() {
			ConfigError::request_build(e).into()
		} else {
			TransportError::network(e).into()
		}
	}
}

/// Coarse error classification driving the retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// See [`Error::Config`].
	Config,
	/// See [`Error::Transient`].
	Transient,
	/// See [`Error::Transport`].
	Transport,
	/// See [`Error::Auth`].
	Auth,
	/// See [`Error::Middleware`].
	Middleware,
	/// See [`Error::Unauthorized`].
	Unauthorized,
	/// See [`Error::Server`].
	Server,
	/// See [`Error::Decode`].
	Decode,
	/// See [`Error::Download`].
	Download,
	/// See [`Error::Cancelled`].
	Cancelled,
	/// See [`Error::RetriesExhausted`].
	RetriesExhausted,
}
impl ErrorKind {
	/// Returns `true` when the default policy retries errors of this kind.
	pub const fn is_retryable(self) -> bool {
		matches!(self, Self::Transient | Self::Transport | Self::Server)
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Config => "config",
			Self::Transient => "transient",
			Self::Transport => "transport",
			Self::Auth => "auth",
			Self::Middleware => "middleware",
			Self::Unauthorized => "unauthorized",
			Self::Server => "server",
			Self::Decode => "decode",
			Self::Download => "download",
			Self::Cancelled => "cancelled",
			Self::RetriesExhausted => "retries_exhausted",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Why an operation was interrupted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
	/// The caller's cancellation token fired.
	Cancelled,
	/// The operation's deadline elapsed.
	DeadlineExceeded,
}
impl Display for CancelReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Cancelled => f.write_str("cancelled"),
			Self::DeadlineExceeded => f.write_str("deadline exceeded"),
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Service was built without a log relay.
	#[error("A log relay must be configured before the service starts.")]
	MissingRelay,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request could not be assembled.
	#[error("HTTP request could not be assembled.")]
	RequestBuild {
		/// Underlying builder failure.
		#[source]
		source: BoxError,
	},
	/// Request configuration has no client reference.
	#[error("Request configuration is missing a client reference.")]
	MissingClientRef,
	/// Request configuration carries no payload.
	#[error("Request configuration is missing a payload.")]
	MissingPayload,
	/// No client is registered under the reference.
	#[error("No client is registered as `{client_ref}`.")]
	UnknownClient {
		/// Requested client reference.
		client_ref: String,
	},
	/// Payload kind does not match the registered client.
	#[error("Client `{client_ref}` is a {client_kind} client but received a {request_kind} request.")]
	ClientKindMismatch {
		/// Requested client reference.
		client_ref: String,
		/// Kind of the registered client.
		client_kind: String,
		/// Kind of the submitted payload.
		request_kind: String,
	},
	/// Request body type is neither JSON nor form encoding.
	#[error("Unsupported body type `{body_type}`.")]
	UnsupportedBodyType {
		/// Offending body type.
		body_type: String,
	},
	/// Structured body could not be serialized.
	#[error("Request body could not be encoded.")]
	BodyEncode(#[from] serde_json::Error),
	/// Request URL cannot be parsed.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending URL.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// HTTP method is not a valid token.
	#[error("HTTP method `{method}` is invalid.")]
	InvalidMethod {
		/// Offending method.
		method: String,
	},
	/// Header name or value contains forbidden characters.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Target host is blocked by the domain filter.
	#[error("Host `{host}` is not permitted by the domain filter.")]
	DomainNotPermitted {
		/// Rejected host.
		host: String,
	},
	/// Token endpoint URL cannot be parsed.
	#[error("Token endpoint URL is invalid.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Download URL yields no usable file name.
	#[error("Cannot derive a file name from `{url}`.")]
	InvalidFileName {
		/// Offending URL.
		url: String,
	},
	/// Extra header list is malformed.
	#[error("Header list entry `{entry}` must be formatted as NAME=VALUE.")]
	InvalidHeaderList {
		/// Offending entry.
		entry: String,
	},
	/// Object-store request is incomplete.
	#[error("Object-store request is invalid: {reason}.")]
	InvalidObjectRequest {
		/// Missing or malformed field.
		reason: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a request builder failure inside [`ConfigError`].
	pub fn request_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::RequestBuild { source: Box::new(src) }
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Operation did not finish before its timeout.
	#[error("Operation `{operation}` timed out.")]
	Timeout {
		/// Task name or URL of the timed-out operation.
		operation: String,
	},
	/// Connection to the upstream could not be established.
	#[error("Connection to the upstream failed.")]
	Connect {
		/// Transport-specific connection error.
		#[source]
		source: BoxError,
	},
}
impl TransientError {
	/// Wraps a transport-specific connection error.
	pub fn connect(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Connect { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO, object-store backends).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while talking to the upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Object-store backend failed.
	#[error("Object-store {operation} operation failed.")]
	ObjectStore {
		/// Operation label.
		operation: &'static str,
		/// Backend-specific failure.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while talking to the upstream.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

/// Credential acquisition failures.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// OAuth token source failed to produce a token.
	#[error("OAuth token source failed to produce a token.")]
	TokenSource {
		/// Source-specific failure.
		#[source]
		source: BoxError,
	},
	/// Custom auth provider failed to authenticate or refresh.
	#[error("Auth provider failed to produce credentials.")]
	Provider {
		/// Provider-specific failure.
		#[source]
		source: BoxError,
	},
}

/// Download-specific failures.
#[derive(Debug, ThisError)]
pub enum DownloadError {
	/// Upstream answered with a status of 400 or above.
	#[error("Bad HTTP status: {status} {reason}.")]
	BadStatus {
		/// HTTP status code.
		status: u16,
		/// Canonical reason phrase.
		reason: String,
	},
	/// Downloaded file digest does not match the expected checksum.
	#[error("Failed to verify checksum: expected {expected}, got {actual}.")]
	ChecksumMismatch {
		/// Expected lowercase hex digest.
		expected: String,
		/// Computed lowercase hex digest.
		actual: String,
	},
	/// Filesystem operation on the destination failed.
	#[error("I/O error on `{}`.", .path.display())]
	Io {
		/// Path involved in the failure.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// External downloader could not be driven.
	#[error("External downloader failed: {message}.")]
	ExternalTool {
		/// Human-readable failure description.
		message: String,
	},
	/// External downloader exited unsuccessfully.
	#[error("External downloader exited with {}.", .code.map_or_else(|| "a signal".to_owned(), |c| format!("code {c}")))]
	ExternalExit {
		/// Exit code, if the process was not killed by a signal.
		code: Option<i32>,
	},
}
