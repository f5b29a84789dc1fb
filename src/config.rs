//! Runtime configuration: timeouts, default headers, domain filtering, and download settings.

// self
use crate::{_prelude::*, error::ConfigError};

/// Process-wide network settings consumed when the service starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
	/// Whole-request timeout applied by the default HTTP client.
	pub request_timeout: Duration,
	/// `User-Agent` sent by every built-in client.
	pub user_agent: String,
	/// Headers added to every HTTP request unless the request sets them itself.
	pub extra_headers: ExtraHeaders,
	/// Hosts (and their subdomains) that must never be contacted.
	pub blocked_domains: Vec<String>,
	/// When non-empty, the only hosts (and subdomains) that may be contacted.
	pub allowed_domains: Vec<String>,
	/// Minimum interval between progress notifications of a download.
	pub download_callback_interval: Duration,
	/// Prefer the external downloader over the native backend.
	pub prefer_external_downloader: bool,
	/// Program name or path of the external downloader.
	pub external_downloader: String,
}
impl NetConfig {
	/// Sets the whole-request timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Sets the download progress interval.
	pub fn with_download_callback_interval(mut self, interval: Duration) -> Self {
		self.download_callback_interval = interval;

		self
	}

	/// Selects the preferred download backend.
	pub fn with_prefer_external_downloader(mut self, prefer: bool) -> Self {
		self.prefer_external_downloader = prefer;

		self
	}

	/// Replaces the default headers.
	pub fn with_extra_headers(mut self, headers: ExtraHeaders) -> Self {
		self.extra_headers = headers;

		self
	}

	/// Replaces the domain lists.
	pub fn with_domains(mut self, allowed: Vec<String>, blocked: Vec<String>) -> Self {
		self.allowed_domains = allowed;
		self.blocked_domains = blocked;

		self
	}

	/// Fails with [`ConfigError::DomainNotPermitted`] when `url` targets a filtered host.
	///
	/// Blocked domains win over allowed ones; a domain matches itself and its subdomains.
	pub fn check_domain(&self, url: &Url) -> Result<(), ConfigError> {
		let host = url.host_str().unwrap_or_default().trim_end_matches('.').to_ascii_lowercase();
		let blocked = self.blocked_domains.iter().any(|d| domain_matches(&host, d));
		let allowed = self.allowed_domains.is_empty()
			|| self.allowed_domains.iter().any(|d| domain_matches(&host, d));

		if blocked || !allowed {
			return Err(ConfigError::DomainNotPermitted { host });
		}

		Ok(())
	}
}
impl Default for NetConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::seconds(30),
			user_agent: concat!("netrun/", env!("CARGO_PKG_VERSION")).into(),
			extra_headers: ExtraHeaders::default(),
			blocked_domains: Vec::new(),
			allowed_domains: Vec::new(),
			download_callback_interval: Duration::seconds(2),
			prefer_external_downloader: false,
			external_downloader: "curl".into(),
		}
	}
}

/// Ordered header set parsed from `NAME=VALUE,NAME=VALUE`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraHeaders(BTreeMap<String, String>);
impl ExtraHeaders {
	/// Adds or replaces a header.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.0.insert(name.into(), value.into());
	}

	/// Iterates headers in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Returns `true` when no header is configured.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl FromStr for ExtraHeaders {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut headers = Self::default();

		for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
			let Some((name, value)) = entry.split_once('=') else {
				return Err(ConfigError::InvalidHeaderList { entry: entry.into() });
			};
			let name = name.trim();

			if name.is_empty() {
				return Err(ConfigError::InvalidHeaderList { entry: entry.into() });
			}

			headers.insert(name, value.trim());
		}

		Ok(headers)
	}
}
impl Display for ExtraHeaders {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		for (i, (name, value)) in self.iter().enumerate() {
			if i > 0 {
				f.write_str(",")?;
			}

			write!(f, "{name}={value}")?;
		}

		Ok(())
	}
}
impl<K, V> FromIterator<(K, V)> for ExtraHeaders
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

fn domain_matches(host: &str, domain: &str) -> bool {
	let domain = domain.trim().trim_matches('.').to_ascii_lowercase();

	!domain.is_empty()
		&& (host == domain
			|| host.strip_suffix(domain.as_str()).is_some_and(|rest| rest.ends_with('.')))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Fixture URL should parse.")
	}

	#[test]
	fn extra_headers_parse_and_render() {
		let headers: ExtraHeaders = "A=1, B=two,,".parse().expect("Header list should parse.");

		assert_eq!(headers.iter().collect::<Vec<_>>(), [("A", "1"), ("B", "two")]);
		assert_eq!(headers.to_string(), "A=1,B=two");
		assert!("A".parse::<ExtraHeaders>().is_err());
		assert!("=1".parse::<ExtraHeaders>().is_err());
	}

	#[test]
	fn blocked_domains_cover_subdomains() {
		let config = NetConfig::default().with_domains(Vec::new(), vec!["tracker.io".into()]);

		assert!(config.check_domain(&url("https://cdn.tracker.io/x")).is_err());
		assert!(config.check_domain(&url("https://tracker.io/x")).is_err());
		assert!(config.check_domain(&url("https://nottracker.io/x")).is_ok());
	}

	#[test]
	fn allow_list_restricts_hosts_and_block_list_wins() {
		let config = NetConfig::default()
			.with_domains(vec!["example.com".into()], vec!["private.example.com".into()]);

		assert!(config.check_domain(&url("https://api.example.com/")).is_ok());
		assert!(config.check_domain(&url("https://private.example.com/")).is_err());
		assert!(config.check_domain(&url("https://other.org/")).is_err());
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = NetConfig::default();

		assert_eq!(config.request_timeout, Duration::seconds(30));
		assert_eq!(config.download_callback_interval, Duration::seconds(2));
		assert_eq!(config.external_downloader, "curl");
		assert!(!config.prefer_external_downloader);
	}
}
