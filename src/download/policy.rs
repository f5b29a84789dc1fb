//! Backend selection.

// self
use crate::_prelude::*;

/// Host platform as far as backend selection is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
	/// macOS; files fetched in-process are subject to quarantine handling.
	MacOs,
	/// Linux.
	Linux,
	/// Windows.
	Windows,
	/// Anything else.
	Other,
}
impl Platform {
	/// Platform the crate was compiled for.
	pub const fn current() -> Self {
		if cfg!(target_os = "macos") {
			Self::MacOs
		} else if cfg!(target_os = "linux") {
			Self::Linux
		} else if cfg!(target_os = "windows") {
			Self::Windows
		} else {
			Self::Other
		}
	}

	/// Returns `true` when downloads must go through the external tool whenever it exists.
	pub const fn forces_external(self) -> bool {
		matches!(self, Self::MacOs)
	}
}

/// Download execution strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
	/// Streaming reqwest download.
	Native,
	/// External downloader subprocess.
	External,
}
impl Backend {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Native => "native",
			Self::External => "external",
		}
	}
}
impl Display for Backend {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Picks the backend for a preference, a platform, and the tool's availability.
///
/// The external tool is used when preferred or forced by the platform, and only if it exists.
pub fn choose_backend(prefer_external: bool, platform: Platform, tool_available: bool) -> Backend {
	if (prefer_external || platform.forces_external()) && tool_available {
		Backend::External
	} else {
		Backend::Native
	}
}

/// Returns `true` when `program` resolves on `PATH` (or is an existing executable path).
pub fn tool_available(program: &str) -> bool {
	which::which(program).is_ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn preference_needs_the_tool() {
		assert_eq!(choose_backend(true, Platform::Linux, true), Backend::External);
		assert_eq!(choose_backend(true, Platform::Linux, false), Backend::Native);
		assert_eq!(choose_backend(false, Platform::Windows, true), Backend::Native);
	}

	#[test]
	fn macos_forces_external_when_present() {
		assert_eq!(choose_backend(false, Platform::MacOs, true), Backend::External);
		assert_eq!(choose_backend(false, Platform::MacOs, false), Backend::Native);
	}

	#[test]
	fn missing_program_is_unavailable() {
		assert!(!tool_available("netrun-definitely-not-installed-tool"));
	}
}
