//! SHA-256 verification of downloaded files.

// crates.io
use sha2::{Digest, Sha256};
use tokio::{fs::File, io::AsyncReadExt};
// self
use crate::{_prelude::*, error::DownloadError};

const READ_BUFFER: usize = 64 * 1024;

/// Returns the lowercase hex SHA-256 digest of the file at `path`.
pub async fn sha256_file(path: &Path) -> Result<String, DownloadError> {
	let io_err = |source| DownloadError::Io { path: path.to_path_buf(), source };
	let mut file = File::open(path).await.map_err(io_err)?;
	let mut hasher = Sha256::new();
	let mut buf = vec![0; READ_BUFFER];

	loop {
		let read = file.read(&mut buf).await.map_err(io_err)?;

		if read == 0 {
			break;
		}

		hasher.update(&buf[..read]);
	}

	Ok(hex::encode(hasher.finalize()))
}

/// Fails with [`DownloadError::ChecksumMismatch`] unless the file hashes to `expected`.
///
/// `expected` is compared case-insensitively after trimming surrounding whitespace.
pub async fn sha256_verify(path: &Path, expected: &str) -> Result<(), DownloadError> {
	let expected = expected.trim().to_ascii_lowercase();
	let actual = sha256_file(path).await?;

	if actual != expected {
		return Err(DownloadError::ChecksumMismatch { expected, actual });
	}

	Ok(())
}
