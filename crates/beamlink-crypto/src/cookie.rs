//! The shared secret ("cookie") used to authenticate node pairs.
//!
//! By default the cookie is read from `$HOME/.erlang.cookie`, the same file
//! the Erlang runtime uses. It can be overridden with an explicit value or a
//! different file. Trailing whitespace (the usual newline) is stripped.

use crate::error::CryptoError;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Name of the cookie file in the user's home directory
pub const COOKIE_FILE_NAME: &str = ".erlang.cookie";

/// Shared authentication secret.
///
/// The bytes are wiped when the cookie is dropped and never appear in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Cookie(Vec<u8>);

impl Cookie {
    /// Create a cookie from an explicit value.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EmptyCookie` if the value is empty after trimming.
    pub fn new(value: impl AsRef<[u8]>) -> Result<Self, CryptoError> {
        let trimmed = trim_trailing_whitespace(value.as_ref());
        if trimmed.is_empty() {
            return Err(CryptoError::EmptyCookie);
        }
        Ok(Self(trimmed.to_vec()))
    }

    /// Load the cookie from the default location (`$HOME/.erlang.cookie`).
    ///
    /// # Errors
    ///
    /// Fails if the home directory is unknown or the file cannot be read.
    pub fn load_default() -> Result<Self, CryptoError> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load the cookie from an explicit file.
    ///
    /// # Errors
    ///
    /// Returns `CookieNotFound` for a missing file, `CookieRead` for other
    /// I/O failures, and `EmptyCookie` for an empty file.
    pub fn load_from(path: &Path) -> Result<Self, CryptoError> {
        let contents = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CryptoError::CookieNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CryptoError::CookieRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        tracing::debug!("Loaded cookie from {}", path.display());
        Self::new(contents)
    }

    /// Resolve the cookie: an explicit value wins, then an explicit file,
    /// then the default location.
    ///
    /// # Errors
    ///
    /// Propagates the error of whichever source was selected.
    pub fn resolve(value: Option<&str>, file: Option<&Path>) -> Result<Self, CryptoError> {
        match (value, file) {
            (Some(value), _) => Self::new(value),
            (None, Some(path)) => Self::load_from(path),
            (None, None) => Self::load_default(),
        }
    }

    /// Default cookie location: `$HOME/.erlang.cookie`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::NoHomeDirectory` if no home directory is known.
    pub fn default_path() -> Result<PathBuf, CryptoError> {
        dirs::home_dir()
            .map(|home| home.join(COOKIE_FILE_NAME))
            .ok_or(CryptoError::NoHomeDirectory)
    }

    /// Raw cookie bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cookie").field(&"<redacted>").finish()
    }
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
