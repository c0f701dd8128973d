//! Cryptographic error types.

use std::path::PathBuf;
use thiserror::Error;

/// Cookie and digest errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No cookie file at the expected location
    #[error("cookie file not found: {}", .path.display())]
    CookieNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// Cookie file exists but could not be read
    #[error("failed to read cookie file {}: {source}", .path.display())]
    CookieRead {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Cookie is empty after trimming
    #[error("cookie is empty")]
    EmptyCookie,

    /// Home directory could not be determined
    #[error("cannot determine home directory for the default cookie path")]
    NoHomeDirectory,
}
