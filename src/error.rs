//! Error types for the CBS authenticator.
//!
//! Mirrors the error taxonomy in the design spec: invalid arguments and
//! invalid states are reported synchronously with no state change, clock and
//! credential-construction failures are reported fail-safe, and CBS dispatch
//! failures move the authenticator to `Failed` in addition to being returned.

use thiserror::Error;

/// Result type for authenticator operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors produced by the CBS authenticator.
#[derive(Error, Debug)]
pub enum AuthError {
    /// A required argument was missing, empty, or conflicting (e.g. both
    /// `device_key` and `device_sas_token` supplied).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal from the authenticator's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The injected `SasTokenFactory` failed to construct a token.
    #[error("SAS token construction failed: {0}")]
    CredentialConstruction(String),

    /// The injected `Clock` could not report the current time.
    #[error("clock unavailable: {0}")]
    ClockUnavailable(String),

    /// Synchronous submission of a `put_token`/`delete_token` request failed.
    #[error("CBS dispatch failed: {0}")]
    CbsDispatch(String),
}

impl AuthError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
