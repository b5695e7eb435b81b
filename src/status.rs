//! Authentication status and the legal transitions between them.
//!
//! The status enum and the transition table are the state machine described
//! in the design spec §4.2. Every status change in the crate goes through
//! [`crate::authenticator::Authenticator::set_status`], the single
//! choke-point that compares old and new status and fires the observer only
//! on an actual change.

use serde::{Deserialize, Serialize};

/// Authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// Freshly created, not yet started.
    None,
    /// Stopped cleanly (or never started) and ready to be started again.
    Idle,
    /// `start` has completed; authentication has not been attempted yet.
    Started,
    /// A `put_token` request is outstanding.
    Authenticating,
    /// A token has been successfully installed on the CBS endpoint.
    Authenticated,
    /// A new `put_token` is about to be dispatched to replace an
    /// about-to-expire token (`DeviceKey` only).
    Refreshing,
    /// A `delete_token` request is outstanding.
    Deauthenticating,
    /// Authentication or deauthentication failed.
    Failed,
    /// An outstanding `put_token` request never completed in time.
    FailedTimeout,
}

impl AuthStatus {
    /// Whether `(self, next)` is one of the transitions enumerated in the
    /// design spec's state table. Used only as a `debug_assert!` inside
    /// `set_status` — it documents the state machine and catches a wiring
    /// bug in this crate, not a user-facing error.
    pub(crate) fn can_transition_to(self, next: AuthStatus) -> bool {
        use AuthStatus::*;
        matches!(
            (self, next),
            (None, Started)
                | (Idle, Started)
                | (Started, Authenticating)
                | (Started, Authenticated) // X.509: no CBS interaction
                | (Started, Failed)
                | (Authenticating, Authenticated)
                | (Authenticating, Failed)
                | (Authenticating, FailedTimeout)
                | (Authenticated, Refreshing)
                | (Refreshing, Authenticating)
                | (Refreshing, Failed)
                | (Authenticated, Deauthenticating)
                | (Authenticating, Deauthenticating)
                | (Deauthenticating, Idle)
                | (Deauthenticating, Failed)
                | (Failed, Idle)
                | (FailedTimeout, Idle)
        )
    }
}
