//! The CBS bridge's wire-level seam.
//!
//! [`CbsChannel`] is the external collaborator from the design spec: it
//! provides `put_token`/`delete_token` as asynchronous primitives that
//! accept a completion closure rather than returning a `Future` directly,
//! because the authenticator core is a synchronous, never-blocking reactor
//! (design spec §5) — not an `async fn` caller. A real implementation is
//! free to run its own executor internally and simply call the closure once
//! the operation completes; see `cbs_bridge::fe2o3` (behind the `fe2o3-cbs`
//! feature) for the production adapter over `fe2o3-amqp-cbs`.

/// Token type string passed verbatim to both `put_token` and `delete_token`.
pub const SAS_TOKEN_TYPE: &str = "servicebus.windows.net:sastoken";

/// A `put_token` request.
#[derive(Debug, Clone)]
pub struct PutTokenRequest {
    pub audience: String,
    pub token_type: &'static str,
    pub token: String,
}

/// A `delete_token` request.
#[derive(Debug, Clone)]
pub struct DeleteTokenRequest {
    pub audience: String,
    pub token_type: &'static str,
}

/// Result of a completed CBS operation.
#[derive(Debug, Clone)]
pub enum CbsOutcome {
    Ok,
    Err {
        status_code: u32,
        status_description: String,
    },
}

impl CbsOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CbsOutcome::Ok)
    }
}

/// A completion closure invoked exactly once when a dispatched request
/// finishes (successfully or not).
pub type CbsCompletion = Box<dyn FnOnce(CbsOutcome)>;

/// The external CBS client interface this core is written against.
///
/// Implementations must call the completion closure exactly once per
/// dispatched request, and may call it from any point after `put_token`
/// / `delete_token` returns (including, for a fake used in tests, never —
/// that is how the timeout scenario in the design spec is exercised).
pub trait CbsChannel {
    /// Submit a `put_token` request. Returns an error if the request could
    /// not be submitted at all (a dispatch failure); a submitted request's
    /// eventual success/failure is reported only through `on_complete`.
    fn put_token(
        &mut self,
        request: PutTokenRequest,
        on_complete: CbsCompletion,
    ) -> Result<(), String>;

    /// Submit a `delete_token` request. Same dispatch-vs-completion split
    /// as `put_token`.
    fn delete_token(
        &mut self,
        request: DeleteTokenRequest,
        on_complete: CbsCompletion,
    ) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_is_ok() {
        assert!(CbsOutcome::Ok.is_ok());
        assert!(!CbsOutcome::Err {
            status_code: 401,
            status_description: "unauthorized".into()
        }
        .is_ok());
    }
}
