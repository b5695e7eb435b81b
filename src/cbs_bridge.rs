//! Production [`CbsChannel`] adapter over `fe2o3-amqp-cbs`.
//!
//! `fe2o3_amqp_cbs::client::CbsClient::put_token`/`delete_token` are
//! `async fn`s, but this crate's core calls `CbsChannel` synchronously and
//! never suspends (see `authenticator` module docs). This adapter is the
//! one place that gap is bridged: it owns a small current-thread `tokio`
//! runtime and blocks on it inside otherwise-synchronous trait methods,
//! then invokes the completion closure with the outcome before returning
//! control to the caller. Gated behind the `fe2o3-cbs` feature so the
//! synchronous core carries no network dependency by default.

use fe2o3_amqp_cbs::client::CbsClient;
use fe2o3_amqp_cbs::token::CbsToken;
use fe2o3_amqp::Session;
use tokio::runtime::{Builder, Runtime};

use crate::cbs::{CbsChannel, CbsCompletion, CbsOutcome, DeleteTokenRequest, PutTokenRequest};

/// Adapts a `fe2o3_amqp_cbs::client::CbsClient` attached to an existing
/// session into this crate's synchronous [`CbsChannel`] trait.
pub struct Fe2o3CbsChannel {
    client: CbsClient,
    runtime: Runtime,
}

impl Fe2o3CbsChannel {
    /// Attach a CBS client to `session` and wrap it. `session` must already
    /// be open; this adapter does not manage connection/session lifecycle.
    pub fn attach(session: &mut Session) -> Result<Self, String> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start CBS adapter runtime: {e}"))?;
        let client = runtime
            .block_on(CbsClient::attach(session))
            .map_err(|e| format!("failed to attach CbsClient: {e}"))?;
        Ok(Self { client, runtime })
    }
}

impl CbsChannel for Fe2o3CbsChannel {
    fn put_token(
        &mut self,
        request: PutTokenRequest,
        on_complete: CbsCompletion,
    ) -> Result<(), String> {
        let token = CbsToken::new(
            request.audience.clone(),
            request.token,
            request.token_type,
            None,
        );
        let result = self.runtime.block_on(self.client.put_token(token));
        let outcome = match result {
            Ok(()) => CbsOutcome::Ok,
            Err(e) => CbsOutcome::Err {
                status_code: 0,
                status_description: e.to_string(),
            },
        };
        on_complete(outcome);
        Ok(())
    }

    fn delete_token(
        &mut self,
        request: DeleteTokenRequest,
        on_complete: CbsCompletion,
    ) -> Result<(), String> {
        let result = self
            .runtime
            .block_on(self.client.delete_token(request.audience.clone()));
        let outcome = match result {
            Ok(()) => CbsOutcome::Ok,
            Err(e) => CbsOutcome::Err {
                status_code: 0,
                status_description: e.to_string(),
            },
        };
        on_complete(outcome);
        Ok(())
    }
}
