//! CBS claims-based-security authentication for a single IoT device's AMQP
//! transport.
//!
//! [`Authenticator`] drives a device's credential through a small state
//! machine against a CBS endpoint: installing a token (`put_token`),
//! refreshing it before expiry, and revoking it on shutdown
//! (`delete_token`). The core is deliberately synchronous and
//! single-threaded — see the module docs on [`authenticator`] for why —
//! with the time source, SAS token construction, and the CBS wire client
//! all injected as traits so the whole state machine can be driven
//! deterministically in tests via [`testing`].

pub mod authenticator;
pub mod cbs;
pub mod clock;
pub mod credential;
pub mod error;
pub mod sas;
pub mod status;
pub mod testing;

#[cfg(feature = "fe2o3-cbs")]
pub mod cbs_bridge;

pub use authenticator::{Authenticator, AuthenticatorConfig, AuthenticatorHandle, CbsTuning, StopResult};
pub use cbs::{CbsChannel, CbsOutcome, DeleteTokenRequest, PutTokenRequest};
pub use clock::{Clock, ClockReadError, SystemClock};
pub use credential::{Credential, CredentialType};
pub use error::{AuthError, Result};
pub use sas::{HmacSasTokenFactory, SasTokenFactory, SasTokenError};
pub use status::AuthStatus;
