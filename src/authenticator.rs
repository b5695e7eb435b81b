//! The authenticator facade: `create`/`start`/`do_work`/`stop` and the
//! state machine and token lifecycle logic behind them.
//!
//! Observer closures need an opaque, reassignable handle to "the
//! authenticator" that a completion fired long after the call that
//! triggered it can still reach safely. A `Box<dyn FnMut>` capturing `self`
//! by value can't express a second live reference to the same object, so
//! the authenticator lives in `Rc<RefCell<Authenticator>>` and hands
//! completion closures a `Weak` clone of that `Rc`; `upgrade()` turns a
//! completion that outlives the authenticator into a silent no-op instead
//! of a dangling pointer.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::cbs::{CbsChannel, CbsOutcome, DeleteTokenRequest, PutTokenRequest, SAS_TOKEN_TYPE};
use crate::clock::{Clock, SystemClock};
use crate::credential::{Credential, CredentialType};
use crate::error::{AuthError, Result};
use crate::sas::{HmacSasTokenFactory, SasTokenFactory};
use crate::status::AuthStatus;

/// Shared handle to a live authenticator.
pub type AuthenticatorHandle = Rc<RefCell<Authenticator>>;

/// Outcome handed to the one-shot `stop` observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    Success,
    Error,
}

/// Millisecond tuning knobs for the token lifecycle.
///
/// `sas_token_refresh_ms` must stay strictly less than `sas_token_lifetime_ms`
/// at all times, both at construction and across any later `set_option` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CbsTuning {
    pub sas_token_lifetime_ms: u64,
    pub sas_token_refresh_ms: u64,
    pub cbs_request_timeout_ms: u64,
}

impl Default for CbsTuning {
    fn default() -> Self {
        Self {
            sas_token_lifetime_ms: 3_600_000,
            sas_token_refresh_ms: 2_700_000,
            cbs_request_timeout_ms: 30_000,
        }
    }
}

impl CbsTuning {
    fn validate(&self) -> Result<()> {
        if self.sas_token_refresh_ms >= self.sas_token_lifetime_ms {
            return Err(AuthError::invalid_argument(
                "sas_token_refresh_time must be strictly less than sas_token_lifetime",
            ));
        }
        Ok(())
    }
}

/// Configuration passed to [`Authenticator::create`].
#[derive(Debug, Clone, Default)]
pub struct AuthenticatorConfig {
    pub device_id: String,
    pub host_fqdn: String,
    pub device_key: Option<String>,
    pub device_sas_token: Option<String>,
    pub x509_certificate: Option<String>,
    pub x509_private_key: Option<String>,
    pub tuning: CbsTuning,
}

impl AuthenticatorConfig {
    fn resolve_credential(&self) -> Result<Credential> {
        if self.device_key.is_some() && self.device_sas_token.is_some() {
            return Err(AuthError::invalid_argument(
                "device_key and device_sas_token are mutually exclusive",
            ));
        }
        let x509_half_supplied =
            self.x509_certificate.is_some() != self.x509_private_key.is_some();
        if x509_half_supplied {
            return Err(AuthError::invalid_argument(
                "x509_certificate and x509_private_key must be supplied together",
            ));
        }

        // Priority: DeviceSasToken > DeviceKey > X509.
        if let Some(token) = &self.device_sas_token {
            return Ok(Credential::DeviceSasToken(token.clone()));
        }
        if let Some(key) = &self.device_key {
            return Ok(Credential::DeviceKey(key.clone()));
        }
        if let (Some(cert), Some(key)) = (&self.x509_certificate, &self.x509_private_key) {
            return Ok(Credential::X509 {
                certificate: cert.clone(),
                private_key: key.clone(),
            });
        }
        Err(AuthError::invalid_argument(
            "no credential supplied: need device_key, device_sas_token, or an x509 pair",
        ))
    }
}

type StatusObserver = Box<dyn FnMut(AuthStatus, AuthStatus)>;
type StopObserver = Box<dyn FnOnce(StopResult)>;

/// The live per-device authentication record.
pub struct Authenticator {
    device_id: String,
    host_fqdn: String,
    credential: Credential,
    sas_token_key_name: String,

    status: AuthStatus,
    cbs_channel: Option<Box<dyn CbsChannel>>,
    clock: Box<dyn Clock>,
    sas_token_factory: Box<dyn SasTokenFactory>,
    tuning: CbsTuning,

    current_sas_token_create_time_s: u64,
    current_sas_token_put_time_s: u64,

    on_status_changed: Option<StatusObserver>,
    on_stop_completed: Option<StopObserver>,

    self_weak: Weak<RefCell<Authenticator>>,
}

impl Authenticator {
    /// Build a new authenticator using real system time and a real HMAC SAS
    /// token factory. Tests should prefer [`Authenticator::create_with`].
    pub fn create(config: AuthenticatorConfig) -> Result<AuthenticatorHandle> {
        Self::create_with(config, SystemClock, HmacSasTokenFactory)
    }

    /// Build a new authenticator with injected clock and SAS token factory.
    pub fn create_with(
        config: AuthenticatorConfig,
        clock: impl Clock + 'static,
        sas_token_factory: impl SasTokenFactory + 'static,
    ) -> Result<AuthenticatorHandle> {
        if config.device_id.trim().is_empty() {
            return Err(AuthError::invalid_argument("device_id is required"));
        }
        if config.host_fqdn.trim().is_empty() {
            return Err(AuthError::invalid_argument("host_fqdn is required"));
        }
        let credential = config.resolve_credential()?;
        config.tuning.validate()?;

        let inner = Authenticator {
            device_id: config.device_id,
            host_fqdn: config.host_fqdn,
            credential,
            // Empty for every credential mode this core currently supports
            // (see sas::SasTokenFactory::create_token docs).
            sas_token_key_name: String::new(),
            status: AuthStatus::None,
            cbs_channel: None,
            clock: Box::new(clock),
            sas_token_factory: Box::new(sas_token_factory),
            tuning: config.tuning,
            current_sas_token_create_time_s: 0,
            current_sas_token_put_time_s: 0,
            on_status_changed: None,
            on_stop_completed: None,
            self_weak: Weak::new(),
        };

        let handle = Rc::new(RefCell::new(inner));
        handle.borrow_mut().self_weak = Rc::downgrade(&handle);
        Ok(handle)
    }

    /// Register the status observer, install the CBS channel (required
    /// unless the credential is X.509), and transition to `Started`.
    pub fn start(
        handle: &AuthenticatorHandle,
        cbs_channel: Option<Box<dyn CbsChannel>>,
        on_status_changed: impl FnMut(AuthStatus, AuthStatus) + 'static,
    ) -> Result<()> {
        let mut this = handle.borrow_mut();
        if this.credential.uses_cbs() && cbs_channel.is_none() {
            return Err(AuthError::invalid_argument(
                "a cbs_channel is required for DeviceKey/DeviceSasToken credentials",
            ));
        }
        if !matches!(this.status, AuthStatus::None | AuthStatus::Idle) {
            return Err(AuthError::invalid_state(
                "start is only legal from None or Idle",
            ));
        }

        this.cbs_channel = cbs_channel;
        this.on_status_changed = Some(Box::new(on_status_changed));
        this.set_status(AuthStatus::Started);
        Ok(())
    }

    /// Driver tick. See the module-level state table for exactly what each
    /// status does on a tick.
    pub fn do_work(handle: &AuthenticatorHandle) -> Result<()> {
        let status = handle.borrow().status;
        match status {
            AuthStatus::None | AuthStatus::Idle => Err(AuthError::invalid_state(
                "do_work called before start",
            )),
            AuthStatus::Started | AuthStatus::Refreshing => {
                Authenticator::authenticate_device(handle)
            }
            AuthStatus::Authenticated => {
                let mut this = handle.borrow_mut();
                if matches!(this.credential, Credential::DeviceKey(_)) && this.refresh_is_due() {
                    this.set_status(AuthStatus::Refreshing);
                }
                Ok(())
            }
            AuthStatus::Authenticating => {
                let mut this = handle.borrow_mut();
                match this.clock.now_unix_s() {
                    Ok(now) => {
                        let elapsed_ms =
                            now.saturating_sub(this.current_sas_token_put_time_s) * 1000;
                        if elapsed_ms >= this.tuning.cbs_request_timeout_ms {
                            this.set_status(AuthStatus::FailedTimeout);
                        }
                    }
                    Err(_) => this.set_status(AuthStatus::Failed),
                }
                Ok(())
            }
            // Nothing to do this tick; that is not an error.
            AuthStatus::Failed | AuthStatus::FailedTimeout | AuthStatus::Deauthenticating => {
                Ok(())
            }
        }
    }

    /// Revoke the installed credential (or, for Failed/FailedTimeout,
    /// simply reset to Idle) and register the one-shot stop observer.
    pub fn stop(
        handle: &AuthenticatorHandle,
        on_stop_completed: impl FnOnce(StopResult) + 'static,
    ) -> Result<()> {
        // The channel is taken out of `this` and the borrow is dropped before
        // dispatching: a `CbsChannel` whose completion fires synchronously
        // (e.g. `cbs_bridge::Fe2o3CbsChannel`, which blocks on its runtime
        // and invokes `on_complete` before returning) calls straight back
        // into `on_delete_token_complete`, which needs its own `borrow_mut`.
        // Holding this function's borrow across the dispatch call would
        // make that a double mutable borrow of the same `RefCell`.
        let (mut channel, request, weak) = {
            let mut this = handle.borrow_mut();
            if matches!(this.credential, Credential::X509 { .. }) {
                return Err(AuthError::invalid_state(
                    "stop is not applicable to X.509 credentials",
                ));
            }
            if !matches!(
                this.status,
                AuthStatus::Authenticated
                    | AuthStatus::Authenticating
                    | AuthStatus::Failed
                    | AuthStatus::FailedTimeout
            ) {
                return Err(AuthError::invalid_state(
                    "stop is only legal from Authenticated, Authenticating, Failed, or FailedTimeout",
                ));
            }

            if matches!(this.status, AuthStatus::Failed | AuthStatus::FailedTimeout) {
                this.set_status(AuthStatus::Idle);
                this.on_status_changed = None;
                return Ok(());
            }

            this.on_stop_completed = Some(Box::new(on_stop_completed));
            this.set_status(AuthStatus::Deauthenticating);

            let audience = this.audience();
            let weak = this.self_weak.clone();
            let request = DeleteTokenRequest {
                audience,
                token_type: SAS_TOKEN_TYPE,
            };
            let channel = this
                .cbs_channel
                .take()
                .expect("cbs_channel present while Deauthenticating");
            (channel, request, weak)
        };

        let dispatch = channel.delete_token(
            request,
            Box::new(move |outcome| {
                if let Some(handle) = weak.upgrade() {
                    Authenticator::on_delete_token_complete(&handle, outcome);
                }
            }),
        );

        let mut this = handle.borrow_mut();
        this.cbs_channel = Some(channel);
        if let Err(message) = dispatch {
            this.on_stop_completed = None;
            this.set_status(AuthStatus::Failed);
            return Err(AuthError::CbsDispatch(message));
        }
        Ok(())
    }

    pub fn get_credential_type(handle: &AuthenticatorHandle) -> CredentialType {
        handle.borrow().credential.credential_type()
    }

    /// Apply a named tuning option. Accepted names: `sas_token_lifetime`,
    /// `sas_token_refresh_time`, `cbs_request_timeout` (all milliseconds).
    pub fn set_option(handle: &AuthenticatorHandle, name: &str, value_ms: u64) -> Result<()> {
        let mut this = handle.borrow_mut();
        let mut candidate = this.tuning;
        match name {
            "sas_token_lifetime" => candidate.sas_token_lifetime_ms = value_ms,
            "sas_token_refresh_time" => candidate.sas_token_refresh_ms = value_ms,
            "cbs_request_timeout" => candidate.cbs_request_timeout_ms = value_ms,
            other => {
                return Err(AuthError::invalid_argument(format!(
                    "unrecognised option: {other}"
                )))
            }
        }
        candidate.validate()?;
        this.tuning = candidate;
        Ok(())
    }

    // -- internal --

    fn audience(&self) -> String {
        format!("{}/devices/{}", self.host_fqdn, self.device_id)
    }

    fn refresh_is_due(&self) -> bool {
        match self.clock.now_unix_s() {
            Ok(now) => {
                now.saturating_sub(self.current_sas_token_create_time_s)
                    >= self.tuning.sas_token_refresh_ms / 1000
            }
            // fail-safe: force a refresh attempt if the clock can't be read.
            Err(_) => true,
        }
    }

    /// The single choke-point for every status change: compares old and new
    /// status, fires the observer only on an actual change, and asserts the
    /// transition is one this crate's own code is allowed to make.
    fn set_status(&mut self, next: AuthStatus) {
        let previous = self.status;
        if previous == next {
            return;
        }
        debug_assert!(
            previous.can_transition_to(next),
            "illegal authenticator transition: {previous:?} -> {next:?}"
        );
        tracing::info!(device_id = %self.device_id, ?previous, ?next, "authenticator status changed");
        self.status = next;
        if let Some(observer) = self.on_status_changed.as_mut() {
            observer(previous, next);
        }
    }

    fn authenticate_device(handle: &AuthenticatorHandle) -> Result<()> {
        // See the comment in `stop`: the channel is taken out and this
        // function's borrow is dropped before the dispatch call, so a
        // synchronously-completing `CbsChannel` can safely re-borrow from
        // inside `on_put_token_complete`.
        let (mut channel, request, weak, now) = {
            let mut this = handle.borrow_mut();

            if matches!(this.credential, Credential::X509 { .. }) {
                this.set_status(AuthStatus::Authenticated);
                return Ok(());
            }

            let now = match this.clock.now_unix_s() {
                Ok(now) => now,
                Err(e) => {
                    this.set_status(AuthStatus::Failed);
                    return Err(AuthError::ClockUnavailable(e.to_string()));
                }
            };

            let audience = this.audience();
            let key_name = this.sas_token_key_name.clone();
            let expiry = now + this.tuning.sas_token_lifetime_ms / 1000;

            let token = match &this.credential {
                Credential::DeviceKey(key) => {
                    let key = key.clone();
                    match this
                        .sas_token_factory
                        .create_token(&key, &audience, &key_name, expiry)
                    {
                        Ok(token) => {
                            this.current_sas_token_create_time_s = now;
                            token
                        }
                        Err(e) => {
                            return Err(AuthError::CredentialConstruction(e.to_string()));
                        }
                    }
                }
                Credential::DeviceSasToken(token) => token.clone(),
                Credential::None | Credential::X509 { .. } => unreachable!("handled above"),
            };

            this.set_status(AuthStatus::Authenticating);

            let weak = this.self_weak.clone();
            let request = PutTokenRequest {
                audience,
                token_type: SAS_TOKEN_TYPE,
                token,
            };
            let channel = this
                .cbs_channel
                .take()
                .expect("cbs_channel present while Authenticating");
            (channel, request, weak, now)
        };

        let dispatch = channel.put_token(
            request,
            Box::new(move |outcome| {
                if let Some(handle) = weak.upgrade() {
                    Authenticator::on_put_token_complete(&handle, outcome);
                }
            }),
        );

        let mut this = handle.borrow_mut();
        this.cbs_channel = Some(channel);
        match dispatch {
            Ok(()) => {
                this.current_sas_token_put_time_s = now;
                Ok(())
            }
            Err(message) => {
                this.set_status(AuthStatus::Failed);
                Err(AuthError::CbsDispatch(message))
            }
        }
    }

    fn on_put_token_complete(handle: &AuthenticatorHandle, outcome: CbsOutcome) {
        let mut this = handle.borrow_mut();
        match &outcome {
            CbsOutcome::Ok => tracing::debug!(device_id = %this.device_id, "put_token completed"),
            CbsOutcome::Err {
                status_code,
                status_description,
            } => tracing::warn!(
                device_id = %this.device_id,
                status_code,
                %status_description,
                "put_token failed"
            ),
        }
        // A timed-out request resolving late finds the authenticator already
        // past Authenticating; any such transition here would be illegal, so
        // the completion is dropped.
        if this.status != AuthStatus::Authenticating {
            return;
        }
        this.set_status(if outcome.is_ok() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Failed
        });
    }

    fn on_delete_token_complete(handle: &AuthenticatorHandle, outcome: CbsOutcome) {
        let mut this = handle.borrow_mut();
        match &outcome {
            CbsOutcome::Ok => tracing::debug!(device_id = %this.device_id, "delete_token completed"),
            CbsOutcome::Err {
                status_code,
                status_description,
            } => tracing::warn!(
                device_id = %this.device_id,
                status_code,
                %status_description,
                "delete_token failed"
            ),
        }

        this.current_sas_token_create_time_s = 0;
        let next = if outcome.is_ok() {
            AuthStatus::Idle
        } else {
            AuthStatus::Failed
        };

        let stop_result = if outcome.is_ok() {
            StopResult::Success
        } else {
            StopResult::Error
        };
        if let Some(stop_observer) = this.on_stop_completed.take() {
            stop_observer(stop_result);
        }
        this.set_status(next);
    }
}
