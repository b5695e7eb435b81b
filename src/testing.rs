//! Test doubles for the three external collaborators this crate injects:
//! [`Clock`], [`SasTokenFactory`], and [`CbsChannel`].
//!
//! Shipped as an ordinary (non-`cfg(test)`-gated) module so an embedding
//! application's own tests can build an `Authenticator` without depending on
//! real time or a real CBS client, following the precedent of credential
//! crates that ship their fixtures as part of the public library surface
//! rather than hiding them behind `#[cfg(test)]`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cbs::{CbsChannel, CbsOutcome, DeleteTokenRequest, PutTokenRequest};
use crate::clock::{Clock, ClockReadError};
use crate::sas::{SasTokenError, SasTokenFactory};

/// A [`Clock`] whose current time is set and advanced explicitly by a test.
///
/// Cloning shares the underlying time via `Rc<RefCell<_>>`, so a test can
/// hold one `FakeClock` to both hand to the authenticator and to advance
/// independently.
#[derive(Clone)]
pub struct FakeClock {
    inner: Rc<RefCell<FakeClockState>>,
}

struct FakeClockState {
    now_unix_s: u64,
    fail: bool,
}

impl FakeClock {
    pub fn new(now_unix_s: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(FakeClockState {
                now_unix_s,
                fail: false,
            })),
        }
    }

    /// Advance the clock by `seconds`.
    pub fn advance(&self, seconds: u64) {
        self.inner.borrow_mut().now_unix_s += seconds;
    }

    /// Make every subsequent `now_unix_s` call fail, simulating an
    /// unreadable system clock.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.borrow_mut().fail = unavailable;
    }
}

impl Clock for FakeClock {
    fn now_unix_s(&self) -> Result<u64, ClockReadError> {
        let state = self.inner.borrow();
        if state.fail {
            Err(ClockReadError)
        } else {
            Ok(state.now_unix_s)
        }
    }
}

/// A [`SasTokenFactory`] returning a deterministic token, or simulating a
/// construction failure.
#[derive(Clone)]
pub struct FakeSasTokenFactory {
    fail: Rc<RefCell<bool>>,
}

impl FakeSasTokenFactory {
    pub fn deterministic() -> Self {
        Self {
            fail: Rc::new(RefCell::new(false)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: Rc::new(RefCell::new(true)),
        }
    }
}

impl SasTokenFactory for FakeSasTokenFactory {
    fn create_token(
        &self,
        _device_key: &str,
        audience: &str,
        key_name: &str,
        expiry_unix_s: u64,
    ) -> Result<String, SasTokenError> {
        if *self.fail.borrow() {
            return Err(SasTokenError::InvalidKeyLength);
        }
        Ok(format!("fake-sas-token:{audience}:{key_name}:{expiry_unix_s}"))
    }
}

/// A dispatched-but-not-yet-completed put or delete request, along with the
/// closure a test can invoke to complete it.
enum PendingOp {
    Put(PutTokenRequest, crate::cbs::CbsCompletion),
    Delete(DeleteTokenRequest, crate::cbs::CbsCompletion),
}

/// A [`CbsChannel`] that records every dispatched request and lets a test
/// complete them on demand (or never — leaving a put outstanding is how the
/// timeout scenario is exercised).
pub struct FakeCbsChannel {
    pending: Rc<RefCell<Vec<PendingOp>>>,
    fail_dispatch: bool,
}

/// Handle a test keeps to drive completions fired by a [`FakeCbsChannel`]
/// after it has been moved into `Authenticator::start`.
#[derive(Clone)]
pub struct FakeCbsCompletions {
    pending: Rc<RefCell<Vec<PendingOp>>>,
}

impl FakeCbsChannel {
    pub fn new() -> Self {
        Self {
            pending: Rc::new(RefCell::new(Vec::new())),
            fail_dispatch: false,
        }
    }

    /// A channel whose `put_token`/`delete_token` calls fail synchronously,
    /// simulating a dispatch-layer failure rather than a protocol failure.
    pub fn failing_dispatch() -> Self {
        Self {
            pending: Rc::new(RefCell::new(Vec::new())),
            fail_dispatch: true,
        }
    }

    /// A cloneable handle for completing requests dispatched through this
    /// channel, usable after the channel itself has been moved into `start`.
    pub fn completions(&self) -> FakeCbsCompletions {
        FakeCbsCompletions {
            pending: self.pending.clone(),
        }
    }
}

impl Default for FakeCbsChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCbsCompletions {
    /// Complete the oldest outstanding `put_token` request.
    pub fn complete_put(&self, outcome: CbsOutcome) {
        let op = {
            let mut pending = self.pending.borrow_mut();
            let index = pending
                .iter()
                .position(|op| matches!(op, PendingOp::Put(..)))
                .expect("no outstanding put_token request");
            pending.remove(index)
        };
        if let PendingOp::Put(_, completion) = op {
            completion(outcome);
        }
    }

    /// Complete the oldest outstanding `delete_token` request.
    pub fn complete_delete(&self, outcome: CbsOutcome) {
        let op = {
            let mut pending = self.pending.borrow_mut();
            let index = pending
                .iter()
                .position(|op| matches!(op, PendingOp::Delete(..)))
                .expect("no outstanding delete_token request");
            pending.remove(index)
        };
        if let PendingOp::Delete(_, completion) = op {
            completion(outcome);
        }
    }

    pub fn outstanding_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl CbsChannel for FakeCbsChannel {
    fn put_token(
        &mut self,
        request: PutTokenRequest,
        on_complete: crate::cbs::CbsCompletion,
    ) -> Result<(), String> {
        if self.fail_dispatch {
            return Err("simulated dispatch failure".to_string());
        }
        self.pending
            .borrow_mut()
            .push(PendingOp::Put(request, on_complete));
        Ok(())
    }

    fn delete_token(
        &mut self,
        request: DeleteTokenRequest,
        on_complete: crate::cbs::CbsCompletion,
    ) -> Result<(), String> {
        if self.fail_dispatch {
            return Err("simulated dispatch failure".to_string());
        }
        self.pending
            .borrow_mut()
            .push(PendingOp::Delete(request, on_complete));
        Ok(())
    }
}

/// A [`CbsChannel`] that invokes its completion closure synchronously,
/// before `put_token`/`delete_token` returns — modelling a real in-process
/// CBS client backed by a blocking runtime, the way
/// `cbs_bridge::Fe2o3CbsChannel` completes inside its own `block_on` call.
/// Exercises the reentrancy guard in `Authenticator::authenticate_device`/
/// `Authenticator::stop`, which must drop their `RefCell` borrow before
/// dispatching for exactly this reason: a channel that completes like this
/// one calls straight back into `on_put_token_complete`/
/// `on_delete_token_complete`, which need their own borrow.
pub struct SynchronousCbsChannel {
    outcome: CbsOutcome,
}

impl SynchronousCbsChannel {
    pub fn new(outcome: CbsOutcome) -> Self {
        Self { outcome }
    }
}

impl CbsChannel for SynchronousCbsChannel {
    fn put_token(
        &mut self,
        _request: PutTokenRequest,
        on_complete: crate::cbs::CbsCompletion,
    ) -> Result<(), String> {
        on_complete(self.outcome.clone());
        Ok(())
    }

    fn delete_token(
        &mut self,
        _request: DeleteTokenRequest,
        on_complete: crate::cbs::CbsCompletion,
    ) -> Result<(), String> {
        on_complete(self.outcome.clone());
        Ok(())
    }
}
