//! Single-slot mailbox pairing engine requests with their settlement
//!
//! At most one request is outstanding at any time. Whichever path gets there
//! first (terminal `bestmove`, hard timeout, process exit, or the caller
//! dropping its ticket) takes the pending entry out of the slot under the
//! lock; every later attempt finds the slot empty and does nothing.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::analysis::AnalysisResult;
use super::protocol::InfoLine;
use crate::error::{Error, Result};

pub type RequestId = u64;

type Resolver = oneshot::Sender<Result<AnalysisResult>>;

struct Pending {
    id: RequestId,
    /// Latest progress for this request only
    snapshot: AnalysisResult,
    /// Whether `go` has been sent, i.e. a terminal line will eventually follow
    dispatched: bool,
    resolver: Resolver,
}

struct Slot {
    next_id: RequestId,
    pending: Option<Pending>,
    /// Terminal lines still owed by searches that were abandoned or timed out
    stale_completions: usize,
    /// Set while no engine is attached; new requests are refused with the reason
    closed: Option<String>,
}

/// Guards the single-outstanding-request invariant
pub struct RequestCorrelator {
    slot: Mutex<Slot>,
}

impl RequestCorrelator {
    /// A correlator that refuses requests until [`reopen`](Self::reopen) is called
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                next_id: 1,
                pending: None,
                stale_completions: 0,
                closed: Some("engine not started".to_string()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot holds no invariants a panicking holder could break halfway
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims the slot for a new request.
    ///
    /// Fails with [`Error::EngineBusy`] if a request is outstanding, or
    /// [`Error::EngineUnavailable`] if no engine is attached.
    pub fn acquire(self: &Arc<Self>) -> Result<Ticket> {
        let mut slot = self.lock();
        if let Some(reason) = &slot.closed {
            return Err(Error::EngineUnavailable(reason.clone()));
        }
        if slot.pending.is_some() {
            return Err(Error::EngineBusy);
        }

        let id = slot.next_id;
        slot.next_id += 1;
        let (resolver, receiver) = oneshot::channel();
        slot.pending = Some(Pending {
            id,
            snapshot: AnalysisResult::default(),
            dispatched: false,
            resolver,
        });
        trace!(request_id = id, "request slot acquired");

        Ok(Ticket {
            id,
            receiver,
            correlator: Arc::clone(self),
        })
    }

    pub fn is_outstanding(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Notes that the search command for `id` reached the engine
    pub fn mark_dispatched(&self, id: RequestId) {
        let mut slot = self.lock();
        if let Some(pending) = slot.pending.as_mut().filter(|p| p.id == id) {
            pending.dispatched = true;
        }
    }

    /// Overwrites the outstanding request's snapshot with newer progress.
    /// Only the primary variation is tracked.
    pub fn record_progress(&self, info: InfoLine) {
        if info.multipv.is_some_and(|n| n != 1) {
            return;
        }

        let mut slot = self.lock();
        if slot.stale_completions > 0 {
            return;
        }
        if let Some(pending) = slot.pending.as_mut() {
            let snapshot = &mut pending.snapshot;
            if info.score.is_some() {
                snapshot.score = info.score;
            }
            if info.depth.is_some() {
                snapshot.depth = info.depth;
            }
            if info.pv.is_some() {
                snapshot.pv = info.pv;
            }
        }
    }

    /// Handles a terminal `bestmove` line. Returns true if it settled the
    /// outstanding request.
    pub fn complete(&self, best_move: Option<String>) -> bool {
        let mut slot = self.lock();
        if slot.stale_completions > 0 {
            slot.stale_completions -= 1;
            debug!("discarding terminal line of an abandoned search");
            return false;
        }

        match slot.pending.take() {
            Some(mut pending) => {
                pending.snapshot.best_move = best_move;
                let _ = pending.resolver.send(Ok(pending.snapshot));
                true
            }
            None => false,
        }
    }

    /// Settles `id` with a timeout error, if it is still outstanding
    pub fn expire(&self, id: RequestId, error: Error) -> bool {
        self.settle_with(id, error)
    }

    /// Rejects the outstanding request (if any) and refuses new ones
    pub fn close(&self, reason: &str) {
        let mut slot = self.lock();
        slot.closed = Some(reason.to_string());
        slot.stale_completions = 0;
        if let Some(pending) = slot.pending.take() {
            let _ = pending
                .resolver
                .send(Err(Error::EngineUnavailable(reason.to_string())));
        }
    }

    /// Accepts requests again after an engine has been attached
    pub fn reopen(&self) {
        let mut slot = self.lock();
        slot.closed = None;
        slot.stale_completions = 0;
    }

    fn settle_with(&self, id: RequestId, error: Error) -> bool {
        let mut slot = self.lock();
        if !slot.pending.as_ref().is_some_and(|p| p.id == id) {
            return false;
        }

        match slot.pending.take() {
            Some(pending) => {
                if pending.dispatched {
                    slot.stale_completions += 1;
                }
                let _ = pending.resolver.send(Err(error));
                true
            }
            None => false,
        }
    }

    fn release(&self, id: RequestId) {
        let mut slot = self.lock();
        if slot.pending.as_ref().is_some_and(|p| p.id == id) {
            if let Some(pending) = slot.pending.take() {
                if pending.dispatched {
                    slot.stale_completions += 1;
                }
                trace!(request_id = id, "request abandoned before settlement");
            }
        }
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Claim on the slot for one request. Dropping it frees the slot, so an
/// abandoned caller can never leave the engine looking busy.
pub struct Ticket {
    id: RequestId,
    receiver: oneshot::Receiver<Result<AnalysisResult>>,
    correlator: Arc<RequestCorrelator>,
}

impl Ticket {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Waits for whichever path settles the request
    pub async fn settled(&mut self) -> Result<AnalysisResult> {
        match (&mut self.receiver).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::EngineUnavailable(
                "request dropped without settlement".to_string(),
            )),
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.correlator.release(self.id);
    }
}
