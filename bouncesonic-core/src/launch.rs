//! The global launch cue.
//!
//! A single non-positional player, independent of the pool. Each accepted
//! request gets a ticket; the render graph reports the ticket back when the cue
//! runs dry and the dispatcher resolves the completion. The pending completion
//! lives behind one mutex and is always removed with `take()`, so whichever of
//! the dispatcher and `stop()` gets there first fires it and the other sees
//! nothing.

use crate::error::{BounceSonicError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// How a launch cue ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The cue played to its last sample.
    Completed,
    /// The engine was stopped before the cue finished.
    Cancelled,
}

/// Completion notification for [`BounceSonicEngine::play_launch_sound`](crate::BounceSonicEngine::play_launch_sound).
///
/// Always called on the engine's dispatcher thread or inside `stop()`, never on
/// the render context.
pub type LaunchCompletion = Box<dyn FnOnce(LaunchOutcome) + Send + 'static>;

struct Pending {
    ticket: u64,
    completion: LaunchCompletion,
}

/// Shared view of the pending completion, handed to the dispatcher.
#[derive(Clone, Default)]
pub(crate) struct PendingLaunch {
    slot: Arc<Mutex<Option<Pending>>>,
}

impl PendingLaunch {
    pub(crate) fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Fire `Completed` if `ticket` is still the pending request.
    pub(crate) fn complete(&self, ticket: u64) -> bool {
        let pending = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(pending) if pending.ticket == ticket => slot.take(),
                _ => None,
            }
        };
        match pending {
            Some(pending) => {
                log::debug!("Launch cue {} completed", ticket);
                (pending.completion)(LaunchOutcome::Completed);
                true
            }
            None => false,
        }
    }

    /// Fire `Cancelled` for whatever is pending. Returns the cancelled ticket.
    pub(crate) fn cancel(&self) -> Option<u64> {
        let pending = self.slot.lock().take()?;
        log::debug!("Launch cue {} cancelled", pending.ticket);
        (pending.completion)(LaunchOutcome::Cancelled);
        Some(pending.ticket)
    }

    fn begin(&self, ticket: u64, completion: LaunchCompletion) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(BounceSonicError::Busy);
        }
        *slot = Some(Pending { ticket, completion });
        Ok(())
    }
}

/// Control-plane side of the launch cue.
pub struct LaunchCuePlayer {
    pending: PendingLaunch,
    next_ticket: u64,
    volume: f32,
}

impl LaunchCuePlayer {
    pub fn new(volume: f32) -> Self {
        Self {
            pending: PendingLaunch::default(),
            next_ticket: 1,
            volume,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Whether a cue is in flight and its completion has not fired yet.
    pub fn is_busy(&self) -> bool {
        self.pending.is_pending()
    }

    /// Register `completion` for a new cue and return its ticket.
    ///
    /// Rejects with `Busy` while a previous cue is pending; its completion is
    /// left untouched.
    pub(crate) fn begin(&mut self, completion: LaunchCompletion) -> Result<u64> {
        let ticket = self.next_ticket;
        self.pending.begin(ticket, completion)?;
        self.next_ticket += 1;
        Ok(ticket)
    }

    pub(crate) fn pending(&self) -> PendingLaunch {
        self.pending.clone()
    }
}
