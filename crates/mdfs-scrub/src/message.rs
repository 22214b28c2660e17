//! The deferred-continuation channel of the scrub scheduler.
//!
//! The drive loop is never called directly from dispatch or from external
//! completions; everything that wants to re-enter it sends a [`ScrubMessage`]
//! instead, and the owning driver drains the channel. This makes the
//! no-recursion discipline structural: native call depth stays bounded no
//! matter how deep the namespace tree is.

use std::sync::Arc;

use mdfs_types::{EntryId, FragmentId, Result, Void};
use tokio::sync::mpsc;

use crate::header::ScrubHeader;

/// Single-shot callback invoked when a whole requested scrub reaches Done.
pub type OnFinish = Box<dyn FnOnce(Result<Void>) + Send>;

/// Which end of the scrub queue an entry is inserted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueEnd {
    Top,
    Bottom,
}

/// Everything needed to insert an entry into the queue, preserved verbatim
/// while an enqueue waits for the entry's containing fragment to be fetched.
pub(crate) struct EnqueueParams {
    pub(crate) entry: EntryId,
    pub(crate) recursive: bool,
    pub(crate) children_only: bool,
    pub(crate) tag: String,
    /// `Some` when a parent expansion pushes a child: the job identity is
    /// preserved down the tree by reusing the parent's header.
    pub(crate) header: Option<Arc<ScrubHeader>>,
    pub(crate) on_finish: Option<OnFinish>,
    pub(crate) end: QueueEnd,
}

pub(crate) enum ScrubMessage {
    /// Deferred re-entry of the drive loop.
    Drive,
    /// A containing-fragment fetch backing a deferred enqueue finished.
    EnqueueFetched {
        params: Box<EnqueueParams>,
        outcome: Result<Void>,
    },
    /// A fragment fetch issued during container expansion finished.
    FragmentFetched {
        entry: EntryId,
        frag: FragmentId,
        outcome: Result<Void>,
    },
    /// Verification of a queued entry (file, or container metadata) finished.
    EntryVerified {
        entry: EntryId,
        outcome: Result<Void>,
    },
    /// Verification of a direct file child dispatched by `parent` finished.
    ChildVerified {
        parent: EntryId,
        child: EntryId,
        outcome: Result<Void>,
    },
}

enum FetchWaiter {
    Insert(Box<EnqueueParams>),
    Expand { entry: EntryId, frag: FragmentId },
}

/// Single-shot handle resolving an asynchronous fragment fetch.
///
/// Consumed by [`complete`](FetchCompletion::complete); invoking it more than
/// once is impossible by construction.
pub struct FetchCompletion {
    tx: mpsc::UnboundedSender<ScrubMessage>,
    waiter: FetchWaiter,
}

impl FetchCompletion {
    pub(crate) fn for_insert(tx: mpsc::UnboundedSender<ScrubMessage>, params: EnqueueParams) -> Self {
        Self {
            tx,
            waiter: FetchWaiter::Insert(Box::new(params)),
        }
    }

    pub(crate) fn for_expand(
        tx: mpsc::UnboundedSender<ScrubMessage>,
        entry: EntryId,
        frag: FragmentId,
    ) -> Self {
        Self {
            tx,
            waiter: FetchWaiter::Expand { entry, frag },
        }
    }

    /// Resolve the fetch, successfully or not, and wake the drive loop.
    pub fn complete(self, outcome: Result<Void>) {
        let msg = match self.waiter {
            FetchWaiter::Insert(params) => ScrubMessage::EnqueueFetched { params, outcome },
            FetchWaiter::Expand { entry, frag } => ScrubMessage::FragmentFetched {
                entry,
                frag,
                outcome,
            },
        };
        // The scheduler owning the receiver may already be gone at shutdown.
        let _ = self.tx.send(msg);
    }
}

enum VerifyTarget {
    Entry(EntryId),
    Child { parent: EntryId, child: EntryId },
}

/// Single-shot handle resolving a per-object verification.
///
/// The verification primitive may complete it inline before returning or
/// out-of-band later; both paths deliver the same message.
pub struct VerifyCompletion {
    tx: mpsc::UnboundedSender<ScrubMessage>,
    target: VerifyTarget,
}

impl VerifyCompletion {
    pub(crate) fn for_entry(tx: mpsc::UnboundedSender<ScrubMessage>, entry: EntryId) -> Self {
        Self {
            tx,
            target: VerifyTarget::Entry(entry),
        }
    }

    pub(crate) fn for_child(
        tx: mpsc::UnboundedSender<ScrubMessage>,
        parent: EntryId,
        child: EntryId,
    ) -> Self {
        Self {
            tx,
            target: VerifyTarget::Child { parent, child },
        }
    }

    /// Report the verification outcome and wake the drive loop. A failed
    /// verification is data for the verifier's own reporting; the scheduler
    /// keeps draining either way.
    pub fn complete(self, outcome: Result<Void>) {
        let msg = match self.target {
            VerifyTarget::Entry(entry) => ScrubMessage::EntryVerified { entry, outcome },
            VerifyTarget::Child { parent, child } => ScrubMessage::ChildVerified {
                parent,
                child,
                outcome,
            },
        };
        let _ = self.tx.send(msg);
    }
}
