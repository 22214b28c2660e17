//! Per-entry scrub state.

use std::sync::Arc;

use mdfs_types::{EntryId, FragmentId};

use crate::header::ScrubHeader;
use crate::message::OnFinish;

/// A namespace entry currently queued for scrubbing, with its traversal
/// state and intrusive queue links.
pub(crate) struct ScrubEntry {
    pub(crate) id: EntryId,
    pub(crate) recursive: bool,
    pub(crate) children_only: bool,
    pub(crate) header: Arc<ScrubHeader>,
    /// Present only on the entry that was the root of an enqueue call.
    pub(crate) on_finish: Option<OnFinish>,
    pub(crate) phase: EntryPhase,
    pub(crate) prev: Option<EntryId>,
    pub(crate) next: Option<EntryId>,
}

impl ScrubEntry {
    pub(crate) fn new(
        id: EntryId,
        recursive: bool,
        children_only: bool,
        header: Arc<ScrubHeader>,
        on_finish: Option<OnFinish>,
        phase: EntryPhase,
    ) -> Self {
        Self {
            id,
            recursive,
            children_only,
            header,
            on_finish,
            phase,
            prev: None,
            next: None,
        }
    }

    /// Park the expansion behind an outstanding fragment fetch.
    pub(crate) fn begin_fragment_wait(&mut self) {
        match std::mem::replace(&mut self.phase, EntryPhase::Done) {
            EntryPhase::Expanding(st) => self.phase = EntryPhase::AwaitFragment(st),
            other => panic!("entry {} cannot wait for a fragment in phase {:?}", self.id, other),
        }
    }

    /// Resume expansion after the awaited fragment fetch resolved.
    pub(crate) fn resume_expansion(&mut self) {
        match std::mem::replace(&mut self.phase, EntryPhase::Done) {
            EntryPhase::AwaitFragment(st) => self.phase = EntryPhase::Expanding(st),
            other => panic!("entry {} is not awaiting a fragment (phase {:?})", self.id, other),
        }
    }
}

/// Where an entry is in its scrub.
///
/// Files go `FileIdle → FileInFlight → Done`. Containers that expand go
/// `Expanding → (AwaitFragment → Expanding)* → FinalizeIdle →
/// FinalizeInFlight → Done`; containers scrubbed without expansion start at
/// `FinalizeIdle`.
#[derive(Debug)]
pub(crate) enum EntryPhase {
    FileIdle,
    FileInFlight,
    Expanding(ExpandState),
    AwaitFragment(ExpandState),
    FinalizeIdle,
    FinalizeInFlight,
    Done,
}

impl EntryPhase {
    pub(crate) fn expand_mut(&mut self) -> Option<&mut ExpandState> {
        match self {
            EntryPhase::Expanding(st) | EntryPhase::AwaitFragment(st) => Some(st),
            _ => None,
        }
    }
}

/// Cursor over a container's fragments and their children.
///
/// Children before `child_idx` in the current fragment have already been
/// dispatched (file verifications issued, container children pushed);
/// the fragment is left only when the cursor is exhausted and no direct
/// file verifications remain in flight.
#[derive(Debug, Default)]
pub(crate) struct ExpandState {
    /// Ordered fragment list, loaded on first expansion step.
    pub(crate) fragments: Option<Vec<FragmentId>>,
    pub(crate) frag_idx: usize,
    pub(crate) child_idx: usize,
    /// Ordered children of the current fragment, loaded once it is resident.
    pub(crate) children: Option<Vec<EntryId>>,
    /// Direct file child verifications dispatched and not yet completed.
    pub(crate) files_in_flight: usize,
}

impl ExpandState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Move the cursor to the next fragment.
    pub(crate) fn advance_fragment(&mut self) {
        self.frag_idx += 1;
        self.child_idx = 0;
        self.children = None;
    }
}
