//! The scrub scheduler.
//!
//! `ScrubStack` owns the queue of namespace entries with pending scrub work
//! and decides, at any instant, which entry is being verified. Entries are
//! examined from the highest-priority end; expanding a container pushes its
//! child containers above it, so a discovered subtree drains completely
//! before siblings or lower-priority jobs proceed.
//!
//! The drive loop is re-entered exclusively through the scheduler's message
//! channel: enqueues, fetch completions and verification completions all
//! send a message and return, and the owning driver drains the channel with
//! [`ScrubStack::pump`] (or [`ScrubStack::drive_until_rest`]). One logical
//! activation is ever live, so queue and counters need no locking.

use std::sync::Arc;

use mdfs_types::{make_error, EntryId, Result, ScrubCode, Void};
use tokio::sync::mpsc;

use crate::cache::{NamespaceCache, ObjectKind};
use crate::config::ScrubConfig;
use crate::entry::{EntryPhase, ExpandState, ScrubEntry};
use crate::header::ScrubHeader;
use crate::message::{
    EnqueueParams, FetchCompletion, OnFinish, QueueEnd, ScrubMessage, VerifyCompletion,
};
use crate::queue::ScrubQueue;

/// Counters maintained by the scheduler. Pure bookkeeping; nothing is
/// throttled on them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrubStats {
    pub files_scrubbed: u64,
    pub containers_scrubbed: u64,
    pub verify_failures: u64,
    pub fetch_failures: u64,
    pub jobs_completed: u64,
}

/// What one dispatch of the front entry reported back to the drive loop.
#[derive(Debug, Default, Clone, Copy)]
struct StepReport {
    added_children: bool,
    progressed: bool,
    done: bool,
}

impl StepReport {
    fn progressed() -> Self {
        Self { progressed: true, ..Default::default() }
    }

    fn added_children() -> Self {
        Self { added_children: true, ..Default::default() }
    }

    fn done() -> Self {
        Self { done: true, ..Default::default() }
    }

    fn blocked() -> Self {
        Self::default()
    }
}

/// Scheduler for recursive namespace scrubs.
///
/// Constructed once per cache and alive for its lifetime. At rest (not
/// mid-scrub) the queue is empty and no operations are in flight; this is
/// asserted at teardown.
pub struct ScrubStack<C: NamespaceCache> {
    cache: Arc<C>,
    config: ScrubConfig,
    queue: ScrubQueue,
    /// Outstanding asynchronous verification operations.
    verifies_in_flight: usize,
    /// Outstanding asynchronous fragment fetches.
    fetches_in_flight: usize,
    /// Whether a drive re-entry is already scheduled; coalesces wakeups so
    /// each scheduling fires exactly one activation.
    drive_pending: bool,
    stats: ScrubStats,
    tx: mpsc::UnboundedSender<ScrubMessage>,
    rx: mpsc::UnboundedReceiver<ScrubMessage>,
}

impl<C: NamespaceCache> ScrubStack<C> {
    pub fn new(cache: Arc<C>, config: ScrubConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            cache,
            config,
            queue: ScrubQueue::new(),
            verifies_in_flight: 0,
            fetches_in_flight: 0,
            drive_pending: false,
            stats: ScrubStats::default(),
            tx,
            rx,
        }
    }

    /// Queue an entry at the highest-priority end. While it (and anything it
    /// transitively pushes) remains queued, no lower-priority entry begins
    /// its own verification step; operations already in flight are allowed
    /// to finish.
    ///
    /// `recursive` scrubs the entire hierarchy under the entry;
    /// `children_only` scrubs the direct children without recursing further.
    /// `tag` is applied by the verification primitives to every object they
    /// check. `on_finish` fires exactly once, when the whole requested scrub
    /// has drained.
    ///
    /// Queue membership is exclusive: enqueueing an entry that is already
    /// queued fails with `ScrubCode::ALREADY_QUEUED` and leaves the queue
    /// untouched.
    pub fn enqueue_top(
        &mut self,
        entry: EntryId,
        recursive: bool,
        children_only: bool,
        tag: impl Into<String>,
        on_finish: Option<OnFinish>,
    ) -> Result<Void> {
        self.enqueue(entry, recursive, children_only, tag.into(), on_finish, QueueEnd::Top)
    }

    /// Like [`enqueue_top`](Self::enqueue_top), but the entry strictly
    /// follows everything already queued; multiple bottom enqueues keep
    /// their relative call order.
    pub fn enqueue_bottom(
        &mut self,
        entry: EntryId,
        recursive: bool,
        children_only: bool,
        tag: impl Into<String>,
        on_finish: Option<OnFinish>,
    ) -> Result<Void> {
        self.enqueue(entry, recursive, children_only, tag.into(), on_finish, QueueEnd::Bottom)
    }

    /// Drain every pending message: deferred drive re-entries and the
    /// completions of fetches and verifications that have already resolved.
    /// This is the external driver step; call it whenever completions may
    /// have been delivered.
    pub fn pump(&mut self) {
        loop {
            let msg = match self.rx.try_recv() {
                Ok(msg) => msg,
                Err(_) => break,
            };
            self.handle(msg);
        }
    }

    /// Process messages, awaiting out-of-band completions, until the
    /// scheduler is at rest. Intended for caches whose fetches and
    /// verifications complete from other tasks.
    pub async fn drive_until_rest(&mut self) {
        while !self.at_rest() {
            let msg = self.rx.recv().await.expect("scrub channel closed");
            self.handle(msg);
        }
    }

    /// Whether the scheduler is quiescent: empty queue, nothing in flight,
    /// no re-entry scheduled.
    pub fn at_rest(&self) -> bool {
        self.queue.is_empty()
            && self.verifies_in_flight == 0
            && self.fetches_in_flight == 0
            && !self.drive_pending
    }

    /// Number of entries currently queued.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Outstanding asynchronous verification operations.
    pub fn verifies_in_flight(&self) -> usize {
        self.verifies_in_flight
    }

    /// Outstanding asynchronous fragment fetches.
    pub fn fetches_in_flight(&self) -> usize {
        self.fetches_in_flight
    }

    pub fn stats(&self) -> ScrubStats {
        self.stats
    }

    /// Shared enqueue routine behind both public entry points.
    ///
    /// If the entry's containing fragment is resident the entry is inserted
    /// immediately; otherwise a fetch is issued and the insertion replays,
    /// with identical parameters, when the fetch resolves. Either way a
    /// deferred drive re-entry is scheduled before returning.
    fn enqueue(
        &mut self,
        entry: EntryId,
        recursive: bool,
        children_only: bool,
        tag: String,
        on_finish: Option<OnFinish>,
        end: QueueEnd,
    ) -> Result<Void> {
        if self.queue.contains(entry) {
            tracing::warn!(entry = %entry, "Entry is already queued for scrubbing");
            return make_error(ScrubCode::ALREADY_QUEUED);
        }
        let params = EnqueueParams {
            entry,
            recursive,
            children_only,
            tag,
            header: None,
            on_finish,
            end,
        };
        match self.cache.containing_fragment(entry) {
            Some(frag) if !self.cache.fragment_resident(frag) => {
                tracing::debug!(
                    entry = %entry,
                    fragment = %frag,
                    "Containing fragment not resident; enqueue deferred behind fetch"
                );
                self.fetches_in_flight += 1;
                self.cache
                    .fetch_fragment(frag, FetchCompletion::for_insert(self.tx.clone(), params));
            }
            _ => {
                let kind = self.classify(entry)?;
                self.admit(params, kind);
            }
        }
        self.schedule_drive();
        Ok(())
    }

    /// Membership and classification checks shared by immediate and deferred
    /// insertion.
    fn classify(&self, entry: EntryId) -> Result<ObjectKind> {
        if self.queue.contains(entry) {
            return make_error(ScrubCode::ALREADY_QUEUED);
        }
        self.cache.entry_kind(entry)
    }

    /// Insert a classified entry into the queue.
    fn admit(&mut self, params: EnqueueParams, kind: ObjectKind) {
        let EnqueueParams {
            entry,
            recursive,
            children_only,
            tag,
            header,
            on_finish,
            end,
        } = params;
        let header = header.unwrap_or_else(|| Arc::new(ScrubHeader::new(tag, entry)));
        let phase = match kind {
            ObjectKind::File => EntryPhase::FileIdle,
            ObjectKind::Container if recursive || children_only => {
                EntryPhase::Expanding(ExpandState::new())
            }
            ObjectKind::Container => EntryPhase::FinalizeIdle,
        };
        let record = ScrubEntry::new(entry, recursive, children_only, header, on_finish, phase);
        match end {
            QueueEnd::Top => self.queue.push_front(record),
            QueueEnd::Bottom => self.queue.push_back(record),
        }
        tracing::debug!(entry = %entry, end = ?end, recursive, children_only, "Queued entry for scrubbing");
        if self.queue.len() == self.config.warn_queue_depth {
            tracing::warn!(depth = self.queue.len(), "Scrub queue depth reached warning threshold");
        }
    }

    /// Schedule a single-shot deferred re-entry of the drive loop.
    fn schedule_drive(&mut self) {
        if self.drive_pending {
            return;
        }
        self.drive_pending = true;
        let _ = self.tx.send(ScrubMessage::Drive);
    }

    fn handle(&mut self, msg: ScrubMessage) {
        match msg {
            ScrubMessage::Drive => {
                self.drive_pending = false;
                self.drive();
            }
            ScrubMessage::EnqueueFetched { params, outcome } => {
                self.fetches_in_flight -= 1;
                let params = *params;
                match outcome {
                    Ok(()) => match self.classify(params.entry) {
                        Ok(kind) => {
                            self.admit(params, kind);
                            self.schedule_drive();
                        }
                        Err(status) => {
                            tracing::warn!(
                                entry = %params.entry,
                                status = %status,
                                "Deferred enqueue abandoned"
                            );
                            if let Some(on_finish) = params.on_finish {
                                on_finish(Err(status));
                            }
                        }
                    },
                    Err(status) => {
                        tracing::error!(
                            entry = %params.entry,
                            status = %status,
                            "Containing-fragment fetch failed; enqueue abandoned"
                        );
                        self.stats.fetch_failures += 1;
                        if let Some(on_finish) = params.on_finish {
                            on_finish(Err(status));
                        }
                    }
                }
            }
            ScrubMessage::FragmentFetched { entry, frag, outcome } => {
                self.fetches_in_flight -= 1;
                let e = self
                    .queue
                    .get_mut(entry)
                    .expect("fragment fetch completed for an entry that is not queued");
                match outcome {
                    Ok(()) => {
                        tracing::trace!(entry = %entry, fragment = %frag, "Fragment fetched; resuming expansion");
                        e.resume_expansion();
                    }
                    Err(status) => {
                        tracing::error!(
                            entry = %entry,
                            fragment = %frag,
                            status = %status,
                            "Fragment fetch failed; skipping fragment"
                        );
                        self.stats.fetch_failures += 1;
                        e.header.mark_fetch_failed();
                        e.resume_expansion();
                        e.phase
                            .expand_mut()
                            .expect("expansion resumed")
                            .advance_fragment();
                    }
                }
                self.schedule_drive();
            }
            ScrubMessage::EntryVerified { entry, outcome } => {
                self.verifies_in_flight -= 1;
                if let Err(status) = &outcome {
                    self.stats.verify_failures += 1;
                    tracing::warn!(entry = %entry, status = %status, "Object verification reported failure");
                }
                let e = self
                    .queue
                    .get_mut(entry)
                    .expect("verification completed for an entry that is not queued");
                match e.phase {
                    EntryPhase::FileInFlight => {
                        self.stats.files_scrubbed += 1;
                        e.phase = EntryPhase::Done;
                    }
                    EntryPhase::FinalizeInFlight => {
                        self.stats.containers_scrubbed += 1;
                        e.phase = EntryPhase::Done;
                    }
                    _ => panic!("verification completed for entry {} in phase {:?}", entry, e.phase),
                }
                self.schedule_drive();
            }
            ScrubMessage::ChildVerified { parent, child, outcome } => {
                self.verifies_in_flight -= 1;
                self.stats.files_scrubbed += 1;
                if let Err(status) = &outcome {
                    self.stats.verify_failures += 1;
                    tracing::warn!(entry = %child, status = %status, "File verification reported failure");
                }
                let e = self
                    .queue
                    .get_mut(parent)
                    .expect("child verification completed for a parent that is not queued");
                let st = e
                    .phase
                    .expand_mut()
                    .expect("child verification completed while parent is not expanding");
                debug_assert!(st.files_in_flight > 0);
                st.files_in_flight -= 1;
                self.schedule_drive();
            }
        }
    }

    /// One drive-loop activation: keep dispatching the highest-priority
    /// entry while work is cheaply available, stop when it is blocked on an
    /// outstanding operation, the queue is empty, or the step budget runs
    /// out (in which case a fresh activation is scheduled).
    fn drive(&mut self) {
        let mut steps = 0usize;
        while let Some(front) = self.queue.front() {
            if steps >= self.config.drive_batch_limit {
                tracing::trace!(steps, "Drive step budget exhausted; rescheduling");
                self.schedule_drive();
                return;
            }
            steps += 1;
            let report = self.dispatch_front(front);
            if report.done {
                self.retire(front);
                continue;
            }
            if report.added_children || report.progressed {
                continue;
            }
            // The front entry is blocked; the completion of whatever it is
            // waiting on reschedules the loop.
            return;
        }
    }

    /// Dispatch one unit of work for the front entry.
    fn dispatch_front(&mut self, id: EntryId) -> StepReport {
        enum FrontAction {
            Done,
            StartFile,
            StartFinalize,
            Expand,
            Blocked,
        }
        let action = {
            let e = self.queue.get(id).expect("front entry");
            match &e.phase {
                EntryPhase::Done => FrontAction::Done,
                EntryPhase::FileIdle => FrontAction::StartFile,
                EntryPhase::FinalizeIdle => FrontAction::StartFinalize,
                EntryPhase::Expanding(_) => FrontAction::Expand,
                EntryPhase::FileInFlight
                | EntryPhase::FinalizeInFlight
                | EntryPhase::AwaitFragment(_) => FrontAction::Blocked,
            }
        };
        match action {
            FrontAction::Done => StepReport::done(),
            FrontAction::StartFile => self.start_file_verify(id),
            FrontAction::StartFinalize => self.start_finalize(id),
            FrontAction::Expand => self.step_expand(id),
            FrontAction::Blocked => StepReport::blocked(),
        }
    }

    fn start_file_verify(&mut self, id: EntryId) -> StepReport {
        let header = {
            let e = self.queue.get_mut(id).expect("front entry");
            e.phase = EntryPhase::FileInFlight;
            e.header.clone()
        };
        self.verifies_in_flight += 1;
        tracing::trace!(entry = %id, "Dispatching file verification");
        self.cache
            .verify_file(id, header.tag(), VerifyCompletion::for_entry(self.tx.clone(), id));
        StepReport::progressed()
    }

    fn start_finalize(&mut self, id: EntryId) -> StepReport {
        let header = {
            let e = self.queue.get_mut(id).expect("front entry");
            e.phase = EntryPhase::FinalizeInFlight;
            e.header.clone()
        };
        self.verifies_in_flight += 1;
        tracing::trace!(entry = %id, "Dispatching container metadata verification");
        self.cache
            .verify_container(id, header.tag(), VerifyCompletion::for_entry(self.tx.clone(), id));
        StepReport::progressed()
    }

    /// One step of container expansion: verify the next unscrubbed file
    /// child, push the next unscrubbed container child, advance to the next
    /// fragment, or report why nothing can happen yet.
    fn step_expand(&mut self, id: EntryId) -> StepReport {
        // Load the ordered fragment list on the first expansion step.
        let needs_fragments = {
            let e = self.queue.get_mut(id).expect("front entry");
            e.phase.expand_mut().expect("expanding").fragments.is_none()
        };
        if needs_fragments {
            match self.cache.container_fragments(id) {
                Ok(frags) => {
                    let e = self.queue.get_mut(id).expect("front entry");
                    e.phase.expand_mut().expect("expanding").fragments = Some(frags);
                }
                Err(status) => {
                    tracing::error!(
                        entry = %id,
                        status = %status,
                        "Cannot enumerate container fragments; finalizing without expansion"
                    );
                    self.stats.fetch_failures += 1;
                    let e = self.queue.get_mut(id).expect("front entry");
                    e.header.mark_fetch_failed();
                    e.phase = EntryPhase::FinalizeIdle;
                    return StepReport::progressed();
                }
            }
        }

        // Pick the current fragment, or finalize once the list is exhausted.
        let next_frag = {
            let e = self.queue.get_mut(id).expect("front entry");
            let st = e.phase.expand_mut().expect("expanding");
            let frags = st.fragments.as_ref().expect("fragment list loaded");
            frags.get(st.frag_idx).copied()
        };
        let frag = match next_frag {
            Some(frag) => frag,
            None => {
                let e = self.queue.get_mut(id).expect("front entry");
                e.phase = EntryPhase::FinalizeIdle;
                tracing::trace!(entry = %id, "All fragments expanded; finalizing container");
                return StepReport::progressed();
            }
        };

        // A non-resident fragment parks the entry behind a fetch.
        if !self.cache.fragment_resident(frag) {
            self.queue
                .get_mut(id)
                .expect("front entry")
                .begin_fragment_wait();
            self.fetches_in_flight += 1;
            tracing::debug!(entry = %id, fragment = %frag, "Fragment not resident; fetch issued");
            self.cache
                .fetch_fragment(frag, FetchCompletion::for_expand(self.tx.clone(), id, frag));
            return StepReport::blocked();
        }

        // Load the fragment's ordered children on first touch.
        let needs_children = {
            let e = self.queue.get_mut(id).expect("front entry");
            e.phase.expand_mut().expect("expanding").children.is_none()
        };
        if needs_children {
            match self.cache.fragment_children(frag) {
                Ok(kids) => {
                    let e = self.queue.get_mut(id).expect("front entry");
                    e.phase.expand_mut().expect("expanding").children = Some(kids);
                }
                Err(status) => {
                    tracing::error!(
                        entry = %id,
                        fragment = %frag,
                        status = %status,
                        "Cannot enumerate fragment children; skipping fragment"
                    );
                    self.stats.fetch_failures += 1;
                    let e = self.queue.get_mut(id).expect("front entry");
                    e.header.mark_fetch_failed();
                    e.phase.expand_mut().expect("expanding").advance_fragment();
                    return StepReport::progressed();
                }
            }
        }

        // Advance the child cursor by one unit of work.
        let child = {
            let e = self.queue.get_mut(id).expect("front entry");
            let st = e.phase.expand_mut().expect("expanding");
            let next = st
                .children
                .as_ref()
                .expect("children loaded")
                .get(st.child_idx)
                .copied();
            match next {
                Some(child) => {
                    st.child_idx += 1;
                    child
                }
                None => {
                    if st.files_in_flight > 0 {
                        // Nothing left to start in this fragment; its
                        // outstanding child verifications re-trigger us.
                        return StepReport::blocked();
                    }
                    st.advance_fragment();
                    tracing::trace!(entry = %id, fragment = %frag, "Fragment fully expanded; advancing");
                    return StepReport::progressed();
                }
            }
        };

        // Only children with no scrub started are examined.
        if self.queue.contains(child) {
            tracing::trace!(entry = %id, child = %child, "Child already queued; skipping");
            return StepReport::progressed();
        }

        match self.cache.entry_kind(child) {
            Err(status) => {
                tracing::warn!(
                    entry = %id,
                    child = %child,
                    status = %status,
                    "Child vanished from cache; skipping"
                );
                StepReport::progressed()
            }
            Ok(ObjectKind::File) => {
                let header = {
                    let e = self.queue.get_mut(id).expect("front entry");
                    e.phase.expand_mut().expect("expanding").files_in_flight += 1;
                    e.header.clone()
                };
                self.verifies_in_flight += 1;
                tracing::trace!(entry = %id, child = %child, "Dispatching file verification for child");
                self.cache.verify_file(
                    child,
                    header.tag(),
                    VerifyCompletion::for_child(self.tx.clone(), id, child),
                );
                StepReport::progressed()
            }
            Ok(ObjectKind::Container) => {
                let (header, recursive) = {
                    let e = self.queue.get(id).expect("front entry");
                    (e.header.clone(), e.recursive)
                };
                // Depth-first priority: the child is explored before any
                // sibling or lower-priority job. A children-only parent
                // gives the child a local (non-expanding) check.
                let params = EnqueueParams {
                    entry: child,
                    recursive,
                    children_only: false,
                    tag: String::new(),
                    header: Some(header),
                    on_finish: None,
                    end: QueueEnd::Top,
                };
                tracing::debug!(entry = %id, child = %child, "Pushing child container for depth-first scrub");
                self.admit(params, ObjectKind::Container);
                StepReport::added_children()
            }
        }
    }

    /// Remove a finished entry from the queue, firing its completion if it
    /// was the root of an enqueue call.
    fn retire(&mut self, id: EntryId) {
        let mut entry = self.queue.remove(id);
        debug_assert!(matches!(entry.phase, EntryPhase::Done));
        if let Some(on_finish) = entry.on_finish.take() {
            let incomplete = entry.header.fetch_failed();
            self.stats.jobs_completed += 1;
            tracing::info!(
                entry = %id,
                tag = %entry.header.tag(),
                recursive = entry.recursive,
                children_only = entry.children_only,
                complete = !incomplete,
                "Scrub job drained"
            );
            let outcome = if incomplete {
                make_error(ScrubCode::FETCH_FAILED)
            } else {
                Ok(())
            };
            on_finish(outcome);
        } else {
            tracing::trace!(entry = %id, "Entry scrub complete");
        }
    }
}

impl<C: NamespaceCache> Drop for ScrubStack<C> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert!(self.queue.is_empty(), "scrub stack dropped with queued entries");
        assert_eq!(self.verifies_in_flight, 0, "scrub stack dropped with verifications in flight");
        assert_eq!(self.fetches_in_flight, 0, "scrub stack dropped with fetches in flight");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::memtree::MemTree;
    use mdfs_types::MetaCode;

    fn new_stack(cache: &Arc<MemTree>) -> ScrubStack<MemTree> {
        ScrubStack::new(cache.clone(), ScrubConfig::default())
    }

    /// An `on_finish` callback recording how often and with what it fired.
    fn probe() -> (OnFinish, Arc<AtomicUsize>, Arc<Mutex<Option<Result<Void>>>>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let outcome = Arc::new(Mutex::new(None));
        let fired2 = fired.clone();
        let outcome2 = outcome.clone();
        let cb: OnFinish = Box::new(move |r| {
            fired2.fetch_add(1, Ordering::SeqCst);
            *outcome2.lock() = Some(r);
        });
        (cb, fired, outcome)
    }

    fn assert_finished_ok(fired: &AtomicUsize, outcome: &Mutex<Option<Result<Void>>>) {
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(outcome.lock().as_ref().unwrap().is_ok());
    }

    #[test]
    fn test_flat_container_scrub() {
        // A container with two resident file children and no subdirectories:
        // both files are verified, then the container itself, and the
        // completion fires once with the queue empty.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let a = cache.add_file(root, 0);
        let b = cache.add_file(root, 0);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, true, false, "", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![a, b, root]);
        assert_finished_ok(&fired, &outcome);
        assert!(stack.at_rest());
        assert_eq!(stack.queue_len(), 0);
        let stats = stack.stats();
        assert_eq!(stats.files_scrubbed, 2);
        assert_eq!(stats.containers_scrubbed, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.verify_failures, 0);
    }

    #[test]
    fn test_nonresident_fragment_blocks_then_resumes() {
        // The root's own fragment is not resident: a fetch is issued, the
        // root stays queued and blocked, and nothing is verified until the
        // fetch completes.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let a = cache.add_file(root, 0);
        cache.set_resident(cache.fragment(root, 0), false);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, true, false, "", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(stack.queue_len(), 1);
        assert_eq!(stack.fetches_in_flight(), 1);
        assert!(cache.verified().is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert_eq!(cache.flush_fetches(), 1);
        stack.pump();

        assert_eq!(cache.verified(), vec![a, root]);
        assert_finished_ok(&fired, &outcome);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_bottom_waits_for_entire_top_subtree() {
        // A bottom enqueue issued while a recursive top scrub is
        // mid-traversal must not start until the whole subtree is done.
        let cache = Arc::new(MemTree::new());
        let y = cache.add_root(1);
        let sub = cache.add_dir(y, 0, 1);
        let g = cache.add_file(sub, 0);
        let f = cache.add_file(y, 0);
        cache.defer_verify(f);

        let x = cache.add_root(1);

        let mut stack = new_stack(&cache);
        let (cb_y, fired_y, outcome_y) = probe();
        stack.enqueue_top(y, true, false, "", Some(cb_y)).unwrap();
        stack.pump();

        // Y is parked on f's outstanding verification.
        assert!(!stack.at_rest());
        assert_eq!(stack.verifies_in_flight(), 1);
        assert!(cache.verified().contains(&g));

        let (cb_x, fired_x, _outcome_x) = probe();
        stack.enqueue_bottom(x, true, false, "", Some(cb_x)).unwrap();
        stack.pump();

        // X was inserted while Y was still queued, so it has not started.
        assert!(!cache.verified().contains(&x));
        assert_eq!(fired_x.load(Ordering::SeqCst), 0);

        cache.flush_verifies();
        stack.pump();

        // Y's subtree drained first, then X ran to completion.
        assert_finished_ok(&fired_y, &outcome_y);
        assert_eq!(fired_x.load(Ordering::SeqCst), 1);
        let order = cache.verified();
        let x_pos = order.iter().position(|&e| e == x).unwrap();
        let y_pos = order.iter().position(|&e| e == y).unwrap();
        assert!(y_pos < x_pos);
        assert_eq!(*order.last().unwrap(), x);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_enqueue_top_is_lifo() {
        // enqueue_top(A) then enqueue_top(B): B is examined strictly first.
        let cache = Arc::new(MemTree::new());
        let parent = cache.add_root(1);
        let a = cache.add_file(parent, 0);
        let b = cache.add_file(parent, 0);

        let mut stack = new_stack(&cache);
        stack.enqueue_top(a, false, false, "", None).unwrap();
        stack.enqueue_top(b, false, false, "", None).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![b, a]);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_enqueue_bottom_is_fifo() {
        // Bottom enqueues keep their call order, and each job's subtree
        // drains before the next begins.
        let cache = Arc::new(MemTree::new());
        let a = cache.add_root(1);
        let a_kid = cache.add_file(a, 0);
        let b = cache.add_root(1);
        let b_kid = cache.add_file(b, 0);

        let mut stack = new_stack(&cache);
        stack.enqueue_bottom(a, true, false, "", None).unwrap();
        stack.enqueue_bottom(b, true, false, "", None).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![a_kid, a, b_kid, b]);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_depth_first_subtree_order() {
        // Expanding a container that discovers child containers C1, C2
        // drains C1's entire subtree before C2 begins, and both before
        // later siblings.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let f0 = cache.add_file(root, 0);
        let c1 = cache.add_dir(root, 0, 1);
        let f1 = cache.add_file(c1, 0);
        let c2 = cache.add_dir(root, 0, 1);
        let f2 = cache.add_file(c2, 0);
        let f3 = cache.add_file(root, 0);

        let mut stack = new_stack(&cache);
        stack.enqueue_top(root, true, false, "", None).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![f0, f1, c1, f2, c2, f3, root]);
        assert!(stack.at_rest());
        assert_eq!(stack.stats().containers_scrubbed, 3);
        assert_eq!(stack.stats().files_scrubbed, 4);
    }

    #[test]
    fn test_reenqueue_is_rejected() {
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let f = cache.add_file(root, 0);
        cache.defer_verify(f);

        let mut stack = new_stack(&cache);
        stack.enqueue_top(f, false, false, "", None).unwrap();
        stack.pump();
        assert_eq!(stack.queue_len(), 1);

        let err = stack.enqueue_top(f, false, false, "", None).unwrap_err();
        assert!(err.is_code(mdfs_types::ScrubCode::ALREADY_QUEUED));
        let err = stack.enqueue_bottom(f, false, false, "", None).unwrap_err();
        assert!(err.is_code(mdfs_types::ScrubCode::ALREADY_QUEUED));
        assert_eq!(stack.queue_len(), 1);

        cache.flush_verifies();
        stack.pump();
        assert!(stack.at_rest());
    }

    #[test]
    fn test_children_only_does_not_recurse() {
        // Direct children and the root are verified; grandchildren are not.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let f = cache.add_file(root, 0);
        let d = cache.add_dir(root, 0, 1);
        let grandchild = cache.add_file(d, 0);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, false, true, "", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![f, d, root]);
        assert!(!cache.verified().contains(&grandchild));
        assert_finished_ok(&fired, &outcome);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_local_scrub_verifies_only_the_entry() {
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let _f = cache.add_file(root, 0);

        let mut stack = new_stack(&cache);
        stack.enqueue_top(root, false, false, "", None).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![root]);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_file_root_entry() {
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let f = cache.add_file(root, 0);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(f, true, false, "", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![f]);
        assert_finished_ok(&fired, &outcome);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_deferred_enqueue_waits_for_containing_fragment() {
        // The target entry's containing fragment is not resident: the entry
        // must not appear in the queue until the fetch completes, then the
        // scrub proceeds with the original parameters.
        let cache = Arc::new(MemTree::new());
        let parent = cache.add_root(1);
        let e = cache.add_file(parent, 0);
        cache.set_resident(cache.fragment(parent, 0), false);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(e, false, false, "tagged", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(stack.queue_len(), 0);
        assert_eq!(stack.fetches_in_flight(), 1);
        assert!(!stack.at_rest());
        assert!(cache.verified().is_empty());

        cache.flush_fetches();
        stack.pump();

        assert_eq!(cache.verified(), vec![e]);
        assert_eq!(cache.verified_tags(), vec![(e, "tagged".to_string())]);
        assert_finished_ok(&fired, &outcome);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_deferred_enqueue_fetch_failure_resolves_callback() {
        let cache = Arc::new(MemTree::new());
        let parent = cache.add_root(1);
        let e = cache.add_file(parent, 0);
        let frag = cache.fragment(parent, 0);
        cache.set_resident(frag, false);
        cache.set_fetch_error(frag);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(e, false, false, "", Some(cb)).unwrap();
        stack.pump();
        cache.flush_fetches();
        stack.pump();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let guard = outcome.lock();
        let status = guard.as_ref().unwrap().as_ref().unwrap_err();
        assert!(status.is_code(MetaCode::FETCH_IO));
        drop(guard);
        assert_eq!(stack.queue_len(), 0);
        assert!(stack.at_rest());
        assert_eq!(stack.stats().fetch_failures, 1);
    }

    #[test]
    fn test_expansion_fetch_failure_still_drains() {
        // A failed fragment fetch mid-expansion skips that fragment, keeps
        // scrubbing the rest, and reports the job structurally incomplete.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(2);
        let _lost = cache.add_file(root, 0);
        let kept = cache.add_file(root, 1);
        let frag0 = cache.fragment(root, 0);
        cache.set_resident(frag0, false);
        cache.set_fetch_error(frag0);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, true, false, "", Some(cb)).unwrap();
        stack.pump();
        assert_eq!(stack.fetches_in_flight(), 1);

        cache.flush_fetches();
        stack.pump();

        assert_eq!(cache.verified(), vec![kept, root]);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let guard = outcome.lock();
        let status = guard.as_ref().unwrap().as_ref().unwrap_err();
        assert!(status.is_code(mdfs_types::ScrubCode::FETCH_FAILED));
        drop(guard);
        assert!(stack.at_rest());
        assert_eq!(stack.stats().fetch_failures, 1);
    }

    #[test]
    fn test_verify_failure_is_data_not_job_failure() {
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let bad = cache.add_file(root, 0);
        let good = cache.add_file(root, 0);
        cache.set_verify_error(bad, MetaCode::INCONSISTENT);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, true, false, "", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![bad, good, root]);
        assert_finished_ok(&fired, &outcome);
        assert_eq!(stack.stats().verify_failures, 1);
        assert_eq!(stack.stats().files_scrubbed, 2);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_tag_reaches_every_verification() {
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        cache.add_file(root, 0);
        let d = cache.add_dir(root, 0, 1);
        cache.add_file(d, 0);

        let mut stack = new_stack(&cache);
        stack.enqueue_top(root, true, false, "scrub-2026-08", None).unwrap();
        stack.pump();

        let tags = cache.verified_tags();
        assert_eq!(tags.len(), 4);
        assert!(tags.iter().all(|(_, tag)| tag == "scrub-2026-08"));
        assert!(stack.at_rest());
    }

    #[test]
    fn test_completion_fires_once_after_whole_tree() {
        // N files and M subdirectories: the callback fires exactly once,
        // after all descendants plus the root's own metadata are done.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        for _ in 0..3 {
            cache.add_file(root, 0);
        }
        for _ in 0..2 {
            let d = cache.add_dir(root, 0, 1);
            cache.add_file(d, 0);
            cache.add_file(d, 0);
        }

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, true, false, "", Some(cb)).unwrap();
        stack.pump();

        assert_finished_ok(&fired, &outcome);
        let stats = stack.stats();
        assert_eq!(stats.files_scrubbed, 7);
        assert_eq!(stats.containers_scrubbed, 3);
        assert_eq!(stats.jobs_completed, 1);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_multi_fragment_container() {
        // Fragments are expanded in their stable order.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(3);
        let a = cache.add_file(root, 0);
        let b = cache.add_file(root, 1);
        let c = cache.add_file(root, 2);

        let mut stack = new_stack(&cache);
        stack.enqueue_top(root, true, false, "", None).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![a, b, c, root]);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_drive_batch_limit_reschedules() {
        // With a one-step budget every activation reschedules itself, and
        // the scrub still runs to completion within a single pump.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let a = cache.add_file(root, 0);
        let d = cache.add_dir(root, 0, 1);
        let b = cache.add_file(d, 0);

        let config = ScrubConfig { drive_batch_limit: 1, ..Default::default() };
        let mut stack = ScrubStack::new(cache.clone(), config);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, true, false, "", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(cache.verified(), vec![a, b, d, root]);
        assert_finished_ok(&fired, &outcome);
        assert!(stack.at_rest());
    }

    #[test]
    fn test_deferred_file_verification_blocks_queue() {
        // While the front entry's verification is outstanding the queue is
        // non-empty and the in-flight counter is nonzero; its completion
        // drains both.
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let f = cache.add_file(root, 0);
        cache.defer_verify(f);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(f, false, false, "", Some(cb)).unwrap();
        stack.pump();

        assert_eq!(stack.queue_len(), 1);
        assert_eq!(stack.verifies_in_flight(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        cache.flush_verifies();
        stack.pump();

        assert_finished_ok(&fired, &outcome);
        assert_eq!(stack.verifies_in_flight(), 0);
        assert!(stack.at_rest());
    }

    #[test]
    #[should_panic(expected = "queued entries")]
    fn test_teardown_mid_scrub_is_fatal() {
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let f = cache.add_file(root, 0);
        cache.defer_verify(f);

        let mut stack = new_stack(&cache);
        stack.enqueue_top(f, false, false, "", None).unwrap();
        stack.pump();
        drop(stack);
    }

    #[tokio::test]
    async fn test_drive_until_rest_with_out_of_band_completions() {
        let cache = Arc::new(MemTree::new());
        let root = cache.add_root(1);
        let a = cache.add_file(root, 0);
        cache.set_resident(cache.fragment(root, 0), false);

        let mut stack = new_stack(&cache);
        let (cb, fired, outcome) = probe();
        stack.enqueue_top(root, true, false, "", Some(cb)).unwrap();

        let flusher = cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            flusher.flush_fetches();
        });

        stack.drive_until_rest().await;

        assert_eq!(cache.verified(), vec![a, root]);
        assert_finished_ok(&fired, &outcome);
        assert!(stack.at_rest());
    }
}
