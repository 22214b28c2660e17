//! In-memory namespace cache.
//!
//! A deterministic [`NamespaceCache`] backend used by the scheduler tests
//! and the demo binary. Trees are built explicitly; fragment residency,
//! fetch outcomes and verification outcomes are all scriptable, and
//! verification dispatch order is recorded for assertions.
//!
//! Fetches never complete inline: they park until [`MemTree::flush_fetches`]
//! is called, modelling the out-of-band completion of real backing-store
//! reads. Verifications complete inline unless the entry was marked with
//! [`MemTree::defer_verify`].

use std::collections::{HashMap, HashSet};

use mdfs_types::{EntryId, FragmentId, MetaCode, Result, Status, Void, make_error_msg, status_code_t};
use parking_lot::Mutex;

use crate::cache::{NamespaceCache, ObjectKind};
use crate::message::{FetchCompletion, VerifyCompletion};

pub struct MemTree {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    entries: HashMap<EntryId, Node>,
    fragments: HashMap<FragmentId, Fragment>,
    pending_fetches: Vec<(FragmentId, FetchCompletion)>,
    parked_verifies: Vec<(EntryId, VerifyCompletion)>,
    deferred: HashSet<EntryId>,
    verify_errors: HashMap<EntryId, status_code_t>,
    fetch_errors: HashSet<FragmentId>,
    /// Verifications in dispatch order, with the tag each one observed.
    verified: Vec<(EntryId, String)>,
}

struct Node {
    kind: ObjectKind,
    parent: Option<FragmentId>,
    fragments: Vec<FragmentId>,
}

struct Fragment {
    children: Vec<EntryId>,
    resident: bool,
}

impl MemTree {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn alloc(inner: &mut Inner, kind: ObjectKind, parent: Option<FragmentId>, fragments: usize) -> EntryId {
        inner.next_id += 1;
        let id = EntryId::new(inner.next_id);
        let mut frags = Vec::with_capacity(fragments);
        for _ in 0..fragments {
            inner.next_id += 1;
            let frag = FragmentId::new(inner.next_id);
            inner.fragments.insert(
                frag,
                Fragment {
                    children: Vec::new(),
                    resident: true,
                },
            );
            frags.push(frag);
        }
        inner.entries.insert(
            id,
            Node {
                kind,
                parent,
                fragments: frags,
            },
        );
        id
    }

    /// Add a container entry with no parent (a tree root) holding
    /// `fragments` resident fragments.
    pub fn add_root(&self, fragments: usize) -> EntryId {
        let mut inner = self.inner.lock();
        Self::alloc(&mut inner, ObjectKind::Container, None, fragments)
    }

    /// Add a container entry under `parent`'s fragment `frag_idx`.
    pub fn add_dir(&self, parent: EntryId, frag_idx: usize, fragments: usize) -> EntryId {
        let mut inner = self.inner.lock();
        let pf = inner.entries[&parent].fragments[frag_idx];
        let id = Self::alloc(&mut inner, ObjectKind::Container, Some(pf), fragments);
        inner.fragments.get_mut(&pf).expect("parent fragment").children.push(id);
        id
    }

    /// Add a file entry under `parent`'s fragment `frag_idx`.
    pub fn add_file(&self, parent: EntryId, frag_idx: usize) -> EntryId {
        let mut inner = self.inner.lock();
        let pf = inner.entries[&parent].fragments[frag_idx];
        let id = Self::alloc(&mut inner, ObjectKind::File, Some(pf), 0);
        inner.fragments.get_mut(&pf).expect("parent fragment").children.push(id);
        id
    }

    /// The `idx`-th fragment of a container entry.
    pub fn fragment(&self, entry: EntryId, idx: usize) -> FragmentId {
        self.inner.lock().entries[&entry].fragments[idx]
    }

    pub fn set_resident(&self, frag: FragmentId, resident: bool) {
        self.inner.lock().fragments.get_mut(&frag).expect("fragment").resident = resident;
    }

    /// Park the entry's verification until [`flush_verifies`](Self::flush_verifies).
    pub fn defer_verify(&self, entry: EntryId) {
        self.inner.lock().deferred.insert(entry);
    }

    /// Make the entry's verification report the given failure code.
    pub fn set_verify_error(&self, entry: EntryId, code: status_code_t) {
        self.inner.lock().verify_errors.insert(entry, code);
    }

    /// Make the next fetch of the fragment fail instead of loading it.
    pub fn set_fetch_error(&self, frag: FragmentId) {
        self.inner.lock().fetch_errors.insert(frag);
    }

    /// Resolve every parked fetch: scripted failures complete with an
    /// error, everything else becomes resident and completes successfully.
    /// Returns how many fetches were resolved.
    pub fn flush_fetches(&self) -> usize {
        let mut inner = self.inner.lock();
        let pending: Vec<_> = inner.pending_fetches.drain(..).collect();
        let mut ready = Vec::with_capacity(pending.len());
        for (frag, done) in pending {
            let outcome: Result<Void> = if inner.fetch_errors.remove(&frag) {
                Err(Status::with_message(
                    MetaCode::FETCH_IO,
                    format!("fetch of fragment {} failed", frag),
                ))
            } else {
                if let Some(f) = inner.fragments.get_mut(&frag) {
                    f.resident = true;
                }
                Ok(())
            };
            ready.push((done, outcome));
        }
        drop(inner);
        let count = ready.len();
        for (done, outcome) in ready {
            done.complete(outcome);
        }
        count
    }

    /// Resolve every parked verification. Returns how many were resolved.
    pub fn flush_verifies(&self) -> usize {
        let mut inner = self.inner.lock();
        let parked: Vec<_> = inner.parked_verifies.drain(..).collect();
        let mut ready = Vec::with_capacity(parked.len());
        for (entry, done) in parked {
            let outcome: Result<Void> = match inner.verify_errors.get(&entry) {
                Some(code) => Err(Status::new(*code)),
                None => Ok(()),
            };
            ready.push((done, outcome));
        }
        drop(inner);
        let count = ready.len();
        for (done, outcome) in ready {
            done.complete(outcome);
        }
        count
    }

    pub fn pending_fetches(&self) -> usize {
        self.inner.lock().pending_fetches.len()
    }

    pub fn pending_verifies(&self) -> usize {
        self.inner.lock().parked_verifies.len()
    }

    /// Entries in verification dispatch order.
    pub fn verified(&self) -> Vec<EntryId> {
        self.inner.lock().verified.iter().map(|(e, _)| *e).collect()
    }

    /// Entries in verification dispatch order, with the tag each observed.
    pub fn verified_tags(&self) -> Vec<(EntryId, String)> {
        self.inner.lock().verified.clone()
    }

    fn run_verify(&self, entry: EntryId, tag: &str, done: VerifyCompletion) {
        let mut inner = self.inner.lock();
        inner.verified.push((entry, tag.to_string()));
        if inner.deferred.contains(&entry) {
            inner.parked_verifies.push((entry, done));
            return;
        }
        let outcome: Result<Void> = match inner.verify_errors.get(&entry) {
            Some(code) => Err(Status::new(*code)),
            None => Ok(()),
        };
        drop(inner);
        done.complete(outcome);
    }
}

impl Default for MemTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceCache for MemTree {
    fn entry_kind(&self, entry: EntryId) -> Result<ObjectKind> {
        match self.inner.lock().entries.get(&entry) {
            Some(node) => Ok(node.kind),
            None => make_error_msg(MetaCode::NOT_FOUND, format!("entry {} not in cache", entry)),
        }
    }

    fn containing_fragment(&self, entry: EntryId) -> Option<FragmentId> {
        self.inner.lock().entries.get(&entry).and_then(|n| n.parent)
    }

    fn fragment_resident(&self, frag: FragmentId) -> bool {
        self.inner.lock().fragments.get(&frag).map(|f| f.resident).unwrap_or(false)
    }

    fn fetch_fragment(&self, frag: FragmentId, done: FetchCompletion) {
        self.inner.lock().pending_fetches.push((frag, done));
    }

    fn container_fragments(&self, entry: EntryId) -> Result<Vec<FragmentId>> {
        let inner = self.inner.lock();
        match inner.entries.get(&entry) {
            Some(node) if node.kind == ObjectKind::Container => Ok(node.fragments.clone()),
            Some(_) => make_error_msg(MetaCode::NOT_DIRECTORY, format!("entry {} is not a container", entry)),
            None => make_error_msg(MetaCode::NOT_FOUND, format!("entry {} not in cache", entry)),
        }
    }

    fn fragment_children(&self, frag: FragmentId) -> Result<Vec<EntryId>> {
        let inner = self.inner.lock();
        match inner.fragments.get(&frag) {
            Some(f) if f.resident => Ok(f.children.clone()),
            Some(_) => make_error_msg(
                MetaCode::FRAGMENT_NOT_RESIDENT,
                format!("fragment {} is not resident", frag),
            ),
            None => make_error_msg(MetaCode::NOT_FOUND, format!("fragment {} not in cache", frag)),
        }
    }

    fn verify_file(&self, entry: EntryId, tag: &str, done: VerifyCompletion) {
        self.run_verify(entry, tag, done);
    }

    fn verify_container(&self, entry: EntryId, tag: &str, done: VerifyCompletion) {
        self.run_verify(entry, tag, done);
    }
}
