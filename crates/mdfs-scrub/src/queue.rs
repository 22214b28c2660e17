//! The scrub queue: an intrusive deque over an arena of queued entries.
//!
//! Entries are addressed by their stable `EntryId`; the doubly-linked
//! `prev`/`next` handles live on the entries themselves, giving O(1)
//! insert at either end, O(1) removal from the middle, and O(1)
//! membership queries. Membership is exclusive: inserting an id that is
//! already present is a programming error and panics.

use std::collections::HashMap;

use mdfs_types::EntryId;

use crate::entry::ScrubEntry;

pub(crate) struct ScrubQueue {
    entries: HashMap<EntryId, ScrubEntry>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
}

impl ScrubQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The highest-priority entry, examined first by every drive-loop pass.
    pub(crate) fn front(&self) -> Option<EntryId> {
        self.head
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&ScrubEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut ScrubEntry> {
        self.entries.get_mut(&id)
    }

    /// Insert at the highest-priority end.
    pub(crate) fn push_front(&mut self, mut entry: ScrubEntry) {
        let id = entry.id;
        assert!(!self.contains(id), "entry {} is already queued", id);
        entry.prev = None;
        entry.next = self.head;
        match self.head {
            Some(old) => {
                self.entries
                    .get_mut(&old)
                    .expect("queue head must be present")
                    .prev = Some(id);
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.entries.insert(id, entry);
    }

    /// Insert at the lowest-priority end.
    pub(crate) fn push_back(&mut self, mut entry: ScrubEntry) {
        let id = entry.id;
        assert!(!self.contains(id), "entry {} is already queued", id);
        entry.next = None;
        entry.prev = self.tail;
        match self.tail {
            Some(old) => {
                self.entries
                    .get_mut(&old)
                    .expect("queue tail must be present")
                    .next = Some(id);
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.entries.insert(id, entry);
    }

    /// Unlink and return an entry from anywhere in the queue.
    pub(crate) fn remove(&mut self, id: EntryId) -> ScrubEntry {
        let entry = self
            .entries
            .remove(&id)
            .unwrap_or_else(|| panic!("entry {} is not queued", id));
        match entry.prev {
            Some(prev) => {
                self.entries
                    .get_mut(&prev)
                    .expect("queue link must be present")
                    .next = entry.next;
            }
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => {
                self.entries
                    .get_mut(&next)
                    .expect("queue link must be present")
                    .prev = entry.prev;
            }
            None => self.tail = entry.prev,
        }
        entry
    }
}
