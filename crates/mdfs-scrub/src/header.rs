//! Per-job scrub parameters.

use std::sync::atomic::{AtomicBool, Ordering};

use mdfs_types::EntryId;

/// Externally supplied parameters for one scrub job, shared by the root entry
/// and every descendant discovered while it is expanded.
///
/// The header is created when a root entry is admitted to the queue and
/// handed down the tree as `Arc<ScrubHeader>`; it is freed when the last
/// entry of the job leaves the queue.
pub struct ScrubHeader {
    tag: String,
    origin: EntryId,
    fetch_failed: AtomicBool,
}

impl ScrubHeader {
    pub fn new(tag: impl Into<String>, origin: EntryId) -> Self {
        Self {
            tag: tag.into(),
            origin,
            fetch_failed: AtomicBool::new(false),
        }
    }

    /// Opaque label handed to the verification primitives, which apply it to
    /// the backing-store objects they check.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The entry this job was enqueued on.
    pub fn origin(&self) -> EntryId {
        self.origin
    }

    /// Record that a fragment fetch belonging to this job failed. Sticky:
    /// the job completes, but as structurally incomplete.
    pub fn mark_fetch_failed(&self) {
        self.fetch_failed.store(true, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) -> bool {
        self.fetch_failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields() {
        let h = ScrubHeader::new("nightly", EntryId::new(7));
        assert_eq!(h.tag(), "nightly");
        assert_eq!(h.origin(), EntryId::new(7));
        assert!(!h.fetch_failed());
    }

    #[test]
    fn test_fetch_failed_is_sticky() {
        let h = ScrubHeader::new("", EntryId::new(1));
        h.mark_fetch_failed();
        h.mark_fetch_failed();
        assert!(h.fetch_failed());
    }
}
