//! Interface the scrub scheduler consumes from the metadata cache.
//!
//! The cache owns the namespace tree: containers split into fragments,
//! fragments holding named child entries. The scheduler never owns any of
//! it; it holds `EntryId`/`FragmentId` keys and asks the cache for
//! classification, residency, iteration, and per-object verification.

use mdfs_types::{EntryId, FragmentId, Result};

use crate::message::{FetchCompletion, VerifyCompletion};

/// What kind of object a namespace entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Container,
}

/// The tree/cache collaborator of the scrub scheduler.
///
/// Residency checks and iteration are synchronous; fragment fetches and
/// object verifications answer through single-shot completions, which the
/// implementation may fire inline before returning or out-of-band later.
/// Every completion handed in must be fired exactly once.
pub trait NamespaceCache: Send + Sync + 'static {
    /// Classify the object behind an entry.
    fn entry_kind(&self, entry: EntryId) -> Result<ObjectKind>;

    /// The fragment of the parent container holding this entry, or `None`
    /// for the root of the tree.
    fn containing_fragment(&self, entry: EntryId) -> Option<FragmentId>;

    /// Whether a fragment's child entries are loadable without I/O.
    fn fragment_resident(&self, frag: FragmentId) -> bool;

    /// Issue an asynchronous fetch of a fragment from backing storage.
    fn fetch_fragment(&self, frag: FragmentId, done: FetchCompletion);

    /// The ordered fragments of a container entry. The order must be stable
    /// across calls while the scrub runs.
    fn container_fragments(&self, entry: EntryId) -> Result<Vec<FragmentId>>;

    /// The ordered child entries of a resident fragment.
    fn fragment_children(&self, frag: FragmentId) -> Result<Vec<EntryId>>;

    /// Verify a file object, applying `tag` to what was checked.
    fn verify_file(&self, entry: EntryId, tag: &str, done: VerifyCompletion);

    /// Verify a container object's own metadata, applying `tag`.
    fn verify_container(&self, entry: EntryId, tag: &str, done: VerifyCompletion);
}
