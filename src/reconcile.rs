use crate::blobstore::{BlobId, BlobStore};
use crate::references::ReferenceExtractor;

/// Outcome of one reconciliation pass. Both lists are sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub removed: Vec<BlobId>,
    pub failed: Vec<BlobId>,
}

/// Deletes every image that `old` referenced and `new` no longer does.
///
/// Must only run once the content holding `new` has been committed. Images
/// that only appear in `new` are not checked for existence.
pub async fn reconcile<S>(
    store: &S,
    extractor: &dyn ReferenceExtractor,
    old: Option<&str>,
    new: Option<&str>,
) -> Reconciliation
where
    S: BlobStore + ?Sized,
{
    let old_refs = old.map(|body| extractor.extract(body)).unwrap_or_default();
    if old_refs.is_empty() {
        return Reconciliation::default();
    }
    let new_refs = new.map(|body| extractor.extract(body)).unwrap_or_default();

    let mut orphans: Vec<_> = old_refs.difference(&new_refs).copied().collect();
    orphans.sort_unstable();

    let mut outcome = Reconciliation::default();
    for id in orphans {
        match store.delete_image(id).await {
            Ok(()) => outcome.removed.push(id),
            Err(err) => {
                tracing::error!(image = %id, error = %err, "failed to delete orphaned image");
                outcome.failed.push(id);
            }
        }
    }
    outcome
}
