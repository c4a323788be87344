//! Store mutation for one operation.

use kvsync_core::effects::KvStore;
use kvsync_core::{OpKind, Operation, SyncResult};

pub(crate) async fn apply_to_store(store: &dyn KvStore, op: &Operation) -> SyncResult<()> {
    match &op.kind {
        OpKind::Put { value } => store.put(&op.key, value.as_bytes()).await,
        OpKind::Delete => store.delete(&op.key).await,
    }
}
