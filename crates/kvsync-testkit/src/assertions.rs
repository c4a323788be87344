//! Convergence assertions.

use kvsync_core::effects::{KvEntry, KvStore};
use std::collections::BTreeMap;

/// Key to visible content: `Some(value)` for live keys, `None` for tombstones.
pub type Contents = BTreeMap<String, Option<String>>;

/// Visible content of a store, ignoring write timestamps
pub async fn contents(store: &dyn KvStore) -> Contents {
    let mut out = BTreeMap::new();
    for key in store.keys().await.unwrap() {
        if let Some(entry) = store.get(&key).await.unwrap() {
            out.insert(key, visible(&entry));
        }
    }
    out
}

fn visible(entry: &KvEntry) -> Option<String> {
    if entry.tombstone {
        None
    } else {
        entry.value_lossy()
    }
}

/// Panic unless every store shows the same content.
pub async fn assert_converged(stores: &[&dyn KvStore]) {
    let Some((first, rest)) = stores.split_first() else {
        return;
    };
    let expected = contents(*first).await;
    for (i, store) in rest.iter().enumerate() {
        let actual = contents(*store).await;
        assert_eq!(actual, expected, "store {} diverged from store 0", i + 1);
    }
}
