//! `kvsyncd dump`

use anyhow::{Context, Result};
use kvsync_core::effects::{KvEntry, KvStore};
use kvsync_transport::RemoteKvStore;

/// Print `key = value` for every key the site holds, sorted by key
pub async fn handle_dump(site: &str) -> Result<()> {
    let store = RemoteKvStore::new(site);
    let mut keys = store
        .keys()
        .await
        .with_context(|| format!("Failed to list keys on {site}"))?;
    keys.sort();

    for key in keys {
        let entry = store
            .get(&key)
            .await
            .with_context(|| format!("Failed to read {key} on {site}"))?;
        if let Some(entry) = entry {
            println!("{key} = {}", render(&entry));
        }
    }
    store.close().await?;
    Ok(())
}

fn render(entry: &KvEntry) -> String {
    match (&entry.value, entry.tombstone) {
        (Some(value), false) => String::from_utf8_lossy(value).into_owned(),
        _ => "<tombstone>".to_string(),
    }
}
