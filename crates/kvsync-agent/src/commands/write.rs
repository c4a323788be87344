//! `kvsyncd put` and `kvsyncd delete`

use anyhow::{Context, Result};
use kvsync_core::effects::WriteOutcome;
use kvsync_transport::PeerClient;

/// Write `key` through the site at `site`
pub async fn handle_put(site: &str, key: &str, value: &str) -> Result<()> {
    let client = PeerClient::new(site);
    let outcome = client
        .put(key, value)
        .await
        .with_context(|| format!("Failed to write {key} via {site}"))?;
    report(key, &outcome);
    client.close().await?;
    Ok(())
}

/// Delete `key` through the site at `site`
pub async fn handle_delete(site: &str, key: &str) -> Result<()> {
    let client = PeerClient::new(site);
    let outcome = client
        .delete(key)
        .await
        .with_context(|| format!("Failed to delete {key} via {site}"))?;
    report(key, &outcome);
    client.close().await?;
    Ok(())
}

fn report(key: &str, outcome: &WriteOutcome) {
    let version = &outcome.version;
    println!(
        "{key} @ {} by {}{}",
        version.timestamp,
        version.origin,
        if version.tombstone { " (deleted)" } else { "" }
    );
    if !outcome.published {
        println!("warning: not published, peers will catch up on reconciliation");
    }
}
