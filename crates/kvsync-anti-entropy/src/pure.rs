//! Pure reconciliation decisions.

use kvsync_core::effects::KvEntry;
use kvsync_core::lww::{self, Winner};
use kvsync_core::{NodeId, Version};

/// Suffix of the synthetic origin given to this site's entries
pub const LOCAL_SIDE: &str = "local";

/// Suffix of the synthetic origin given to the peer's entries
pub const PEER_SIDE: &str = "peer";

/// What reconciliation does with one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPlan {
    /// Neither side has the key
    Absent,
    /// Both sides hold the same content
    Converged,
    /// Copy the local entry to the peer
    Push(KvEntry),
    /// Copy the peer entry to the local store; `winner` refreshes local metadata
    Pull {
        /// Entry to write locally
        entry: KvEntry,
        /// Synthesized version of the peer entry
        winner: Version,
    },
}

/// Version synthesized for one side's entry.
///
/// The origin is `<node>#<side>`; `#` never appears in configured node ids,
/// so synthetic versions never collide with versions of live operations.
pub fn side_version(node: &NodeId, side: &str, entry: &KvEntry) -> Version {
    Version::new(entry.write_ts, node.synthetic(side), entry.tombstone)
}

/// Decide how to converge one key.
///
/// With a single side present its entry is propagated. With both present the
/// LWW winner is copied over the loser, unless the loser already holds the
/// same content.
pub fn plan_key(node: &NodeId, local: Option<&KvEntry>, peer: Option<&KvEntry>) -> KeyPlan {
    match (local, peer) {
        (None, None) => KeyPlan::Absent,
        (Some(local), None) => KeyPlan::Push(local.clone()),
        (None, Some(peer)) => KeyPlan::Pull {
            entry: peer.clone(),
            winner: side_version(node, PEER_SIDE, peer),
        },
        (Some(local), Some(peer)) => {
            if local.same_content(peer) {
                return KeyPlan::Converged;
            }
            let local_version = side_version(node, LOCAL_SIDE, local);
            let peer_version = side_version(node, PEER_SIDE, peer);
            match lww::resolve(&local_version, &peer_version) {
                Winner::Left => KeyPlan::Push(local.clone()),
                Winner::Right => KeyPlan::Pull {
                    entry: peer.clone(),
                    winner: peer_version,
                },
            }
        }
    }
}
