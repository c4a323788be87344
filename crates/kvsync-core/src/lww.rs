//! Last-Writer-Wins decision rule.
//!
//! Rules, applied in order:
//!
//! 1. no incumbent: the candidate wins
//! 2. higher timestamp wins
//! 3. equal timestamps: the lexicographically greater origin wins
//!
//! Both the replication consumer and the reconciliation engine decide
//! conflicts through this module only.

use crate::operation::Version;
use std::cmp::Ordering;

/// Which side of a two-way comparison won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The first argument won
    Left,
    /// The second argument won
    Right,
}

/// Total order over versions: timestamp first, origin as tie-break.
///
/// The tombstone flag does not participate; two versions with the same
/// timestamp and origin describe the same operation.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.origin.cmp(&b.origin))
}

/// Decide whether `candidate` replaces `incumbent`.
///
/// Identical versions do not win, so re-applying a version is a no-op.
pub fn wins(candidate: &Version, incumbent: Option<&Version>) -> bool {
    match incumbent {
        None => true,
        Some(incumbent) => compare(candidate, incumbent) == Ordering::Greater,
    }
}

/// Pick the winner of two present versions.
///
/// Ties on identical versions go to `left`.
pub fn resolve(left: &Version, right: &Version) -> Winner {
    if wins(right, Some(left)) {
        Winner::Right
    } else {
        Winner::Left
    }
}
