//! # kvsync store
//!
//! Key-value stores implementing [`kvsync_core::effects::KvStore`]:
//! - `MemoryKvStore`: volatile, for tests and ephemeral sites
//! - `LogKvStore`: append-only JSON-lines log replayed on open
//!
//! Both keep tombstones for deleted keys and stamp every write with a
//! millisecond timestamp that strictly increases within the store.

pub mod log;
pub mod memory;
pub mod stamp;

pub use log::LogKvStore;
pub use memory::MemoryKvStore;
pub use stamp::WriteStamp;
