//! Memory management for masp values.
//!
//! Everything here is generic over the stored type. [`chunk`] provides the slab
//! storage, [`list`] and [`map`] build persistent collections on top of it.
//! Collection is never automatic: callers decide when to run `gc()`.

pub mod chunk;
pub mod list;
pub mod map;

pub use chunk::{ChunkBox, SlotId, CHUNK_SLOTS};
pub use list::{ListPool, PersistentList};
pub use map::{MapPool, PersistentMap, TrieKey};
