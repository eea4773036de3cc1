//! Derived, memory-resident node state
//!
//! The UTXO index, the pending transaction pool and the block admission
//! cache. Each lives behind its own lock; the sled store in `core` stays
//! the single durable source of truth.

pub mod block_cache;
pub mod pending_pool;
pub mod utxo_index;

pub use block_cache::BlockCache;
pub use pending_pool::PendingPool;
pub use utxo_index::{OutputKey, UnspentOutput, UtxoIndex};
