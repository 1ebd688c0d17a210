//! # weir-chainstate
//! The stateful half of Weir: the block index, the layered coins cache
//! over a durable store, block application and undo, the fork safety
//! check, the mempool, and the [`engine::ChainEngine`] that serializes
//! all of it behind one region lock.

pub mod apply;
pub mod block_index;
pub mod coins;
pub mod engine;
pub mod fork_guard;
pub mod mempool;
pub mod notify;
pub mod store;
pub mod undo;
