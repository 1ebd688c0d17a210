//! Integration test suite for Weir.
//!
//! The tests drive the full chain engine end to end: block production,
//! connection, reorganization, mempool flow, and the durable RocksDB
//! store. Shared block-building helpers live in [`helpers`].

pub mod helpers;
