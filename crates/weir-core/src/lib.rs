//! # weir-core
//! Protocol types, stateless validation, and the pluggable verification
//! seams for the Weir chain-state engine.

pub mod block_validation;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod params;
pub mod reward;
pub mod script;
pub mod types;
pub mod validation;
