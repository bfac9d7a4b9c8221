//! Core Basalt data structures.
//!
//! This crate provides definitions of the core data structures shared by
//! Basalt node subsystems: blocks and batch identifiers, transactions,
//! submission results, and the wire-visible transaction status taxonomy.

pub mod block;
pub mod transaction;

pub use transaction::Address;
