// vim: tw=80
//! The muskox pool model
//!
//! Data structures shared between the muskox CLI and the muskoxd daemon: the
//! vdev tree, its naming and traversal rules, the statistics delta engine,
//! background-operation progress tracking, and the RPC protocol.

pub mod activity;
pub mod delta;
pub mod name;
pub mod rpc;
pub mod types;
pub mod vdev;
pub mod walk;

pub use crate::types::{Error, Guid, Result};
