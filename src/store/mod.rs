//! In-memory storage module
//!
//! Provides the concurrent keyspace each database is built on.
//! This module is independent of protocol and command handling (loose coupling).

mod entity;
mod dict;

pub use entity::DataEntity;
pub use dict::{Dict, ShardedDict};
