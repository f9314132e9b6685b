//! FerrumCluster - A Redis-compatible in-memory key-value store that
//! partitions its keyspace across nodes with a consistent hash ring
//!
//! Layers, from the wire inwards:
//! - `server` accepts clients and drives a `Database`
//! - `cluster` routes each command to the node owning its key
//! - `database` selects a numbered keyspace and runs the command there
//! - `commands` and `store` implement the commands and the keyspace itself
//! - `aof` records write commands and replays them at startup

pub mod protocol;
pub mod store;
pub mod connection;
pub mod commands;
pub mod database;
pub mod aof;
pub mod cluster;
pub mod server;
pub mod config;

/// Re-export commonly used types
pub use store::{DataEntity, Dict, ShardedDict};
pub use protocol::{RespValue, RespError};
pub use commands::{Command, CommandRegistry};
pub use connection::{Connection, Session};
pub use database::{Database, Db, StandaloneDatabase};
pub use cluster::{ClusterConfig, ClusterDatabase};
pub use config::Config;
