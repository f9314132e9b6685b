//! Append-Only File (AOF) persistence module
//!
//! Provides durability by logging all write commands to disk.
//! Each command is written in a compact binary format with checksums.

mod entry;
mod writer;
mod reader;
mod handler;

pub use entry::AofEntry;
pub use writer::AofWriter;
pub use reader::AofReader;
pub use handler::AofHandler;

use serde::Deserialize;
use std::path::PathBuf;

/// AOF sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Sync after every write (safest, slowest)
    Always,
    /// Sync every second (balanced)
    #[default]
    #[serde(rename = "everysec")]
    EverySecond,
    /// Let the OS decide when to sync (fastest, least safe)
    No,
}

/// AOF configuration
#[derive(Debug, Clone)]
pub struct AofConfig {
    /// Path to the AOF file
    pub path: PathBuf,
    /// Sync policy
    pub sync_policy: SyncPolicy,
    /// Whether to enable AOF
    pub enabled: bool,
}

impl Default for AofConfig {
    fn default() -> Self {
        AofConfig {
            path: PathBuf::from("appendonly.aof"),
            sync_policy: SyncPolicy::default(),
            enabled: false,
        }
    }
}
