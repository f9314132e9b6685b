//! Command execution module
//!
//! Provides a unified interface for all commands through the Command trait.
//! Each family of commands lives in its own file for high cohesion.

mod registry;

// Command implementations
mod admin;
mod key;
mod string;

pub use registry::CommandRegistry;

use crate::database::Db;
use crate::protocol::RespValue;
use bytes::Bytes;

/// Command execution trait
///
/// All commands implement this trait with a single execute method.
/// This provides loose coupling between command implementations and the dispatcher.
pub trait Command: Send + Sync {
    /// Execute the command against one database
    ///
    /// Arguments:
    /// - db: the selected database (keyspace plus durability hook)
    /// - args: command arguments (excluding the command name itself)
    ///
    /// Returns:
    /// - RespValue representing the response to send to the client
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue;

    /// Get the command name (for registration and logging)
    fn name(&self) -> &'static str;

    /// Argument count contract, excluding the command name
    ///
    /// `n >= 0` requires exactly `n` arguments, `n < 0` at least `-n`.
    fn arity(&self) -> i32;

    /// Whether the command may mutate the keyspace
    fn is_write(&self) -> bool {
        false
    }

    /// Whether the command reads keys and then writes based on what it read,
    /// so no other write may run on the same database in between
    fn is_read_modify_write(&self) -> bool {
        false
    }
}

/// Check an argument count against an arity contract
pub fn validate_arity(arity: i32, arg_count: usize) -> bool {
    if arity >= 0 {
        arg_count == arity as usize
    } else {
        arg_count >= arity.unsigned_abs() as usize
    }
}

/// Prefix `args` with the command name, forming the line recorded in the AOF
pub(crate) fn to_cmd_line(name: &'static str, args: &[Bytes]) -> Vec<Bytes> {
    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(Bytes::from_static(name.as_bytes()));
    line.extend_from_slice(args);
    line
}
