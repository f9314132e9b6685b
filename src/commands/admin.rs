//! Server commands (PING, FLUSHDB, DBSIZE)

use super::{to_cmd_line, Command};
use crate::database::Db;
use crate::protocol::RespValue;
use bytes::Bytes;

/// PING command - Liveness check
///
/// Syntax: PING
pub struct PingCommand;

impl Command for PingCommand {
    fn execute(&self, _db: &Db, _args: &[Bytes]) -> RespValue {
        RespValue::simple_string("PONG")
    }

    fn name(&self) -> &'static str {
        "PING"
    }

    fn arity(&self) -> i32 {
        0
    }
}

/// FLUSHDB command - Remove all keys from the current database
///
/// Syntax: FLUSHDB
pub struct FlushDbCommand;

impl Command for FlushDbCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        db.flush();
        db.add_aof(to_cmd_line("flushdb", args));
        RespValue::ok()
    }

    fn name(&self) -> &'static str {
        "FLUSHDB"
    }

    fn arity(&self) -> i32 {
        0
    }

    fn is_write(&self) -> bool {
        true
    }

    fn is_read_modify_write(&self) -> bool {
        true
    }
}

/// DBSIZE command - Number of keys in the current database
///
/// Syntax: DBSIZE
pub struct DbSizeCommand;

impl Command for DbSizeCommand {
    fn execute(&self, db: &Db, _args: &[Bytes]) -> RespValue {
        RespValue::integer(db.len() as i64)
    }

    fn name(&self) -> &'static str {
        "DBSIZE"
    }

    fn arity(&self) -> i32 {
        0
    }
}
