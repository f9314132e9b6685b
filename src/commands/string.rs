//! String commands (SET, SETNX, GET, GETSET, STRLEN)

use super::{to_cmd_line, Command};
use crate::database::Db;
use crate::protocol::RespValue;
use crate::store::DataEntity;
use bytes::Bytes;

/// SET command - Set a key to a value
///
/// Syntax: SET key value
pub struct SetCommand;

impl Command for SetCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        db.put_entity(args[0].clone(), DataEntity::new(args[1].clone()));
        db.add_aof(to_cmd_line("set", args));
        RespValue::ok()
    }

    fn name(&self) -> &'static str {
        "SET"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// SETNX command - Set a key only if it does not exist
///
/// Syntax: SETNX key value
pub struct SetNxCommand;

impl Command for SetNxCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let inserted = db.put_if_absent(args[0].clone(), DataEntity::new(args[1].clone()));
        if inserted > 0 {
            db.add_aof(to_cmd_line("setnx", args));
        }
        RespValue::integer(inserted as i64)
    }

    fn name(&self) -> &'static str {
        "SETNX"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// GET command - Get the value of a key
///
/// Syntax: GET key
pub struct GetCommand;

impl Command for GetCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        match db.get_entity(&args[0]) {
            Some(entity) => RespValue::bulk_string(entity.data.clone()),
            None => RespValue::null(),
        }
    }

    fn name(&self) -> &'static str {
        "GET"
    }

    fn arity(&self) -> i32 {
        1
    }
}

/// GETSET command - Set a key and return its previous value
///
/// Syntax: GETSET key value
pub struct GetSetCommand;

impl Command for GetSetCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let old = db.get_entity(&args[0]);
        db.put_entity(args[0].clone(), DataEntity::new(args[1].clone()));
        db.add_aof(to_cmd_line("set", args));

        match old {
            Some(entity) => RespValue::bulk_string(entity.data.clone()),
            None => RespValue::null(),
        }
    }

    fn name(&self) -> &'static str {
        "GETSET"
    }

    fn arity(&self) -> i32 {
        2
    }

    fn is_write(&self) -> bool {
        true
    }

    fn is_read_modify_write(&self) -> bool {
        true
    }
}

/// STRLEN command - Length of the value stored at key
///
/// Syntax: STRLEN key
pub struct StrLenCommand;

impl Command for StrLenCommand {
    fn execute(&self, db: &Db, args: &[Bytes]) -> RespValue {
        let len = db.get_entity(&args[0]).map_or(0, |entity| entity.data.len());
        RespValue::integer(len as i64)
    }

    fn name(&self) -> &'static str {
        "STRLEN"
    }

    fn arity(&self) -> i32 {
        1
    }
}
