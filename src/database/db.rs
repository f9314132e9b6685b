//! A single indexed database
//!
//! Validates one command line against the registry, runs the handler and
//! hands successful writes to the durability hook.

use crate::commands::{validate_arity, CommandRegistry};
use crate::protocol::{CmdLine, RespValue};
use crate::store::{DataEntity, Dict, ShardedDict};
use bytes::Bytes;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Durability hook, called with every successfully executed write
pub type AofCallback = Arc<dyn Fn(usize, CmdLine) + Send + Sync>;

/// One database: an index, a keyspace and an optional durability hook
pub struct Db {
    index: usize,
    data: Box<dyn Dict>,
    commands: Arc<CommandRegistry>,
    add_aof: Option<AofCallback>,

    /// Plain writes share it; read-modify-write commands hold it exclusively.
    /// Every write holds it exclusively while a durability hook is attached,
    /// so the hook sees writes in the order they were applied.
    write_order: RwLock<()>,
}

impl Db {
    /// Create an empty database backed by a `ShardedDict`
    pub fn new(index: usize, commands: Arc<CommandRegistry>) -> Self {
        Self::with_dict(index, commands, Box::new(ShardedDict::new()))
    }

    /// Create a database over a caller-provided keyspace
    pub fn with_dict(index: usize, commands: Arc<CommandRegistry>, data: Box<dyn Dict>) -> Self {
        Db {
            index,
            data,
            commands,
            add_aof: None,
            write_order: RwLock::new(()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Attach the durability hook
    pub fn set_aof(&mut self, callback: AofCallback) {
        self.add_aof = Some(callback);
    }

    /// Execute one command line (name included)
    pub fn exec(&self, cmd_line: &[Bytes]) -> RespValue {
        let Some(name) = cmd_line.first() else {
            return RespValue::error("ERR empty command");
        };
        let cmd_name = String::from_utf8_lossy(name).to_lowercase();

        let command = match self.commands.get(&cmd_name) {
            Some(cmd) => cmd,
            None => {
                warn!("Unknown command: '{}'", cmd_name);
                return RespValue::error(format!("ERR unknown command '{}'", cmd_name));
            }
        };

        let args = &cmd_line[1..];
        if !validate_arity(command.arity(), args.len()) {
            return RespValue::wrong_arity(&cmd_name);
        }

        debug!("db{} executing {}", self.index, cmd_name);

        let mut _exclusive = None;
        let mut _shared = None;
        if command.is_write() {
            if self.add_aof.is_some() || command.is_read_modify_write() {
                _exclusive = Some(self.write_order.write().unwrap_or_else(PoisonError::into_inner));
            } else {
                _shared = Some(self.write_order.read().unwrap_or_else(PoisonError::into_inner));
            }
        }

        command.execute(self, args)
    }

    /// Record a write for replay after restart
    pub fn add_aof(&self, cmd_line: CmdLine) {
        if let Some(ref add_aof) = self.add_aof {
            add_aof(self.index, cmd_line);
        }
    }

    /* ---- Data Access ----- */

    pub fn get_entity(&self, key: &[u8]) -> Option<Arc<DataEntity>> {
        self.data.get(key)
    }

    pub fn put_entity(&self, key: Bytes, entity: DataEntity) -> usize {
        self.data.put(key, Arc::new(entity))
    }

    pub fn put_if_exists(&self, key: Bytes, entity: DataEntity) -> usize {
        self.data.put_if_exists(key, Arc::new(entity))
    }

    pub fn put_if_absent(&self, key: Bytes, entity: DataEntity) -> usize {
        self.data.put_if_absent(key, Arc::new(entity))
    }

    pub fn remove(&self, key: &[u8]) -> usize {
        self.data.remove(key)
    }

    /// Remove the given keys, returning how many existed
    pub fn removes(&self, keys: &[Bytes]) -> usize {
        self.data.removes(keys)
    }

    pub fn flush(&self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.data.keys()
    }

    pub fn for_each(&self, visitor: &mut dyn FnMut(&Bytes, &Arc<DataEntity>) -> bool) {
        self.data.for_each(visitor)
    }

    pub fn random_keys(&self, limit: usize) -> Vec<Bytes> {
        self.data.random_keys(limit)
    }

    pub fn random_distinct_keys(&self, limit: usize) -> Vec<Bytes> {
        self.data.random_distinct_keys(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cmd_line;
    use std::sync::Mutex as StdMutex;

    fn db() -> Db {
        Db::new(0, Arc::new(CommandRegistry::new()))
    }

    #[test]
    fn test_unknown_command_any_case() {
        let db = db();
        for name in ["nosuch", "NOSUCH", "NoSuch"] {
            let reply = db.exec(&cmd_line([name, "k"]));
            assert_eq!(reply, RespValue::error("ERR unknown command 'nosuch'"));
        }
        assert!(db.is_empty());
    }

    #[test]
    fn test_wrong_arity_skips_handler() {
        let db = db();
        let reply = db.exec(&cmd_line(["SET", "k"]));
        assert_eq!(reply, RespValue::wrong_arity("set"));
        assert!(db.get_entity(b"k").is_none());

        let reply = db.exec(&cmd_line(["DEL"]));
        assert_eq!(reply, RespValue::wrong_arity("del"));
    }

    #[test]
    fn test_writes_reach_aof_in_order() {
        let log: Arc<StdMutex<Vec<(usize, CmdLine)>>> = Arc::default();
        let sink = log.clone();

        let mut db = Db::new(3, Arc::new(CommandRegistry::new()));
        assert_eq!(db.index(), 3);
        db.set_aof(Arc::new(move |index, line| {
            sink.lock().unwrap().push((index, line));
        }));

        db.exec(&cmd_line(["SET", "a", "1"]));
        db.exec(&cmd_line(["GET", "a"]));
        db.exec(&cmd_line(["DEL", "a", "missing"]));
        db.exec(&cmd_line(["DEL", "missing"]));

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                (3, cmd_line(["set", "a", "1"])),
                (3, cmd_line(["del", "a", "missing"])),
            ]
        );
    }

    #[test]
    fn test_rename_never_loses_a_concurrent_set() {
        const KEYS: usize = 2000;
        let db = db();
        for i in 0..KEYS {
            db.exec(&cmd_line(["SET", format!("src{}", i).as_str(), "old"]));
        }

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..KEYS {
                    db.exec(&cmd_line(["RENAME", format!("src{}", i).as_str(), format!("dst{}", i).as_str()]));
                }
            });
            scope.spawn(|| {
                for i in 0..KEYS {
                    db.exec(&cmd_line(["SET", format!("src{}", i).as_str(), "new"]));
                }
            });
        });

        // SET either ran before RENAME (moved to dst) or after it (still in src)
        for i in 0..KEYS {
            let src = db.get_entity(format!("src{}", i).as_bytes());
            let dst = db.get_entity(format!("dst{}", i).as_bytes()).map(|e| e.data.clone());
            match src {
                Some(entity) => assert_eq!(entity.data, Bytes::from("new")),
                None => assert_eq!(dst, Some(Bytes::from("new")), "SET on src{} was lost", i),
            }
        }
    }

    #[test]
    fn test_entity_access() {
        let db = db();
        assert_eq!(db.put_if_absent(Bytes::from("k"), DataEntity::new("v")), 1);
        assert_eq!(db.put_if_exists(Bytes::from("k"), DataEntity::new("w")), 1);
        assert_eq!(db.get_entity(b"k").unwrap().data, Bytes::from("w"));
        assert_eq!(db.removes(&[Bytes::from("k"), Bytes::from("x")]), 1);
        assert!(db.is_empty());
    }
}
