//! Multi-database node
//!
//! A fixed array of databases plus the optional AOF handler. Owns database
//! selection and the node-level failure barrier.

use super::{panic_message, Database, Db};
use crate::aof::{AofConfig, AofHandler, AofReader, AofWriter};
use crate::commands::CommandRegistry;
use crate::connection::{Connection, Session};
use crate::protocol::RespValue;
use bytes::Bytes;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Number of databases when the configuration asks for zero
pub const DEFAULT_DATABASES: usize = 16;

/// All databases of one node
pub struct StandaloneDatabase {
    dbs: Vec<Db>,
    aof: Option<Arc<AofHandler>>,
}

impl StandaloneDatabase {
    /// Create `databases` empty databases without persistence
    pub fn new(databases: usize) -> Self {
        Self::with_registry(databases, Arc::new(CommandRegistry::new()))
    }

    /// Create `databases` empty databases executing the commands of `commands`
    pub fn with_registry(databases: usize, commands: Arc<CommandRegistry>) -> Self {
        let count = if databases == 0 { DEFAULT_DATABASES } else { databases };

        StandaloneDatabase {
            dbs: (0..count).map(|index| Db::new(index, commands.clone())).collect(),
            aof: None,
        }
    }

    /// Create the databases, replay the AOF if present, then start logging writes
    pub fn with_aof(databases: usize, config: &AofConfig) -> anyhow::Result<Self> {
        let mut database = Self::new(databases);
        if !config.enabled {
            return Ok(database);
        }

        if config.path.exists() {
            info!("Loading AOF from {:?}", config.path);
            let reader = AofReader::load(&config.path)?;
            let (entries, valid_len) = reader.parse_valid_prefix();
            let replayed = database.replay(entries.into_iter().map(|e| (e.db_index as usize, e.cmd_line)));
            info!("Replayed {} entries from AOF", replayed);

            // New records must follow the last readable one
            if valid_len < reader.len() {
                warn!(
                    "Discarding {} unreadable bytes at the end of {:?}",
                    reader.len() - valid_len,
                    config.path
                );
                AofWriter::truncate(&config.path, valid_len as u64)?;
            }
        }

        // Attached only after replay so replayed commands are not appended again
        let handler = Arc::new(AofHandler::new(config)?);
        for db in database.dbs.iter_mut() {
            let handler = handler.clone();
            db.set_aof(Arc::new(move |index, cmd_line| handler.add_aof(index, cmd_line)));
        }
        database.aof = Some(handler);

        Ok(database)
    }

    /// Re-execute recorded commands, returning how many succeeded
    fn replay<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (usize, Vec<Bytes>)>,
    {
        let mut session = Session::new();
        let mut replayed = 0;

        for (db_index, cmd_line) in entries {
            if db_index >= self.dbs.len() {
                warn!("AOF entry for db{} beyond configured databases, skipped", db_index);
                continue;
            }
            session.select_db(db_index);
            match self.exec_local(&mut session, &cmd_line) {
                RespValue::Error(e) => warn!("AOF entry failed to replay: {}", e),
                _ => replayed += 1,
            }
        }

        replayed
    }

    /// Execute a command line for a client session
    pub fn exec_local(&self, conn: &mut dyn Connection, cmd_line: &[Bytes]) -> RespValue {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(conn, cmd_line)));

        match result {
            Ok(reply) => reply,
            Err(payload) => {
                error!("Command panicked: {}", panic_message(payload.as_ref()));
                RespValue::unknown_error()
            }
        }
    }

    fn dispatch(&self, conn: &mut dyn Connection, cmd_line: &[Bytes]) -> RespValue {
        let Some(name) = cmd_line.first() else {
            return RespValue::error("ERR empty command");
        };

        if name.eq_ignore_ascii_case(b"select") {
            if cmd_line.len() != 2 {
                return RespValue::wrong_arity("select");
            }
            return self.exec_select(conn, &cmd_line[1]);
        }

        match self.dbs.get(conn.db_index()) {
            Some(db) => db.exec(cmd_line),
            None => RespValue::error("ERR DB index is out of range"),
        }
    }

    fn exec_select(&self, conn: &mut dyn Connection, arg: &Bytes) -> RespValue {
        let index = match std::str::from_utf8(arg).ok().and_then(|s| s.parse::<usize>().ok()) {
            Some(index) => index,
            None => return RespValue::error("ERR invalid DB index"),
        };

        if index >= self.dbs.len() {
            return RespValue::error("ERR DB index is out of range");
        }

        conn.select_db(index);
        RespValue::ok()
    }

    /// Database at `index`
    pub fn db(&self, index: usize) -> Option<&Db> {
        self.dbs.get(index)
    }

    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }
}

impl Database for StandaloneDatabase {
    fn exec<'a>(
        &'a self,
        conn: &'a mut dyn Connection,
        cmd_line: &'a [Bytes],
    ) -> impl Future<Output = RespValue> + Send + 'a {
        std::future::ready(self.exec_local(conn, cmd_line))
    }

    fn after_client_close(&self, _conn: &dyn Connection) {}

    fn close(&self) {
        if let Some(ref aof) = self.aof {
            aof.close();
        }
    }
}
