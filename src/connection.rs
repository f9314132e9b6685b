//! Client session capability
//!
//! The selected database is per-session state owned by whoever holds the
//! transport; databases only read and update it through this trait.

/// Session state visible to command execution
pub trait Connection: Send {
    /// Currently selected database index
    fn db_index(&self) -> usize;

    /// Select another database for subsequent commands
    fn select_db(&mut self, index: usize);
}

/// Plain session state, used by client connections and by AOF replay
#[derive(Debug, Default, Clone)]
pub struct Session {
    db_index: usize,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn with_db(db_index: usize) -> Self {
        Session { db_index }
    }
}

impl Connection for Session {
    fn db_index(&self) -> usize {
        self.db_index
    }

    fn select_db(&mut self, index: usize) {
        self.db_index = index;
    }
}
