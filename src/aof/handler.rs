//! AOF handler
//!
//! Databases enqueue writes through `add_aof`; a dedicated thread drains the
//! queue into the AOF file. A single queue feeds a single writer, so records
//! land on disk in enqueue order.

use super::{AofConfig, AofEntry, AofWriter};
use crate::protocol::CmdLine;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long the writer waits for new entries before syncing anyway
const IDLE_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on entries written between two commits
const MAX_BATCH: usize = 1024;

enum AofMessage {
    Entry(AofEntry),
    Shutdown,
}

/// Handle on the background AOF writer
pub struct AofHandler {
    tx: Sender<AofMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AofHandler {
    /// Open the AOF file and start the writer thread
    pub fn new(config: &AofConfig) -> anyhow::Result<Self> {
        let writer = AofWriter::new(&config.path, config.sync_policy)?;
        let (tx, rx) = mpsc::channel();

        let worker = std::thread::Builder::new()
            .name("aof-writer".to_string())
            .spawn(move || Self::run_writer(writer, rx))?;

        info!("AOF writer started at {:?} ({:?})", config.path, config.sync_policy);

        Ok(AofHandler {
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Enqueue a write command executed against `db_index`
    pub fn add_aof(&self, db_index: usize, cmd_line: CmdLine) {
        let entry = AofEntry::new(db_index, cmd_line);
        if self.tx.send(AofMessage::Entry(entry)).is_err() {
            warn!("AOF writer stopped, dropping write for db{}", db_index);
        }
    }

    /// Flush pending entries and stop the writer
    pub fn close(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            let _ = self.tx.send(AofMessage::Shutdown);
            if worker.join().is_err() {
                error!("AOF writer thread panicked");
            }
            info!("AOF writer stopped");
        }
    }

    fn run_writer(mut writer: AofWriter, rx: mpsc::Receiver<AofMessage>) {
        loop {
            let first = match rx.recv_timeout(IDLE_SYNC_INTERVAL) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = writer.commit() {
                        error!("AOF sync failed: {}", e);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let mut shutdown = false;
            let mut pending = Some(first);
            let mut written = 0;

            while let Some(message) = pending.take() {
                match message {
                    AofMessage::Entry(entry) => {
                        if let Err(e) = writer.write(&entry) {
                            error!("AOF write failed: {}", e);
                        }
                        written += 1;
                    }
                    AofMessage::Shutdown => {
                        shutdown = true;
                        break;
                    }
                }
                if written < MAX_BATCH {
                    pending = rx.try_recv().ok();
                }
            }

            if let Err(e) = writer.commit() {
                error!("AOF commit failed: {}", e);
            }
            if shutdown {
                break;
            }
        }

        if let Err(e) = writer.sync() {
            error!("AOF final sync failed: {}", e);
        }
    }
}

impl Drop for AofHandler {
    fn drop(&mut self) {
        self.close();
    }
}
