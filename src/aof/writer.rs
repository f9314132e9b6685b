//! AOF writer
//!
//! Appends encoded entries to the AOF file and applies the sync policy.
//! Owned by the single background writer, so it needs no locking.

use super::{AofEntry, SyncPolicy};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// AOF writer
pub struct AofWriter {
    file: BufWriter<File>,
    sync_policy: SyncPolicy,
    last_sync: Instant,
}

impl AofWriter {
    /// Open (or create) the AOF file in append mode
    pub fn new<P: AsRef<Path>>(path: P, sync_policy: SyncPolicy) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        Ok(AofWriter {
            file: BufWriter::new(file),
            sync_policy,
            last_sync: Instant::now(),
        })
    }

    /// Cut the file at `len`, dropping an unreadable tail before appending
    pub fn truncate<P: AsRef<Path>>(path: P, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    /// Buffer an entry; `commit` makes it durable per the sync policy
    pub fn write(&mut self, entry: &AofEntry) -> io::Result<()> {
        self.file.write_all(&entry.to_bytes())
    }

    /// Flush buffered entries and sync if the policy asks for it
    pub fn commit(&mut self) -> io::Result<()> {
        self.file.flush()?;

        match self.sync_policy {
            SyncPolicy::Always => self.sync()?,
            SyncPolicy::EverySecond => {
                if self.last_sync.elapsed() >= Duration::from_secs(1) {
                    self.sync()?;
                }
            }
            SyncPolicy::No => {}
        }

        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        self.last_sync = Instant::now();
        Ok(())
    }
}
