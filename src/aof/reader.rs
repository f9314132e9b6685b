//! AOF reader
//!
//! Loads the AOF file and decodes its records for replay.

use super::AofEntry;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// AOF reader
pub struct AofReader {
    data: Vec<u8>,
}

impl AofReader {
    /// Load AOF file
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(AofReader {
            data: fs::read(path)?,
        })
    }

    /// Parse all entries from the AOF
    ///
    /// Decoding stops at the first truncated or corrupt record: a crash in
    /// the middle of an append leaves a partial tail, and everything before
    /// it is still valid.
    pub fn parse_entries(&self) -> Vec<AofEntry> {
        self.parse_valid_prefix().0
    }

    /// Entries of the readable prefix, with the prefix length in bytes
    pub fn parse_valid_prefix(&self) -> (Vec<AofEntry>, usize) {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < self.data.len() {
            match AofEntry::from_bytes(&self.data[pos..]) {
                Ok((entry, size)) => {
                    entries.push(entry);
                    pos += size;
                }
                Err(e) => {
                    warn!(
                        "AOF record at offset {} unreadable ({}), ignoring the last {} bytes",
                        pos,
                        e,
                        self.data.len() - pos
                    );
                    break;
                }
            }
        }

        info!("AOF loaded: {} entries", entries.len());
        (entries, pos)
    }

    /// Size of the loaded file in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aof::{AofWriter, SyncPolicy};
    use crate::protocol::cmd_line;
    use std::io::Write;

    #[test]
    fn test_load_stops_at_torn_tail() {
        let temp_file = std::env::temp_dir().join("ferrum_cluster_test_reader.aof");
        let _ = fs::remove_file(&temp_file);

        let mut writer = AofWriter::new(&temp_file, SyncPolicy::Always).unwrap();
        writer.write(&AofEntry::new(0, cmd_line(["set", "key1", "value1"]))).unwrap();
        writer.write(&AofEntry::new(2, cmd_line(["set", "key2", "value2"]))).unwrap();
        writer.commit().unwrap();
        drop(writer);

        // Half-written third record
        let partial = AofEntry::new(0, cmd_line(["del", "key1"])).to_bytes();
        let mut file = fs::OpenOptions::new().append(true).open(&temp_file).unwrap();
        file.write_all(&partial[..partial.len() / 2]).unwrap();
        drop(file);

        let reader = AofReader::load(&temp_file).unwrap();
        let entries = reader.parse_entries();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cmd_line[1], "key1");
        assert_eq!(entries[1].db_index, 2);

        let (_, valid) = reader.parse_valid_prefix();
        assert_eq!(valid, reader.len() - partial.len() / 2);

        fs::remove_file(&temp_file).unwrap();
    }
}
