//! AOF entry format
//!
//! Binary format (little endian):
//! [db_index(u32)] [argc(u32)] ([arg_len(u32)] [arg_bytes])* [checksum(u64)]

use crate::protocol::CmdLine;
use bytes::Bytes;

/// Fixed part of a record: db index, argc and checksum
const MIN_RECORD_LEN: usize = 4 + 4 + 8;

/// One recorded write command
#[derive(Debug, Clone, PartialEq)]
pub struct AofEntry {
    /// Database the command ran against
    pub db_index: u32,
    /// Full command line, name included
    pub cmd_line: CmdLine,
}

impl AofEntry {
    pub fn new(db_index: usize, cmd_line: CmdLine) -> Self {
        AofEntry {
            db_index: db_index as u32,
            cmd_line,
        }
    }

    /// Serialize to bytes with checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload: usize = self.cmd_line.iter().map(|arg| 4 + arg.len()).sum();
        let mut buf = Vec::with_capacity(MIN_RECORD_LEN + payload);

        buf.extend_from_slice(&self.db_index.to_le_bytes());
        buf.extend_from_slice(&(self.cmd_line.len() as u32).to_le_bytes());
        for arg in &self.cmd_line {
            buf.extend_from_slice(&(arg.len() as u32).to_le_bytes());
            buf.extend_from_slice(arg);
        }

        // xxhash64 of all previous bytes
        let checksum = xxhash_rust::xxh64::xxh64(&buf, 0);
        buf.extend_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Deserialize one record, returning it with its encoded size
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), String> {
        if data.len() < MIN_RECORD_LEN {
            return Err("Insufficient data".to_string());
        }

        let mut pos = 0;
        let db_index = read_u32(data, &mut pos).ok_or("Missing db index")?;
        let argc = read_u32(data, &mut pos).ok_or("Missing argument count")? as usize;

        let mut cmd_line = Vec::with_capacity(argc.min(64));
        for _ in 0..argc {
            let len = read_u32(data, &mut pos).ok_or("Missing argument length")? as usize;
            if pos + len > data.len() {
                return Err("Truncated argument".to_string());
            }
            cmd_line.push(Bytes::copy_from_slice(&data[pos..pos + len]));
            pos += len;
        }

        if pos + 8 > data.len() {
            return Err("Missing checksum".to_string());
        }
        let stored_checksum = u64::from_le_bytes(
            data[pos..pos + 8].try_into().map_err(|_| "Invalid checksum")?,
        );

        let calculated_checksum = xxhash_rust::xxh64::xxh64(&data[..pos], 0);
        if stored_checksum != calculated_checksum {
            return Err(format!(
                "Checksum mismatch: expected {}, got {}",
                stored_checksum, calculated_checksum
            ));
        }

        Ok((AofEntry { db_index, cmd_line }, pos + 8))
    }
}

fn read_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
    let bytes = data.get(*pos..*pos + 4)?;
    *pos += 4;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cmd_line;

    #[test]
    fn test_serialize_deserialize() {
        let entry = AofEntry::new(5, cmd_line(["set", "mykey", "myvalue"]));

        let bytes = entry.to_bytes();
        let (decoded, size) = AofEntry::from_bytes(&bytes).unwrap();

        assert_eq!(size, bytes.len());
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_checksum_validation() {
        let entry = AofEntry::new(0, cmd_line(["set", "key", "value"]));
        let mut bytes = entry.to_bytes();

        // Corrupt one argument byte
        bytes[14] ^= 0xFF;

        let result = AofEntry::from_bytes(&bytes);
        assert!(result.unwrap_err().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_record() {
        let bytes = AofEntry::new(0, cmd_line(["del", "key"])).to_bytes();
        assert!(AofEntry::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }
}
