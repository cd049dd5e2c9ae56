//! Durable audit journal
//!
//! An optional append-only mirror of every audit row, one JSON record
//! per line with a CRC32 checksum, synced to disk before the append
//! returns. The journal is an observability surface: journal failure is
//! reported to the caller but must never decide engine outcomes, and
//! nothing in the engine reads it back.
//!
//! Line format:
//!
//! ```text
//! <json record> '\t' <crc32 of the json bytes, lowercase hex> '\n'
//! ```
//!
//! Any checksum mismatch on read is corruption and fails the read.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crc32fast::Hasher;

use super::record::Audit;

/// Append-only audit journal
pub trait Journal: Send + Sync {
    /// Append one record; durable before return
    fn append(&self, audit: &Audit) -> io::Result<()>;

    /// Sync the journal to durable storage
    fn sync(&self) -> io::Result<()>;
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// File-backed journal: one checksummed JSON line per audit
pub struct FileJournal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileJournal {
    /// Open or create a journal file
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FileJournal {
    fn append(&self, audit: &Audit) -> io::Result<()> {
        let json = serde_json::to_string(audit)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let crc = checksum(json.as_bytes());
        let mut writer = self.writer.lock().unwrap();
        writeln!(writer, "{}\t{:08x}", json, crc)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    fn sync(&self) -> io::Result<()> {
        let writer = self.writer.lock().unwrap();
        writer.get_ref().sync_all()
    }
}

/// Read a journal file back, verifying every checksum.
///
/// Returns `InvalidData` on the first malformed or corrupt line.
pub fn read_journal(path: impl AsRef<Path>) -> io::Result<Vec<Audit>> {
    let corrupt = |line_no: usize, reason: &str| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("journal line {}: {}", line_no, reason),
        )
    };

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let (json, crc_text) = line
            .rsplit_once('\t')
            .ok_or_else(|| corrupt(line_no, "missing checksum"))?;
        let expected = u32::from_str_radix(crc_text, 16)
            .map_err(|_| corrupt(line_no, "malformed checksum"))?;
        if checksum(json.as_bytes()) != expected {
            return Err(corrupt(line_no, "checksum mismatch"));
        }
        let audit: Audit =
            serde_json::from_str(json).map_err(|_| corrupt(line_no, "malformed record"))?;
        records.push(audit);
    }
    Ok(records)
}

/// In-memory journal for tests
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<Audit>>,
}

impl MemoryJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// All appended records
    pub fn records(&self) -> Vec<Audit> {
        self.records.lock().unwrap().clone()
    }

    /// Number of appended records
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Journal for MemoryJournal {
    fn append(&self, audit: &Audit) -> io::Result<()> {
        self.records.lock().unwrap().push(audit.clone());
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}
