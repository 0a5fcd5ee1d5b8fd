//! Write-ahead log — append-only per-symbol event journal
//!
//! # Binary Format (per record)
//! ```text
//! [len:   u32]  // payload length in bytes
//! [seq:   u64]  // per-symbol monotonic event sequence
//! [ts_ns: u64]  // event timestamp, Unix nanos
//! [payload bytes]
//! ```
//! All integers little-endian. The payload is the JSON-encoded event.
//!
//! Files rotate by size (`wal-<symbol>-NNNNNN.bin`). A truncated record at
//! the tail of the last file is a crash artifact and terminates reading
//! cleanly; an implausible length is reported as corruption.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::market::Symbol;

/// Fixed record header size: len (4) + seq (8) + ts_ns (8).
pub const HEADER_LEN: usize = 20;

/// Reject record lengths beyond this as corruption rather than trying to
/// allocate them.
const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("sequence error: expected {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },

    #[error("corruption at byte offset {offset}: {detail}")]
    Corruption { offset: u64, detail: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ── Record ──────────────────────────────────────────────────────────

/// One WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub seq: u64,
    pub ts_ns: u64,
    pub payload: Vec<u8>,
}

impl WalRecord {
    pub fn new(seq: u64, ts_ns: u64, payload: Vec<u8>) -> Self {
        Self { seq, ts_ns, payload }
    }

    /// Serialize to the binary wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.ts_ns.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Deserialize from the binary wire format.
    ///
    /// Returns `(record, bytes_consumed)`, `Ok(None)` when `data` holds an
    /// incomplete record (truncated tail), or an error on implausible
    /// lengths.
    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Option<(Self, usize)>, WalError> {
        if data.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_le_bytes(data[0..4].try_into().expect("4-byte slice")) as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(WalError::Corruption {
                offset,
                detail: format!("implausible payload length {}", len),
            });
        }

        let total = HEADER_LEN + len;
        if data.len() < total {
            return Ok(None);
        }

        let seq = u64::from_le_bytes(data[4..12].try_into().expect("8-byte slice"));
        let ts_ns = u64::from_le_bytes(data[12..20].try_into().expect("8-byte slice"));
        let payload = data[HEADER_LEN..total].to_vec();

        Ok(Some((Self { seq, ts_ns, payload }, total)))
    }
}

// ── Flush / Fsync Policies ──────────────────────────────────────────

/// Controls when buffered data is flushed to the OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// Controls when `fsync` (durable write) is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    OnRotation,
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for one symbol's WAL.
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub dir: PathBuf,
    /// File name prefix, derived from the symbol.
    pub prefix: String,
    /// Maximum file size in bytes before rotation.
    pub max_file_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl WalConfig {
    pub fn for_symbol(dir: impl Into<PathBuf>, symbol: &Symbol) -> Self {
        Self {
            dir: dir.into(),
            prefix: format!("wal-{}", symbol.as_str().replace('/', "-")),
            max_file_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryN(64),
        }
    }
}

// ── Writer ──────────────────────────────────────────────────────────

/// Append-only WAL writer with rotation and seq gap validation.
pub struct WalWriter {
    config: WalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_seq: u64,
    file_index: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
}

impl WalWriter {
    /// Open a writer, creating the directory if needed and continuing
    /// after the highest existing file index.
    pub fn open(config: WalConfig) -> Result<Self, WalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = Self::latest_index(&config.dir, &config.prefix);
        let current_file = Self::wal_path(&config.dir, &config.prefix, file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_seq: 0,
            file_index,
            writes_since_flush: 0,
            writes_since_fsync: 0,
        })
    }

    /// Set the next expected sequence number (after recovery).
    pub fn set_next_seq(&mut self, seq: u64) {
        self.next_seq = seq;
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Append one record, validating sequence gaplessness.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        if self.next_seq > 0 && record.seq != self.next_seq {
            return Err(WalError::Sequence {
                expected: self.next_seq,
                got: record.seq,
            });
        }

        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let bytes = record.to_bytes();
        self.writer.write_all(&bytes)?;
        self.current_file_size += bytes.len() as u64;
        self.next_seq = record.seq + 1;
        self.writes_since_flush += 1;
        self.writes_since_fsync += 1;

        self.apply_flush_policy()?;
        self.apply_fsync_policy()?;
        Ok(())
    }

    /// Force flush + fsync (shutdown, rotation).
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    fn apply_flush_policy(&mut self) -> Result<(), WalError> {
        let should_flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        if should_flush {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), WalError> {
        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_fsync {
            self.writer.flush()?;
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), WalError> {
        self.sync()?;

        self.file_index += 1;
        self.current_file = Self::wal_path(&self.config.dir, &self.config.prefix, self.file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;
        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        tracing::info!(file = %self.current_file.display(), "rotated WAL file");
        Ok(())
    }

    fn wal_path(dir: &Path, prefix: &str, index: u64) -> PathBuf {
        dir.join(format!("{}-{:06}.bin", prefix, index))
    }

    fn latest_index(dir: &Path, prefix: &str) -> u64 {
        Self::indexed_files(dir, prefix)
            .last()
            .map(|(index, _)| *index)
            .unwrap_or(0)
    }

    fn indexed_files(dir: &Path, prefix: &str) -> Vec<(u64, PathBuf)> {
        let mut files: Vec<(u64, PathBuf)> = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let name = e.file_name().to_string_lossy().to_string();
                        let index = name
                            .strip_prefix(prefix)?
                            .strip_prefix('-')?
                            .strip_suffix(".bin")?
                            .parse::<u64>()
                            .ok()?;
                        Some((index, e.path()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        files.sort_by_key(|(index, _)| *index);
        files
    }
}

// ── Reader ──────────────────────────────────────────────────────────

/// Sequential WAL reader across rotated files.
///
/// Stops cleanly at a truncated tail record; validates that sequence
/// numbers are gapless and monotonic.
pub struct WalReader {
    files: Vec<PathBuf>,
    current_file_idx: usize,
    data: Vec<u8>,
    pos: usize,
    global_offset: u64,
    last_seq: Option<u64>,
    truncated_tail: bool,
}

impl WalReader {
    /// Open a reader over all files with the given prefix, in index order.
    pub fn open(dir: &Path, prefix: &str) -> Result<Self, WalError> {
        let files = WalWriter::indexed_files(dir, prefix)
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        let mut reader = Self {
            files,
            current_file_idx: 0,
            data: Vec::new(),
            pos: 0,
            global_offset: 0,
            last_seq: None,
            truncated_tail: false,
        };
        reader.load_current_file()?;
        Ok(reader)
    }

    pub fn open_for_symbol(dir: &Path, symbol: &Symbol) -> Result<Self, WalError> {
        let prefix = format!("wal-{}", symbol.as_str().replace('/', "-"));
        Self::open(dir, &prefix)
    }

    /// Read the next record, or `None` when the log is exhausted.
    pub fn next_record(&mut self) -> Result<Option<WalRecord>, WalError> {
        loop {
            if self.truncated_tail {
                return Ok(None);
            }
            if self.pos >= self.data.len() {
                if !self.advance_file()? {
                    return Ok(None);
                }
                continue;
            }

            match WalRecord::from_bytes(&self.data[self.pos..], self.global_offset)? {
                Some((record, consumed)) => {
                    self.pos += consumed;
                    self.global_offset += consumed as u64;

                    if let Some(last) = self.last_seq {
                        if record.seq != last + 1 {
                            return Err(WalError::Sequence {
                                expected: last + 1,
                                got: record.seq,
                            });
                        }
                    }
                    self.last_seq = Some(record.seq);
                    return Ok(Some(record));
                }
                None => {
                    // Partial record: only acceptable at the very end of
                    // the last file (crash artifact).
                    if self.current_file_idx + 1 < self.files.len() {
                        return Err(WalError::Corruption {
                            offset: self.global_offset,
                            detail: "partial record before end of log".into(),
                        });
                    }
                    tracing::warn!(
                        offset = self.global_offset,
                        "truncated WAL tail, stopping replay"
                    );
                    self.truncated_tail = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Read everything remaining.
    pub fn read_all(&mut self) -> Result<Vec<WalRecord>, WalError> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Last successfully read sequence number.
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    fn load_current_file(&mut self) -> Result<(), WalError> {
        self.data.clear();
        self.pos = 0;
        if let Some(path) = self.files.get(self.current_file_idx) {
            File::open(path)?.read_to_end(&mut self.data)?;
        }
        Ok(())
    }

    fn advance_file(&mut self) -> Result<bool, WalError> {
        if self.current_file_idx + 1 >= self.files.len() {
            return Ok(false);
        }
        self.current_file_idx += 1;
        self.load_current_file()?;
        Ok(true)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
