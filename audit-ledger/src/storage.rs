//! Durable chain storage
//!
//! # Files
//!
//! - `audit_chain.json.gz` - gzip-compressed JSON document holding the full chain
//! - `audit_chain.json.gz.{pid}.{seq}.tmp` - staging file, renamed over the chain
//!   file on persist. Every write gets its own name, so two writers never
//!   share a staging file
//! - `audit_chain.json.gz.unreadable_{ts}` - a chain file that failed to load,
//!   moved aside so the next persist cannot overwrite it
//! - `corruption_report_{ts}.json` - one report per detected corruption event
//!
//! Persist writes the staging file, fsyncs it and renames it into place, so a
//! crash mid-write leaves the previous chain file intact. Readers that already
//! opened the old file (backup copies) keep a consistent snapshot.

use crate::{
    error::{Error, Result},
    types::LedgerEntry,
};
use chrono::Utc;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default chain file name
pub const CHAIN_FILE_NAME: &str = "audit_chain.json.gz";

/// On-disk format version
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ChainDocumentRef<'a> {
    format_version: u32,
    entries: &'a [LedgerEntry],
}

#[derive(Deserialize)]
struct ChainDocument {
    format_version: u32,
    entries: Vec<LedgerEntry>,
}

/// Result of loading the chain at startup
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Loaded entries (empty on a fresh or unreadable store)
    pub entries: Vec<LedgerEntry>,

    /// Set when the chain file existed but could not be read
    pub warning: Option<String>,

    /// Where the unreadable chain file was moved
    pub set_aside: Option<PathBuf>,
}

/// File-backed chain store
#[derive(Debug, Clone)]
pub struct ChainStore {
    path: PathBuf,
}

impl ChainStore {
    /// Store for the chain file at `path`; creates the parent directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    /// Chain file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a chain file has been persisted
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the full chain. A missing file is an empty chain.
    pub fn load(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_chain_file(&self.path)
    }

    /// Startup load. An unreadable chain file is renamed to
    /// `{chain}.unreadable_{ts}` and the chain starts empty with a warning.
    ///
    /// Fails only when the unreadable file cannot be moved out of the way.
    pub fn load_or_empty(&self) -> Result<LoadOutcome> {
        match self.load() {
            Ok(entries) => {
                tracing::info!(
                    path = %self.path.display(),
                    entries = entries.len(),
                    "Loaded audit chain"
                );
                Ok(LoadOutcome {
                    entries,
                    warning: None,
                    set_aside: None,
                })
            }
            Err(e) => {
                let aside = self.move_aside()?;
                let warning = format!(
                    "Failed to load chain from {}: {}; moved to {}, starting with an empty chain",
                    self.path.display(),
                    e,
                    aside.display()
                );
                tracing::warn!("{}", warning);
                Ok(LoadOutcome {
                    entries: Vec::new(),
                    warning: Some(warning),
                    set_aside: Some(aside),
                })
            }
        }
    }

    fn move_aside(&self) -> Result<PathBuf> {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CHAIN_FILE_NAME.into());
        name.push(format!(".unreadable_{}", Utc::now().format("%Y%m%d_%H%M%S_%6f")));
        let aside = self.path.with_file_name(name);

        fs::rename(&self.path, &aside).map_err(|e| {
            Error::Storage(format!(
                "chain file {} is unreadable and could not be moved aside: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(aside)
    }

    /// Atomically replace the chain file with `entries`
    pub fn save(&self, entries: &[LedgerEntry]) -> Result<()> {
        write_chain_file(&self.path, entries)?;
        tracing::debug!(
            path = %self.path.display(),
            entries = entries.len(),
            "Chain persisted"
        );
        Ok(())
    }

    /// Size of the chain file in bytes (0 when absent)
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}

/// Decode a chain file
pub fn read_chain_file(path: &Path) -> Result<Vec<LedgerEntry>> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let document: ChainDocument = serde_json::from_reader(decoder)
        .map_err(|e| Error::Storage(format!("corrupt chain file {}: {}", path.display(), e)))?;

    if document.format_version != FORMAT_VERSION {
        return Err(Error::Storage(format!(
            "unsupported chain format version {} in {}",
            document.format_version,
            path.display()
        )));
    }

    Ok(document.entries)
}

/// Encode a chain file via write-to-temp + fsync + rename
pub fn write_chain_file(path: &Path, entries: &[LedgerEntry]) -> Result<()> {
    let tmp_path = staging_path(path);
    let written = write_document(&tmp_path, entries)
        .and_then(|()| fs::rename(&tmp_path, path).map_err(Error::from));
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}

fn write_document(tmp_path: &Path, entries: &[LedgerEntry]) -> Result<()> {
    {
        let file = File::create(tmp_path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(
            &mut encoder,
            &ChainDocumentRef {
                format_version: FORMAT_VERSION,
                entries,
            },
        )?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::Storage(format!("flush {}: {}", tmp_path.display(), e)))?;
        file.sync_all()?;
    }
    Ok(())
}

/// Sibling path for staging a write to `path`, unique per call
pub fn staging_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| CHAIN_FILE_NAME.into());
    name.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}
