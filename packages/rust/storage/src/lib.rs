//! Deployment ledger: bounded publish history plus the current-pointer file.
//!
//! Two files live in the site's state directory:
//! - the ledger (`deployment-history.json`): JSON array of
//!   [`DeploymentRecord`], newest first, at most `capacity` entries
//! - the pointer (`ipfs-hash.txt`): the latest content id as plain text
//!
//! **Access rules:** a single writer per site is assumed. Every write is a
//! full overwrite through a temp file and a rename, so a concurrent reader
//! sees either the old or the new file, never a torn one. Two concurrent
//! writers can still lose one append.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use quillpin_shared::{ContentId, DeploymentRecord, PersistenceError};

type Result<T> = std::result::Result<T, PersistenceError>;

/// Handle on the ledger and pointer files of one site.
#[derive(Debug, Clone)]
pub struct DeploymentLedger {
    ledger_path: PathBuf,
    pointer_path: PathBuf,
    capacity: usize,
}

impl DeploymentLedger {
    /// A capacity of zero is treated as one so the head is always the latest publish.
    pub fn new(ledger_path: impl Into<PathBuf>, pointer_path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            ledger_path: ledger_path.into(),
            pointer_path: pointer_path.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn pointer_path(&self) -> &Path {
        &self.pointer_path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Point at `record`, then insert it at the head of the ledger and evict
    /// past capacity. The pointer is written even when the ledger cannot be.
    /// Returns the ledger length after the append.
    pub fn append(&self, record: &DeploymentRecord) -> Result<usize> {
        write_atomic(&self.pointer_path, record.content_id.as_str().as_bytes())?;

        let mut records = self.read()?;
        records.insert(0, record.clone());
        records.truncate(self.capacity);

        let json = serde_json::to_vec_pretty(&records).map_err(|e| PersistenceError::Corrupt {
            path: self.ledger_path.clone(),
            message: format!("failed to serialize ledger: {e}"),
        })?;
        write_atomic(&self.ledger_path, &json)?;

        info!(
            cid = %record.content_id,
            backend = %record.backend,
            entries = records.len(),
            "deployment recorded"
        );
        Ok(records.len())
    }

    /// Every record, newest first. A missing ledger file is an empty ledger.
    pub fn read(&self) -> Result<Vec<DeploymentRecord>> {
        let bytes = match std::fs::read(&self.ledger_path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.ledger_path.display(), "no ledger yet");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.ledger_path.clone(),
                    source,
                });
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
            path: self.ledger_path.clone(),
            message: e.to_string(),
        })
    }

    /// Newest record, if any.
    pub fn latest(&self) -> Result<Option<DeploymentRecord>> {
        Ok(self.read()?.into_iter().next())
    }

    /// Content id in the pointer file. Missing or blank file means none.
    pub fn current(&self) -> Result<Option<ContentId>> {
        match std::fs::read_to_string(&self.pointer_path) {
            Ok(text) => Ok(ContentId::new(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Read {
                path: self.pointer_path.clone(),
                source,
            }),
        }
    }
}

/// Write via `.<name>.tmp` in the same directory, then rename over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "quillpin".into());
    let temp = dir.join(format!(".{file_name}.tmp"));

    {
        let mut file = std::fs::File::create(&temp).map_err(write_err)?;
        file.write_all(contents).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
    }

    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(cid: &str, minute: u32) -> DeploymentRecord {
        DeploymentRecord {
            content_id: ContentId::new(cid).unwrap(),
            backend: "pinata".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).unwrap(),
            size_bytes: 1024,
            pinned: true,
            file_count: 3,
        }
    }

    fn ledger(dir: &Path, capacity: usize) -> DeploymentLedger {
        DeploymentLedger::new(
            dir.join("deployment-history.json"),
            dir.join("ipfs-hash.txt"),
            capacity,
        )
    }

    #[test]
    fn missing_files_read_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ledger(tmp.path(), 20);
        assert!(ledger.read().unwrap().is_empty());
        assert_eq!(ledger.current().unwrap(), None);
        assert_eq!(ledger.latest().unwrap(), None);
    }

    #[test]
    fn capacity_two_keeps_newest_two() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ledger(tmp.path(), 2);

        assert_eq!(ledger.append(&record("A", 1)).unwrap(), 1);
        assert_eq!(ledger.append(&record("B", 2)).unwrap(), 2);
        assert_eq!(ledger.append(&record("C", 3)).unwrap(), 2);

        let ids: Vec<_> = ledger
            .read()
            .unwrap()
            .into_iter()
            .map(|r| r.content_id.to_string())
            .collect();
        assert_eq!(ids, ["C", "B"]);
        assert_eq!(ledger.current().unwrap().unwrap().as_str(), "C");
    }

    #[test]
    fn head_is_always_latest_append() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ledger(tmp.path(), 20);
        for i in 0..25 {
            let cid = format!("Qm{i}");
            ledger.append(&record(&cid, i)).unwrap();
            let all = ledger.read().unwrap();
            assert!(all.len() <= 20);
            assert_eq!(all[0].content_id.as_str(), cid);
        }
        assert_eq!(ledger.read().unwrap().len(), 20);
    }

    #[test]
    fn pointer_file_is_plain_text() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ledger(tmp.path(), 20);
        ledger.append(&record("QmPlain", 0)).unwrap();
        let raw = std::fs::read_to_string(ledger.pointer_path()).unwrap();
        assert_eq!(raw, "QmPlain");
    }

    #[test]
    fn corrupt_ledger_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ledger(tmp.path(), 20);
        std::fs::write(ledger.ledger_path(), "{not json").unwrap();
        assert!(matches!(ledger.read(), Err(PersistenceError::Corrupt { .. })));
        // And appends refuse to overwrite it.
        assert!(ledger.append(&record("X", 0)).is_err());
        assert_eq!(
            std::fs::read_to_string(ledger.ledger_path()).unwrap(),
            "{not json"
        );
        assert_eq!(ledger.current().unwrap().unwrap().as_str(), "X");
    }

    #[test]
    fn corrupt_ledger_still_moves_pointer() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ledger(tmp.path(), 20);
        std::fs::write(ledger.pointer_path(), "QmOld").unwrap();
        std::fs::write(ledger.ledger_path(), "{not json").unwrap();

        let err = ledger.append(&record("QmNew", 0)).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
        assert_eq!(
            std::fs::read_to_string(ledger.pointer_path()).unwrap(),
            "QmNew"
        );
    }

    #[test]
    fn zero_capacity_still_keeps_head() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = ledger(tmp.path(), 0);
        ledger.append(&record("A", 0)).unwrap();
        ledger.append(&record("B", 1)).unwrap();
        let all = ledger.read().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content_id.as_str(), "B");
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested").join("out.md");
        write_atomic(&target, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        assert!(!tmp.path().join("nested").join(".out.md.tmp").exists());
    }
}
