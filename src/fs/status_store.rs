use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use log::warn;

use graph::{Status, StatusRecord};

use super::Fs;

/// Reads and writes per-chunk status records in node cache folders.
///
/// Every record is stamped with this process's session id. A `Running`
/// record carrying a different session id belongs to a process that is
/// no longer driving the chunk (a crashed or killed run), so it is
/// reported as `None` and the chunk becomes submittable again.
#[derive(Debug, Clone)]
pub struct StatusStore {
    session_id: String,
}

impl StatusStore {
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self {
            session_id: format!("{}-{millis}", std::process::id()),
        }
    }

    /// For tests that need to impersonate another engine process.
    pub fn with_session_id(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_owned(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Read one status record. A missing or unreadable file is simply
    /// "no status"; a corrupt record is logged and treated the same.
    pub fn read(&self, fs: &Fs, path: &Path) -> Option<StatusRecord> {
        let text = fs.read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("ignoring corrupt status file {path:?}: {e}");
                None
            }
        }
    }

    /// Persist one status record atomically, stamped with our session.
    pub fn write(&self, fs: &Fs, path: &Path, record: &mut StatusRecord) -> Result<()> {
        record.session_id = self.session_id.clone();
        let json = serde_json::to_string_pretty(record)?;
        fs.write_file_atomic(path, &json)
    }

    /// The effective status of one chunk, as planning sees it.
    pub fn chunk_status(&self, fs: &Fs, node_dir: &Path, chunk: usize, uid: &str) -> Status {
        let mut buf = PathBuf::with_capacity(256);
        let path = fs.status_file(node_dir, chunk, &mut buf);
        let Some(record) = self.read(fs, path) else {
            return Status::None;
        };
        // a record written for a different uid never counts
        if record.uid != uid {
            return Status::None;
        }
        if record.status == Status::Running && record.session_id != self.session_id {
            warn!(
                "found stale Running status in {node_dir:?} chunk {chunk} (session {}); treating as not started",
                record.session_id
            );
            return Status::None;
        }
        record.status
    }

    /// Effective statuses for all chunks of a node.
    pub fn node_statuses(
        &self,
        fs: &Fs,
        node_dir: &Path,
        nb_chunks: usize,
        uid: &str,
    ) -> Vec<Status> {
        (0..nb_chunks)
            .map(|chunk| self.chunk_status(fs, node_dir, chunk, uid))
            .collect()
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Fs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = Fs::new(dir.path(), false);
        (dir, fs)
    }

    fn record(uid: &str) -> StatusRecord {
        StatusRecord::new("Blur_1", "Blur", uid, 0, 1)
    }

    #[test]
    fn test_write_read_round_trip() {
        let (dir, fs) = setup();
        let store = StatusStore::new();
        let node_dir = dir.path().join("Blur").join("abc123");
        fs.create_dir(node_dir.join("status")).unwrap();

        let mut buf = PathBuf::new();
        let path = fs.status_file(&node_dir, 0, &mut buf).to_path_buf();
        let mut rec = record("abc123");
        rec.status = Status::Success;
        store.write(&fs, &path, &mut rec).unwrap();

        assert_eq!(store.chunk_status(&fs, &node_dir, 0, "abc123"), Status::Success);
        // different uid means the cached result doesn't apply
        assert_eq!(store.chunk_status(&fs, &node_dir, 0, "other"), Status::None);
        // missing chunk file
        assert_eq!(store.chunk_status(&fs, &node_dir, 1, "abc123"), Status::None);
    }

    #[test]
    fn test_stale_running_record_is_resubmittable() {
        let (dir, fs) = setup();
        let node_dir = dir.path().join("Blur").join("abc123");
        fs.create_dir(node_dir.join("status")).unwrap();
        let mut buf = PathBuf::new();
        let path = fs.status_file(&node_dir, 0, &mut buf).to_path_buf();

        let other = StatusStore::with_session_id("dead-process");
        let mut rec = record("abc123");
        rec.status = Status::Running;
        other.write(&fs, &path, &mut rec).unwrap();

        // the writing session still sees its own Running record
        assert_eq!(other.chunk_status(&fs, &node_dir, 0, "abc123"), Status::Running);
        // a new session sees a crashed chunk, ready to resubmit
        let fresh = StatusStore::new();
        assert_eq!(fresh.chunk_status(&fs, &node_dir, 0, "abc123"), Status::None);
    }

    #[test]
    fn test_corrupt_status_file_ignored() {
        let (dir, fs) = setup();
        let node_dir = dir.path().join("Blur").join("abc123");
        fs.create_dir(node_dir.join("status")).unwrap();
        std::fs::write(node_dir.join("status").join("0.status"), "{ nope").unwrap();

        let store = StatusStore::new();
        assert_eq!(store.chunk_status(&fs, &node_dir, 0, "abc123"), Status::None);
    }
}
