//! JSON file storage backend.
//!
//! Keeps the streamer state in `<dir>/state.json` and the contract audit log
//! in `<dir>/events.jsonl` (one JSON object per line).
//!
//! State writes go to a temporary file that is renamed over the previous one,
//! so a crash mid-write never leaves a truncated document behind.
//!
//! ```rust,no_run
//! use hivestream_storage::FileAdapter;
//!
//! let adapter = FileAdapter::new("./data");
//! ```

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use hivestream_core::adapter::{ContractEvent, PersistenceAdapter, StreamState};
use hivestream_core::error::StreamerError;

const STATE_FILE: &str = "state.json";
const EVENTS_FILE: &str = "events.jsonl";

/// File-backed persistence adapter.
pub struct FileAdapter {
    dir: PathBuf,
    /// Serialises writers inside this process.
    write_lock: Mutex<()>,
}

impl FileAdapter {
    /// Adapter rooted at `dir`. The directory is created by `create()` or
    /// the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    /// Read back the audit log, oldest first. Unparseable lines are skipped.
    pub async fn events(&self) -> Result<Vec<ContractEvent>, StreamerError> {
        let raw = match fs::read_to_string(self.events_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(e)),
        };
        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

fn storage(e: impl ToString) -> StreamerError {
    StreamerError::Storage(e.to_string())
}

#[async_trait]
impl PersistenceAdapter for FileAdapter {
    async fn create(&self) -> Result<(), StreamerError> {
        fs::create_dir_all(&self.dir).await.map_err(storage)?;
        debug!(dir = %self.dir.display(), "file storage ready");
        Ok(())
    }

    async fn load_state(&self) -> Result<Option<StreamState>, StreamerError> {
        let raw = match fs::read(self.state_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage(e)),
        };
        let state = serde_json::from_slice(&raw).map_err(storage)?;
        Ok(Some(state))
    }

    async fn save_state(&self, state: &StreamState) -> Result<(), StreamerError> {
        let body = serde_json::to_vec_pretty(state).map_err(storage)?;
        let target = self.state_path();
        let tmp = target.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await.map_err(storage)?;
        fs::write(&tmp, &body).await.map_err(storage)?;
        fs::rename(&tmp, &target).await.map_err(storage)?;

        debug!(block = state.last_block_number, actions = state.actions.len(), "state saved");
        Ok(())
    }

    async fn add_event(&self, event: ContractEvent) -> Result<(), StreamerError> {
        let mut line = serde_json::to_string(&event).map_err(storage)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())
            .await
            .map_err(storage)?;
        file.write_all(line.as_bytes()).await.map_err(storage)?;
        file.flush().await.map_err(storage)?;
        Ok(())
    }
}
