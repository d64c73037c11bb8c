use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::app::ports::CheckpointStore;
use crate::error::Result;

/// Checkpoint kept as a decimal id in a small file, replaced atomically on write.
pub struct FileCheckpoint {
    path: PathBuf,
    last: Mutex<Option<i64>>,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<i64>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let id = content.trim().parse::<i64>().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("checkpoint {} is not an id: {e}", self.path.display()),
            )
        })?;
        Ok(Some(id))
    }
}

impl CheckpointStore for FileCheckpoint {
    fn load(&self) -> Result<Option<i64>> {
        let id = self.read_file()?;
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = id;
        Ok(id)
    }

    fn save(&self, inscription_id: i64) -> Result<()> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.is_none() {
            *last = self.read_file()?;
        }
        if matches!(*last, Some(current) if current >= inscription_id) {
            return Ok(());
        }
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, inscription_id.to_string())?;
        fs::rename(&tmp, &self.path)?;
        *last = Some(inscription_id);
        debug!("checkpoint saved: {}", inscription_id);
        Ok(())
    }
}
