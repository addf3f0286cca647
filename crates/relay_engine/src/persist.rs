use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use relay_logging::relay_debug;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::SessionId;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("directory missing or not writable: {0}")]
    Dir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure `dir` exists and is writable; create it if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::Dir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
    Ok(())
}

/// Working directory of one session; sessions never share paths.
pub fn session_dir(base: &Path, session: SessionId) -> PathBuf {
    base.join(format!("session-{session}"))
}

/// Atomically write content to `{dir}/{filename}` via a temp file and rename.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Delete a file, ignoring a missing one.
pub async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => relay_debug!("Removed {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => relay_debug!("Could not remove {}: {err}", path.display()),
    }
}

pub async fn remove_dir_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(path).await {
        if err.kind() != io::ErrorKind::NotFound {
            relay_debug!("Could not remove {}: {err}", path.display());
        }
    }
}

pub async fn file_size(path: &Path) -> io::Result<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}
