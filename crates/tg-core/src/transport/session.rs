//! On-disk session cache owned by the transport.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    session: Option<String>,
}

#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    current: RwLock<Option<String>>,
}

impl SessionStore {
    /// Session kept only in memory.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
        }
    }

    /// Load a session file if present; a missing file means no session yet.
    pub fn open(path: &Path) -> io::Result<Self> {
        let current = match fs::read(path) {
            Ok(data) => serde_json::from_slice::<SessionFile>(&data)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
                .session,
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            current: RwLock::new(current),
        })
    }

    pub fn get(&self) -> Option<String> {
        self.current.read().clone()
    }

    pub fn store(&self, session: String) -> io::Result<()> {
        *self.current.write() = Some(session.clone());
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(&SessionFile {
            session: Some(session),
        })
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        write_private(path, &data)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_no_session() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn stored_session_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        SessionStore::open(&path)
            .unwrap()
            .store("abc".into())
            .unwrap();
        assert_eq!(SessionStore::open(&path).unwrap().get().as_deref(), Some("abc"));
    }
}
