//! JSON-file-backed storage service.
//!
//! State lives in two read/write-locked maps (users, tasks) loaded from
//! `users.json` / `tasks.json` under the data directory and flushed after
//! every mutation. Repository handles borrow the service, so a scope
//! (`repositories()`) cannot outlive it and every exit path releases the
//! locks it took.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use vx_domain::{Error, Result};

use crate::models::{Task, User};
use crate::tasks::TaskRepo;
use crate::users::UserRepo;

pub(crate) struct StorageState {
    pub(crate) users: RwLock<HashMap<String, User>>,
    pub(crate) tasks: RwLock<HashMap<String, Task>>,
    data_dir: Option<PathBuf>,
}

/// Storage service managing the user/task maps and their persistence.
pub struct StorageService {
    pub(crate) state: StorageState,
}

impl StorageService {
    /// Load or create the store under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(Error::Io)?;

        let users = load_map::<User>(&data_dir.join("users.json"))?;
        let tasks = load_map::<Task>(&data_dir.join("tasks.json"))?;

        tracing::info!(
            users = users.len(),
            tasks = tasks.len(),
            path = %data_dir.display(),
            "storage loaded"
        );

        Ok(Self {
            state: StorageState {
                users: RwLock::new(users),
                tasks: RwLock::new(tasks),
                data_dir: Some(data_dir.to_path_buf()),
            },
        })
    }

    /// A store with no backing files. Used by tests and the CLI harness.
    pub fn in_memory() -> Self {
        Self {
            state: StorageState {
                users: RwLock::new(HashMap::new()),
                tasks: RwLock::new(HashMap::new()),
                data_dir: None,
            },
        }
    }

    /// Open a repository scope over this service.
    pub fn repositories(&self) -> (UserRepo<'_>, TaskRepo<'_>) {
        (UserRepo::new(self), TaskRepo::new(self))
    }

    /// Whether the backing directory is present and writable.
    pub fn health_check(&self) -> bool {
        match &self.state.data_dir {
            None => true,
            Some(dir) => {
                let probe = dir.join(".health");
                match std::fs::write(&probe, b"ok") {
                    Ok(()) => {
                        let _ = std::fs::remove_file(&probe);
                        true
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "storage health check failed");
                        false
                    }
                }
            }
        }
    }

    pub(crate) fn flush_users(&self) -> Result<()> {
        if let Some(dir) = &self.state.data_dir {
            flush_map(&dir.join("users.json"), &*self.state.users.read())?;
        }
        Ok(())
    }

    pub(crate) fn flush_tasks(&self) -> Result<()> {
        if let Some(dir) = &self.state.data_dir {
            flush_map(&dir.join("tasks.json"), &*self.state.tasks.read())?;
        }
        Ok(())
    }
}

fn load_map<T: serde::de::DeserializeOwned>(path: &Path) -> Result<HashMap<String, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    serde_json::from_str(&raw).map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))
}

fn flush_map<T: serde::Serialize>(path: &Path, map: &HashMap<String, T>) -> Result<()> {
    let json = serde_json::to_string_pretty(map)
        .map_err(|e| Error::Storage(format!("serializing {}: {e}", path.display())))?;
    std::fs::write(path, json).map_err(Error::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_and_reloads() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = StorageService::open(dir.path()).unwrap();
            let (users, tasks) = store.repositories();
            let user = users.create("+15550100", Some("Bob".into())).unwrap();
            tasks
                .create(&user.user_id, "water the plants", 2, None)
                .unwrap();
        }

        let store = StorageService::open(dir.path()).unwrap();
        let (users, tasks) = store.repositories();
        let user = users.get_by_phone("+15550100").unwrap().unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Bob"));
        assert_eq!(tasks.get_open_count(&user.user_id).unwrap(), 1);
    }

    #[test]
    fn health_check_reports_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = StorageService::open(dir.path()).unwrap();
        assert!(store.health_check());
        assert!(StorageService::in_memory().health_check());
    }
}
