//! File-backed task records, one pretty-printed JSON document per task.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::model::{Task, TaskId, TransitionError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("task {0} already exists")]
    AlreadyExists(TaskId),
    #[error("task store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt task record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("task {0} record is inconsistent with its status")]
    Inconsistent(TaskId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("failed to replace task record: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Task records under a single directory.
///
/// Each record is replaced atomically (temp file + rename) so a concurrent
/// reader sees either the old or the new version. Read-modify-write cycles
/// on one id are serialized by a per-id lock; different ids never contend.
pub struct TaskStore {
    dir: PathBuf,
    locks: DashMap<TaskId, Arc<Mutex<()>>>,
}

impl TaskStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: TaskId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Run `f` under the per-id lock. The lock entry is dropped again once
    /// no other caller holds it, so the map only tracks ids in use.
    fn with_lock<T>(
        &self,
        id: TaskId,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock = self.locks.entry(id).or_default().clone();
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);
        self.locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    /// Persist a new task. Fails if a record with the same id exists.
    pub fn create(&self, task: &Task) -> Result<(), StoreError> {
        self.with_lock(task.id(), || {
            if self.record_path(task.id()).exists() {
                return Err(StoreError::AlreadyExists(task.id()));
            }
            self.write(task)?;
            debug!("Created task record {}", task.id());
            Ok(())
        })
    }

    /// Read a task. Missing, unreadable or inconsistent records are `None`.
    pub fn get(&self, id: TaskId) -> Option<Task> {
        match self.load(id) {
            Ok(task) => Some(task),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                warn!("Task {} treated as not found: {}", id, e);
                None
            }
        }
    }

    /// Read a task, reporting why it could not be read
    pub fn load(&self, id: TaskId) -> Result<Task, StoreError> {
        self.read_path(&self.record_path(id), id)
    }

    fn read_path(&self, path: &Path, id: TaskId) -> Result<Task, StoreError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };
        let task: Task = serde_json::from_slice(&data)?;
        if task.id() != id || !task.is_consistent() {
            return Err(StoreError::Inconsistent(id));
        }
        Ok(task)
    }

    /// Read-modify-write a task under its lock. The closure's error aborts
    /// the update and leaves the record untouched.
    pub fn update<F>(&self, id: TaskId, mutate: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task) -> Result<(), TransitionError>,
    {
        self.with_lock(id, || {
            let mut task = self.load(id)?;
            mutate(&mut task)?;
            self.write(&task)?;
            debug!("Task {} is now {}", id, task.status());
            Ok(task)
        })
    }

    /// Every readable task, oldest first
    pub fn list(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .record_ids()?
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect();
        tasks.sort_by_key(|t| t.created_at());
        Ok(tasks)
    }

    /// Delete records created before `now - age`, along with corrupt
    /// records. Returns the number removed.
    pub fn purge_older_than(&self, age: chrono::Duration) -> Result<usize, StoreError> {
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };
        let mut removed = 0;

        for id in self.record_ids()? {
            let deleted = self.with_lock(id, || {
                let path = self.record_path(id);
                let stale = match self.read_path(&path, id) {
                    Ok(task) => task.created_at() < cutoff,
                    Err(StoreError::NotFound(_)) => false,
                    Err(e) => {
                        warn!("Purging unreadable task record {:?}: {}", path, e);
                        true
                    }
                };
                if !stale {
                    return Ok(false);
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })?;
            if deleted {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Purged {} task records from {:?}", removed, self.dir);
        }
        Ok(removed)
    }

    fn record_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<TaskId>().ok())
            else {
                continue;
            };
            ids.push(id);
        }
        Ok(ids)
    }

    fn write(&self, task: &Task) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, task)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(task.id()))?;
        Ok(())
    }
}
