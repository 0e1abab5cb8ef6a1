use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::project::PlanStore;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Saves and loads the plan store as YAML, with advisory file locking so
/// two `mx` processes do not interleave writes
pub struct Storage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = file_path.with_extension("yaml.lock");
        Self {
            file_path,
            lock_file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Acquire an exclusive lock; the returned handle holds it until dropped
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        self.wait_for(|| FileExt::try_lock_exclusive(&lock_file))?;

        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        Ok(lock_file)
    }

    /// Acquire a shared lock, if anyone has ever written one
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        self.wait_for(|| FileExt::try_lock_shared(&lock_file))?;
        Ok(Some(lock_file))
    }

    fn wait_for<F>(&self, mut try_lock: F) -> Result<()>
    where
        F: FnMut() -> std::io::Result<()>,
    {
        let start = Instant::now();
        loop {
            match try_lock() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another process may be writing: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    fn read_store(&self) -> Result<PlanStore> {
        let mut contents = String::new();
        File::open(&self.file_path)
            .and_then(|file| BufReader::new(file).read_to_string(&mut contents))
            .with_context(|| format!("Failed to read file: {:?}", self.file_path))?;
        if contents.trim().is_empty() {
            return Ok(PlanStore::new());
        }
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path))
    }

    fn write_store(&self, store: &PlanStore) -> Result<()> {
        let yaml = serde_yaml::to_string(store)?;
        fs::write(&self.file_path, yaml)
            .with_context(|| format!("Failed to write {:?}", self.file_path))
    }

    /// Loads the store, creating an empty file on first use
    pub fn load(&self) -> Result<PlanStore> {
        if !self.file_path.exists() {
            let store = PlanStore::new();
            self.save(&store)?;
            return Ok(store);
        }

        let _lock = self.acquire_read_lock()?;
        self.read_store()
    }

    pub fn save(&self, store: &PlanStore) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _lock = self.acquire_write_lock()?;
        self.write_store(store)
    }

    /// Reload, apply `update_fn`, and save under one exclusive lock
    pub fn update_atomically<F, T>(&self, update_fn: F) -> Result<T>
    where
        F: FnOnce(&mut PlanStore) -> Result<T>,
    {
        if !self.file_path.exists() {
            self.save(&PlanStore::new())?;
        }
        let _lock = self.acquire_write_lock()?;
        let mut store = self.read_store()?;
        let value = update_fn(&mut store)?;
        self.write_store(&store)?;
        Ok(value)
    }
}
