//! Storage collaborator
//!
//! [`FileSystem`] is asynchronous: every operation except `resolve` reports
//! through a callback that runs exactly once. [`DefaultFileSystem`] runs
//! [`SyncFileSystem`] on a worker thread.

use std::fs;
use std::io;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use super::Worker;

/// Raw file contents.
pub type IoBuffer = Vec<u8>;

pub type ReadCallback = Box<dyn FnOnce(Result<IoBuffer, String>) + Send + 'static>;
pub type FsCallback = Box<dyn FnOnce(Result<(), String>) + Send + 'static>;
pub type StatCallback = Box<dyn FnOnce(Result<StatResult, String>) + Send + 'static>;

/// Result of [`FileSystem::stat`]. A missing path is not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatResult {
    pub exists: bool,
    pub is_file: bool,
    pub is_directory: bool,
    /// Modification time in milliseconds since the Unix epoch.
    pub last_modified: i64,
}

/// Persistent storage used by script through `_fileSystem`.
///
/// Errors are human-readable and never empty.
pub trait FileSystem: Send + Sync {
    fn read(&self, path: &str, callback: ReadCallback);

    fn write(&self, path: &str, data: IoBuffer, callback: FsCallback);

    fn move_file(&self, from: &str, to: &str, callback: FsCallback);

    fn remove(&self, path: &str, callback: FsCallback);

    fn stat(&self, path: &str, callback: StatCallback);

    /// Map a script-supplied path to the path used for storage.
    fn resolve(&self, path: &str) -> String;
}

/// Blocking storage on `std::fs`, optionally rooted at a base directory.
#[derive(Debug, Clone, Default)]
pub struct SyncFileSystem {
    base_path: Option<String>,
}

impl SyncFileSystem {
    pub fn new(base_path: Option<PathBuf>) -> Self {
        let mut fs = Self::default();
        if let Some(base) = base_path {
            fs.set_base_path(&base.to_string_lossy());
        }
        fs
    }

    /// Set the directory relative paths resolve against. A trailing
    /// separator is ignored; an empty path disables resolution.
    pub fn set_base_path(&mut self, base: &str) {
        let trimmed = base.strip_suffix(MAIN_SEPARATOR).unwrap_or(base);
        self.base_path = (!base.is_empty()).then(|| trimmed.to_string());
    }

    pub fn read(&self, path: &str) -> Result<IoBuffer, String> {
        fs::read(path).map_err(|e| describe_io("Failed to open", path, &e))
    }

    pub fn write(&self, path: &str, data: &[u8]) -> Result<(), String> {
        fs::write(path, data).map_err(|e| describe_io("Failed to write", path, &e))
    }

    pub fn move_file(&self, from: &str, to: &str) -> Result<(), String> {
        fs::rename(from, to).map_err(|e| {
            describe_io("Failed to move", &format!("{from} to {to}"), &e)
        })
    }

    pub fn remove(&self, path: &str) -> Result<(), String> {
        fs::remove_file(path).map_err(|e| describe_io("Failed to remove", path, &e))
    }

    pub fn stat(&self, path: &str) -> Result<StatResult, String> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StatResult::default()),
            Err(e) => return Err(describe_io("Unable to stat", path, &e)),
        };

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_millis() as i64)
            .unwrap_or(0);

        Ok(StatResult {
            exists: true,
            is_file: metadata.is_file(),
            is_directory: metadata.is_dir(),
            last_modified,
        })
    }

    pub fn resolve(&self, path: &str) -> String {
        match &self.base_path {
            Some(base) if !path.is_empty() && Path::new(path).is_relative() => {
                format!("{base}{MAIN_SEPARATOR}{path}")
            }
            _ => path.to_string(),
        }
    }
}

fn describe_io(action: &str, subject: &str, e: &io::Error) -> String {
    format!("{action} {subject} ({e})")
}

/// [`SyncFileSystem`] behind a worker thread.
pub struct DefaultFileSystem {
    sync: Arc<SyncFileSystem>,
    worker: Worker,
}

impl DefaultFileSystem {
    pub fn new(base_path: Option<PathBuf>) -> Self {
        Self::with_sync(SyncFileSystem::new(base_path))
    }

    pub fn with_sync(sync: SyncFileSystem) -> Self {
        Self {
            sync: Arc::new(sync),
            worker: Worker::spawn("sieve-fs"),
        }
    }
}

impl FileSystem for DefaultFileSystem {
    fn read(&self, path: &str, callback: ReadCallback) {
        let sync = self.sync.clone();
        let path = path.to_string();
        self.worker.submit(move || callback(sync.read(&path)));
    }

    fn write(&self, path: &str, data: IoBuffer, callback: FsCallback) {
        let sync = self.sync.clone();
        let path = path.to_string();
        self.worker.submit(move || callback(sync.write(&path, &data)));
    }

    fn move_file(&self, from: &str, to: &str, callback: FsCallback) {
        let sync = self.sync.clone();
        let (from, to) = (from.to_string(), to.to_string());
        self.worker.submit(move || callback(sync.move_file(&from, &to)));
    }

    fn remove(&self, path: &str, callback: FsCallback) {
        let sync = self.sync.clone();
        let path = path.to_string();
        self.worker.submit(move || callback(sync.remove(&path)));
    }

    fn stat(&self, path: &str, callback: StatCallback) {
        let sync = self.sync.clone();
        let path = path.to_string();
        self.worker.submit(move || callback(sync.stat(&path)));
    }

    fn resolve(&self, path: &str) -> String {
        self.sync.resolve(path)
    }
}
