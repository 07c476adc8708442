// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    dirs: HashSet<PathBuf>,
    // Logical clock; every added file moves it forward by one second.
    clock: u64,
}

/// In-memory filesystem with a logical modification clock.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or overwrite) a file, stamping it with the next clock tick.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut state = self.state.lock();
        state.clock += 1;
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(state.clock);
        Self::insert(&mut state, path.as_ref(), content.into(), modified);
    }

    /// Add a file with an explicit modification time (seconds since the epoch).
    pub fn add_file_at(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>, secs: u64) {
        let mut state = self.state.lock();
        state.clock = state.clock.max(secs);
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        Self::insert(&mut state, path.as_ref(), content.into(), modified);
    }

    fn insert(state: &mut MockState, path: &Path, content: Vec<u8>, modified: SystemTime) {
        if let Some(parent) = path.parent() {
            Self::ensure_dirs(state, parent);
        }
        state
            .files
            .insert(path.to_path_buf(), MockFile { content, modified });
    }

    fn ensure_dirs(state: &mut MockState, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            if !state.dirs.insert(ancestor.to_path_buf()) {
                break;
            }
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.state.lock();
        match state.files.get(path) {
            Some(file) => String::from_utf8(file.content.clone())
                .map_err(|e| anyhow!("Invalid UTF-8: {}", e)),
            None if state.dirs.contains(path) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.state.lock().files.get(path).map(|f| f.modified)
    }
}
