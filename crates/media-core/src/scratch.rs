//! Derived-file management
//!
//! Every transform writes to a fresh file named `<chat>-<purpose>-<uuid>.mp3`
//! under the scratch root, so concurrent transforms never collide and a file
//! always has exactly one owner.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Why a derived file was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScratchPurpose {
    Play,
    Resume,
    Volume,
}

impl ScratchPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScratchPurpose::Play => "play",
            ScratchPurpose::Resume => "resume",
            ScratchPurpose::Volume => "volume",
        }
    }
}

impl fmt::Display for ScratchPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root directory for derived files
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if needed
    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// A fresh, unique output path
    pub fn output_path(&self, owner: impl fmt::Display, purpose: ScratchPurpose) -> PathBuf {
        self.root
            .join(format!("{}-{}-{}.mp3", owner, purpose, Uuid::new_v4().simple()))
    }

    /// Whether `path` lives directly under this root
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
    }

    /// Remove a derived file, logging failures. Missing files are fine.
    pub async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed derived file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove derived file"),
        }
    }

    pub async fn remove_all<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.remove(path.as_ref()).await;
        }
    }

    /// Delete every derived file under the root that is not in `keep`.
    /// Returns the number of files removed.
    pub async fn sweep(&self, keep: &HashSet<PathBuf>) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("mp3") || keep.contains(&path) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "sweep could not remove file"),
            }
        }

        if removed > 0 {
            debug!(root = %self.root.display(), removed, "swept orphaned derived files");
        }
        Ok(removed)
    }
}
