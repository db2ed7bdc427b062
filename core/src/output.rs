//! Where rendered scripts end up.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{Span, debug};

/// Persists rendered scripts as executables.
pub trait ScriptSink {
    /// Stores `contents` under `name` and returns where it went.
    fn write_script(&self, name: &str, contents: &str) -> io::Result<PathBuf>;
}

/// Writes scripts into a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    span: Span,
}

impl DirectorySink {
    /// Creates `dir` (and its parents) if needed.
    pub fn create(dir: impl Into<PathBuf>, span: Span) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(parent: &span, "Writing scripts to {}", dir.display());
        Ok(Self { dir, span })
    }
}

impl ScriptSink for DirectorySink {
    fn write_script(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, contents)?;
        make_executable(&path)?;
        debug!(parent: &self.span, "Wrote {}", path.display());
        Ok(path)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Keeps scripts in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemorySink {
    scripts: Mutex<BTreeMap<String, String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map is still a valid map.
        self.scripts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ScriptSink for MemorySink {
    fn write_script(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        self.lock().insert(name.to_string(), contents.to_string());
        Ok(PathBuf::from(name))
    }
}
