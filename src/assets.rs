//! Recognition asset provisioning
//!
//! Acoustic models, dictionaries and grammars must be on disk before the
//! engine can register any profile. Provisioning runs once, on its own thread,
//! and yields the directory the grammar paths are resolved against.
//!
//! [`AssetSync`] mirrors a bundled asset tree into a working directory. A
//! manifest of SHA-256 hashes kept next to the copied files lets later runs
//! skip unchanged files and remove files that were dropped from the bundle.

use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Manifest file written into the target directory
pub const MANIFEST_FILE_NAME: &str = ".voicenav-assets.json";

/// Errors raised while provisioning assets
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Asset directory not found: {0}")]
    SourceMissing(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write asset manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Asset provisioning was cancelled")]
    Cancelled,
}

impl ProvisioningError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Shared cancellation flag checked by long-running provisioning work
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ProvisioningError> {
        if self.is_cancelled() {
            Err(ProvisioningError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Makes recognition assets available on disk
pub trait AssetProvisioner: Send + 'static {
    /// Returns the directory holding the assets
    fn provision(&self, cancel: &CancelFlag) -> Result<PathBuf, ProvisioningError>;
}

/// Assets that are already in place
#[derive(Debug, Clone)]
pub struct ExistingDirectory(pub PathBuf);

impl AssetProvisioner for ExistingDirectory {
    fn provision(&self, cancel: &CancelFlag) -> Result<PathBuf, ProvisioningError> {
        cancel.check()?;
        if self.0.is_dir() {
            Ok(self.0.clone())
        } else {
            Err(ProvisioningError::SourceMissing(self.0.clone()))
        }
    }
}

// =============================================================================
// Asset synchronisation
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct AssetManifest {
    /// Relative path (forward slashes) -> lowercase hex SHA-256
    files: BTreeMap<String, String>,
}

/// Counts from the last synchronisation, logged on completion
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub copied: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// Copies a bundled asset tree into a working directory
#[derive(Debug, Clone)]
pub struct AssetSync {
    source: PathBuf,
    target: PathBuf,
}

impl AssetSync {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Synchronises the target with the source and reports what changed
    pub fn sync(&self, cancel: &CancelFlag) -> Result<SyncSummary, ProvisioningError> {
        cancel.check()?;
        if !self.source.is_dir() {
            return Err(ProvisioningError::SourceMissing(self.source.clone()));
        }
        std::fs::create_dir_all(&self.target)
            .map_err(|e| ProvisioningError::io(&self.target, e))?;

        let previous = self.read_manifest();
        let mut current = AssetManifest::default();
        let mut summary = SyncSummary::default();

        let mut files = Vec::new();
        collect_files(&self.source, &self.source, &mut files)?;

        for relative in files {
            cancel.check()?;

            let source_path = self.source.join(&relative);
            let target_path = self.target.join(&relative);
            let key = manifest_key(&relative);
            let hash = file_sha256(&source_path)?;

            let unchanged = previous.files.get(&key) == Some(&hash) && target_path.is_file();
            if unchanged {
                summary.unchanged += 1;
            } else {
                if let Some(parent) = target_path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| ProvisioningError::io(parent, e))?;
                }
                std::fs::copy(&source_path, &target_path)
                    .map_err(|e| ProvisioningError::io(&target_path, e))?;
                tracing::debug!("Copied asset {}", key);
                summary.copied += 1;
            }

            current.files.insert(key, hash);
        }

        for stale in previous.files.keys().filter(|k| !current.files.contains_key(*k)) {
            cancel.check()?;
            if !is_plain_relative(stale) {
                tracing::warn!("Ignoring manifest entry outside the asset directory: {}", stale);
                continue;
            }
            let path = self.target.join(stale);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Removed stale asset {}", stale);
                    summary.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ProvisioningError::io(&path, e)),
            }
        }

        self.write_manifest(&current)?;
        Ok(summary)
    }

    fn manifest_path(&self) -> PathBuf {
        self.target.join(MANIFEST_FILE_NAME)
    }

    /// A missing or unreadable manifest means every file is copied again
    fn read_manifest(&self) -> AssetManifest {
        let path = self.manifest_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(_) => return AssetManifest::default(),
        };
        match serde_json::from_str(&contents) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("Ignoring corrupt asset manifest {}: {}", path.display(), e);
                AssetManifest::default()
            }
        }
    }

    fn write_manifest(&self, manifest: &AssetManifest) -> Result<(), ProvisioningError> {
        let path = self.manifest_path();
        let contents = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&path, contents).map_err(|e| ProvisioningError::io(&path, e))
    }
}

impl AssetProvisioner for AssetSync {
    fn provision(&self, cancel: &CancelFlag) -> Result<PathBuf, ProvisioningError> {
        let summary = self.sync(cancel)?;
        tracing::info!(
            "Assets synchronised to {} ({} copied, {} unchanged, {} removed)",
            self.target.display(),
            summary.copied,
            summary.unchanged,
            summary.removed
        );
        Ok(self.target.clone())
    }
}

/// Collects file paths under `dir` relative to `base`, sorted
fn collect_files(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ProvisioningError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProvisioningError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProvisioningError::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();

    for path in paths {
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// True if `key` only names entries below the directory it is joined onto
fn is_plain_relative(key: &str) -> bool {
    let path = Path::new(key);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

fn manifest_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_sha256(path: &Path) -> Result<String, ProvisioningError> {
    let mut file = std::fs::File::open(path).map_err(|e| ProvisioningError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ProvisioningError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

// =============================================================================
// Background task
// =============================================================================

/// Result delivered by a provisioning task
pub type ProvisioningResult = Result<PathBuf, ProvisioningError>;

/// One-shot provisioning running on a background thread.
///
/// Dropping the task cancels it and waits for the thread to finish.
pub struct ProvisioningTask {
    cancel: CancelFlag,
    result: Receiver<ProvisioningResult>,
    handle: Option<JoinHandle<()>>,
}

impl ProvisioningTask {
    /// Receiver yielding the single result
    pub fn receiver(&self) -> Receiver<ProvisioningResult> {
        self.result.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ProvisioningTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Starts provisioning on a new thread
pub fn spawn_provisioning<P: AssetProvisioner>(provisioner: P) -> ProvisioningTask {
    let (tx, rx) = bounded(1);
    let cancel = CancelFlag::new();
    let thread_cancel = cancel.clone();

    let handle = std::thread::spawn(move || {
        tracing::debug!("Asset provisioning started");
        let result = provisioner.provision(&thread_cancel);
        if let Err(ref e) = result {
            tracing::debug!("Asset provisioning finished with error: {}", e);
        }
        let _ = tx.send(result);
    });

    ProvisioningTask {
        cancel,
        result: rx,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_manifest_key_uses_forward_slashes() {
        let relative = Path::new("grammars").join("menu.gram");
        assert_eq!(manifest_key(&relative), "grammars/menu.gram");
    }

    #[test]
    fn test_only_plain_relative_keys_are_removable() {
        assert!(is_plain_relative("menu.gram"));
        assert!(is_plain_relative("en-us/mdef"));
        assert!(!is_plain_relative("../menu.gram"));
        assert!(!is_plain_relative("en-us/../../mdef"));
        assert!(!is_plain_relative("/etc/passwd"));
        assert!(!is_plain_relative("./menu.gram"));
        assert!(!is_plain_relative(""));
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(ProvisioningError::Cancelled)));
    }

    #[test]
    fn test_existing_directory_missing() {
        let provisioner = ExistingDirectory(PathBuf::from("/nonexistent/voicenav/assets"));
        let result = provisioner.provision(&CancelFlag::new());
        assert!(matches!(result, Err(ProvisioningError::SourceMissing(_))));
    }

    #[test]
    fn test_spawned_task_delivers_one_result() {
        let dir = std::env::temp_dir();
        let task = spawn_provisioning(ExistingDirectory(dir.clone()));
        let result = task
            .receiver()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(result.unwrap(), dir);
    }

    #[test]
    fn test_error_display() {
        let err = ProvisioningError::SourceMissing(PathBuf::from("/a/b"));
        assert_eq!(err.to_string(), "Asset directory not found: /a/b");
    }
}
