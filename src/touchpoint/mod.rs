//! Native touchpoint - filesystem actions for `native` units
//!
//! Everything a native action replaces or deletes is moved into a per-run
//! backup area first, so undo can put it back. The area is discarded once the
//! transaction is committed or rolled back, unless an undo failed to put an
//! entry back; then the area stays on disk and the outcome is a warning.

mod actions;

use anyhow::{Context, Result, bail};
use phasekit::{Profile, ParametersBuilder, SharedAction, Status, Touchpoint};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

use actions::ACTIONS;

/// Touchpoint type key
pub const NATIVE: &str = "native";

/// Profile property exposed to native actions as a parameter of the same name
pub const INSTALL_FOLDER: &str = "installFolder";

/// Holding area for files native actions displaced
#[derive(Debug)]
pub struct BackupArea {
    root: PathBuf,
    next: AtomicU64,
    /// Stashed entries whose restore failed
    unrestored: Mutex<Vec<PathBuf>>,
}

impl BackupArea {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            next: AtomicU64::new(0),
            unrestored: Mutex::new(Vec::new()),
        }
    }

    /// Move `path` into the area, returning where it went
    pub fn stash(&self, path: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create backup area: {}", self.root.display()))?;

        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map_or_else(|| "entry".to_string(), |n| n.to_string_lossy().to_string());
        let dest = self.root.join(format!("{n:04}-{name}"));

        move_path(path, &dest)?;
        log::debug!("Backed up {} to {}", path.display(), dest.display());
        Ok(dest)
    }

    /// Move a stashed entry back to where it came from
    ///
    /// On failure the entry stays in the area and [`discard`](Self::discard)
    /// will no longer delete it.
    pub fn restore(&self, stashed: &Path, original: &Path) -> Result<()> {
        let result = original
            .parent()
            .map_or(Ok(()), |parent| {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))
            })
            .and_then(|()| move_path(stashed, original));

        match result {
            Ok(()) => {
                log::debug!("Restored {}", original.display());
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Could not restore {}; its backup stays at {}",
                    original.display(),
                    stashed.display()
                );
                self.unrestored
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(stashed.to_path_buf());
                Err(e)
            }
        }
    }

    /// Delete the area and everything still in it
    ///
    /// Once any restore has failed this leaves the area in place and errors.
    pub fn discard(&self) -> Result<()> {
        let unrestored = self.unrestored.lock().unwrap_or_else(PoisonError::into_inner).len();
        if unrestored > 0 {
            bail!(
                "Kept backup area {} holding {unrestored} entries that could not be restored",
                self.root.display()
            );
        }
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to remove backup area: {}", self.root.display()))?;
            log::debug!("Discarded backup area {}", self.root.display());
        }
        Ok(())
    }
}

/// Rename, falling back to copy-then-delete across filesystems
fn move_path(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    let meta = fs::symlink_metadata(from)
        .with_context(|| format!("Failed to read {}", from.display()))?;
    let result = if meta.is_dir() {
        for entry in WalkDir::new(from) {
            let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
            let dest = to.join(entry.path().strip_prefix(from)?);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)?;
            } else {
                fs::copy(entry.path(), &dest)?;
            }
        }
        fs::remove_dir_all(from)
    } else {
        fs::copy(from, to)?;
        fs::remove_file(from)
    };
    result.with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))
}

/// Touchpoint for units that live on the local filesystem
#[derive(Debug)]
pub struct NativeTouchpoint {
    backups: Arc<BackupArea>,
}

impl NativeTouchpoint {
    pub fn new(backup_root: impl AsRef<Path>) -> Self {
        let backups = BackupArea::new(backup_root);
        log::debug!(
            "Native touchpoint ({}) backing up to {}",
            ACTIONS.join(", "),
            backups.root.display()
        );
        Self {
            backups: Arc::new(backups),
        }
    }

    fn discard_backups(&self) -> Status {
        match self.backups.discard() {
            Ok(()) => Status::ok(),
            Err(e) => Status::warning(format!("{e:#}")),
        }
    }
}

impl Touchpoint for NativeTouchpoint {
    fn touchpoint_type(&self) -> &str {
        NATIVE
    }

    fn action(&self, id: &str) -> Option<SharedAction> {
        actions::lookup(id, &self.backups)
    }

    fn initialize_phase(&self, _phase_id: &str, profile: &Profile, params: &mut ParametersBuilder) -> Status {
        if let Some(folder) = profile.property(INSTALL_FOLDER) {
            params.insert(INSTALL_FOLDER, folder);
        }
        Status::ok()
    }

    fn commit(&self, _profile: &Profile) -> Status {
        self.discard_backups()
    }

    fn rollback(&self, _profile: &Profile) -> Status {
        self.discard_backups()
    }
}
