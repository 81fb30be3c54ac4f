//! Filesystem actions of the native touchpoint
//!
//! Every instance remembers what its `execute` changed so `undo` reverses
//! exactly that, including partial work left behind by a failed execute.

use super::BackupArea;
use crate::paths;
use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use phasekit::{Action, ActionContext, Parameters, SharedAction, Status};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tar::EntryType;
use walkdir::WalkDir;

pub const MKDIR: &str = "mkdir";
pub const RMDIR: &str = "rmdir";
pub const COPY: &str = "copy";
pub const REMOVE: &str = "remove";
pub const LN: &str = "ln";
pub const CHMOD: &str = "chmod";
pub const UNZIP: &str = "unzip";

/// Every action id the native touchpoint answers to
pub const ACTIONS: [&str; 7] = [MKDIR, RMDIR, COPY, REMOVE, LN, CHMOD, UNZIP];

/// A fresh action instance for `id`
pub fn lookup(id: &str, backups: &Arc<BackupArea>) -> Option<SharedAction> {
    let action: SharedAction = match id {
        MKDIR => Arc::new(Mkdir::default()),
        RMDIR => Arc::new(Rmdir::default()),
        COPY => Arc::new(CopyTree::new(Arc::clone(backups))),
        REMOVE => Arc::new(Remove::new(Arc::clone(backups))),
        LN => Arc::new(Ln::default()),
        CHMOD => Arc::new(Chmod::default()),
        UNZIP => Arc::new(Unzip::default()),
        _ => return None,
    };
    Some(action)
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn path_param(params: &Parameters, action: &str, name: &str) -> Result<PathBuf> {
    Ok(paths::expand(params.require(action, name)?))
}

/// Ancestors of `path` (itself included) that do not exist, deepest first
fn missing_dirs(path: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Create `dir` and record every directory that had to be made, in creation order
fn ensure_dir(dir: &Path, created: &mut Vec<PathBuf>) -> Result<()> {
    let missing = missing_dirs(dir);
    if missing.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    created.extend(missing.into_iter().rev());
    Ok(())
}

/// Remove recorded paths newest first; directories only when empty
fn remove_created(created: &[PathBuf]) -> Result<()> {
    for path in created.iter().rev() {
        let Ok(meta) = fs::symlink_metadata(path) else {
            continue;
        };
        if meta.is_dir() {
            if let Err(e) = fs::remove_dir(path) {
                log::debug!("Leaving {}: {e}", path.display());
            }
        } else {
            fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

// ============================================================================
// mkdir / rmdir
// ============================================================================

/// `mkdir(path:...)` - create a directory and any missing parents
#[derive(Debug, Default)]
pub struct Mkdir {
    created: Mutex<Vec<PathBuf>>,
}

impl Action for Mkdir {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let path = path_param(ctx.params, MKDIR, "path")?;
        let mut created = Vec::new();
        let result = ensure_dir(&path, &mut created);
        *locked(&self.created) = created;
        result?;
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        let created = std::mem::take(&mut *locked(&self.created));
        remove_created(&created)?;
        Ok(Status::ok())
    }
}

/// `rmdir(path:...)` - remove an empty directory
#[derive(Debug, Default)]
pub struct Rmdir {
    removed: Mutex<Option<PathBuf>>,
}

impl Action for Rmdir {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let path = path_param(ctx.params, RMDIR, "path")?;
        if !path.exists() {
            log::debug!("{} already absent", path.display());
            return Ok(Status::ok());
        }
        fs::remove_dir(&path).with_context(|| format!("Failed to remove directory: {}", path.display()))?;
        *locked(&self.removed) = Some(path);
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        if let Some(path) = locked(&self.removed).take() {
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to recreate directory: {}", path.display()))?;
        }
        Ok(Status::ok())
    }
}

// ============================================================================
// copy / remove
// ============================================================================

#[derive(Debug, Default)]
struct CopyRecord {
    created: Vec<PathBuf>,
    /// (original location, where it was stashed)
    replaced: Vec<(PathBuf, PathBuf)>,
}

/// `copy(source:...,target:...[,overwrite:true])` - copy a file or a tree
///
/// Existing files are only replaced with `overwrite:true`; the replaced
/// originals go to the backup area.
#[derive(Debug)]
pub struct CopyTree {
    backups: Arc<BackupArea>,
    record: Mutex<CopyRecord>,
}

impl CopyTree {
    fn new(backups: Arc<BackupArea>) -> Self {
        Self {
            backups,
            record: Mutex::new(CopyRecord::default()),
        }
    }

    fn copy_tree(&self, source: &Path, target: &Path, overwrite: bool, record: &mut CopyRecord) -> Result<()> {
        if let Some(parent) = target.parent() {
            ensure_dir(parent, &mut record.created)?;
        }

        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
            let rel = entry.path().strip_prefix(source)?;
            let dest = if rel.as_os_str().is_empty() {
                target.to_path_buf()
            } else {
                target.join(rel)
            };

            if entry.file_type().is_dir() {
                ensure_dir(&dest, &mut record.created)?;
                continue;
            }

            if dest.exists() {
                if !overwrite {
                    bail!("{} already exists", dest.display());
                }
                let stashed = self.backups.stash(&dest)?;
                record.replaced.push((dest.clone(), stashed));
            }
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("Failed to copy {} to {}", entry.path().display(), dest.display()))?;
            record.created.push(dest);
        }
        Ok(())
    }
}

impl Action for CopyTree {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let source = path_param(ctx.params, COPY, "source")?;
        let target = path_param(ctx.params, COPY, "target")?;
        let overwrite = ctx.params.get("overwrite") == Some("true");

        if !source.exists() {
            bail!("Source does not exist: {}", source.display());
        }

        let mut record = CopyRecord::default();
        let result = self.copy_tree(&source, &target, overwrite, &mut record);
        log::debug!(
            "Copied {} entries from {} to {}",
            record.created.len(),
            source.display(),
            target.display()
        );
        *locked(&self.record) = record;
        result?;
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        let record = std::mem::take(&mut *locked(&self.record));
        let removed = remove_created(&record.created);
        // Every stash gets its restore attempt; the first error is reported
        let mut restored = Ok(());
        for (original, stashed) in record.replaced.iter().rev() {
            if let Err(e) = self.backups.restore(stashed, original) {
                restored = restored.and(Err(e));
            }
        }
        removed.and(restored)?;
        Ok(Status::ok())
    }
}

/// `remove(path:...)` - move a file or tree into the backup area
#[derive(Debug)]
pub struct Remove {
    backups: Arc<BackupArea>,
    stashed: Mutex<Option<(PathBuf, PathBuf)>>,
}

impl Remove {
    fn new(backups: Arc<BackupArea>) -> Self {
        Self {
            backups,
            stashed: Mutex::new(None),
        }
    }
}

impl Action for Remove {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let path = path_param(ctx.params, REMOVE, "path")?;
        if fs::symlink_metadata(&path).is_err() {
            log::debug!("{} already absent", path.display());
            return Ok(Status::ok());
        }
        let stashed = self.backups.stash(&path)?;
        *locked(&self.stashed) = Some((path, stashed));
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        if let Some((original, stashed)) = locked(&self.stashed).take() {
            self.backups.restore(&stashed, &original)?;
        }
        Ok(Status::ok())
    }
}

// ============================================================================
// ln
// ============================================================================

#[derive(Debug, Default)]
struct LinkRecord {
    link: Option<PathBuf>,
    parents: Vec<PathBuf>,
}

/// `ln(target:...,link:...)` - create a symbolic link at `link`
#[derive(Debug, Default)]
pub struct Ln {
    record: Mutex<LinkRecord>,
}

impl Action for Ln {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let target = path_param(ctx.params, LN, "target")?;
        let link = path_param(ctx.params, LN, "link")?;

        if fs::symlink_metadata(&link).is_ok() {
            bail!("{} already exists", link.display());
        }

        let mut record = LinkRecord::default();
        let result = link
            .parent()
            .map_or(Ok(()), |parent| ensure_dir(parent, &mut record.parents))
            .and_then(|()| create_link(&target, &link));
        if result.is_ok() {
            record.link = Some(link);
        }
        *locked(&self.record) = record;
        result?;
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        let record = std::mem::take(&mut *locked(&self.record));
        if let Some(link) = &record.link {
            remove_link(link)?;
        }
        remove_created(&record.parents)?;
        Ok(Status::ok())
    }
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("Failed to create symlink: {} -> {}", link.display(), target.display()))
}

#[cfg(windows)]
fn create_link(target: &Path, link: &Path) -> Result<()> {
    let result = if target.is_dir() {
        // Junctions need no elevation; fall back to a directory symlink
        if junction::create(target, link).is_ok() {
            return Ok(());
        }
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    };
    result.with_context(|| format!("Failed to create symlink: {} -> {}", link.display(), target.display()))
}

#[cfg(not(any(unix, windows)))]
fn create_link(_target: &Path, _link: &Path) -> Result<()> {
    bail!("Symlinks are not supported on this platform")
}

fn remove_link(link: &Path) -> Result<()> {
    // Directory junctions and symlinks on Windows need remove_dir
    fs::remove_file(link)
        .or_else(|_| fs::remove_dir(link))
        .with_context(|| format!("Failed to remove link: {}", link.display()))
}

// ============================================================================
// chmod
// ============================================================================

/// `chmod(path:...,permissions:755)` - set Unix permission bits
///
/// Elsewhere this logs a warning and succeeds.
#[derive(Debug, Default)]
pub struct Chmod {
    previous: Mutex<Option<(PathBuf, u32)>>,
}

#[cfg(unix)]
impl Action for Chmod {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        use std::os::unix::fs::PermissionsExt;

        let path = path_param(ctx.params, CHMOD, "path")?;
        let raw = ctx.params.require(CHMOD, "permissions")?;
        let mode = u32::from_str_radix(raw.trim_start_matches("0o"), 8)
            .with_context(|| format!("Invalid permissions '{raw}'"))?;

        let old = fs::metadata(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?
            .permissions()
            .mode()
            & 0o7777;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to chmod {}", path.display()))?;
        *locked(&self.previous) = Some((path, old));
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        use std::os::unix::fs::PermissionsExt;

        if let Some((path, mode)) = locked(&self.previous).take() {
            fs::set_permissions(&path, fs::Permissions::from_mode(mode))
                .with_context(|| format!("Failed to restore permissions of {}", path.display()))?;
        }
        Ok(Status::ok())
    }
}

#[cfg(not(unix))]
impl Action for Chmod {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let path = path_param(ctx.params, CHMOD, "path")?;
        log::warn!("chmod is not supported on this platform, skipping {}", path.display());
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        Ok(Status::ok())
    }
}

// ============================================================================
// unzip
// ============================================================================

/// `unzip(source:...,target:...)` - extract a `.zip`, `.tar.gz` or `.tgz`
///
/// Refuses entries that would land outside `target`, link and device
/// entries, and never overwrites.
#[derive(Debug, Default)]
pub struct Unzip {
    extracted: Mutex<Vec<PathBuf>>,
}

impl Action for Unzip {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let source = path_param(ctx.params, UNZIP, "source")?;
        let target = path_param(ctx.params, UNZIP, "target")?;
        let name = source.to_string_lossy().to_lowercase();

        let mut created = Vec::new();
        let result = ensure_dir(&target, &mut created).and_then(|()| {
            if name.ends_with(".zip") {
                extract_zip(&source, &target, &mut created)
            } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
                extract_tar_gz(&source, &target, &mut created)
            } else {
                bail!("Unsupported archive format: {}", source.display())
            }
        });
        log::debug!("Extracted {} entries into {}", created.len(), target.display());
        *locked(&self.extracted) = created;
        result?;
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
        let created = std::mem::take(&mut *locked(&self.extracted));
        remove_created(&created)?;
        Ok(Status::ok())
    }
}

fn extract_zip(source: &Path, target: &Path, created: &mut Vec<PathBuf>) -> Result<()> {
    let file = fs::File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("Failed to read zip archive")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            bail!("Refusing unsafe archive entry: {}", entry.name());
        };
        let dest = target.join(rel);

        if entry.is_dir() {
            ensure_dir(&dest, created)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            ensure_dir(parent, created)?;
        }
        if dest.exists() {
            bail!("{} already exists", dest.display());
        }

        created.push(dest.clone());
        let mut out = fs::File::create(&dest).with_context(|| format!("Failed to create {}", dest.display()))?;
        io::copy(&mut entry, &mut out).with_context(|| format!("Failed to extract {}", dest.display()))?;
    }
    Ok(())
}

fn extract_tar_gz(source: &Path, target: &Path, created: &mut Vec<PathBuf>) -> Result<()> {
    let file = fs::File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries().context("Failed to read tar archive")? {
        let mut entry = entry?;
        let rel = entry.path()?.into_owned();
        if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
            bail!("Refusing unsafe archive entry: {}", rel.display());
        }
        let dest = target.join(&rel);

        match entry.header().entry_type() {
            EntryType::Directory => {
                ensure_dir(&dest, created)?;
                continue;
            }
            EntryType::Regular | EntryType::Continuous => {}
            EntryType::XGlobalHeader => continue,
            kind => bail!("Refusing {kind:?} archive entry: {}", rel.display()),
        }
        if let Some(parent) = dest.parent() {
            ensure_dir(parent, created)?;
        }
        if dest.exists() {
            bail!("{} already exists", dest.display());
        }

        created.push(dest.clone());
        let unpacked = entry
            .unpack_in(target)
            .with_context(|| format!("Failed to extract {}", dest.display()))?;
        if !unpacked {
            bail!("Refusing unsafe archive entry: {}", rel.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasekit::{ParametersBuilder, Profile};
    use std::io::Write;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        backups: Arc<BackupArea>,
        profile: Profile,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let backups = Arc::new(BackupArea::new(dir.path().join("backup")));
            Self {
                dir,
                backups,
                profile: Profile::new("test"),
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn arg(&self, rel: &str) -> String {
            self.path(rel).to_string_lossy().to_string()
        }

        fn action(&self, id: &str) -> SharedAction {
            lookup(id, &self.backups).unwrap()
        }

        fn run(&mut self, action: &SharedAction, params: &Parameters) -> Result<Status> {
            action.execute(&mut ActionContext::new(params, &mut self.profile))
        }

        fn undo(&mut self, action: &SharedAction, params: &Parameters) -> Result<Status> {
            action.undo(&mut ActionContext::new(params, &mut self.profile))
        }
    }

    #[test]
    fn test_mkdir_undo_removes_created_parents() {
        let mut fx = Fixture::new();
        let params = ParametersBuilder::new().with("path", fx.arg("a/b/c")).build();
        let action = fx.action(MKDIR);

        assert!(fx.run(&action, &params).unwrap().is_ok());
        assert!(fx.path("a/b/c").is_dir());

        fx.undo(&action, &params).unwrap();
        assert!(!fx.path("a").exists());
    }

    #[test]
    fn test_mkdir_missing_param_is_error() {
        let mut fx = Fixture::new();
        let action = fx.action(MKDIR);
        let err = fx.run(&action, &Parameters::default()).unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_rmdir_then_undo() {
        let mut fx = Fixture::new();
        fs::create_dir(fx.path("empty")).unwrap();
        let params = ParametersBuilder::new().with("path", fx.arg("empty")).build();
        let action = fx.action(RMDIR);

        fx.run(&action, &params).unwrap();
        assert!(!fx.path("empty").exists());
        fx.undo(&action, &params).unwrap();
        assert!(fx.path("empty").is_dir());
    }

    #[test]
    fn test_copy_tree_and_undo() {
        let mut fx = Fixture::new();
        fs::create_dir_all(fx.path("src/nested")).unwrap();
        fs::write(fx.path("src/a.txt"), "a").unwrap();
        fs::write(fx.path("src/nested/b.txt"), "b").unwrap();

        let params = ParametersBuilder::new()
            .with("source", fx.arg("src"))
            .with("target", fx.arg("out/dst"))
            .build();
        let action = fx.action(COPY);

        fx.run(&action, &params).unwrap();
        assert_eq!(fs::read_to_string(fx.path("out/dst/nested/b.txt")).unwrap(), "b");

        fx.undo(&action, &params).unwrap();
        assert!(!fx.path("out").exists());
        assert!(fx.path("src/a.txt").exists());
    }

    #[test]
    fn test_copy_refuses_overwrite_by_default() {
        let mut fx = Fixture::new();
        fs::write(fx.path("new.txt"), "new").unwrap();
        fs::write(fx.path("old.txt"), "old").unwrap();

        let params = ParametersBuilder::new()
            .with("source", fx.arg("new.txt"))
            .with("target", fx.arg("old.txt"))
            .build();
        let action = fx.action(COPY);

        assert!(fx.run(&action, &params).is_err());
        assert_eq!(fs::read_to_string(fx.path("old.txt")).unwrap(), "old");
    }

    #[test]
    fn test_copy_overwrite_restores_original_on_undo() {
        let mut fx = Fixture::new();
        fs::write(fx.path("new.txt"), "new").unwrap();
        fs::write(fx.path("old.txt"), "old").unwrap();

        let params = ParametersBuilder::new()
            .with("source", fx.arg("new.txt"))
            .with("target", fx.arg("old.txt"))
            .with("overwrite", "true")
            .build();
        let action = fx.action(COPY);

        fx.run(&action, &params).unwrap();
        assert_eq!(fs::read_to_string(fx.path("old.txt")).unwrap(), "new");

        fx.undo(&action, &params).unwrap();
        assert_eq!(fs::read_to_string(fx.path("old.txt")).unwrap(), "old");
    }

    #[test]
    fn test_remove_then_undo() {
        let mut fx = Fixture::new();
        fs::create_dir_all(fx.path("tree/sub")).unwrap();
        fs::write(fx.path("tree/sub/f.txt"), "f").unwrap();

        let params = ParametersBuilder::new().with("path", fx.arg("tree")).build();
        let action = fx.action(REMOVE);

        fx.run(&action, &params).unwrap();
        assert!(!fx.path("tree").exists());

        fx.undo(&action, &params).unwrap();
        assert_eq!(fs::read_to_string(fx.path("tree/sub/f.txt")).unwrap(), "f");
    }

    #[test]
    fn test_remove_absent_is_ok() {
        let mut fx = Fixture::new();
        let params = ParametersBuilder::new().with("path", fx.arg("ghost")).build();
        let action = fx.action(REMOVE);
        assert!(fx.run(&action, &params).unwrap().is_ok());
        assert!(fx.undo(&action, &params).unwrap().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_ln_then_undo() {
        let mut fx = Fixture::new();
        fs::write(fx.path("target.txt"), "t").unwrap();

        let params = ParametersBuilder::new()
            .with("target", fx.arg("target.txt"))
            .with("link", fx.arg("links/here"))
            .build();
        let action = fx.action(LN);

        fx.run(&action, &params).unwrap();
        assert_eq!(fs::read_link(fx.path("links/here")).unwrap(), fx.path("target.txt"));

        fx.undo(&action, &params).unwrap();
        assert!(!fx.path("links").exists());
        assert!(fx.path("target.txt").exists());
    }

    #[test]
    fn test_ln_refuses_existing_link_path() {
        let mut fx = Fixture::new();
        fs::write(fx.path("busy"), "x").unwrap();
        let params = ParametersBuilder::new()
            .with("target", fx.arg("anything"))
            .with("link", fx.arg("busy"))
            .build();
        let action = fx.action(LN);
        assert!(fx.run(&action, &params).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_chmod_then_undo() {
        use std::os::unix::fs::PermissionsExt;

        let mut fx = Fixture::new();
        fs::write(fx.path("script.sh"), "#!/bin/sh").unwrap();
        fs::set_permissions(fx.path("script.sh"), fs::Permissions::from_mode(0o644)).unwrap();

        let params = ParametersBuilder::new()
            .with("path", fx.arg("script.sh"))
            .with("permissions", "755")
            .build();
        let action = fx.action(CHMOD);

        fx.run(&action, &params).unwrap();
        let mode = fs::metadata(fx.path("script.sh")).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);

        fx.undo(&action, &params).unwrap();
        let mode = fs::metadata(fx.path("script.sh")).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_unzip_zip_and_undo() {
        let mut fx = Fixture::new();
        let archive = fx.path("bundle.zip");
        {
            let options = zip::write::SimpleFileOptions::default();
            let mut writer = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
            writer.add_directory("bin/", options).unwrap();
            writer.start_file("bin/tool", options).unwrap();
            writer.write_all(b"binary").unwrap();
            writer.start_file("README", options).unwrap();
            writer.write_all(b"docs").unwrap();
            writer.finish().unwrap();
        }

        let params = ParametersBuilder::new()
            .with("source", archive.to_string_lossy())
            .with("target", fx.arg("opt/tool"))
            .build();
        let action = fx.action(UNZIP);

        fx.run(&action, &params).unwrap();
        assert_eq!(fs::read_to_string(fx.path("opt/tool/bin/tool")).unwrap(), "binary");
        assert_eq!(fs::read_to_string(fx.path("opt/tool/README")).unwrap(), "docs");

        fx.undo(&action, &params).unwrap();
        assert!(!fx.path("opt").exists());
        assert!(archive.exists());
    }

    #[test]
    fn test_unzip_tar_gz() {
        let mut fx = Fixture::new();
        let archive = fx.path("bundle.tar.gz");
        {
            let encoder = flate2::write::GzEncoder::new(
                fs::File::create(&archive).unwrap(),
                flate2::Compression::default(),
            );
            let mut builder = tar::Builder::new(encoder);
            let data = b"hello";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "share/greeting.txt", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let params = ParametersBuilder::new()
            .with("source", archive.to_string_lossy())
            .with("target", fx.arg("opt"))
            .build();
        let action = fx.action(UNZIP);

        fx.run(&action, &params).unwrap();
        assert_eq!(fs::read_to_string(fx.path("opt/share/greeting.txt")).unwrap(), "hello");

        fx.undo(&action, &params).unwrap();
        assert!(!fx.path("opt").exists());
    }

    #[test]
    fn test_unzip_tar_gz_refuses_symlink_entry() {
        let mut fx = Fixture::new();
        let outside = fx.path("outside");
        fs::create_dir_all(&outside).unwrap();
        let archive = fx.path("bundle.tgz");
        {
            let encoder = flate2::write::GzEncoder::new(
                fs::File::create(&archive).unwrap(),
                flate2::Compression::default(),
            );
            let mut builder = tar::Builder::new(encoder);
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            builder.append_link(&mut link, "esc", &outside).unwrap();

            let data = b"pwned";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "esc/evil.txt", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let params = ParametersBuilder::new()
            .with("source", archive.to_string_lossy())
            .with("target", fx.arg("opt"))
            .build();
        let action = fx.action(UNZIP);

        let err = fx.run(&action, &params).unwrap_err();
        assert!(format!("{err:#}").contains("Symlink"), "{err:#}");
        assert!(fs::symlink_metadata(fx.path("opt/esc")).is_err());
        assert!(!outside.join("evil.txt").exists());

        fx.undo(&action, &params).unwrap();
        assert!(!fx.path("opt").exists());
    }

    #[test]
    fn test_unzip_unknown_format() {
        let mut fx = Fixture::new();
        fs::write(fx.path("bundle.rar"), "x").unwrap();
        let params = ParametersBuilder::new()
            .with("source", fx.arg("bundle.rar"))
            .with("target", fx.arg("opt"))
            .build();
        let action = fx.action(UNZIP);

        let err = fx.run(&action, &params).unwrap_err();
        assert!(err.to_string().contains("Unsupported archive format"));
        fx.undo(&action, &params).unwrap();
        assert!(!fx.path("opt").exists());
    }
}
