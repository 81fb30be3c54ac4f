//! On-disk profile store
//!
//! One TOML file per profile under the profiles directory. Parents are
//! loaded and attached on `get` so property lookup falls back through them.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use phasekit::{Profile, ProfileStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serialized profile plus bookkeeping
#[derive(Debug, Serialize, Deserialize)]
struct ProfileFile {
    /// When this file was last written
    saved_at: DateTime<Utc>,
    profile: Profile,
}

/// Profile store backed by `<root>/<id>.toml`
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    root: PathBuf,
}

impl FileProfileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn profile_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            bail!("Invalid profile id '{id}'");
        }
        Ok(self.root.join(format!("{id}.toml")))
    }

    /// Ids of every stored profile, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read profiles directory: {}", self.root.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml")
                && let Some(stem) = path.file_stem()
            {
                ids.push(stem.to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// When the profile was last saved
    pub fn saved_at(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read(id)?.map(|file| file.saved_at))
    }

    fn read(&self, id: &str) -> Result<Option<ProfileFile>> {
        let path = self.profile_path(id)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;
        let file: ProfileFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;

        if file.profile.id() != id {
            bail!(
                "Profile file {} holds profile '{}'",
                path.display(),
                file.profile.id()
            );
        }
        Ok(Some(file))
    }

    fn write(&self, profile: &Profile) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create profiles directory: {}", self.root.display())
        })?;

        let path = self.profile_path(profile.id())?;
        let file = ProfileFile {
            saved_at: Utc::now(),
            profile: profile.clone(),
        };
        let content = toml::to_string_pretty(&file).context("Failed to serialize profile to TOML")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write profile: {}", path.display()))?;

        log::debug!("Saved profile '{}' to {}", profile.id(), path.display());
        Ok(())
    }

    /// Load `id` and attach its parent chain
    fn load_chain(&self, id: &str, seen: &mut HashSet<String>) -> Result<Option<Profile>> {
        if !seen.insert(id.to_string()) {
            bail!("Profile '{id}' is its own ancestor");
        }
        let Some(file) = self.read(id)? else {
            return Ok(None);
        };

        let mut profile = file.profile;
        if let Some(parent_id) = profile.parent_id().map(str::to_string) {
            let parent = self
                .load_chain(&parent_id, seen)?
                .with_context(|| format!("Parent profile '{parent_id}' of '{id}' not found"))?;
            profile.attach_parent(Arc::new(parent));
        }
        Ok(Some(profile))
    }
}

impl ProfileStore for FileProfileStore {
    fn get(&self, id: &str) -> Result<Option<Profile>> {
        self.load_chain(id, &mut HashSet::new())
    }

    fn add(&self, profile: &Profile) -> Result<()> {
        if self.profile_path(profile.id())?.exists() {
            bail!("Profile '{}' already exists", profile.id());
        }
        self.write(profile)
    }

    fn update(&self, profile: &Profile) -> Result<()> {
        if !self.profile_path(profile.id())?.exists() {
            bail!("Profile '{}' does not exist", profile.id());
        }
        self.write(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasekit::{InstallableUnit, UnitKey};
    use tempfile::TempDir;

    fn store() -> (TempDir, FileProfileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileProfileStore::new(dir.path().join("profiles"));
        (dir, store)
    }

    #[test]
    fn test_add_then_get() {
        let (_dir, store) = store();
        let mut profile = Profile::new("dev");
        profile.set_property("installFolder", "/opt/dev");
        profile.add_unit(InstallableUnit::new("tool", "1.0").with_instruction("install", "mkdir(path:x)"));
        profile.set_unit_property(&UnitKey::new("tool", "1.0"), "pinned", "yes");

        store.add(&profile).unwrap();
        let loaded = store.get("dev").unwrap().unwrap();

        assert!(loaded.same_content(&profile));
        assert!(store.saved_at("dev").unwrap().is_some());
    }

    #[test]
    fn test_missing_profile_is_none() {
        let (_dir, store) = store();
        assert!(store.get("nope").unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_add_twice_fails() {
        let (_dir, store) = store();
        let profile = Profile::new("dev");
        store.add(&profile).unwrap();
        assert!(store.add(&profile).is_err());
    }

    #[test]
    fn test_update_requires_existing() {
        let (_dir, store) = store();
        let profile = Profile::new("dev");
        assert!(store.update(&profile).is_err());
        store.add(&profile).unwrap();
        assert!(store.update(&profile).is_ok());
    }

    #[test]
    fn test_parent_chain_attached() {
        let (_dir, store) = store();
        let mut base = Profile::new("base");
        base.set_property("color", "blue");
        store.add(&base).unwrap();

        let child = Profile::new("child").with_parent(Arc::new(base));
        store.add(&child).unwrap();

        let loaded = store.get("child").unwrap().unwrap();
        assert_eq!(loaded.parent_id(), Some("base"));
        assert_eq!(loaded.property("color"), Some("blue"));
        assert_eq!(store.list().unwrap(), vec!["base", "child"]);
    }

    #[test]
    fn test_invalid_id_rejected() {
        let (_dir, store) = store();
        assert!(store.get("../etc").is_err());
        assert!(store.add(&Profile::new("a/b")).is_err());
    }
}
