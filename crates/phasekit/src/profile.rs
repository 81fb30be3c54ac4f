//! Profiles - the mutable record of what is installed - and their store

use crate::unit::{InstallableUnit, UnitKey};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Per-unit property map
pub type Properties = BTreeMap<String, String>;

/// A profile: profile-scoped properties, installed units, per-unit properties
///
/// Property lookups fall back to the parent profile when a key is absent
/// locally. Every mutation marks the profile as changed so the engine knows
/// whether it must be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(skip)]
    parent: Option<Arc<Profile>>,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    units: BTreeMap<String, InstallableUnit>,
    #[serde(default)]
    unit_properties: BTreeMap<String, Properties>,
    #[serde(skip)]
    changed: bool,
}

impl Profile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            parent: None,
            properties: Properties::new(),
            units: BTreeMap::new(),
            unit_properties: BTreeMap::new(),
            changed: false,
        }
    }

    /// Attach a parent for property fallback
    pub fn with_parent(mut self, parent: Arc<Profile>) -> Self {
        self.parent_id = Some(parent.id.clone());
        self.parent = Some(parent);
        self
    }

    /// Re-attach a loaded parent (the parent itself is not serialized)
    pub fn attach_parent(&mut self, parent: Arc<Profile>) {
        self.parent_id = Some(parent.id.clone());
        self.parent = Some(parent);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<Profile>> {
        self.parent.as_ref()
    }

    // ------------------------------------------------------------------------
    // Profile properties
    // ------------------------------------------------------------------------

    /// Look up a property locally, then through the parent chain
    pub fn property(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(value) => Some(value.as_str()),
            None => self.parent.as_ref().and_then(|p| p.property(key)),
        }
    }

    /// Local properties only
    pub fn local_properties(&self) -> &Properties {
        &self.properties
    }

    /// Set a local property, returning the previous local value
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.changed = true;
        self.properties.insert(key.into(), value.into())
    }

    /// Remove a local property, returning its value
    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        let removed = self.properties.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    // ------------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------------

    pub fn add_unit(&mut self, unit: InstallableUnit) {
        self.replace_unit(unit);
    }

    /// Put `unit` in place of the unit with the same key, keeping that key's
    /// per-unit properties; returns the unit it displaced
    pub fn replace_unit(&mut self, unit: InstallableUnit) -> Option<InstallableUnit> {
        self.changed = true;
        self.units.insert(unit.key().to_string(), unit)
    }

    /// Remove a unit but leave its per-unit properties in place
    pub fn take_unit(&mut self, key: &UnitKey) -> Option<InstallableUnit> {
        let unit = self.units.remove(&key.to_string())?;
        self.changed = true;
        Some(unit)
    }

    /// Remove a unit together with its per-unit properties
    pub fn remove_unit(&mut self, key: &UnitKey) -> Option<(InstallableUnit, Properties)> {
        let name = key.to_string();
        let unit = self.units.remove(&name)?;
        self.changed = true;
        let properties = self.unit_properties.remove(&name).unwrap_or_default();
        Some((unit, properties))
    }

    pub fn contains_unit(&self, key: &UnitKey) -> bool {
        self.units.contains_key(&key.to_string())
    }

    pub fn unit(&self, key: &UnitKey) -> Option<&InstallableUnit> {
        self.units.get(&key.to_string())
    }

    pub fn units(&self) -> impl Iterator<Item = &InstallableUnit> {
        self.units.values()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    // ------------------------------------------------------------------------
    // Per-unit properties
    // ------------------------------------------------------------------------

    pub fn unit_properties(&self, key: &UnitKey) -> Option<&Properties> {
        self.unit_properties.get(&key.to_string())
    }

    pub fn unit_property(&self, key: &UnitKey, name: &str) -> Option<&str> {
        self.unit_properties
            .get(&key.to_string())
            .and_then(|props| props.get(name))
            .map(String::as_str)
    }

    /// Set a per-unit property, returning the previous value
    pub fn set_unit_property(
        &mut self,
        key: &UnitKey,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.changed = true;
        self.unit_properties
            .entry(key.to_string())
            .or_default()
            .insert(name.into(), value.into())
    }

    /// Remove a per-unit property, returning its value
    pub fn remove_unit_property(&mut self, key: &UnitKey, name: &str) -> Option<String> {
        let name_key = key.to_string();
        let props = self.unit_properties.get_mut(&name_key)?;
        let removed = props.remove(name);
        if props.is_empty() {
            self.unit_properties.remove(&name_key);
        }
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    /// Restore a unit and replace its per-unit properties wholesale
    pub fn restore_unit(&mut self, unit: InstallableUnit, properties: Properties) {
        let name = unit.key().to_string();
        self.changed = true;
        self.units.insert(name.clone(), unit);
        if properties.is_empty() {
            self.unit_properties.remove(&name);
        } else {
            self.unit_properties.insert(name, properties);
        }
    }

    // ------------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------------

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Mark the profile as persisted
    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    /// Compare observable content (local properties, units, unit properties)
    pub fn same_content(&self, other: &Profile) -> bool {
        self.id == other.id
            && self.properties == other.properties
            && self.units == other.units
            && self.unit_properties == other.unit_properties
    }
}

/// Persistence for profiles
///
/// The store gives no transactional guarantee; the engine's commit step is
/// the transaction boundary.
pub trait ProfileStore: Send + Sync {
    /// Load a profile by id
    fn get(&self, id: &str) -> Result<Option<Profile>>;

    /// Persist a profile that does not exist yet
    fn add(&self, profile: &Profile) -> Result<()>;

    /// Persist an existing profile
    fn update(&self, profile: &Profile) -> Result<()>;
}

/// In-memory store, mainly for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    inner: Mutex<MemoryStoreState>,
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    profiles: BTreeMap<String, Profile>,
    adds: usize,
    updates: usize,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryStoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful `add` calls
    pub fn add_count(&self) -> usize {
        self.state().adds
    }

    /// Number of successful `update` calls
    pub fn update_count(&self) -> usize {
        self.state().updates
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(&self, id: &str) -> Result<Option<Profile>> {
        Ok(self.state().profiles.get(id).cloned())
    }

    fn add(&self, profile: &Profile) -> Result<()> {
        let mut state = self.state();
        if state.profiles.contains_key(profile.id()) {
            anyhow::bail!("profile '{}' already exists", profile.id());
        }
        let mut stored = profile.clone();
        stored.clear_changed();
        state.profiles.insert(profile.id().to_string(), stored);
        state.adds += 1;
        Ok(())
    }

    fn update(&self, profile: &Profile) -> Result<()> {
        let mut state = self.state();
        if !state.profiles.contains_key(profile.id()) {
            anyhow::bail!("profile '{}' does not exist", profile.id());
        }
        let mut stored = profile.clone();
        stored.clear_changed();
        state.profiles.insert(profile.id().to_string(), stored);
        state.updates += 1;
        Ok(())
    }
}
