//! Phase-local actions that edit the profile
//!
//! Each instance remembers what it replaced so `undo` can put it back.

use crate::action::{Action, ActionContext, SharedAction};
use crate::error::ConfigError;
use crate::params::{PARAM_UNIT_ID, PARAM_UNIT_VERSION, Parameters};
use crate::profile::Properties;
use crate::status::Status;
use crate::unit::{InstallableUnit, UnitKey};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const INSTALL_UNIT: &str = "installUnit";
pub const UNINSTALL_UNIT: &str = "uninstallUnit";
pub const SET_PROFILE_PROPERTY: &str = "setProfileProperty";
pub const REMOVE_PROFILE_PROPERTY: &str = "removeProfileProperty";
pub const SET_UNIT_PROPERTY: &str = "setUnitProperty";
pub const REMOVE_UNIT_PROPERTY: &str = "removeUnitProperty";

/// Fresh instance of a property action, or `None`
pub fn property_action(id: &str) -> Option<SharedAction> {
    let action: SharedAction = match id {
        SET_PROFILE_PROPERTY => Arc::new(SetProfileProperty::default()),
        REMOVE_PROFILE_PROPERTY => Arc::new(RemoveProfileProperty::default()),
        SET_UNIT_PROPERTY => Arc::new(SetUnitProperty::default()),
        REMOVE_UNIT_PROPERTY => Arc::new(RemoveUnitProperty::default()),
        _ => return None,
    };
    Some(action)
}

/// What an action saw before it changed something
#[derive(Debug)]
struct Memo<T>(Mutex<Option<T>>);

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self(Mutex::new(None))
    }
}

impl<T> Memo<T> {
    fn guard(&self) -> MutexGuard<'_, Option<T>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, value: T) {
        *self.guard() = Some(value);
    }

    fn take(&self) -> Option<T> {
        self.guard().take()
    }
}

fn target_unit(action: &str, params: &Parameters) -> Result<UnitKey, ConfigError> {
    Ok(UnitKey::new(
        params.require(action, PARAM_UNIT_ID)?,
        params.require(action, PARAM_UNIT_VERSION)?,
    ))
}

// ============================================================================
// Unit membership
// ============================================================================

/// Adds the operand's target unit to the profile
///
/// Re-installing a unit that is already present swaps the unit record and
/// leaves its per-unit properties alone.
#[derive(Debug, Default)]
pub struct InstallUnit {
    replaced: Memo<Option<InstallableUnit>>,
}

impl Action for InstallUnit {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let Some(unit) = ctx.params.operand().and_then(|op| op.to()) else {
            anyhow::bail!("{INSTALL_UNIT} needs an operand with a target unit");
        };
        let previous = ctx.profile.replace_unit(InstallableUnit::clone(unit));
        self.replaced.store(previous);
        log::debug!("Added {} to profile '{}'", unit, ctx.profile.id());
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let Some(unit) = ctx.params.operand().and_then(|op| op.to()) else {
            return Ok(Status::ok());
        };
        let Some(previous) = self.replaced.take() else {
            return Ok(Status::ok());
        };
        match previous {
            Some(previous) => {
                ctx.profile.replace_unit(previous);
            }
            None => {
                ctx.profile.take_unit(&unit.key());
            }
        }
        Ok(Status::ok())
    }
}

/// Removes the operand's source unit and its properties from the profile
#[derive(Debug, Default)]
pub struct UninstallUnit {
    removed: Memo<(InstallableUnit, Properties)>,
}

impl Action for UninstallUnit {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let Some(unit) = ctx.params.operand().and_then(|op| op.from()) else {
            anyhow::bail!("{UNINSTALL_UNIT} needs an operand with a source unit");
        };
        match ctx.profile.remove_unit(&unit.key()) {
            Some(entry) => {
                log::debug!("Removed {} from profile '{}'", unit, ctx.profile.id());
                self.removed.store(entry);
            }
            None => log::debug!("{} was not in profile '{}'", unit, ctx.profile.id()),
        }
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        if let Some((unit, properties)) = self.removed.take() {
            ctx.profile.restore_unit(unit, properties);
        }
        Ok(Status::ok())
    }
}

// ============================================================================
// Profile properties
// ============================================================================

/// `setProfileProperty(name:, value:)`
#[derive(Debug, Default)]
pub struct SetProfileProperty {
    previous: Memo<(String, Option<String>)>,
}

impl Action for SetProfileProperty {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let name = ctx.params.require(SET_PROFILE_PROPERTY, "name")?.to_string();
        let value = ctx.params.require(SET_PROFILE_PROPERTY, "value")?.to_string();
        let previous = ctx.profile.set_property(name.clone(), value);
        self.previous.store((name, previous));
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        match self.previous.take() {
            Some((name, Some(value))) => {
                ctx.profile.set_property(name, value);
            }
            Some((name, None)) => {
                ctx.profile.remove_property(&name);
            }
            None => {}
        }
        Ok(Status::ok())
    }
}

/// `removeProfileProperty(name:)`
#[derive(Debug, Default)]
pub struct RemoveProfileProperty {
    removed: Memo<(String, String)>,
}

impl Action for RemoveProfileProperty {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let name = ctx.params.require(REMOVE_PROFILE_PROPERTY, "name")?.to_string();
        if let Some(value) = ctx.profile.remove_property(&name) {
            self.removed.store((name, value));
        }
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        if let Some((name, value)) = self.removed.take() {
            ctx.profile.set_property(name, value);
        }
        Ok(Status::ok())
    }
}

// ============================================================================
// Per-unit properties
// ============================================================================

/// `setUnitProperty(name:, value:)` on the unit the phase acts on
#[derive(Debug, Default)]
pub struct SetUnitProperty {
    previous: Memo<(UnitKey, String, Option<String>)>,
}

impl Action for SetUnitProperty {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let key = target_unit(SET_UNIT_PROPERTY, ctx.params)?;
        let name = ctx.params.require(SET_UNIT_PROPERTY, "name")?.to_string();
        let value = ctx.params.require(SET_UNIT_PROPERTY, "value")?.to_string();
        let previous = ctx.profile.set_unit_property(&key, name.clone(), value);
        self.previous.store((key, name, previous));
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        match self.previous.take() {
            Some((key, name, Some(value))) => {
                ctx.profile.set_unit_property(&key, name, value);
            }
            Some((key, name, None)) => {
                ctx.profile.remove_unit_property(&key, &name);
            }
            None => {}
        }
        Ok(Status::ok())
    }
}

/// `removeUnitProperty(name:)` on the unit the phase acts on
#[derive(Debug, Default)]
pub struct RemoveUnitProperty {
    removed: Memo<(UnitKey, String, String)>,
}

impl Action for RemoveUnitProperty {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        let key = target_unit(REMOVE_UNIT_PROPERTY, ctx.params)?;
        let name = ctx.params.require(REMOVE_UNIT_PROPERTY, "name")?.to_string();
        if let Some(value) = ctx.profile.remove_unit_property(&key, &name) {
            self.removed.store((key, name, value));
        }
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
        if let Some((key, name, value)) = self.removed.take() {
            ctx.profile.set_unit_property(&key, name, value);
        }
        Ok(Status::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Operand;
    use crate::params::ParametersBuilder;
    use crate::profile::Profile;

    fn run(action: &SharedAction, params: &Parameters, profile: &mut Profile) -> Status {
        action
            .execute(&mut ActionContext::new(params, profile))
            .unwrap()
    }

    fn undo(action: &SharedAction, params: &Parameters, profile: &mut Profile) -> Status {
        action.undo(&mut ActionContext::new(params, profile)).unwrap()
    }

    #[test]
    fn test_set_profile_property_restores_previous() {
        let mut profile = Profile::new("p");
        profile.set_property("color", "blue");
        let params = ParametersBuilder::new()
            .with("name", "color")
            .with("value", "red")
            .build();

        let action = property_action(SET_PROFILE_PROPERTY).unwrap();
        assert!(run(&action, &params, &mut profile).is_ok());
        assert_eq!(profile.property("color"), Some("red"));
        undo(&action, &params, &mut profile);
        assert_eq!(profile.property("color"), Some("blue"));
    }

    #[test]
    fn test_set_profile_property_undo_removes_new_key() {
        let mut profile = Profile::new("p");
        let params = ParametersBuilder::new()
            .with("name", "fresh")
            .with("value", "1")
            .build();

        let action = property_action(SET_PROFILE_PROPERTY).unwrap();
        run(&action, &params, &mut profile);
        undo(&action, &params, &mut profile);
        assert_eq!(profile.property("fresh"), None);
    }

    #[test]
    fn test_missing_argument_is_error() {
        let mut profile = Profile::new("p");
        let action = property_action(SET_PROFILE_PROPERTY).unwrap();
        let result = action.execute(&mut ActionContext::new(&Parameters::default(), &mut profile));
        assert!(result.is_err());
    }

    #[test]
    fn test_unit_property_round_trip() {
        let mut profile = Profile::new("p");
        let params = ParametersBuilder::new()
            .with(PARAM_UNIT_ID, "a")
            .with(PARAM_UNIT_VERSION, "1")
            .with("name", "pinned")
            .with("value", "yes")
            .build();
        let key = UnitKey::new("a", "1");

        let set = property_action(SET_UNIT_PROPERTY).unwrap();
        run(&set, &params, &mut profile);
        assert_eq!(profile.unit_property(&key, "pinned"), Some("yes"));

        let remove = property_action(REMOVE_UNIT_PROPERTY).unwrap();
        run(&remove, &params, &mut profile);
        assert_eq!(profile.unit_property(&key, "pinned"), None);

        undo(&remove, &params, &mut profile);
        assert_eq!(profile.unit_property(&key, "pinned"), Some("yes"));
        undo(&set, &params, &mut profile);
        assert_eq!(profile.unit_property(&key, "pinned"), None);
    }

    #[test]
    fn test_uninstall_unit_undo_restores_properties() {
        let unit = Arc::new(InstallableUnit::new("a", "1"));
        let mut profile = Profile::new("p");
        profile.add_unit(InstallableUnit::clone(&unit));
        profile.set_unit_property(&unit.key(), "pinned", "yes");

        let mut builder = ParametersBuilder::new();
        builder.operand(Operand::uninstall(Arc::clone(&unit)));
        let params = builder.build();

        let action: SharedAction = Arc::new(UninstallUnit::default());
        run(&action, &params, &mut profile);
        assert!(!profile.contains_unit(&unit.key()));

        undo(&action, &params, &mut profile);
        assert!(profile.contains_unit(&unit.key()));
        assert_eq!(profile.unit_property(&unit.key(), "pinned"), Some("yes"));
    }

    #[test]
    fn test_install_unit_undo_removes_unit() {
        let unit = Arc::new(InstallableUnit::new("a", "1"));
        let mut profile = Profile::new("p");
        let mut builder = ParametersBuilder::new();
        builder.operand(Operand::install(Arc::clone(&unit)));
        let params = builder.build();

        let action: SharedAction = Arc::new(InstallUnit::default());
        run(&action, &params, &mut profile);
        assert!(profile.contains_unit(&unit.key()));
        undo(&action, &params, &mut profile);
        assert!(!profile.contains_unit(&unit.key()));
    }

    #[test]
    fn test_reinstall_keeps_unit_properties() {
        let unit = Arc::new(InstallableUnit::new("a", "1"));
        let mut profile = Profile::new("p");
        profile.add_unit(InstallableUnit::clone(&unit));
        profile.set_unit_property(&unit.key(), "channel", "stable");

        let mut builder = ParametersBuilder::new();
        builder.operand(Operand::install(Arc::clone(&unit)));
        let params = builder.build();

        let action: SharedAction = Arc::new(InstallUnit::default());
        run(&action, &params, &mut profile);
        assert!(profile.contains_unit(&unit.key()));
        assert_eq!(profile.unit_property(&unit.key(), "channel"), Some("stable"));

        undo(&action, &params, &mut profile);
        assert!(profile.contains_unit(&unit.key()));
        assert_eq!(profile.unit_property(&unit.key(), "channel"), Some("stable"));
    }
}
