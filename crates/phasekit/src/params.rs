//! Immutable parameter snapshots handed to actions and hooks

use crate::error::ConfigError;
use crate::operand::Operand;
use std::collections::BTreeMap;

/// Phase id of the running phase
pub const PARAM_PHASE_ID: &str = "phaseId";
/// Id of the profile being provisioned
pub const PARAM_PROFILE_ID: &str = "profileId";
/// Touchpoint type the parameters were built for
pub const PARAM_TOUCHPOINT: &str = "touchpoint";
/// Id of the unit the current phase acts on
pub const PARAM_UNIT_ID: &str = "unitId";
/// Version of the unit the current phase acts on
pub const PARAM_UNIT_VERSION: &str = "unitVersion";

/// A frozen parameter map
///
/// Built once per scope (phase, touchpoint, operand, action) through
/// [`ParametersBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    values: BTreeMap<String, String>,
    operand: Option<Operand>,
}

impl Parameters {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Fetch a parameter an action cannot work without
    pub fn require(&self, action: &str, name: &str) -> Result<&str, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::MissingParameter {
            action: action.to_string(),
            parameter: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The operand these parameters were built for, if operand-scoped
    pub fn operand(&self) -> Option<&Operand> {
        self.operand.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Start a builder seeded with these values
    pub fn to_builder(&self) -> ParametersBuilder {
        ParametersBuilder {
            values: self.values.clone(),
            operand: self.operand.clone(),
        }
    }
}

/// Builder for [`Parameters`]
#[derive(Debug, Clone, Default)]
pub struct ParametersBuilder {
    values: BTreeMap<String, String>,
    operand: Option<Operand>,
}

impl ParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn operand(&mut self, operand: Operand) -> &mut Self {
        self.operand = Some(operand);
        self
    }

    /// Read back a value set so far
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn build(self) -> Parameters {
        Parameters {
            values: self.values,
            operand: self.operand,
        }
    }
}
