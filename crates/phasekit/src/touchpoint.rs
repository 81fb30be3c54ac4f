//! Touchpoints - pluggable handlers keyed by touchpoint type
//!
//! A touchpoint knows how to act on units of one target system ("native",
//! "null", ...). New kinds are added by registering them under their type key
//! in a [`TouchpointRegistry`].

use crate::action::SharedAction;
use crate::operand::Operand;
use crate::params::{Parameters, ParametersBuilder};
use crate::profile::Profile;
use crate::status::Status;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Handler for one touchpoint type
///
/// Phase hooks run once per phase for every touchpoint used by that phase;
/// operand hooks run once per applicable operand.
pub trait Touchpoint: Send + Sync {
    /// Type key this touchpoint is registered under
    fn touchpoint_type(&self) -> &str;

    /// A fresh instance of a touchpoint-scoped action, or `None`
    fn action(&self, id: &str) -> Option<SharedAction>;

    /// Contribute touchpoint-scoped phase parameters
    fn initialize_phase(
        &self,
        _phase_id: &str,
        _profile: &Profile,
        _params: &mut ParametersBuilder,
    ) -> Status {
        Status::ok()
    }

    fn complete_phase(&self, _phase_id: &str, _profile: &mut Profile, _params: &Parameters) -> Status {
        Status::ok()
    }

    /// Contribute operand-scoped parameters
    fn initialize_operand(
        &self,
        _profile: &Profile,
        _operand: &Operand,
        _params: &mut ParametersBuilder,
    ) -> Status {
        Status::ok()
    }

    fn complete_operand(&self, _profile: &mut Profile, _operand: &Operand, _params: &Parameters) -> Status {
        Status::ok()
    }

    /// Called once after the transaction committed
    fn commit(&self, _profile: &Profile) -> Status {
        Status::ok()
    }

    /// Called once after the transaction rolled back
    fn rollback(&self, _profile: &Profile) -> Status {
        Status::ok()
    }
}

/// A shared touchpoint
pub type SharedTouchpoint = Arc<dyn Touchpoint>;

/// Touchpoint with no actions of its own
///
/// Units that only need profile membership (or only phase-local property
/// actions) use it.
#[derive(Debug, Default)]
pub struct NullTouchpoint;

impl Touchpoint for NullTouchpoint {
    fn touchpoint_type(&self) -> &str {
        crate::unit::NULL_TOUCHPOINT
    }

    fn action(&self, _id: &str) -> Option<SharedAction> {
        None
    }
}

/// Registry of touchpoints keyed by type
#[derive(Clone, Default)]
pub struct TouchpointRegistry {
    touchpoints: BTreeMap<String, SharedTouchpoint>,
}

impl TouchpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the [`NullTouchpoint`]
    pub fn with_null() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NullTouchpoint));
        registry
    }

    /// Register a touchpoint, returning the one it replaced
    pub fn register(&mut self, touchpoint: SharedTouchpoint) -> Option<SharedTouchpoint> {
        let key = touchpoint.touchpoint_type().to_string();
        log::debug!("Registering touchpoint '{}'", key);
        self.touchpoints.insert(key, touchpoint)
    }

    pub fn lookup(&self, touchpoint_type: &str) -> Option<SharedTouchpoint> {
        self.touchpoints.get(touchpoint_type).cloned()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.touchpoints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.touchpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touchpoints.is_empty()
    }
}

impl fmt::Debug for TouchpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.touchpoints.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = TouchpointRegistry::new();
        assert!(registry.lookup("null").is_none());
        assert!(registry.register(Arc::new(NullTouchpoint)).is_none());
        assert!(registry.register(Arc::new(NullTouchpoint)).is_some());
        assert!(registry.lookup("null").is_some());
        assert_eq!(registry.types().collect::<Vec<_>>(), vec!["null"]);
    }

    #[test]
    fn test_null_touchpoint_has_no_actions() {
        assert!(NullTouchpoint.action("mkdir").is_none());
    }
}
