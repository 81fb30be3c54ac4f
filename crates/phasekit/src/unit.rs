//! Installable units - the opaque metadata records the engine moves around

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Touchpoint type used when a unit does not name one
pub const NULL_TOUCHPOINT: &str = "null";

/// Identity of an installable unit (id + version)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub id: String,
    pub version: String,
}

impl UnitKey {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Parse the `id/version` form
    pub fn parse(text: &str) -> Option<Self> {
        let (id, version) = text.rsplit_once('/')?;
        let (id, version) = (id.trim(), version.trim());
        if id.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(id, version))
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.version)
    }
}

/// An installable unit
///
/// Immutable once built. Carries a touchpoint type and, per phase id, the
/// instruction string that phase should run for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallableUnit {
    id: String,
    version: String,
    #[serde(default = "default_touchpoint")]
    touchpoint: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    instructions: BTreeMap<String, String>,
}

fn default_touchpoint() -> String {
    NULL_TOUCHPOINT.to_string()
}

impl InstallableUnit {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            touchpoint: default_touchpoint(),
            instructions: BTreeMap::new(),
        }
    }

    pub fn with_touchpoint(mut self, touchpoint_type: impl Into<String>) -> Self {
        self.touchpoint = touchpoint_type.into();
        self
    }

    /// Set the instruction string for a phase
    pub fn with_instruction(mut self, phase_id: impl Into<String>, source: impl Into<String>) -> Self {
        self.instructions.insert(phase_id.into(), source.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(&self.id, &self.version)
    }

    pub fn touchpoint_type(&self) -> &str {
        &self.touchpoint
    }

    /// Instruction source for `phase_id`, if any
    pub fn instruction(&self, phase_id: &str) -> Option<&str> {
        self.instructions.get(phase_id).map(String::as_str)
    }

    pub fn instructions(&self) -> &BTreeMap<String, String> {
        &self.instructions
    }
}

impl fmt::Display for InstallableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(
            UnitKey::parse("org.example.tool/1.0.0"),
            Some(UnitKey::new("org.example.tool", "1.0.0"))
        );
        assert_eq!(UnitKey::parse("a/b/2"), Some(UnitKey::new("a/b", "2")));
        assert_eq!(UnitKey::parse("no-version"), None);
        assert_eq!(UnitKey::parse("/1.0"), None);
    }

    #[test]
    fn test_builder() {
        let unit = InstallableUnit::new("tool", "2.1")
            .with_touchpoint("native")
            .with_instruction("install", "mkdir(path:/opt/tool)");

        assert_eq!(unit.key().to_string(), "tool/2.1");
        assert_eq!(unit.touchpoint_type(), "native");
        assert_eq!(unit.instruction("install"), Some("mkdir(path:/opt/tool)"));
        assert_eq!(unit.instruction("configure"), None);
    }

    #[test]
    fn test_default_touchpoint() {
        assert_eq!(InstallableUnit::new("a", "1").touchpoint_type(), NULL_TOUCHPOINT);
    }
}
