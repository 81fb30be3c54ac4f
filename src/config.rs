//! Transaction files
//!
//! A transaction names the target profile, declares the units involved and
//! lists the operands in execution order. TOML by default, JSON when the file
//! ends in `.json`:
//!
//! ```toml
//! profile = "dev"
//!
//! [properties]
//! installFolder = "~/opt/dev"
//!
//! [[units]]
//! id = "ripgrep"
//! version = "14.1.0"
//! touchpoint = "native"
//!
//! [units.instructions]
//! install = "unzip(source:dist/rg.tar.gz,target:${installFolder}/rg)"
//!
//! [units.properties]
//! channel = "stable"
//!
//! [[operands]]
//! to = "ripgrep/14.1.0"
//! ```
//!
//! Unit `properties` become per-unit properties when the unit is installed.

use anyhow::{Context, Result};
use phasekit::instruction::{self, Statement};
use phasekit::phases::{INSTALL, actions::SET_UNIT_PROPERTY};
use phasekit::{InstallableUnit, NULL_TOUCHPOINT, Operand, Properties, UnitKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Problems in an otherwise well-formed transaction file
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("unit '{0}' is declared more than once")]
    DuplicateUnit(String),

    #[error("operand #{index} references unknown unit '{reference}'")]
    UnknownUnit { index: usize, reference: String },

    #[error("operand #{index} reference '{reference}' is not 'id/version'")]
    BadReference { index: usize, reference: String },

    #[error("operand #{0} has neither 'from' nor 'to'")]
    EmptyOperand(usize),

    #[error("no profile id given")]
    MissingProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub id: String,
    pub version: String,
    #[serde(default = "default_touchpoint")]
    pub touchpoint: String,
    /// Instruction source keyed by phase id
    #[serde(default)]
    pub instructions: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: Properties,
}

fn default_touchpoint() -> String {
    NULL_TOUCHPOINT.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperandSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// A transaction file as written on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFile {
    #[serde(default)]
    pub profile: String,
    /// Seed properties for a profile that does not exist yet
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub units: Vec<UnitSpec>,
    #[serde(default)]
    pub operands: Vec<OperandSpec>,
}

/// A transaction ready for the engine
#[derive(Debug, Clone)]
pub struct Transaction {
    pub profile_id: String,
    pub properties: Properties,
    pub operands: Vec<Operand>,
}

impl TransactionFile {
    /// Load from TOML, or JSON for `.json` files
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read transaction file: {}", path.display()))?;

        let file = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML: {}", path.display()))?
        };

        log::debug!("Loaded transaction from {}", path.display());
        Ok(file)
    }

    /// Resolve unit references into operands
    ///
    /// `profile_override` replaces the file's profile id when given.
    pub fn resolve(self, profile_override: Option<&str>) -> Result<Transaction, TransactionError> {
        let profile_id = profile_override.map_or(self.profile, str::to_string);
        if profile_id.trim().is_empty() {
            return Err(TransactionError::MissingProfile);
        }

        let mut units: BTreeMap<UnitKey, Arc<InstallableUnit>> = BTreeMap::new();
        for spec in self.units {
            let unit = build_unit(spec);
            let key = unit.key();
            if units.insert(key.clone(), Arc::new(unit)).is_some() {
                return Err(TransactionError::DuplicateUnit(key.to_string()));
            }
        }

        let lookup = |index: usize, reference: Option<String>| -> Result<_, TransactionError> {
            let Some(reference) = reference else {
                return Ok(None);
            };
            let key = UnitKey::parse(&reference).ok_or_else(|| TransactionError::BadReference {
                index,
                reference: reference.clone(),
            })?;
            units
                .get(&key)
                .cloned()
                .map(Some)
                .ok_or(TransactionError::UnknownUnit { index, reference })
        };

        let mut operands = Vec::with_capacity(self.operands.len());
        for (index, spec) in self.operands.into_iter().enumerate() {
            let from = lookup(index + 1, spec.from)?;
            let to = lookup(index + 1, spec.to)?;
            let operand = Operand::new(from, to).map_err(|_| TransactionError::EmptyOperand(index + 1))?;
            operands.push(operand);
        }

        Ok(Transaction {
            profile_id,
            properties: self.properties,
            operands,
        })
    }
}

/// Build a unit from its declaration; its properties become `setUnitProperty` calls
/// appended to the install instruction
fn build_unit(spec: UnitSpec) -> InstallableUnit {
    let mut instructions = spec.instructions;
    if !spec.properties.is_empty() {
        let setters: Vec<Statement> = spec
            .properties
            .iter()
            .map(|(name, value)| {
                Statement::new(SET_UNIT_PROPERTY)
                    .with_arg("name", instruction::encode_value(name))
                    .with_arg("value", instruction::encode_value(value))
            })
            .collect();
        let setters = instruction::render(&setters);
        let install = instructions.entry(INSTALL.to_string()).or_default();
        if install.trim().is_empty() {
            *install = setters;
        } else {
            install.push(';');
            install.push_str(&setters);
        }
    }

    instructions.into_iter().fold(
        InstallableUnit::new(spec.id, spec.version).with_touchpoint(spec.touchpoint),
        |unit, (phase, source)| unit.with_instruction(phase, source),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasekit::OperandKind;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
profile = "dev"

[properties]
installFolder = "/opt/dev"

[[units]]
id = "tool"
version = "1.0"
touchpoint = "native"

[units.instructions]
install = "mkdir(path:${installFolder}/tool)"

[units.properties]
channel = "a,b"

[[units]]
id = "tool"
version = "2.0"

[[operands]]
from = "tool/1.0"
to = "tool/2.0"

[[operands]]
to = "tool/1.0"
"#;

    #[test]
    fn test_resolve_sample() {
        let file: TransactionFile = toml::from_str(SAMPLE).unwrap();
        let tx = file.resolve(None).unwrap();

        assert_eq!(tx.profile_id, "dev");
        assert_eq!(tx.properties.get("installFolder").map(String::as_str), Some("/opt/dev"));
        assert_eq!(tx.operands.len(), 2);
        assert_eq!(tx.operands[0].kind(), OperandKind::Update);
        assert_eq!(tx.operands[1].kind(), OperandKind::Install);

        let unit = tx.operands[1].to().unwrap();
        assert_eq!(unit.touchpoint_type(), "native");
        assert_eq!(
            unit.instruction("install"),
            Some("mkdir(path:${installFolder}/tool);setUnitProperty(name:channel,value:a${#44}b)")
        );
        assert_eq!(tx.operands[0].to().unwrap().touchpoint_type(), NULL_TOUCHPOINT);
    }

    #[test]
    fn test_profile_override() {
        let file: TransactionFile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(file.resolve(Some("other")).unwrap().profile_id, "other");
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let file = TransactionFile {
            profile: "dev".into(),
            operands: vec![OperandSpec {
                from: None,
                to: Some("ghost/1".into()),
            }],
            ..Default::default()
        };
        assert!(matches!(
            file.resolve(None),
            Err(TransactionError::UnknownUnit { index: 1, .. })
        ));
    }

    #[test]
    fn test_empty_operand_rejected() {
        let file = TransactionFile {
            profile: "dev".into(),
            operands: vec![OperandSpec::default()],
            ..Default::default()
        };
        assert!(matches!(file.resolve(None), Err(TransactionError::EmptyOperand(1))));
    }

    #[test]
    fn test_missing_profile_rejected() {
        let file = TransactionFile::default();
        assert!(matches!(file.resolve(None), Err(TransactionError::MissingProfile)));
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.json");
        fs::write(
            &path,
            r#"{"profile":"dev","units":[{"id":"a","version":"1"}],"operands":[{"to":"a/1"}]}"#,
        )
        .unwrap();

        let tx = TransactionFile::load(&path).unwrap().resolve(None).unwrap();
        assert_eq!(tx.operands.len(), 1);
    }
}
