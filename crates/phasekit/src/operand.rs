//! Operands - requested transitions between unit states

use crate::error::{EngineError, Result};
use crate::unit::InstallableUnit;
use std::fmt;
use std::sync::Arc;

/// What an operand does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Install,
    Uninstall,
    Update,
}

/// A transition from an optional source unit to an optional target unit
///
/// At least one side is always present. Units are shared, so cloning an
/// operand is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    from: Option<Arc<InstallableUnit>>,
    to: Option<Arc<InstallableUnit>>,
}

impl Operand {
    /// Create an operand; fails when both sides are absent
    pub fn new(
        from: Option<Arc<InstallableUnit>>,
        to: Option<Arc<InstallableUnit>>,
    ) -> Result<Self> {
        if from.is_none() && to.is_none() {
            return Err(EngineError::InvalidArgument(
                "operand needs a source or a target unit".into(),
            ));
        }
        Ok(Self { from, to })
    }

    pub fn install(to: Arc<InstallableUnit>) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn uninstall(from: Arc<InstallableUnit>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn update(from: Arc<InstallableUnit>, to: Arc<InstallableUnit>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn from(&self) -> Option<&Arc<InstallableUnit>> {
        self.from.as_ref()
    }

    pub fn to(&self) -> Option<&Arc<InstallableUnit>> {
        self.to.as_ref()
    }

    pub fn kind(&self) -> OperandKind {
        match (&self.from, &self.to) {
            (None, _) => OperandKind::Install,
            (Some(_), None) => OperandKind::Uninstall,
            (Some(_), Some(_)) => OperandKind::Update,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.from, &self.to) {
            (None, Some(to)) => write!(f, "install {to}"),
            (Some(from), None) => write!(f, "uninstall {from}"),
            (Some(from), Some(to)) => write!(f, "update {from} -> {to}"),
            (None, None) => f.write_str("noop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, version: &str) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::new(id, version))
    }

    #[test]
    fn test_kind() {
        assert_eq!(Operand::install(unit("a", "1")).kind(), OperandKind::Install);
        assert_eq!(Operand::uninstall(unit("a", "1")).kind(), OperandKind::Uninstall);
        assert_eq!(
            Operand::update(unit("a", "1"), unit("a", "2")).kind(),
            OperandKind::Update
        );
    }

    #[test]
    fn test_empty_operand_rejected() {
        assert!(matches!(
            Operand::new(None, None),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(Operand::new(None, Some(unit("a", "1"))).is_ok());
    }

    #[test]
    fn test_display() {
        let op = Operand::update(unit("a", "1"), unit("a", "2"));
        assert_eq!(op.to_string(), "update a/1 -> a/2");
    }
}
