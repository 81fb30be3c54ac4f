//! The standard provisioning phases
//!
//! | Phase         | Acts on | Implicit action   |
//! |---------------|---------|-------------------|
//! | `collect`     | to      |                   |
//! | `unconfigure` | from    |                   |
//! | `uninstall`   | from    | `uninstallUnit()` |
//! | `install`     | to      | `installUnit()`   |
//! | `configure`   | to      |                   |
//!
//! Every standard phase offers the property actions from [`actions`].

pub mod actions;

use crate::action::SharedAction;
use crate::instruction::Statement;
use crate::operand::Operand;
use crate::phase::{Phase, SharedPhase};
use crate::unit::InstallableUnit;
use std::sync::Arc;

pub const COLLECT: &str = "collect";
pub const UNCONFIGURE: &str = "unconfigure";
pub const UNINSTALL: &str = "uninstall";
pub const INSTALL: &str = "install";
pub const CONFIGURE: &str = "configure";

/// Weight every standard phase starts with
pub const DEFAULT_WEIGHT: u32 = 10;

/// Which side of an operand a phase acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSide {
    From,
    To,
}

/// What the phase does to profile membership after the unit's instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Keep,
    Add,
    Remove,
}

/// One of the standard phases
#[derive(Debug, Clone)]
pub struct StandardPhase {
    id: &'static str,
    weight: u32,
    side: UnitSide,
    membership: Membership,
}

impl StandardPhase {
    const fn new(id: &'static str, side: UnitSide, membership: Membership) -> Self {
        Self {
            id,
            weight: DEFAULT_WEIGHT,
            side,
            membership,
        }
    }

    pub const fn collect() -> Self {
        Self::new(COLLECT, UnitSide::To, Membership::Keep)
    }

    pub const fn unconfigure() -> Self {
        Self::new(UNCONFIGURE, UnitSide::From, Membership::Keep)
    }

    pub const fn uninstall() -> Self {
        Self::new(UNINSTALL, UnitSide::From, Membership::Remove)
    }

    pub const fn install() -> Self {
        Self::new(INSTALL, UnitSide::To, Membership::Add)
    }

    pub const fn configure() -> Self {
        Self::new(CONFIGURE, UnitSide::To, Membership::Keep)
    }

    #[must_use]
    pub const fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn side(&self) -> UnitSide {
        self.side
    }
}

impl Phase for StandardPhase {
    fn id(&self) -> &str {
        self.id
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    fn unit<'a>(&self, operand: &'a Operand) -> Option<&'a Arc<InstallableUnit>> {
        match self.side {
            UnitSide::From => operand.from(),
            UnitSide::To => operand.to(),
        }
    }

    fn action(&self, id: &str) -> Option<SharedAction> {
        match (id, self.membership) {
            (actions::INSTALL_UNIT, Membership::Add) => Some(Arc::new(actions::InstallUnit::default())),
            (actions::UNINSTALL_UNIT, Membership::Remove) => {
                Some(Arc::new(actions::UninstallUnit::default()))
            }
            _ => actions::property_action(id),
        }
    }

    fn implicit_actions(&self) -> Vec<Statement> {
        match self.membership {
            Membership::Keep => Vec::new(),
            Membership::Add => vec![Statement::new(actions::INSTALL_UNIT)],
            Membership::Remove => vec![Statement::new(actions::UNINSTALL_UNIT)],
        }
    }
}

/// `collect, unconfigure, uninstall, install, configure`, in that order
pub fn default_phases() -> Vec<SharedPhase> {
    vec![
        Arc::new(StandardPhase::collect()),
        Arc::new(StandardPhase::unconfigure()),
        Arc::new(StandardPhase::uninstall()),
        Arc::new(StandardPhase::install()),
        Arc::new(StandardPhase::configure()),
    ]
}
