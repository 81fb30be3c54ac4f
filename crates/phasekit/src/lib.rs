//! # Phasekit
//!
//! A transactional phase engine for provisioning.
//!
//! Given a profile and an ordered list of operands (install, uninstall or
//! update of installable units), the engine runs a fixed sequence of phases,
//! dispatches each unit's per-phase instructions to the touchpoint that owns
//! the unit, and undoes everything if the run fails or is canceled.
//!
//! ## Core Concepts
//!
//! - **Operand**: a transition `from -> to` between two optional units
//! - **Phase**: one ordered stage (collect, uninstall, install, ...)
//! - **Touchpoint**: handler for one kind of target system, supplying actions
//! - **Action**: a reversible unit of work bound to an immutable parameter map
//! - **Session**: the ledger of executed actions used for rollback
//! - **Engine**: serializes per profile, runs a [`PhaseSet`], then commits,
//!   rolls back, or leaves a warning-only run unresolved
//!
//! ## Instructions
//!
//! Units carry one instruction string per phase id:
//!
//! ```text
//! mkdir(path:${installFolder}/bin);setUnitProperty(name:installed,value:true)
//! ```
//!
//! Actions are looked up in the phase first, then in the touchpoint.
//! `${name}` references resolve against the operand's parameters and an
//! undefined name is an `ERROR`, raised before any action of that operand runs.
//!
//! ## Example
//!
//! ```ignore
//! use phasekit::{
//!     Engine, InstallableUnit, MemoryProfileStore, NullMonitor, Operand, PhaseSet, Profile,
//!     TouchpointRegistry,
//! };
//! use std::sync::Arc;
//!
//! let engine = Engine::new(Arc::new(MemoryProfileStore::new()), TouchpointRegistry::with_null());
//! let unit = InstallableUnit::new("org.example.tool", "1.0.0")
//!     .with_instruction("configure", "setProfileProperty(name:tool,value:${unitVersion})");
//!
//! let mut profile = Profile::new("default");
//! let result = engine.perform(
//!     &mut profile,
//!     &PhaseSet::default(),
//!     &[Operand::install(Arc::new(unit))],
//!     &NullMonitor,
//! )?;
//! assert!(result.is_committed());
//! ```
//!
//! ## Extension Traits
//!
//! - [`Touchpoint`]: new target systems, registered by type key
//! - [`Action`]: reversible work offered by a phase or touchpoint
//! - [`Phase`]: custom phases beyond the standard five
//! - [`ProfileStore`]: profile persistence
//! - [`ProgressMonitor`]: progress and cooperative cancellation
//! - [`EngineListener`]: lifecycle events

pub mod action;
pub mod engine;
pub mod error;
pub mod event;
pub mod instruction;
pub mod lock;
pub mod monitor;
pub mod operand;
pub mod params;
pub mod phase;
pub mod phase_set;
pub mod phases;
pub mod profile;
pub mod session;
pub mod status;
pub mod touchpoint;
pub mod unit;

// Re-export main types at crate root
pub use action::{Action, ActionContext, BoundAction, SharedAction};
pub use engine::{Engine, PerformResult, Resolution};
pub use error::{ConfigError, EngineError, Result};
pub use event::{EngineEvent, EngineListener, Listeners, NoListener};
pub use instruction::{ActionLookup, InstructionParser, Statement, encode_value, lookup_action};
pub use lock::{ProfileLock, ProfileLocks};
pub use monitor::{CancelFlag, NullMonitor, ProgressMonitor};
pub use operand::{Operand, OperandKind};
pub use params::{Parameters, ParametersBuilder};
pub use phase::{Phase, PhaseOutcome, PhaseRun, PhaseState, SharedPhase};
pub use phase_set::PhaseSet;
pub use phases::{StandardPhase, default_phases};
pub use profile::{MemoryProfileStore, Profile, ProfileStore, Properties};
pub use session::Session;
pub use status::{Severity, Status};
pub use touchpoint::{NullTouchpoint, SharedTouchpoint, Touchpoint, TouchpointRegistry};
pub use unit::{InstallableUnit, NULL_TOUCHPOINT, UnitKey};
