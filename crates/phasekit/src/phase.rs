//! Phases - one ordered stage of a provisioning transaction
//!
//! A phase moves through `Idle -> PrePerform -> MainPerform -> PostPerform ->
//! Done`, or to `Aborted` from any of the first three states.
//!
//! - **PrePerform** resolves every touchpoint the applicable operands need
//!   (any missing one aborts the phase before an operand is touched) and runs
//!   the phase-level initialization hooks.
//! - **MainPerform** walks the operands in order, builds each operand's
//!   parameter snapshot, binds its instructions and executes the actions,
//!   recording each one in the session right after it ran. The first action
//!   whose status is not exactly `OK` ends the loop for the whole phase.
//! - **PostPerform** runs the phase-level completion hooks.
//!
//! Only MainPerform is bracketed by session phase records.

use crate::action::{BoundAction, SharedAction};
use crate::error::{ConfigError, EngineError, Result};
use crate::instruction::{self, InstructionParser, Statement};
use crate::monitor::ProgressMonitor;
use crate::operand::Operand;
use crate::params::{
    PARAM_PHASE_ID, PARAM_PROFILE_ID, PARAM_TOUCHPOINT, PARAM_UNIT_ID, PARAM_UNIT_VERSION,
    Parameters, ParametersBuilder,
};
use crate::profile::Profile;
use crate::session::Session;
use crate::status::Status;
use crate::touchpoint::{SharedTouchpoint, TouchpointRegistry};
use crate::unit::InstallableUnit;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Core trait for phases
///
/// Implementors decide which unit of an operand they act on, may offer
/// phase-local actions (looked up before touchpoint actions) and may hook
/// into phase and operand boundaries.
pub trait Phase: Send + Sync + fmt::Debug {
    /// Phase id; also the key of the unit instruction this phase runs
    fn id(&self) -> &str;

    /// Progress weight (advisory only)
    fn weight(&self) -> u32;

    /// The unit of `operand` this phase acts on
    fn unit<'a>(&self, operand: &'a Operand) -> Option<&'a Arc<InstallableUnit>>;

    fn is_applicable(&self, operand: &Operand) -> bool {
        self.unit(operand).is_some()
    }

    /// A fresh instance of a phase-local action, or `None`
    fn action(&self, _id: &str) -> Option<SharedAction> {
        None
    }

    /// Statements appended after the unit's own instructions for every
    /// applicable operand
    fn implicit_actions(&self) -> Vec<Statement> {
        Vec::new()
    }

    fn initialize_phase(&self, _profile: &Profile, _params: &mut ParametersBuilder) -> Status {
        Status::ok()
    }

    fn complete_phase(&self, _profile: &mut Profile, _params: &Parameters) -> Status {
        Status::ok()
    }

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

    /// Undo one operand's recorded actions, newest first
    ///
    /// Each action is undone with the parameters it executed with. Failures
    /// are collected; every action still gets its undo call.
    fn undo(&self, profile: &mut Profile, operand: &Operand, actions: &[BoundAction]) -> Status {
        let mut status = Status::multi(format!("Undo {} for {}", self.id(), operand));
        for action in actions.iter().rev() {
            let result = action.undo(profile);
            if !result.is_ok() {
                log::warn!("Undo of '{}' for {} reported {}", action.id(), operand, result);
            }
            status.merge(result);
        }
        status
    }
}

/// A shared phase
pub type SharedPhase = Arc<dyn Phase>;

/// Lifecycle state of one phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Idle,
    PrePerform,
    MainPerform,
    PostPerform,
    Done,
    Aborted,
}

impl PhaseState {
    pub fn allowed_transitions(self) -> &'static [PhaseState] {
        use PhaseState::*;
        match self {
            Idle => &[PrePerform, Aborted],
            PrePerform => &[MainPerform, Aborted],
            MainPerform => &[PostPerform, Aborted],
            PostPerform => &[Done],
            Done | Aborted => &[],
        }
    }

    pub fn can_transition_to(self, next: PhaseState) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a phase run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Every applicable operand was processed
    Completed(Status),
    /// A non-OK, non-fatal action status stopped the operand loop; the phase
    /// still ran its completion hooks
    AbortedEarly(Status),
    /// ERROR or CANCEL; the phase never reached PostPerform
    Aborted(Status),
}

impl PhaseOutcome {
    pub fn status(&self) -> &Status {
        match self {
            Self::Completed(s) | Self::AbortedEarly(s) | Self::Aborted(s) => s,
        }
    }

    pub fn into_status(self) -> Status {
        match self {
            Self::Completed(s) | Self::AbortedEarly(s) | Self::Aborted(s) => s,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// Touchpoint plus its touchpoint-scoped phase parameters
struct TouchpointScope {
    touchpoint: SharedTouchpoint,
    params: Parameters,
}

/// One run of a phase over an operand list
pub struct PhaseRun<'a> {
    phase: &'a SharedPhase,
    touchpoints: &'a TouchpointRegistry,
    monitor: &'a dyn ProgressMonitor,
    state: PhaseState,
    status: Status,
}

impl<'a> PhaseRun<'a> {
    pub fn new(
        phase: &'a SharedPhase,
        touchpoints: &'a TouchpointRegistry,
        monitor: &'a dyn ProgressMonitor,
    ) -> Self {
        Self {
            phase,
            touchpoints,
            monitor,
            state: PhaseState::Idle,
            status: Status::multi(format!("Phase {}", phase.id())),
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    fn transition(&mut self, next: PhaseState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::IllegalTransition {
                phase: self.phase.id().to_string(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        log::trace!("Phase '{}': {} -> {}", self.phase.id(), self.state, next);
        self.state = next;
        Ok(())
    }

    fn abort(mut self) -> Result<PhaseOutcome> {
        self.transition(PhaseState::Aborted)?;
        log::debug!("Phase '{}' aborted: {}", self.phase.id(), self.status.severity());
        Ok(PhaseOutcome::Aborted(self.status))
    }

    /// Drive the phase to `Done` or `Aborted`
    ///
    /// `Err` is returned only for contract violations (session misuse,
    /// illegal state changes); everything else is reported in the outcome.
    pub fn perform(
        mut self,
        session: &mut Session,
        profile: &mut Profile,
        operands: &[Operand],
    ) -> Result<PhaseOutcome> {
        let phase = Arc::clone(self.phase);
        log::debug!("Phase '{}' starting over {} operands", phase.id(), operands.len());

        // ---- PrePerform ----------------------------------------------------
        self.transition(PhaseState::PrePerform)?;

        let scopes = match self.resolve_touchpoints(operands) {
            Ok(found) => found,
            Err(err) => {
                self.status.add(err.to_status());
                return self.abort();
            }
        };

        let mut builder = ParametersBuilder::new()
            .with(PARAM_PHASE_ID, phase.id())
            .with(PARAM_PROFILE_ID, profile.id());
        self.status.merge(phase.initialize_phase(profile, &mut builder));
        let phase_params = builder.build();

        let mut scoped: BTreeMap<String, TouchpointScope> = BTreeMap::new();
        for (touchpoint_type, touchpoint) in scopes {
            let mut builder = phase_params.to_builder();
            builder.insert(PARAM_TOUCHPOINT, touchpoint_type.as_str());
            self.status
                .merge(touchpoint.initialize_phase(phase.id(), profile, &mut builder));
            scoped.insert(
                touchpoint_type,
                TouchpointScope {
                    touchpoint,
                    params: builder.build(),
                },
            );
        }

        if self.status.is_fatal() {
            return self.abort();
        }

        // ---- MainPerform ---------------------------------------------------
        self.transition(PhaseState::MainPerform)?;
        session.record_phase_start(Arc::clone(&phase))?;
        for touchpoint_type in scoped.keys() {
            session.record_touchpoint(touchpoint_type);
        }

        let mut stopped_early = false;
        for operand in operands {
            if self.monitor.is_canceled() {
                log::debug!("Phase '{}' observed cancellation", phase.id());
                self.status.add(Status::cancel());
                return self.abort();
            }
            if !phase.is_applicable(operand) {
                continue;
            }
            let Some(unit) = phase.unit(operand) else {
                continue;
            };
            let Some(scope) = scoped.get(unit.touchpoint_type()) else {
                continue;
            };

            self.monitor.sub_task(&format!("{} {}", phase.id(), unit));
            if !self.perform_operand(session, profile, operand, unit, scope)? {
                stopped_early = true;
                break;
            }
            if self.status.is_fatal() {
                break;
            }
        }

        if self.status.is_fatal() {
            // The phase record stays open so rollback undoes it first.
            return self.abort();
        }
        session.record_phase_end(phase.as_ref())?;

        // ---- PostPerform ---------------------------------------------------
        self.transition(PhaseState::PostPerform)?;
        for scope in scoped.values() {
            self.status
                .merge(scope.touchpoint.complete_phase(phase.id(), profile, &scope.params));
        }
        self.status.merge(phase.complete_phase(profile, &phase_params));
        self.transition(PhaseState::Done)?;

        log::debug!("Phase '{}' done: {}", phase.id(), self.status.severity());
        if stopped_early {
            Ok(PhaseOutcome::AbortedEarly(self.status))
        } else {
            Ok(PhaseOutcome::Completed(self.status))
        }
    }

    /// Distinct touchpoints needed by the applicable operands
    fn resolve_touchpoints(
        &self,
        operands: &[Operand],
    ) -> std::result::Result<BTreeMap<String, SharedTouchpoint>, ConfigError> {
        let mut found = BTreeMap::new();
        for operand in operands {
            if !self.phase.is_applicable(operand) {
                continue;
            }
            let Some(unit) = self.phase.unit(operand) else {
                continue;
            };
            let touchpoint_type = unit.touchpoint_type();
            if found.contains_key(touchpoint_type) {
                continue;
            }
            let touchpoint = self.touchpoints.lookup(touchpoint_type).ok_or_else(|| {
                ConfigError::MissingTouchpoint {
                    touchpoint_type: touchpoint_type.to_string(),
                    unit: unit.to_string(),
                }
            })?;
            found.insert(touchpoint_type.to_string(), touchpoint);
        }
        Ok(found)
    }

    /// Run one operand; `Ok(false)` means an action returned non-OK
    fn perform_operand(
        &mut self,
        session: &mut Session,
        profile: &mut Profile,
        operand: &Operand,
        unit: &InstallableUnit,
        scope: &TouchpointScope,
    ) -> Result<bool> {
        let phase = Arc::clone(self.phase);

        let mut builder = scope.params.to_builder();
        builder
            .operand(operand.clone())
            .insert(PARAM_UNIT_ID, unit.id())
            .insert(PARAM_UNIT_VERSION, unit.version());
        self.status
            .merge(phase.initialize_operand(profile, operand, &mut builder));
        self.status
            .merge(scope.touchpoint.initialize_operand(profile, operand, &mut builder));
        let params = builder.build();
        if self.status.is_fatal() {
            return Ok(true);
        }

        let actions = match self.bind_actions(unit, scope, &params) {
            Ok(actions) => actions,
            Err(err) => {
                log::debug!("Phase '{}' cannot bind actions for {}: {}", phase.id(), unit, err);
                self.status.add(err.to_status());
                return Ok(true);
            }
        };

        for action in actions {
            log::debug!("Phase '{}' executing '{}' for {}", phase.id(), action.id(), unit);
            let result = action.execute(profile);
            session.record_action(action, operand)?;
            if !result.is_ok() {
                log::debug!("Phase '{}' stopping on {}", phase.id(), result);
                self.status.merge(result);
                return Ok(false);
            }
        }

        self.status
            .merge(scope.touchpoint.complete_operand(profile, operand, &params));
        self.status
            .merge(phase.complete_operand(profile, operand, &params));
        Ok(true)
    }

    fn bind_actions(
        &self,
        unit: &InstallableUnit,
        scope: &TouchpointScope,
        params: &Parameters,
    ) -> std::result::Result<Vec<BoundAction>, ConfigError> {
        let mut statements = match unit.instruction(self.phase.id()) {
            Some(source) => instruction::parse(source)?,
            None => Vec::new(),
        };
        statements.extend(self.phase.implicit_actions());

        InstructionParser::new(self.phase.as_ref(), scope.touchpoint.as_ref()).bind(&statements, params)
    }
}
