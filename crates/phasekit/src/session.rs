//! Session - the per-transaction ledger of executed actions
//!
//! A session records, per phase, which actions ran against which operand so
//! a failed run can be undone in exact reverse order. It is created fresh
//! for every engine run and consumed by either [`Session::commit`] or
//! [`Session::rollback`].

use crate::action::BoundAction;
use crate::error::{EngineError, Result};
use crate::operand::Operand;
use crate::phase::{Phase, SharedPhase};
use crate::profile::Profile;
use crate::status::Status;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Committed,
    RolledBack,
}

/// Actions executed for one operand, in execution order
#[derive(Debug)]
struct OperandRecord {
    operand: Operand,
    actions: Vec<BoundAction>,
}

#[derive(Debug)]
struct PhaseRecord {
    phase: SharedPhase,
    operands: Vec<OperandRecord>,
}

impl PhaseRecord {
    fn undo(&self, profile: &mut Profile) -> Status {
        log::debug!(
            "Undoing phase '{}' ({} operand records)",
            self.phase.id(),
            self.operands.len()
        );
        let mut status = Status::multi(format!("Undo phase {}", self.phase.id()));
        for record in self.operands.iter().rev() {
            status.merge(self.phase.undo(profile, &record.operand, &record.actions));
        }
        status
    }

    fn action_count(&self) -> usize {
        self.operands.iter().map(|r| r.actions.len()).sum()
    }
}

/// Transaction ledger
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    current: Option<PhaseRecord>,
    completed: Vec<PhaseRecord>,
    touchpoints: BTreeSet<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Active,
            current: None,
            completed: Vec::new(),
            touchpoints: BTreeSet::new(),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Committed => Err(EngineError::SessionConsumed("committed")),
            SessionState::RolledBack => Err(EngineError::SessionConsumed("rolled back")),
        }
    }

    /// Open a phase record; fails if one is already open
    pub fn record_phase_start(&mut self, phase: SharedPhase) -> Result<()> {
        self.ensure_active()?;
        if let Some(open) = &self.current {
            return Err(EngineError::PhaseAlreadyOpen {
                open: open.phase.id().to_string(),
                requested: phase.id().to_string(),
            });
        }
        self.current = Some(PhaseRecord {
            phase,
            operands: Vec::new(),
        });
        Ok(())
    }

    /// Close the open phase record; fails unless `phase` is the open one
    pub fn record_phase_end(&mut self, phase: &dyn Phase) -> Result<()> {
        self.ensure_active()?;
        match self.current.take() {
            Some(record) if record.phase.id() == phase.id() => {
                self.completed.push(record);
                Ok(())
            }
            other => {
                self.current = other;
                Err(EngineError::PhaseNotStarted(phase.id().to_string()))
            }
        }
    }

    /// Append an executed action to the open phase
    ///
    /// Consecutive actions on the same operand share one record; returning to
    /// an earlier operand later starts a new record.
    pub fn record_action(&mut self, action: BoundAction, operand: &Operand) -> Result<()> {
        self.ensure_active()?;
        let Some(current) = self.current.as_mut() else {
            return Err(EngineError::NoOpenPhase(action.id().to_string()));
        };

        match current.operands.last_mut() {
            Some(last) if last.operand == *operand => last.actions.push(action),
            _ => current.operands.push(OperandRecord {
                operand: operand.clone(),
                actions: vec![action],
            }),
        }
        Ok(())
    }

    /// Remember that a touchpoint took part in this transaction
    pub fn record_touchpoint(&mut self, touchpoint_type: &str) {
        self.touchpoints.insert(touchpoint_type.to_string());
    }

    /// Touchpoint types that took part, in sorted order
    pub fn touchpoints(&self) -> impl Iterator<Item = &str> {
        self.touchpoints.iter().map(String::as_str)
    }

    pub fn is_phase_open(&self) -> bool {
        self.current.is_some()
    }

    /// Number of phase records, open one included
    pub fn phase_count(&self) -> usize {
        self.completed.len() + usize::from(self.current.is_some())
    }

    /// Number of operand records in the open phase, or the last closed one
    pub fn operand_record_count(&self) -> usize {
        self.current
            .as_ref()
            .or(self.completed.last())
            .map_or(0, |record| record.operands.len())
    }

    pub fn action_count(&self) -> usize {
        self.completed
            .iter()
            .chain(self.current.iter())
            .map(PhaseRecord::action_count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.completed.is_empty()
    }

    /// Finalize the transaction; no undo is possible afterwards
    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            SessionState::Committed => return Ok(()),
            SessionState::RolledBack => return Err(EngineError::SessionConsumed("rolled back")),
            SessionState::Active => {}
        }
        log::debug!("Committing session ({} actions)", self.action_count());
        self.current = None;
        self.completed.clear();
        self.state = SessionState::Committed;
        Ok(())
    }

    /// Undo everything recorded, newest first
    ///
    /// An open phase is undone first, then closed phases in reverse order.
    /// Within a phase operand records and their actions are undone in reverse.
    /// Undo failures are aggregated and never stop the sweep. Rolling back an
    /// already rolled-back session does nothing.
    pub fn rollback(&mut self, profile: &mut Profile) -> Result<Status> {
        match self.state {
            SessionState::RolledBack => return Ok(Status::ok()),
            SessionState::Committed => return Err(EngineError::SessionConsumed("committed")),
            SessionState::Active => {}
        }

        let mut status = Status::multi("Rollback");
        if let Some(open) = self.current.take() {
            status.merge(open.undo(profile));
        }
        while let Some(record) = self.completed.pop() {
            status.merge(record.undo(profile));
        }

        if !status.is_ok() {
            log::warn!("Rollback finished with {}", status.severity());
        }
        self.state = SessionState::RolledBack;
        Ok(status)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionContext};
    use crate::params::ParametersBuilder;
    use crate::unit::InstallableUnit;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct TestPhase(&'static str);

    impl Phase for TestPhase {
        fn id(&self) -> &str {
            self.0
        }

        fn weight(&self) -> u32 {
            10
        }

        fn unit<'a>(&self, operand: &'a Operand) -> Option<&'a Arc<InstallableUnit>> {
            operand.to()
        }
    }

    #[derive(Debug)]
    struct Logged {
        log: Arc<Mutex<Vec<String>>>,
        fail_undo: bool,
    }

    impl Action for Logged {
        fn execute(&self, _ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
            Ok(Status::ok())
        }

        fn undo(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
            let tag = ctx.params.get("tag").unwrap_or("?").to_string();
            self.log.lock().unwrap().push(tag);
            if self.fail_undo {
                anyhow::bail!("cannot undo");
            }
            Ok(Status::ok())
        }
    }

    fn bound(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> BoundAction {
        bound_with(log, tag, false)
    }

    fn bound_with(log: &Arc<Mutex<Vec<String>>>, tag: &str, fail_undo: bool) -> BoundAction {
        BoundAction::new(
            "logged",
            Arc::new(Logged {
                log: Arc::clone(log),
                fail_undo,
            }),
            ParametersBuilder::new().with("tag", tag).build(),
        )
    }

    fn operand(id: &str) -> Operand {
        Operand::install(Arc::new(InstallableUnit::new(id, "1")))
    }

    fn phase(id: &'static str) -> SharedPhase {
        Arc::new(TestPhase(id))
    }

    #[test]
    fn test_phase_start_end_must_alternate() {
        let mut session = Session::new();
        let install = phase("install");
        let configure = phase("configure");

        assert!(matches!(
            session.record_phase_end(install.as_ref()),
            Err(EngineError::PhaseNotStarted(_))
        ));
        session.record_phase_start(Arc::clone(&install)).unwrap();
        assert!(matches!(
            session.record_phase_start(Arc::clone(&configure)),
            Err(EngineError::PhaseAlreadyOpen { .. })
        ));
        assert!(matches!(
            session.record_phase_end(configure.as_ref()),
            Err(EngineError::PhaseNotStarted(_))
        ));
        assert!(session.is_phase_open());
        session.record_phase_end(install.as_ref()).unwrap();
        assert!(!session.is_phase_open());
    }

    #[test]
    fn test_record_action_requires_open_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new();
        assert!(matches!(
            session.record_action(bound(&log, "a"), &operand("x")),
            Err(EngineError::NoOpenPhase(_))
        ));
    }

    #[test]
    fn test_consecutive_actions_share_record() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new();
        let (a, b) = (operand("a"), operand("b"));

        session.record_phase_start(phase("install")).unwrap();
        session.record_action(bound(&log, "a1"), &a).unwrap();
        session.record_action(bound(&log, "a2"), &a).unwrap();
        session.record_action(bound(&log, "b1"), &b).unwrap();
        session.record_action(bound(&log, "a3"), &a).unwrap();

        assert_eq!(session.operand_record_count(), 3);
        assert_eq!(session.action_count(), 4);
    }

    #[test]
    fn test_rollback_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new();
        let (a, b) = (operand("a"), operand("b"));

        let first = phase("install");
        session.record_phase_start(Arc::clone(&first)).unwrap();
        session.record_action(bound(&log, "1a1"), &a).unwrap();
        session.record_action(bound(&log, "1a2"), &a).unwrap();
        session.record_action(bound(&log, "1b1"), &b).unwrap();
        session.record_phase_end(first.as_ref()).unwrap();

        // second phase left open, as after a failure mid-phase
        session.record_phase_start(phase("configure")).unwrap();
        session.record_action(bound(&log, "2a1"), &a).unwrap();
        session.record_action(bound(&log, "2b1"), &b).unwrap();

        let mut profile = Profile::new("p");
        let status = session.rollback(&mut profile).unwrap();
        assert!(status.is_ok());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["2b1", "2a1", "1b1", "1a2", "1a1"]
        );
        assert!(session.is_empty());
    }

    #[test]
    fn test_rollback_continues_past_undo_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new();
        let a = operand("a");

        session.record_phase_start(phase("install")).unwrap();
        session.record_action(bound(&log, "first"), &a).unwrap();
        session.record_action(bound_with(&log, "broken", true), &a).unwrap();
        session.record_action(bound(&log, "last"), &a).unwrap();

        let mut profile = Profile::new("p");
        let status = session.rollback(&mut profile).unwrap();
        assert!(status.is_fatal());
        assert_eq!(*log.lock().unwrap(), vec!["last", "broken", "first"]);
    }

    #[test]
    fn test_second_rollback_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new();
        session.record_phase_start(phase("install")).unwrap();
        session.record_action(bound(&log, "x"), &operand("a")).unwrap();

        let mut profile = Profile::new("p");
        session.rollback(&mut profile).unwrap();
        let again = session.rollback(&mut profile).unwrap();
        assert!(again.is_ok());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_consumed_session_rejects_use() {
        let mut session = Session::new();
        session.commit().unwrap();
        assert!(session.commit().is_ok());
        assert!(matches!(
            session.record_phase_start(phase("install")),
            Err(EngineError::SessionConsumed("committed"))
        ));
        let mut profile = Profile::new("p");
        assert!(session.rollback(&mut profile).is_err());
    }

    #[test]
    fn test_commit_clears_records() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new();
        let install = phase("install");
        session.record_phase_start(Arc::clone(&install)).unwrap();
        session.record_action(bound(&log, "x"), &operand("a")).unwrap();
        session.record_phase_end(install.as_ref()).unwrap();

        session.commit().unwrap();
        assert!(session.is_empty());
        assert_eq!(session.action_count(), 0);
        assert!(log.lock().unwrap().is_empty());
    }
}
