//! Ordered, weighted list of phases run as one unit

use crate::error::{EngineError, Result};
use crate::event::{EngineEvent, EngineListener};
use crate::monitor::ProgressMonitor;
use crate::operand::Operand;
use crate::phase::{PhaseOutcome, PhaseRun, SharedPhase};
use crate::phases;
use crate::profile::Profile;
use crate::session::Session;
use crate::status::Status;
use crate::touchpoint::TouchpointRegistry;
use std::collections::HashSet;

/// Phases in execution order
#[derive(Debug, Clone)]
pub struct PhaseSet {
    phases: Vec<SharedPhase>,
}

impl PhaseSet {
    /// Build a set; phase ids must be unique
    pub fn new(phases: Vec<SharedPhase>) -> Result<Self> {
        let mut seen = HashSet::new();
        for phase in &phases {
            if !seen.insert(phase.id().to_string()) {
                return Err(EngineError::InvalidArgument(format!(
                    "duplicate phase id '{}'",
                    phase.id()
                )));
            }
        }
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[SharedPhase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Progress weight of each phase for this operand list
    ///
    /// `weight * (applicable / total)` with the division truncated first, so a
    /// phase that applies to only some operands gets 0.
    pub fn progress_weights(&self, operands: &[Operand]) -> Vec<u64> {
        let total = operands.len() as u64;
        self.phases
            .iter()
            .map(|phase| {
                if total == 0 {
                    return 0;
                }
                let applicable = operands.iter().filter(|op| phase.is_applicable(op)).count() as u64;
                u64::from(phase.weight()) * (applicable / total)
            })
            .collect()
    }

    /// Run every phase in order
    ///
    /// Stops before the next phase once the aggregate is ERROR or CANCEL, or
    /// when cancellation is observed between phases.
    pub fn perform(
        &self,
        session: &mut Session,
        profile: &mut Profile,
        operands: &[Operand],
        touchpoints: &TouchpointRegistry,
        monitor: &dyn ProgressMonitor,
        listener: &dyn EngineListener,
    ) -> Result<Status> {
        let weights = self.progress_weights(operands);
        monitor.begin(weights.iter().sum());

        let mut status = Status::multi("Perform phases");
        for (phase, &weight) in self.phases.iter().zip(&weights) {
            if monitor.is_canceled() {
                log::debug!("Cancellation observed before phase '{}'", phase.id());
                status.add(Status::cancel());
                break;
            }

            monitor.phase_started(phase.id(), weight);
            listener.notify(&EngineEvent::PhaseStarted {
                profile_id: profile.id().to_string(),
                phase_id: phase.id().to_string(),
            });

            let outcome = PhaseRun::new(phase, touchpoints, monitor).perform(session, profile, operands)?;
            if let PhaseOutcome::AbortedEarly(early) = &outcome {
                log::debug!("Phase '{}' stopped early: {}", phase.id(), early.severity());
            }

            listener.notify(&EngineEvent::PhaseCompleted {
                profile_id: profile.id().to_string(),
                phase_id: phase.id().to_string(),
                status: outcome.status().clone(),
            });
            monitor.worked(weight);

            status.merge(outcome.into_status());
            if status.is_fatal() {
                break;
            }
        }
        Ok(status)
    }
}

impl Default for PhaseSet {
    fn default() -> Self {
        Self {
            phases: phases::default_phases(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::StandardPhase;
    use crate::unit::InstallableUnit;
    use std::sync::Arc;

    fn install(id: &str) -> Operand {
        Operand::install(Arc::new(InstallableUnit::new(id, "1")))
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = PhaseSet::new(vec![
            Arc::new(StandardPhase::install()),
            Arc::new(StandardPhase::install()),
        ]);
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_weights_truncate_before_multiplying() {
        let set = PhaseSet::new(vec![
            Arc::new(StandardPhase::uninstall()),
            Arc::new(StandardPhase::install()),
        ])
        .unwrap();
        let a = Arc::new(InstallableUnit::new("a", "1"));
        let operands = vec![
            Operand::update(a.clone(), Arc::new(InstallableUnit::new("a", "2"))),
            install("b"),
            install("c"),
            install("d"),
        ];
        assert_eq!(set.progress_weights(&operands), vec![0, 10]);
    }

    #[test]
    fn test_weights_without_operands() {
        assert_eq!(PhaseSet::default().progress_weights(&[]), vec![0; 5]);
    }

    #[test]
    fn test_default_set() {
        let set = PhaseSet::default();
        assert_eq!(set.len(), 5);
        assert_eq!(set.phases()[3].id(), "install");
    }
}
