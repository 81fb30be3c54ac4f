//! Engine lifecycle events

use crate::status::Status;
use std::fmt;
use std::sync::Arc;

/// Something that happened during [`crate::Engine::perform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The profile lock is held and the phases are about to run
    BeginOperation { profile_id: String, operands: usize },
    PhaseStarted { profile_id: String, phase_id: String },
    PhaseCompleted {
        profile_id: String,
        phase_id: String,
        status: Status,
    },
    /// The session was committed and the profile persisted
    CommitOperation { profile_id: String },
    /// The session was rolled back; `status` is the undo sweep's result
    RollbackOperation { profile_id: String, status: Status },
    /// Warning-only result: neither committed nor rolled back
    UnresolvedOperation { profile_id: String, status: Status },
}

impl EngineEvent {
    pub fn profile_id(&self) -> &str {
        match self {
            Self::BeginOperation { profile_id, .. }
            | Self::PhaseStarted { profile_id, .. }
            | Self::PhaseCompleted { profile_id, .. }
            | Self::CommitOperation { profile_id }
            | Self::RollbackOperation { profile_id, .. }
            | Self::UnresolvedOperation { profile_id, .. } => profile_id,
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginOperation { profile_id, operands } => {
                write!(f, "begin '{profile_id}' ({operands} operands)")
            }
            Self::PhaseStarted { phase_id, .. } => write!(f, "phase '{phase_id}' started"),
            Self::PhaseCompleted { phase_id, status, .. } => {
                write!(f, "phase '{phase_id}' completed: {}", status.severity())
            }
            Self::CommitOperation { profile_id } => write!(f, "commit '{profile_id}'"),
            Self::RollbackOperation { profile_id, .. } => write!(f, "rollback '{profile_id}'"),
            Self::UnresolvedOperation { profile_id, .. } => write!(f, "unresolved '{profile_id}'"),
        }
    }
}

/// Receives engine events synchronously on the performing thread
pub trait EngineListener: Send + Sync {
    fn notify(&self, event: &EngineEvent);
}

/// No-op listener
#[derive(Debug, Default, Clone, Copy)]
pub struct NoListener;

impl EngineListener for NoListener {
    fn notify(&self, _event: &EngineEvent) {}
}

/// Fan-out over registered listeners
#[derive(Default, Clone)]
pub struct Listeners {
    listeners: Vec<Arc<dyn EngineListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn EngineListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl EngineListener for Listeners {
    fn notify(&self, event: &EngineEvent) {
        log::trace!("Event: {event}");
        for listener in &self.listeners {
            listener.notify(event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EngineEvent>>);

    impl EngineListener for Recorder {
        fn notify(&self, event: &EngineEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_fan_out() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut listeners = Listeners::new();
        listeners.add(first.clone());
        listeners.add(second.clone());

        listeners.notify(&EngineEvent::CommitOperation {
            profile_id: "p".into(),
        });

        assert_eq!(first.0.lock().unwrap().len(), 1);
        assert_eq!(second.0.lock().unwrap()[0].profile_id(), "p");
    }

    #[test]
    fn test_display() {
        let event = EngineEvent::PhaseCompleted {
            profile_id: "p".into(),
            phase_id: "install".into(),
            status: Status::warning("w"),
        };
        assert_eq!(event.to_string(), "phase 'install' completed: WARNING");
    }
}
