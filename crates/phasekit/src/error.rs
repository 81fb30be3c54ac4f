//! Error types for the phase engine
//!
//! Two families exist and they never mix:
//!
//! - [`EngineError`]: contract violations and invalid arguments. These are
//!   returned as `Err` and abort the call outright.
//! - [`ConfigError`]: bad metadata or wiring (unknown action, undefined
//!   variable, missing touchpoint). These become `ERROR` [`Status`] values
//!   and flow through the normal rollback path.

use crate::status::Status;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Unrecoverable misuse of the engine API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// An argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A phase was started while another phase record was still open.
    #[error("phase '{requested}' started while phase '{open}' is still open")]
    PhaseAlreadyOpen {
        /// Phase that is currently open.
        open: String,
        /// Phase that tried to start.
        requested: String,
    },

    /// A phase was ended that had not been started.
    #[error("phase '{0}' ended but was never started")]
    PhaseNotStarted(String),

    /// An action was recorded outside of any phase.
    #[error("action '{0}' recorded with no open phase")]
    NoOpenPhase(String),

    /// A session was used after commit or rollback.
    #[error("session already {0}")]
    SessionConsumed(&'static str),

    /// A phase tried to move between two states that are not connected.
    #[error("phase '{phase}' cannot move from {from} to {to}")]
    IllegalTransition {
        /// Phase id.
        phase: String,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },
}

/// Configuration problem detected while running a phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No touchpoint is registered for a unit's touchpoint type.
    #[error("no touchpoint registered for type '{touchpoint_type}' (unit {unit})")]
    MissingTouchpoint {
        /// Touchpoint type key.
        touchpoint_type: String,
        /// Unit that required it.
        unit: String,
    },

    /// An instruction named an action neither the phase nor the touchpoint provides.
    #[error("action '{action}' not found in phase '{phase}' or touchpoint '{touchpoint}'")]
    ActionNotFound {
        /// Action id as written in the instruction.
        action: String,
        /// Phase that was searched first.
        phase: String,
        /// Touchpoint that was searched second.
        touchpoint: String,
    },

    /// A `${name}` reference named an undefined parameter.
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    /// A `${#NN}` escape did not name a valid character.
    #[error("invalid character escape '${{#{0}}}'")]
    InvalidEscape(String),

    /// An instruction string did not follow `name(key:value,...)`.
    #[error("malformed instruction '{statement}': {reason}")]
    MalformedInstruction {
        /// Offending statement text.
        statement: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// An action required an argument that was not supplied.
    #[error("action '{action}' requires parameter '{parameter}'")]
    MissingParameter {
        /// Action id.
        action: String,
        /// Missing parameter name.
        parameter: String,
    },
}

impl ConfigError {
    /// Convert into an `ERROR` status.
    pub fn to_status(&self) -> Status {
        Status::error(self.to_string())
    }
}

impl From<ConfigError> for Status {
    fn from(err: ConfigError) -> Self {
        err.to_status()
    }
}
