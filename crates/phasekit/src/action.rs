//! Action trait - a named, reversible unit of work
//!
//! Actions are looked up by id for every dispatch, so an implementation may
//! keep whatever it needs to reverse itself (a previous value, a backup
//! location) inside the instance it was given out as.

use crate::params::Parameters;
use crate::profile::Profile;
use crate::status::Status;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Context passed to action execute/undo
pub struct ActionContext<'a> {
    /// Parameters captured when the action was dispatched
    pub params: &'a Parameters,
    /// Profile being provisioned
    pub profile: &'a mut Profile,
}

impl<'a> ActionContext<'a> {
    pub fn new(params: &'a Parameters, profile: &'a mut Profile) -> Self {
        Self { params, profile }
    }
}

/// Core trait for provisioning actions
///
/// `undo` receives the exact parameter map `execute` received. Returning
/// `Err` is reported as an `ERROR` status; any other severity is data.
pub trait Action: Send + Sync + fmt::Debug {
    /// Perform the action
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status>;

    /// Reverse a previous `execute`
    fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status>;
}

/// A shared action instance
pub type SharedAction = Arc<dyn Action>;

/// An action together with the parameters it was dispatched with
///
/// This is what the session records, so rollback can call `undo` with the
/// same map `execute` saw.
#[derive(Clone)]
pub struct BoundAction {
    id: String,
    action: SharedAction,
    params: Parameters,
}

impl BoundAction {
    pub fn new(id: impl Into<String>, action: SharedAction, params: Parameters) -> Self {
        Self {
            id: id.into(),
            action,
            params,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn execute(&self, profile: &mut Profile) -> Status {
        let mut ctx = ActionContext::new(&self.params, profile);
        match self.action.execute(&mut ctx) {
            Ok(status) => status,
            Err(e) => Status::error(format!("{} failed: {e:#}", self.id)),
        }
    }

    pub fn undo(&self, profile: &mut Profile) -> Status {
        let mut ctx = ActionContext::new(&self.params, profile);
        match self.action.undo(&mut ctx) {
            Ok(status) => status,
            Err(e) => Status::error(format!("undo of {} failed: {e:#}", self.id)),
        }
    }
}

impl fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAction")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParametersBuilder;
    use crate::status::Severity;

    #[derive(Debug)]
    struct Failing;

    impl Action for Failing {
        fn execute(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
            anyhow::bail!("disk full")
        }

        fn undo(&self, _ctx: &mut ActionContext<'_>) -> Result<Status> {
            Ok(Status::ok())
        }
    }

    #[derive(Debug)]
    struct SetFromParam;

    impl Action for SetFromParam {
        fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
            let value = ctx.params.require("set", "value")?.to_string();
            ctx.profile.set_property("key", value);
            Ok(Status::ok())
        }

        fn undo(&self, ctx: &mut ActionContext<'_>) -> Result<Status> {
            ctx.profile.remove_property("key");
            Ok(Status::ok())
        }
    }

    #[test]
    fn test_err_becomes_error_status() {
        let bound = BoundAction::new("failing", Arc::new(Failing), Parameters::default());
        let mut profile = Profile::new("p");
        let status = bound.execute(&mut profile);
        assert_eq!(status.severity(), Severity::Error);
        assert!(status.message().contains("disk full"));
    }

    #[test]
    fn test_undo_sees_same_params() {
        let params = ParametersBuilder::new().with("value", "42").build();
        let bound = BoundAction::new("set", Arc::new(SetFromParam), params);
        let mut profile = Profile::new("p");

        assert!(bound.execute(&mut profile).is_ok());
        assert_eq!(profile.property("key"), Some("42"));
        assert!(bound.undo(&mut profile).is_ok());
        assert_eq!(profile.property("key"), None);
    }
}
