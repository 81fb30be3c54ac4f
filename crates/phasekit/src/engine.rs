//! Transaction entry point
//!
//! [`Engine::perform`] serializes on the profile id, runs a [`PhaseSet`] and
//! then settles the [`Session`] from the aggregate status:
//!
//! | Aggregate        | Session    | Profile store       | Resolution   |
//! |------------------|------------|---------------------|--------------|
//! | exactly `OK`     | committed  | add or update       | `Committed`  |
//! | `ERROR`/`CANCEL` | rolled back| untouched           | `RolledBack` |
//! | `INFO`/`WARNING` | left as is | untouched           | `Unresolved` |
//!
//! A store failure while committing turns into an `ERROR` child and a
//! rollback.

use crate::error::{EngineError, Result};
use crate::event::{EngineEvent, EngineListener, Listeners};
use crate::lock::ProfileLocks;
use crate::monitor::ProgressMonitor;
use crate::operand::Operand;
use crate::phase_set::PhaseSet;
use crate::profile::{Profile, ProfileStore, Properties};
use crate::session::Session;
use crate::status::Status;
use crate::touchpoint::TouchpointRegistry;
use crate::unit::UnitKey;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// How a transaction was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Committed,
    RolledBack,
    /// Warning-only result; the profile keeps whatever the phases did and is
    /// not persisted
    Unresolved,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Unresolved => "unresolved",
        })
    }
}

/// Result of [`Engine::perform`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformResult {
    /// Aggregate status, or its only child when there is exactly one
    pub status: Status,
    pub resolution: Resolution,
}

impl PerformResult {
    pub fn is_committed(&self) -> bool {
        self.resolution == Resolution::Committed
    }
}

/// Per-unit properties to carry from an update's source unit to its target
type PropertyMoves = Vec<(UnitKey, Properties)>;

/// Runs phase sets against profiles
pub struct Engine {
    store: Arc<dyn ProfileStore>,
    touchpoints: TouchpointRegistry,
    locks: ProfileLocks,
    listeners: Listeners,
}

impl Engine {
    pub fn new(store: Arc<dyn ProfileStore>, touchpoints: TouchpointRegistry) -> Self {
        Self {
            store,
            touchpoints,
            locks: ProfileLocks::new(),
            listeners: Listeners::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EngineListener>) {
        self.listeners.add(listener);
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn EngineListener>) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn touchpoints(&self) -> &TouchpointRegistry {
        &self.touchpoints
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Run `phase_set` over `operands` as one transaction on `profile`
    ///
    /// Blocks while another call holds the same profile id. `Err` means the
    /// engine was misused; every other failure is in the returned status.
    pub fn perform(
        &self,
        profile: &mut Profile,
        phase_set: &PhaseSet,
        operands: &[Operand],
        monitor: &dyn ProgressMonitor,
    ) -> Result<PerformResult> {
        if profile.id().trim().is_empty() {
            return Err(EngineError::InvalidArgument("profile id is empty".into()));
        }

        let _lock = self.locks.acquire(profile.id());
        let profile_id = profile.id().to_string();
        log::info!(
            "Performing {} phases over {} operands on profile '{}'",
            phase_set.len(),
            operands.len(),
            profile_id
        );

        let mut session = Session::new();
        let moves = snapshot_unit_properties(profile, operands);
        self.listeners.notify(&EngineEvent::BeginOperation {
            profile_id: profile_id.clone(),
            operands: operands.len(),
        });

        let performed = phase_set.perform(
            &mut session,
            profile,
            operands,
            &self.touchpoints,
            monitor,
            &self.listeners,
        );
        let mut status = match performed {
            Ok(status) => status,
            Err(err) => {
                log::warn!("Engine contract violated on '{profile_id}': {err}; undoing");
                if let Err(undo_err) = session.rollback(profile) {
                    log::warn!("Rollback after contract violation failed: {undo_err}");
                }
                monitor.done();
                return Err(err);
            }
        };

        let resolution = if status.is_ok() {
            match self.persist(profile, &moves) {
                Ok(()) => {
                    session.commit()?;
                    profile.clear_changed();
                    log::info!("Committed profile '{profile_id}'");
                    self.run_touchpoint_hooks(&session, profile, &mut status, true);
                    self.listeners.notify(&EngineEvent::CommitOperation {
                        profile_id: profile_id.clone(),
                    });
                    Resolution::Committed
                }
                Err(err) => {
                    status.add(Status::error(format!(
                        "Failed to persist profile '{profile_id}': {err:#}"
                    )));
                    self.roll_back(&mut session, profile, &mut status)?
                }
            }
        } else if status.is_fatal() {
            self.roll_back(&mut session, profile, &mut status)?
        } else {
            log::warn!(
                "Profile '{profile_id}' finished with {}; neither committing nor rolling back",
                status.severity()
            );
            self.listeners.notify(&EngineEvent::UnresolvedOperation {
                profile_id: profile_id.clone(),
                status: status.clone(),
            });
            Resolution::Unresolved
        };

        monitor.done();
        Ok(PerformResult {
            status: status.into_specific(),
            resolution,
        })
    }

    fn roll_back(&self, session: &mut Session, profile: &mut Profile, status: &mut Status) -> Result<Resolution> {
        log::info!("Rolling back profile '{}' ({})", profile.id(), status.severity());
        let undo = session.rollback(profile)?;
        if !undo.is_ok() {
            status.add(undo.clone());
        }
        self.run_touchpoint_hooks(session, profile, status, false);
        self.listeners.notify(&EngineEvent::RollbackOperation {
            profile_id: profile.id().to_string(),
            status: undo,
        });
        Ok(Resolution::RolledBack)
    }

    /// Call `commit` or `rollback` on every touchpoint the session used
    fn run_touchpoint_hooks(&self, session: &Session, profile: &Profile, status: &mut Status, committed: bool) {
        for touchpoint_type in session.touchpoints() {
            let Some(touchpoint) = self.touchpoints.lookup(touchpoint_type) else {
                continue;
            };
            let result = if committed {
                touchpoint.commit(profile)
            } else {
                touchpoint.rollback(profile)
            };
            if !result.is_ok() {
                log::warn!("Touchpoint '{touchpoint_type}' hook reported {result}");
                status.add(result);
            }
        }
    }

    /// Hand a changed profile to the store
    fn persist(&self, profile: &mut Profile, moves: &PropertyMoves) -> anyhow::Result<()> {
        if !profile.is_changed() {
            log::debug!("Profile '{}' unchanged; nothing to persist", profile.id());
            return Ok(());
        }
        if self.store.get(profile.id())?.is_none() {
            log::debug!("Adding new profile '{}'", profile.id());
            return self.store.add(profile);
        }
        move_unit_properties(profile, moves);
        log::debug!("Updating profile '{}'", profile.id());
        self.store.update(profile)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("touchpoints", &self.touchpoints)
            .field("locks", &self.locks)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

/// Per-unit properties of every update's source unit, keyed by target unit
fn snapshot_unit_properties(profile: &Profile, operands: &[Operand]) -> PropertyMoves {
    operands
        .iter()
        .filter_map(|operand| {
            let (from, to) = (operand.from()?, operand.to()?);
            let properties = profile.unit_properties(&from.key())?;
            (!properties.is_empty()).then(|| (to.key(), properties.clone()))
        })
        .collect()
}

/// Copy snapshotted properties onto target units that are in the profile
///
/// Values the transaction already set on the target unit are kept.
fn move_unit_properties(profile: &mut Profile, moves: &PropertyMoves) {
    for (key, properties) in moves {
        if !profile.contains_unit(key) {
            continue;
        }
        for (name, value) in properties {
            if profile.unit_property(key, name).is_none() {
                profile.set_unit_property(key, name.clone(), value.clone());
            }
        }
    }
}
