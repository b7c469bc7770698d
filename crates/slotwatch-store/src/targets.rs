//! Durable target and transition-state store.
//!
//! Targets and their transition states are kept in one JSON document so that
//! adding or deleting a target creates or drops its state in the same write.
//! Each mutation is applied to a copy of the document, persisted, and only
//! then made visible; a failed write leaves both disk and memory at the
//! previous value.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotwatch_detect::Status;
use slotwatch_persist::JsonStore;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::observations::ObservationLog;
use crate::types::{NewTarget, Target, TargetId, TargetUpdate, TransitionState};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    targets: BTreeMap<TargetId, Target>,
    #[serde(default)]
    states: BTreeMap<TargetId, TransitionState>,
}

/// Target configuration and transition state, persisted on every write.
#[derive(Debug)]
pub struct TargetStore {
    doc: Mutex<StoreDocument>,
    store: JsonStore,
    observations: Arc<ObservationLog>,
}

impl TargetStore {
    /// Opens the store in `state_dir`, loading `targets.json` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read or parsed.
    pub fn open(state_dir: &Path, observations: Arc<ObservationLog>) -> Result<Self> {
        let store = JsonStore::new(state_dir, "targets");
        let doc: StoreDocument = store.try_load()?.unwrap_or_default();
        debug!(
            targets = doc.targets.len(),
            states = doc.states.len(),
            "loaded targets from disk"
        );
        Ok(Self {
            doc: Mutex::new(doc),
            store,
            observations,
        })
    }

    /// The observation log cleaned up alongside deleted targets.
    #[must_use]
    pub fn observations(&self) -> &Arc<ObservationLog> {
        &self.observations
    }

    /// Adds a target together with its initial transition state.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be persisted.
    pub fn add(&self, new: NewTarget) -> Result<TargetId> {
        let id = TargetId::new();
        let now = Utc::now();
        let target = Target {
            id,
            name: new.name,
            url: new.url,
            final_url: None,
            enabled: new.enabled,
            policy: new.policy,
            created_at: now,
            updated_at: now,
        };

        self.mutate(|doc| {
            doc.targets.insert(id, target);
            doc.states.insert(id, TransitionState::initial(now));
            Some(())
        })?;

        info!(target_id = %id, "added target");
        Ok(id)
    }

    /// Gets a target by id.
    #[must_use]
    pub fn get(&self, id: TargetId) -> Option<Target> {
        self.doc.lock().targets.get(&id).cloned()
    }

    /// Returns all targets ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<Target> {
        self.doc.lock().targets.values().cloned().collect()
    }

    /// Returns the targets scheduled checks should visit.
    #[must_use]
    pub fn list_enabled(&self) -> Vec<Target> {
        self.doc
            .lock()
            .targets
            .values()
            .filter(|t| t.enabled)
            .cloned()
            .collect()
    }

    /// Returns the number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc.lock().targets.len()
    }

    /// Returns true if there are no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc.lock().targets.is_empty()
    }

    /// Applies a partial update. Unknown ids are ignored.
    ///
    /// Returns `true` if the target existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be persisted.
    pub fn update(&self, id: TargetId, update: TargetUpdate) -> Result<bool> {
        let updated = self.mutate(|doc| {
            let target = doc.targets.get_mut(&id)?;
            update.apply(target);
            target.updated_at = Utc::now();
            Some(())
        })?;

        if updated.is_some() {
            debug!(target_id = %id, "updated target");
        } else {
            debug!(target_id = %id, "update for unknown target ignored");
        }
        Ok(updated.is_some())
    }

    /// Deletes a target, its transition state and its observation log.
    ///
    /// Returns `true` if the target existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be persisted. Failing to
    /// remove the observation log is only logged.
    pub fn delete(&self, id: TargetId) -> Result<bool> {
        let removed = self.mutate(|doc| {
            let target = doc.targets.remove(&id);
            let state = doc.states.remove(&id);
            (target.is_some() || state.is_some()).then_some(())
        })?;

        if removed.is_none() {
            return Ok(false);
        }

        if let Err(e) = self.observations.remove(id) {
            warn!(target_id = %id, error = %e, "failed to remove observation log");
        }
        info!(target_id = %id, "deleted target");
        Ok(true)
    }

    /// Gets the transition state of a target.
    #[must_use]
    pub fn get_state(&self, id: TargetId) -> Option<TransitionState> {
        self.doc.lock().states.get(&id).cloned()
    }

    /// Records an observed status for a target.
    ///
    /// An unchanged status only refreshes `updated_at`. A changed status also
    /// moves `last_changed_at`, sets `last_open_at` when the new status is
    /// OPEN, and resets the failure counter. A target without a state record
    /// gets one. Unknown targets are ignored and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be persisted.
    pub fn set_state(&self, id: TargetId, status: Status) -> Result<Option<TransitionState>> {
        let now = Utc::now();
        let written = self.mutate(|doc| {
            if !doc.targets.contains_key(&id) {
                return None;
            }
            let state = doc.states.entry(id).or_insert_with(|| {
                debug!(target_id = %id, "creating missing transition state");
                TransitionState::initial(now)
            });
            let changed = state.record(status, now);
            Some((changed, state.clone()))
        })?;

        match written {
            Some((changed, state)) => {
                if changed {
                    info!(target_id = %id, status = %status, "status changed");
                }
                Ok(Some(state))
            }
            None => {
                warn!(target_id = %id, status = %status, "set_state for unknown target ignored");
                Ok(None)
            }
        }
    }

    /// Runs `f` on a copy of the document and persists the result when `f`
    /// returns `Some`. Nothing is written for `None`.
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreDocument) -> Option<R>) -> Result<Option<R>> {
        let mut doc = self.doc.lock();
        let mut next = doc.clone();
        let Some(out) = f(&mut next) else {
            return Ok(None);
        };
        self.store.save(&next)?;
        *doc = next;
        Ok(Some(out))
    }
}
