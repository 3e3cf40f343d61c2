use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::datastore::JsonlStore;
use crate::error::{EngineError, Result};
use crate::identity::Identity;
use crate::model::{ItemKind, Note, OwnerId, Task};
use crate::store::RecordStore;

/// Entry point for every lifecycle, trash, ordering and view operation.
/// Each mutating call resolves the owner, re-reads the target record to
/// check ownership, then issues its writes.
pub struct Engine<S> {
    store: S,
    clock: Box<dyn Clock>,
    identity: Box<dyn Identity>,
    config: EngineConfig,
}

impl<S: RecordStore> Engine<S> {
    pub fn new(
        store: S,
        clock: impl Clock + 'static,
        identity: impl Identity + 'static,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            clock: Box::new(clock),
            identity: Box::new(identity),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn owner(&self) -> Result<OwnerId> {
        self.identity
            .current_owner_id()
            .ok_or(EngineError::NotAuthenticated)
    }

    /// Loads a task the current owner may mutate.
    pub(crate) fn authorize_task(&self, id: Uuid) -> Result<(OwnerId, Task)> {
        let owner = self.owner()?;
        let task = self.store.get_task(id)?.ok_or(EngineError::NotFound {
            kind: ItemKind::Task,
            id,
        })?;
        if task.owner_id != owner {
            warn!(task_id = %id, owner = %owner, "task ownership check failed");
            return Err(EngineError::AccessDenied {
                kind: ItemKind::Task,
                id,
            });
        }
        Ok((owner, task))
    }

    pub(crate) fn authorize_note(&self, id: Uuid) -> Result<(OwnerId, Note)> {
        let owner = self.owner()?;
        let note = self.store.get_note(id)?.ok_or(EngineError::NotFound {
            kind: ItemKind::Note,
            id,
        })?;
        if note.owner_id != owner {
            warn!(note_id = %id, owner = %owner, "note ownership check failed");
            return Err(EngineError::AccessDenied {
                kind: ItemKind::Note,
                id,
            });
        }
        Ok((owner, note))
    }
}

impl Engine<JsonlStore> {
    /// Opens the file-backed store in the configured data directory.
    #[tracing::instrument(skip_all)]
    pub fn open(config: EngineConfig, identity: impl Identity + 'static) -> Result<Self> {
        let data_dir = config.resolve_data_dir().map_err(EngineError::Config)?;
        let store = JsonlStore::open(&data_dir)?;
        info!(data_dir = %data_dir.display(), timezone = %config.timezone, "engine ready");
        Ok(Self::new(store, SystemClock, identity, config))
    }
}
