use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::model::{ItemKind, Note, NoteChanges};
use crate::store::RecordStore;

impl<S: RecordStore> Engine<S> {
    #[instrument(skip(self, title, content))]
    pub fn create_note(&self, title: impl Into<String>, content: Option<String>) -> Result<Note> {
        let owner = self.owner()?;
        let mut note = Note::new(owner, title, self.now());
        note.content = content;
        let note = self.store().create_note(note)?;
        info!(note_id = %note.id, "note created");
        Ok(note)
    }

    #[instrument(skip(self), fields(note_id = %id))]
    pub fn trash_note(&self, id: Uuid) -> Result<Note> {
        let (_, note) = self.authorize_note(id)?;
        if note.deleted {
            debug!("note already trashed");
            return Ok(note);
        }
        let now = self.now();
        let changes = NoteChanges {
            deleted: Some(true),
            deleted_at: Some(Some(now)),
            updated_at: Some(now),
            ..NoteChanges::default()
        };
        let note = self.store().update_note(id, &changes)?;
        info!(note_id = %id, "note moved to trash");
        Ok(note)
    }

    #[instrument(skip(self), fields(note_id = %id))]
    pub fn restore_note(&self, id: Uuid) -> Result<Note> {
        let (_, note) = self.authorize_note(id)?;
        if !note.deleted {
            debug!("note not trashed; nothing to restore");
            return Ok(note);
        }
        let changes = NoteChanges {
            deleted: Some(false),
            deleted_at: Some(None),
            updated_at: Some(self.now()),
            ..NoteChanges::default()
        };
        let note = self.store().update_note(id, &changes)?;
        info!(note_id = %id, "note restored");
        Ok(note)
    }

    #[instrument(skip(self), fields(note_id = %id))]
    pub fn purge_note(&self, id: Uuid) -> Result<()> {
        let (_, note) = self.authorize_note(id)?;
        if !note.deleted {
            warn!(note_id = %id, "refusing to purge a note outside the trash");
            return Err(EngineError::NotInTrash {
                kind: ItemKind::Note,
                id,
            });
        }
        self.store().delete_note(id)?;
        info!(note_id = %id, "note purged");
        Ok(())
    }
}
