use thiserror::Error;
use uuid::Uuid;

use crate::model::ItemKind;

pub type Result<T> =
  std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("no authenticated owner")]
  NotAuthenticated,

  #[error(
    "access denied to {kind} {id}"
  )]
  AccessDenied {
    kind: ItemKind,
    id:   Uuid
  },

  #[error("{kind} not found: {id}")]
  NotFound {
    kind: ItemKind,
    id:   Uuid
  },

  #[error(
    "{kind} {id} is in the trash; \
     restore it first"
  )]
  InTrash {
    kind: ItemKind,
    id:   Uuid
  },

  #[error(
    "{kind} {id} is not in the trash; \
     trash it before purging"
  )]
  NotInTrash {
    kind: ItemKind,
    id:   Uuid
  },

  #[error(
    "invalid recurrence: {0}"
  )]
  InvalidRecurrence(String),

  #[error("configuration error: {0:#}")]
  Config(anyhow::Error),

  #[error(transparent)]
  Store(#[from] anyhow::Error)
}

impl EngineError {
  pub fn invalid_recurrence(
    reason: impl Into<String>
  ) -> Self {
    Self::InvalidRecurrence(
      reason.into()
    )
  }
}
