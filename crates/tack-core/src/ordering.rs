use tracing::{
  debug,
  info,
  instrument
};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{
  EngineError,
  Result
};
use crate::model::{
  ItemKind,
  Task,
  TaskChanges
};
use crate::store::{
  ListScope,
  RecordQuery,
  RecordStore
};

pub trait Sequenced {
  fn sequence_id(&self) -> Uuid;
  fn sequence_order(&self) -> i64;
}

impl Sequenced for Task {
  fn sequence_id(&self) -> Uuid {
    self.id
  }

  fn sequence_order(&self) -> i64 {
    self.order
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct OrderChange {
  pub id:    Uuid,
  pub order: i64
}

/// Moves `moved` to the slot held by `target` in an already ordered
/// sequence and renumbers positions densely from zero. Only items whose
/// stored order differs from their new position are returned.
pub fn plan_reorder<T: Sequenced>(
  items: &[T],
  moved: Uuid,
  target: Uuid
) -> Vec<OrderChange> {
  if moved == target {
    return vec![];
  }

  let position = |id: Uuid| {
    items.iter().position(|item| {
      item.sequence_id() == id
    })
  };
  let (Some(from), Some(to)) =
    (position(moved), position(target))
  else {
    return vec![];
  };

  let mut sequence: Vec<&T> =
    items.iter().collect();
  let item = sequence.remove(from);
  sequence.insert(to, item);

  sequence
    .iter()
    .enumerate()
    .filter_map(|(idx, item)| {
      let order = idx as i64;
      (item.sequence_order() != order)
        .then(|| OrderChange {
          id: item.sequence_id(),
          order
        })
    })
    .collect()
}

impl<S: RecordStore> Engine<S> {
  /// Drag-drop reorder within one view of the owner's live tasks. Writes
  /// only the tasks whose order changed.
  #[instrument(skip(self), fields(moved = %moved, target = %target))]
  pub fn reorder_tasks(
    &self,
    view: ListScope,
    moved: Uuid,
    target: Uuid
  ) -> Result<Vec<OrderChange>> {
    if moved == target {
      debug!("moved onto itself; no-op");
      return Ok(vec![]);
    }

    let (owner, _) =
      self.authorize_task(moved)?;
    self.authorize_task(target)?;

    let items = self.store().query_tasks(
      &RecordQuery::owned_by(owner)
        .live()
        .in_list(view)
    )?;
    for id in [moved, target] {
      if !items
        .iter()
        .any(|task| task.id == id)
      {
        return Err(
          EngineError::NotFound {
            kind: ItemKind::Task,
            id
          }
        );
      }
    }

    let changes =
      plan_reorder(&items, moved, target);
    let now = self.now();
    for change in &changes {
      self.store().update_task(
        change.id,
        &TaskChanges {
          order: Some(change.order),
          updated_at: Some(now),
          ..TaskChanges::default()
        }
      )?;
    }

    info!(
      view = ?view,
      writes = changes.len(),
      "tasks reordered"
    );
    Ok(changes)
  }
}
