pub mod clock;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod engine;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod notes;
pub mod ordering;
pub mod pipeline;
pub mod recurrence;
pub mod store;
pub mod trash;

pub use clock::{
  Clock,
  FixedClock,
  SystemClock
};
pub use config::EngineConfig;
pub use datastore::JsonlStore;
pub use engine::Engine;
pub use error::{
  EngineError,
  Result
};
pub use identity::{
  Identity,
  StaticIdentity
};
pub use lifecycle::{
  Completion,
  TaskDraft,
  TaskEdit
};
pub use model::{
  DayOfWeek,
  ItemKind,
  Note,
  Priority,
  RecurrenceConfig,
  RecurrencePattern,
  Status,
  Task
};
pub use ordering::OrderChange;
pub use pipeline::{
  DateRange,
  FilterSet,
  SortKey,
  StatusFilter
};
pub use recurrence::{
  RecurrenceDraft,
  next_occurrence
};
pub use store::{
  ListScope,
  MemoryStore,
  RecordQuery,
  RecordStore
};
pub use trash::TrashedItem;
