use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tack_core::datastore::JsonlStore;
use tack_core::logging::init_tracing;
use tack_core::model::{NoteChanges, TaskChanges};
use tack_core::{
    Engine, EngineConfig, EngineError, FilterSet, FixedClock, ItemKind, ListScope, MemoryStore,
    Note, RecordQuery, RecordStore, RecurrenceDraft, RecurrencePattern, SortKey, StaticIdentity,
    Status, StatusFilter, Task, TaskDraft, TaskEdit,
};
use tempfile::tempdir;
use uuid::Uuid;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

struct Harness {
    engine: Engine<Arc<MemoryStore>>,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    identity: Arc<StaticIdentity>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(at(2024, 1, 1) + Duration::hours(9)));
    let identity = Arc::new(StaticIdentity::signed_in("owner-a"));
    let engine = Engine::new(
        store.clone(),
        clock.clone(),
        identity.clone(),
        EngineConfig::default(),
    );
    Harness {
        engine,
        store,
        clock,
        identity,
    }
}

#[test]
fn weekly_series_stops_at_end_date() {
    let h = harness();
    let draft = TaskDraft {
        due_date: Some(at(2024, 1, 1)),
        recurrence: Some(
            RecurrenceDraft::new(RecurrencePattern::Weekly)
                .on_days(["mon"])
                .until(at(2024, 1, 10)),
        ),
        ..TaskDraft::titled("standup notes")
    };
    let root = h.engine.create_task(draft).expect("create recurring task");

    let first = h.engine.complete_task(root.id).expect("complete root");
    assert!(first.task.completed);
    assert_eq!(first.task.status, Status::Completed);
    let successor = first.successor.expect("series continues");
    assert_eq!(successor.due_date, Some(at(2024, 1, 8)));
    assert_eq!(successor.parent_recurring_task_id, Some(root.id));
    assert_eq!(successor.title, "standup notes");
    assert!(successor.is_recurring);
    assert!(!successor.completed);

    let second = h
        .engine
        .complete_task(successor.id)
        .expect("complete successor");
    assert!(second.successor.is_none());
    assert_eq!(h.store.task_len(), 2);
}

#[test]
fn completing_a_plain_task_creates_nothing() {
    let h = harness();
    let task = h
        .engine
        .create_task(TaskDraft::titled("file taxes"))
        .expect("create task");

    let done = h.engine.complete_task(task.id).expect("complete");
    assert!(done.successor.is_none());
    assert_eq!(done.task.completed_at, Some(h.engine.now()));
    assert_eq!(h.store.task_len(), 1);

    // Completing again is a no-op.
    let again = h.engine.complete_task(task.id).expect("complete again");
    assert_eq!(again.task, done.task);
    assert_eq!(h.store.task_len(), 1);
}

#[test]
fn successors_point_at_series_root() {
    let h = harness();
    let root = h
        .engine
        .create_task(TaskDraft {
            due_date: Some(at(2024, 1, 1)),
            recurrence: Some(RecurrenceDraft::new(RecurrencePattern::Daily).every(2)),
            ..TaskDraft::titled("water plants")
        })
        .expect("create");

    let mut current = root.id;
    let mut dues = Vec::new();
    for _ in 0..3 {
        let completion = h.engine.toggle_complete(current).expect("toggle");
        let next = completion.successor.expect("endless series");
        assert_eq!(next.parent_recurring_task_id, Some(root.id));
        dues.push(next.due_date.expect("successor has a due date"));
        current = next.id;
    }
    assert_eq!(dues, vec![at(2024, 1, 3), at(2024, 1, 5), at(2024, 1, 7)]);
}

#[test]
fn reopening_keeps_generated_successor() {
    let h = harness();
    let task = h
        .engine
        .create_task(TaskDraft {
            recurrence: Some(RecurrenceDraft::new(RecurrencePattern::Weekly)),
            ..TaskDraft::titled("review budget")
        })
        .expect("create");

    let completion = h.engine.set_status(task.id, Status::Completed).expect("complete");
    let successor = completion.successor.expect("successor");
    assert_eq!(successor.due_date, Some(h.engine.now() + Duration::days(7)));

    let reopened = h
        .engine
        .set_status(task.id, Status::InProgress)
        .expect("reopen")
        .task;
    assert_eq!(reopened.status, Status::InProgress);
    assert!(!reopened.completed);
    assert!(reopened.completed_at.is_none());
    assert_eq!(h.store.task_len(), 2);

    let toggled = h.engine.toggle_complete(successor.id).expect("toggle successor");
    let back = h.engine.reopen_task(successor.id, None).expect("reopen successor");
    assert!(toggled.task.completed);
    assert_eq!(back.status, Status::Todo);
}

#[test]
fn trash_restore_and_purge() {
    let h = harness();
    let task = h
        .engine
        .create_task(TaskDraft::titled("old errand"))
        .expect("create task");
    let note = h
        .engine
        .create_note("scratch", Some("phone numbers".to_string()))
        .expect("create note");

    h.engine.trash_task(task.id).expect("trash task");
    h.clock.advance(Duration::minutes(5));
    h.engine.trash_note(note.id).expect("trash note");

    let visible = h.engine.visible_tasks(&FilterSet::default()).expect("visible");
    assert!(visible.is_empty());

    let trashed = h.engine.list_trashed().expect("list trash");
    assert_eq!(trashed.len(), 2);
    assert_eq!(trashed[0].kind, ItemKind::Note);
    assert_eq!(trashed[1].id(), task.id);
    assert_eq!(h.engine.trashed_task_count().expect("count"), 1);

    let restored = h.engine.restore_task(task.id).expect("restore");
    let restored_again = h.engine.restore_task(task.id).expect("restore twice");
    assert!(!restored.deleted);
    assert!(restored.deleted_at.is_none());
    assert_eq!(restored, restored_again);
    assert_eq!(h.engine.trashed_task_count().expect("count"), 0);
    assert_eq!(
        h.engine
            .visible_tasks(&FilterSet::default())
            .expect("visible")
            .len(),
        1
    );

    assert_eq!(h.engine.empty_trash().expect("empty trash"), 1);
    assert!(h.engine.list_trashed().expect("list trash").is_empty());
    assert!(matches!(
        h.engine.trash_note(note.id),
        Err(EngineError::NotFound {
            kind: ItemKind::Note,
            ..
        })
    ));

    h.engine.trash_task(task.id).expect("trash again");
    h.engine
        .purge_item(ItemKind::Task, task.id)
        .expect("purge task");
    assert!(h.store.get_task(task.id).expect("read").is_none());
    assert_eq!(h.store.task_len(), 0);
}

#[test]
fn ownership_and_state_errors() {
    let h = harness();
    let task = h
        .engine
        .create_task(TaskDraft::titled("private"))
        .expect("create");

    h.identity.switch_to(Some("owner-b".to_string()));
    assert!(matches!(
        h.engine.complete_task(task.id),
        Err(EngineError::AccessDenied {
            kind: ItemKind::Task,
            ..
        })
    ));
    assert!(matches!(
        h.engine.trash_task(task.id),
        Err(EngineError::AccessDenied { .. })
    ));
    assert!(h.engine.list_trashed().expect("other owner trash").is_empty());

    h.identity.switch_to(None);
    assert!(matches!(
        h.engine.visible_tasks(&FilterSet::default()),
        Err(EngineError::NotAuthenticated)
    ));
    assert!(matches!(
        h.engine.create_task(TaskDraft::titled("nope")),
        Err(EngineError::NotAuthenticated)
    ));

    h.identity.switch_to(Some("owner-a".to_string()));
    assert!(matches!(
        h.engine.complete_task(Uuid::new_v4()),
        Err(EngineError::NotFound { .. })
    ));

    h.engine.trash_task(task.id).expect("trash");
    assert!(matches!(
        h.engine.toggle_complete(task.id),
        Err(EngineError::InTrash { .. })
    ));
    assert!(matches!(
        h.engine.edit_task(task.id, TaskEdit::default()),
        Err(EngineError::InTrash { .. })
    ));
}

#[test]
fn other_owners_cannot_touch_records() {
    let h = harness();
    let kept = h
        .engine
        .create_task(TaskDraft::titled("kept"))
        .expect("create kept");
    let binned = h
        .engine
        .create_task(TaskDraft::titled("binned"))
        .expect("create binned");
    let live_note = h.engine.create_note("live", None).expect("create note");
    let binned_note = h.engine.create_note("binned", None).expect("create note");
    h.engine.trash_task(binned.id).expect("trash task");
    h.engine.trash_note(binned_note.id).expect("trash note");

    h.identity.switch_to(Some("owner-b".to_string()));
    let denied = |result: tack_core::Result<()>| {
        assert!(
            matches!(result, Err(EngineError::AccessDenied { .. })),
            "expected access denied, got {result:?}"
        );
    };

    denied(h.engine.restore_task(binned.id).map(|_| ()));
    denied(h.engine.purge_task(binned.id));
    denied(h.engine.reopen_task(kept.id, None).map(|_| ()));
    denied(h.engine.set_status(kept.id, Status::InProgress).map(|_| ()));
    denied(h.engine.edit_task(kept.id, TaskEdit::default()).map(|_| ()));
    denied(
        h.engine
            .reorder_tasks(ListScope::Unlisted, kept.id, binned.id)
            .map(|_| ()),
    );
    denied(h.engine.trash_note(live_note.id).map(|_| ()));
    denied(h.engine.restore_note(binned_note.id).map(|_| ()));
    denied(h.engine.purge_note(binned_note.id));
    denied(h.engine.restore_item(ItemKind::Task, binned.id));
    denied(h.engine.purge_item(ItemKind::Note, binned_note.id));

    h.identity.switch_to(Some("owner-a".to_string()));
    let trashed = h.engine.list_trashed().expect("list trash");
    assert_eq!(trashed.len(), 2);
    assert_eq!(h.store.task_len(), 2);
    assert!(
        !h.store
            .get_note(live_note.id)
            .expect("read note")
            .expect("note exists")
            .deleted
    );
}

#[test]
fn purge_requires_the_trash() {
    let h = harness();
    let task = h
        .engine
        .create_task(TaskDraft::titled("still needed"))
        .expect("create task");
    let done = h
        .engine
        .create_task(TaskDraft::titled("finished"))
        .expect("create task");
    h.engine.complete_task(done.id).expect("complete");
    let note = h.engine.create_note("draft", None).expect("create note");

    for id in [task.id, done.id] {
        assert!(matches!(
            h.engine.purge_item(ItemKind::Task, id),
            Err(EngineError::NotInTrash {
                kind: ItemKind::Task,
                ..
            })
        ));
    }
    assert!(matches!(
        h.engine.purge_item(ItemKind::Note, note.id),
        Err(EngineError::NotInTrash {
            kind: ItemKind::Note,
            ..
        })
    ));
    assert_eq!(h.store.task_len(), 2);
    assert!(h.store.get_note(note.id).expect("read note").is_some());

    h.engine.trash_note(note.id).expect("trash note");
    h.engine.purge_note(note.id).expect("purge trashed note");
    assert!(h.store.get_note(note.id).expect("read note").is_none());
}

#[test]
fn restore_after_reorder_keeps_positions_unique() {
    let h = harness();
    let ids: Vec<Uuid> = ["a", "b", "c"]
        .into_iter()
        .map(|title| {
            h.engine
                .create_task(TaskDraft::titled(title))
                .expect("create")
                .id
        })
        .collect();

    h.engine.trash_task(ids[1]).expect("trash b");
    h.engine
        .reorder_tasks(ListScope::Unlisted, ids[2], ids[0])
        .expect("reorder");
    let restored = h.engine.restore_task(ids[1]).expect("restore b");
    assert_eq!(restored.order, 2);

    let manual = FilterSet {
        sort: SortKey::Manual,
        ..FilterSet::default()
    };
    let view = h.engine.visible_tasks(&manual).expect("visible");
    let placed: Vec<(&str, i64)> = view.iter().map(|t| (t.title.as_str(), t.order)).collect();
    assert_eq!(placed, vec![("c", 0), ("a", 1), ("b", 2)]);

    let distinct: std::collections::BTreeSet<i64> = view.iter().map(|t| t.order).collect();
    assert_eq!(distinct.len(), view.len());
}

/// Memory store whose task inserts can be switched off and whose updates
/// can be rationed.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_creates: AtomicBool,
    updates_left: Option<AtomicUsize>,
}

impl RecordStore for FlakyStore {
    fn get_task(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        self.inner.get_task(id)
    }

    fn query_tasks(&self, query: &RecordQuery) -> anyhow::Result<Vec<Task>> {
        self.inner.query_tasks(query)
    }

    fn create_task(&self, task: Task) -> anyhow::Result<Task> {
        if self.fail_creates.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.create_task(task)
    }

    fn update_task(&self, id: Uuid, changes: &TaskChanges) -> anyhow::Result<Task> {
        if let Some(left) = &self.updates_left
            && left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        {
            anyhow::bail!("store went read-only");
        }
        self.inner.update_task(id, changes)
    }

    fn delete_task(&self, id: Uuid) -> anyhow::Result<()> {
        self.inner.delete_task(id)
    }

    fn get_note(&self, id: Uuid) -> anyhow::Result<Option<Note>> {
        self.inner.get_note(id)
    }

    fn query_notes(&self, query: &RecordQuery) -> anyhow::Result<Vec<Note>> {
        self.inner.query_notes(query)
    }

    fn create_note(&self, note: Note) -> anyhow::Result<Note> {
        self.inner.create_note(note)
    }

    fn update_note(&self, id: Uuid, changes: &NoteChanges) -> anyhow::Result<Note> {
        self.inner.update_note(id, changes)
    }

    fn delete_note(&self, id: Uuid) -> anyhow::Result<()> {
        self.inner.delete_note(id)
    }
}

fn flaky_engine(updates_left: Option<usize>) -> (Engine<Arc<FlakyStore>>, Arc<FlakyStore>, Uuid) {
    let store = Arc::new(FlakyStore {
        updates_left: updates_left.map(AtomicUsize::new),
        ..FlakyStore::default()
    });
    let engine = Engine::new(
        store.clone(),
        FixedClock::new(at(2024, 1, 1)),
        StaticIdentity::signed_in("owner-a"),
        EngineConfig::default(),
    );
    let task = engine
        .create_task(TaskDraft {
            recurrence: Some(RecurrenceDraft::new(RecurrencePattern::Daily)),
            ..TaskDraft::titled("stretch")
        })
        .expect("create");
    store.fail_creates.store(true, Ordering::SeqCst);
    (engine, store, task.id)
}

#[test]
fn failed_successor_write_reverts_completion() {
    let (engine, store, id) = flaky_engine(None);

    let err = engine.complete_task(id).expect_err("successor insert fails");
    assert_eq!(err.to_string(), "disk full");

    let task = store.get_task(id).expect("read").expect("exists");
    assert!(!task.completed);
    assert_eq!(task.status, Status::Todo);
    assert!(task.completed_at.is_none());
}

#[test]
fn failed_revert_keeps_the_successor_error() {
    let (engine, _store, id) = flaky_engine(Some(1));

    let err = engine.complete_task(id).expect_err("revert fails");
    let message = err.to_string();
    assert!(message.contains("failed to revert completion"), "{message}");
    assert!(message.contains("disk full"), "{message}");
}

#[test]
fn invalid_recurrence_is_rejected_before_any_write() {
    let h = harness();
    let err = h
        .engine
        .create_task(TaskDraft {
            recurrence: Some(RecurrenceDraft::new(RecurrencePattern::Daily).every(0)),
            ..TaskDraft::titled("broken")
        })
        .expect_err("interval 0 is invalid");
    assert!(matches!(err, EngineError::InvalidRecurrence(_)));
    assert_eq!(h.store.task_len(), 0);

    let task = h
        .engine
        .create_task(TaskDraft::titled("fine"))
        .expect("create");
    let err = h
        .engine
        .edit_task(
            task.id,
            TaskEdit {
                recurrence: Some(Some(
                    RecurrenceDraft::new(RecurrencePattern::Weekly).on_days(["caturday"]),
                )),
                ..TaskEdit::default()
            },
        )
        .expect_err("unknown day");
    assert!(err.to_string().contains("caturday"));
    assert!(!h.store.get_task(task.id).expect("read").expect("exists").is_recurring);
}

#[test]
fn edit_moves_task_to_end_of_new_list() {
    let h = harness();
    let list = Uuid::new_v4();
    let a = h
        .engine
        .create_task(TaskDraft {
            list_id: Some(list),
            ..TaskDraft::titled("a")
        })
        .expect("create a");
    let loose = h
        .engine
        .create_task(TaskDraft::titled("loose"))
        .expect("create loose");
    assert_eq!(a.order, 0);
    assert_eq!(loose.order, 0);

    let moved = h
        .engine
        .edit_task(
            loose.id,
            TaskEdit {
                list_id: Some(Some(list)),
                tags: Some(vec![" home ".to_string(), String::new()]),
                description: Some(Some("by friday".to_string())),
                ..TaskEdit::default()
            },
        )
        .expect("edit");
    assert_eq!(moved.list_id, Some(list));
    assert_eq!(moved.order, 1);
    assert_eq!(moved.tags.iter().collect::<Vec<_>>(), vec!["home"]);
    assert_eq!(moved.description.as_deref(), Some("by friday"));
}

#[test]
fn reorder_keeps_positions_dense() {
    let h = harness();
    let ids: Vec<Uuid> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|title| {
            h.engine
                .create_task(TaskDraft::titled(title))
                .expect("create")
                .id
        })
        .collect();

    let changes = h
        .engine
        .reorder_tasks(ListScope::Unlisted, ids[0], ids[2])
        .expect("reorder");
    assert_eq!(changes.len(), 3);

    let manual = FilterSet {
        sort: SortKey::Manual,
        ..FilterSet::default()
    };
    let view = h.engine.visible_tasks(&manual).expect("visible");
    let titles: Vec<&str> = view.iter().map(|t| t.title.as_str()).collect();
    let orders: Vec<i64> = view.iter().map(|t| t.order).collect();
    assert_eq!(titles, vec!["b", "c", "a", "d"]);
    assert_eq!(orders, vec![0, 1, 2, 3]);

    assert!(
        h.engine
            .reorder_tasks(ListScope::Unlisted, ids[1], ids[1])
            .expect("self move")
            .is_empty()
    );

    h.engine.trash_task(ids[3]).expect("trash");
    assert!(matches!(
        h.engine.reorder_tasks(ListScope::Unlisted, ids[0], ids[3]),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn visible_tasks_apply_filters_for_current_owner() {
    let h = harness();
    h.engine
        .create_task(TaskDraft {
            status: Some(Status::InProgress),
            ..TaskDraft::titled("draft report")
        })
        .expect("create");
    let done = h
        .engine
        .create_task(TaskDraft::titled("send invoice"))
        .expect("create");
    h.engine.complete_task(done.id).expect("complete");

    h.identity.switch_to(Some("owner-b".to_string()));
    h.engine
        .create_task(TaskDraft::titled("someone else's report"))
        .expect("create other");
    h.identity.switch_to(Some("owner-a".to_string()));

    let open = FilterSet {
        status: StatusFilter::Open,
        search: Some("REPORT".to_string()),
        ..FilterSet::default()
    };
    let view = h.engine.visible_tasks(&open).expect("visible");
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].title, "draft report");
}

#[test]
fn jsonl_store_persists_engine_writes() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlStore::open(temp.path()).expect("open datastore");
    let engine = Engine::new(
        store,
        FixedClock::new(at(2024, 2, 1)),
        StaticIdentity::signed_in("owner-a"),
        EngineConfig::default(),
    );

    let task = engine
        .create_task(TaskDraft {
            due_date: Some(at(2024, 1, 31)),
            recurrence: Some(RecurrenceDraft::new(RecurrencePattern::Monthly)),
            ..TaskDraft::titled("pay rent")
        })
        .expect("create");
    let successor = engine
        .complete_task(task.id)
        .expect("complete")
        .successor
        .expect("monthly successor");
    assert_eq!(successor.due_date, Some(at(2024, 2, 29)));
    engine.create_note("landlord", None).expect("note");

    let reopened = JsonlStore::open(temp.path()).expect("reopen datastore");
    let tasks = reopened.load_tasks().expect("load tasks");
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().any(|t| t.id == task.id && t.completed));
    assert_eq!(reopened.load_notes().expect("load notes").len(), 1);
}

#[test]
fn tracing_init_tolerates_repeat_calls() {
    init_tracing(1, 0).expect("first init");
    init_tracing(0, 0).expect("second init");
}

#[test]
fn open_uses_configured_data_dir() {
    let temp = tempdir().expect("tempdir");
    let config = EngineConfig::from_toml_str(&format!(
        "timezone = \"Europe/Berlin\"\nreopen_status = \"in-progress\"\ndata_dir = \"{}\"\n",
        temp.path().join("store").display()
    ))
    .expect("parse config");

    let engine = Engine::open(config, StaticIdentity::signed_in("owner-a")).expect("open engine");
    let task = engine
        .create_task(TaskDraft::titled("call plumber"))
        .expect("create");
    engine.complete_task(task.id).expect("complete");
    let reopened = engine.reopen_task(task.id, None).expect("reopen");

    assert_eq!(reopened.status, Status::InProgress);
    assert_eq!(engine.config().timezone, chrono_tz::Europe::Berlin);
    assert!(temp.path().join("store").join("tasks.data").exists());
}
