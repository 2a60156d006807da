use gantt_core::db::open_db_in_memory;
use gantt_core::{
    LinkRepository, LinkType, LinkUpdate, RepoError, SqliteLinkRepository, SqliteTaskRepository,
    TaskId, TaskRepository, TaskType, TaskUpdate, TaskValidationError, ROOT_TASK_ID,
};
use rusqlite::Connection;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn add(repo: &SqliteTaskRepository<'_>, text: &str, parent: TaskId) -> TaskId {
    repo.add_task(&TaskUpdate {
        text: Some(text.to_string()),
        parent: Some(parent),
        ..TaskUpdate::default()
    })
    .unwrap()
}

#[test]
fn add_applies_defaults_and_assigns_ids() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let id = repo.add_task(&TaskUpdate::default()).unwrap();
    assert!(id > ROOT_TASK_ID);

    let task = repo.get_task(id).unwrap().unwrap();
    assert_eq!(task.text, "");
    assert_eq!(task.start_date, None);
    assert_eq!(task.duration, 0);
    assert_eq!(task.progress, 0);
    assert_eq!(task.parent, ROOT_TASK_ID);
    assert_eq!(task.order, 0);
    assert_eq!(task.kind, TaskType::Task);
    assert!(task.is_top_level());
}

#[test]
fn add_appends_after_last_sibling() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let parent = add(&repo, "Phase", ROOT_TASK_ID);
    let first = add(&repo, "First", parent);
    let second = add(&repo, "Second", parent);

    assert_eq!(repo.get_task(first).unwrap().unwrap().order, 0);
    assert_eq!(repo.get_task(second).unwrap().unwrap().order, 1);
    assert_eq!(repo.list_child_ids(parent).unwrap(), vec![first, second]);
}

#[test]
fn add_with_order_inserts_at_sibling_index() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let a = add(&repo, "A", ROOT_TASK_ID);
    let b = repo
        .add_task(&TaskUpdate {
            text: Some("B".to_string()),
            order: Some(0),
            ..TaskUpdate::default()
        })
        .unwrap();
    let c = repo
        .add_task(&TaskUpdate {
            text: Some("C".to_string()),
            order: Some(40),
            ..TaskUpdate::default()
        })
        .unwrap();
    let d = repo
        .add_task(&TaskUpdate {
            text: Some("D".to_string()),
            order: Some(1),
            ..TaskUpdate::default()
        })
        .unwrap();

    let placed: Vec<(TaskId, i64)> = repo
        .list_children(ROOT_TASK_ID)
        .unwrap()
        .iter()
        .map(|t| (t.id, t.order))
        .collect();
    assert_eq!(placed, vec![(b, 0), (d, 1), (a, 2), (c, 3)]);
}

#[test]
fn update_with_parent_or_order_keeps_both_lists_contiguous() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let left = add(&repo, "Left", ROOT_TASK_ID);
    let right = add(&repo, "Right", ROOT_TASK_ID);
    let x = add(&repo, "X", left);
    let y = add(&repo, "Y", left);
    let z = add(&repo, "Z", left);
    let r = add(&repo, "R", right);

    repo.update_task(
        x,
        &TaskUpdate {
            parent: Some(right),
            order: Some(0),
            ..TaskUpdate::default()
        },
    )
    .unwrap();
    repo.update_task(
        z,
        &TaskUpdate {
            order: Some(0),
            ..TaskUpdate::default()
        },
    )
    .unwrap();

    let left_ids: Vec<(TaskId, i64)> = repo
        .list_children(left)
        .unwrap()
        .iter()
        .map(|t| (t.id, t.order))
        .collect();
    let right_ids: Vec<(TaskId, i64)> = repo
        .list_children(right)
        .unwrap()
        .iter()
        .map(|t| (t.id, t.order))
        .collect();
    assert_eq!(left_ids, vec![(z, 0), (y, 1)]);
    assert_eq!(right_ids, vec![(x, 0), (r, 1)]);
}

#[test]
fn add_rejects_missing_parent() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let err = repo
        .add_task(&TaskUpdate {
            parent: Some(404),
            ..TaskUpdate::default()
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::ParentNotFound(404)));
    assert!(repo.list_tasks().unwrap().is_empty());
}

#[test]
fn add_rejects_invalid_fields() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let err = repo
        .add_task(&TaskUpdate {
            progress: Some(150),
            ..TaskUpdate::default()
        })
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::TaskValidation(TaskValidationError::ProgressOutOfRange(150))
    ));
}

#[test]
fn get_missing_task_returns_none() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();
    assert!(repo.get_task(77).unwrap().is_none());
}

#[test]
fn update_changes_only_supplied_fields() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let id = repo
        .add_task(&TaskUpdate {
            text: Some("Original Task".to_string()),
            start_date: Some("2024-05-01".to_string()),
            duration: Some(4),
            kind: Some(TaskType::Project),
            ..TaskUpdate::default()
        })
        .unwrap();

    repo.update_task(
        id,
        &TaskUpdate {
            text: Some("Updated Task".to_string()),
            progress: Some(45),
            ..TaskUpdate::default()
        },
    )
    .unwrap();

    let task = repo.get_task(id).unwrap().unwrap();
    assert_eq!(task.text, "Updated Task");
    assert_eq!(task.progress, 45);
    assert_eq!(task.start_date.as_deref(), Some("2024-05-01"));
    assert_eq!(task.duration, 4);
    assert_eq!(task.kind, TaskType::Project);
    assert_eq!(task.parent, ROOT_TASK_ID);
}

#[test]
fn update_missing_task_returns_not_found() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let err = repo
        .update_task(
            12,
            &TaskUpdate {
                text: Some("ghost".to_string()),
                ..TaskUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::TaskNotFound(12)));

    let err = repo.update_task(12, &TaskUpdate::default()).unwrap_err();
    assert!(matches!(err, RepoError::TaskNotFound(12)));
}

#[test]
fn list_is_ordered_by_parent_then_sibling_order() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let a = add(&repo, "A", ROOT_TASK_ID);
    let b = add(&repo, "B", ROOT_TASK_ID);
    let a1 = add(&repo, "A1", a);
    let b1 = add(&repo, "B1", b);
    let a2 = add(&repo, "A2", a);

    let ids: Vec<TaskId> = repo.list_tasks().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![a, b, a1, a2, b1]);
}

#[test]
fn subtree_is_pre_order_and_keeps_sibling_order() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let root = add(&repo, "Root", ROOT_TASK_ID);
    let first = add(&repo, "First", root);
    let second = add(&repo, "Second", root);
    let nested = add(&repo, "Nested", first);
    add(&repo, "Outside", ROOT_TASK_ID);

    let ids: Vec<TaskId> = repo.subtree(root).unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![root, first, nested, second]);

    let err = repo.subtree(999).unwrap_err();
    assert!(matches!(err, RepoError::TaskNotFound(999)));
}

#[test]
fn subtree_reports_parent_loops_instead_of_spinning() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let a = add(&repo, "A", ROOT_TASK_ID);
    let b = add(&repo, "B", a);
    conn.execute("UPDATE tasks SET parent = ?1 WHERE id = ?2;", [b, a])
        .unwrap();

    let err = repo.subtree(a).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn place_children_renumbers_contiguously() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let parent = add(&repo, "Parent", ROOT_TASK_ID);
    let a = add(&repo, "A", parent);
    let b = add(&repo, "B", parent);
    let c = add(&repo, "C", parent);

    repo.place_children(parent, &[c, a, b]).unwrap();

    let children = repo.list_children(parent).unwrap();
    let placed: Vec<(TaskId, i64)> = children.iter().map(|t| (t.id, t.order)).collect();
    assert_eq!(placed, vec![(c, 0), (a, 1), (b, 2)]);
}

#[test]
fn delete_cascades_to_descendants_and_links() {
    let conn = setup();
    let tasks = SqliteTaskRepository::try_new(&conn).unwrap();
    let links = SqliteLinkRepository::try_new(&conn).unwrap();

    let root = add(&tasks, "Root", ROOT_TASK_ID);
    let child = add(&tasks, "Child", root);
    let grandchild = add(&tasks, "Grandchild", child);
    let outside = add(&tasks, "Outside", ROOT_TASK_ID);
    let other = add(&tasks, "Other", ROOT_TASK_ID);

    links
        .add_link(&LinkUpdate::new(grandchild, outside, LinkType::FinishToStart))
        .unwrap();
    links
        .add_link(&LinkUpdate::new(outside, root, LinkType::StartToStart))
        .unwrap();
    let kept = links
        .add_link(&LinkUpdate::new(outside, other, LinkType::FinishToFinish))
        .unwrap();

    let removed = tasks.delete_task(root).unwrap();
    assert_eq!(removed, vec![root, child, grandchild]);

    for id in [root, child, grandchild] {
        assert!(tasks.get_task(id).unwrap().is_none());
    }
    assert!(tasks.get_task(outside).unwrap().is_some());

    let remaining: Vec<_> = links.list_links().unwrap().iter().map(|l| l.id).collect();
    assert_eq!(remaining, vec![kept]);
}

#[test]
fn delete_missing_task_returns_not_found() {
    let conn = setup();
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();
    let err = repo.delete_task(5).unwrap_err();
    assert!(matches!(err, RepoError::TaskNotFound(5)));
}
