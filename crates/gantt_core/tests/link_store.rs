use gantt_core::db::open_db_in_memory;
use gantt_core::{
    LinkRepository, LinkType, LinkUpdate, LinkValidationError, RepoError, SqliteLinkRepository,
    SqliteTaskRepository, TaskId, TaskRepository, TaskUpdate, ROOT_TASK_ID,
};
use rusqlite::Connection;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn add_tasks(conn: &Connection, count: usize) -> Vec<TaskId> {
    let repo = SqliteTaskRepository::try_new(conn).unwrap();
    (0..count)
        .map(|index| {
            repo.add_task(&TaskUpdate {
                text: Some(format!("Task {index}")),
                parent: Some(ROOT_TASK_ID),
                ..TaskUpdate::default()
            })
            .unwrap()
        })
        .collect()
}

#[test]
fn add_and_get_round_trip() {
    let conn = setup();
    let ids = add_tasks(&conn, 2);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let link_id = repo
        .add_link(&LinkUpdate::new(ids[0], ids[1], LinkType::StartToFinish))
        .unwrap();

    let link = repo.get_link(link_id).unwrap().unwrap();
    assert_eq!(link.source, ids[0]);
    assert_eq!(link.target, ids[1]);
    assert_eq!(link.kind, LinkType::StartToFinish);
}

#[test]
fn add_defaults_to_finish_to_start() {
    let conn = setup();
    let ids = add_tasks(&conn, 2);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let link_id = repo
        .add_link(&LinkUpdate {
            source: Some(ids[0]),
            target: Some(ids[1]),
            kind: None,
        })
        .unwrap();
    assert_eq!(
        repo.get_link(link_id).unwrap().unwrap().kind,
        LinkType::FinishToStart
    );
}

#[test]
fn add_rejects_missing_endpoint() {
    let conn = setup();
    let ids = add_tasks(&conn, 1);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let err = repo
        .add_link(&LinkUpdate::new(ids[0], 999, LinkType::FinishToStart))
        .unwrap_err();
    assert!(matches!(err, RepoError::MissingEndpoint(999)));
    assert!(repo.list_links().unwrap().is_empty());
}

#[test]
fn add_rejects_self_link_and_absent_endpoints() {
    let conn = setup();
    let ids = add_tasks(&conn, 1);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let err = repo
        .add_link(&LinkUpdate::new(ids[0], ids[0], LinkType::FinishToStart))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::LinkValidation(LinkValidationError::SelfLink(_))
    ));

    let err = repo
        .add_link(&LinkUpdate {
            source: Some(ids[0]),
            ..LinkUpdate::default()
        })
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::LinkValidation(LinkValidationError::MissingTarget)
    ));
}

#[test]
fn update_merges_supplied_fields() {
    let conn = setup();
    let ids = add_tasks(&conn, 3);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let link_id = repo
        .add_link(&LinkUpdate::new(ids[0], ids[1], LinkType::FinishToStart))
        .unwrap();

    repo.update_link(
        link_id,
        &LinkUpdate {
            target: Some(ids[2]),
            ..LinkUpdate::default()
        },
    )
    .unwrap();
    let link = repo.get_link(link_id).unwrap().unwrap();
    assert_eq!((link.source, link.target), (ids[0], ids[2]));
    assert_eq!(link.kind, LinkType::FinishToStart);

    repo.update_link(
        link_id,
        &LinkUpdate {
            kind: Some(LinkType::FinishToFinish),
            ..LinkUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(
        repo.get_link(link_id).unwrap().unwrap().kind,
        LinkType::FinishToFinish
    );
}

#[test]
fn update_rejects_collapsing_into_self_link() {
    let conn = setup();
    let ids = add_tasks(&conn, 2);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let link_id = repo
        .add_link(&LinkUpdate::new(ids[0], ids[1], LinkType::FinishToStart))
        .unwrap();
    let err = repo
        .update_link(
            link_id,
            &LinkUpdate {
                target: Some(ids[0]),
                ..LinkUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::LinkValidation(_)));

    let link = repo.get_link(link_id).unwrap().unwrap();
    assert_eq!(link.target, ids[1]);
}

#[test]
fn update_and_delete_missing_link_return_not_found() {
    let conn = setup();
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let err = repo
        .update_link(
            8,
            &LinkUpdate {
                kind: Some(LinkType::StartToStart),
                ..LinkUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::LinkNotFound(8)));

    let err = repo.delete_link(8).unwrap_err();
    assert!(matches!(err, RepoError::LinkNotFound(8)));
}

#[test]
fn delete_removes_only_that_link() {
    let conn = setup();
    let ids = add_tasks(&conn, 3);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let first = repo
        .add_link(&LinkUpdate::new(ids[0], ids[1], LinkType::FinishToStart))
        .unwrap();
    let second = repo
        .add_link(&LinkUpdate::new(ids[1], ids[2], LinkType::FinishToStart))
        .unwrap();

    repo.delete_link(first).unwrap();
    let remaining: Vec<_> = repo.list_links().unwrap().iter().map(|l| l.id).collect();
    assert_eq!(remaining, vec![second]);
}

#[test]
fn list_links_touching_matches_either_endpoint() {
    let conn = setup();
    let ids = add_tasks(&conn, 4);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let outgoing = repo
        .add_link(&LinkUpdate::new(ids[0], ids[1], LinkType::FinishToStart))
        .unwrap();
    let incoming = repo
        .add_link(&LinkUpdate::new(ids[2], ids[0], LinkType::StartToStart))
        .unwrap();
    repo.add_link(&LinkUpdate::new(ids[2], ids[3], LinkType::FinishToStart))
        .unwrap();

    let touching: Vec<_> = repo
        .list_links_touching(&[ids[0]])
        .unwrap()
        .iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(touching, vec![outgoing, incoming]);

    assert!(repo.list_links_touching(&[]).unwrap().is_empty());
}

#[test]
fn list_links_touching_accepts_more_ids_than_one_statement_can_bind() {
    let conn = setup();
    let ids = add_tasks(&conn, 3);
    let repo = SqliteLinkRepository::try_new(&conn).unwrap();

    let spanning = repo
        .add_link(&LinkUpdate::new(ids[0], ids[1], LinkType::FinishToStart))
        .unwrap();
    let external = repo
        .add_link(&LinkUpdate::new(ids[2], ids[1], LinkType::FinishToFinish))
        .unwrap();

    // Both endpoints of `spanning` sit in different query batches.
    let mut many: Vec<TaskId> = vec![ids[0]];
    many.extend(100_000..120_000);
    many.push(ids[1]);

    let touching: Vec<_> = repo
        .list_links_touching(&many)
        .unwrap()
        .iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(touching, vec![spanning, external]);
}
