use std::collections::HashSet;

use shared::domain::FileId;

use super::*;

fn named(name: &str) -> FileDescriptor {
    FileDescriptor {
        name: Some(name.to_string()),
        ..FileDescriptor::default()
    }
}

#[test]
fn fills_missing_bookkeeping_fields() {
    let records = reconcile(
        vec![
            named("a.png"),
            FileDescriptor {
                status: Some(UploadStatus::Error),
                ..named("b.png")
            },
            FileDescriptor {
                status: Some(UploadStatus::Uploading),
                percent: Some(0.25),
                ..named("c.png")
            },
        ],
        &IdGenerator,
    );

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].status, UploadStatus::Done);
    assert_eq!(records[0].percent, 1.0);
    assert_eq!(records[1].status, UploadStatus::Error);
    assert_eq!(records[1].percent, 0.0);
    assert_eq!(records[2].status, UploadStatus::Uploading);
    assert_eq!(records[2].percent, 0.25);

    let names: Vec<_> = records.iter().filter_map(|r| r.name.as_deref()).collect();
    assert_eq!(names, ["a.png", "b.png", "c.png"]);
}

#[test]
fn every_record_gets_a_unique_non_empty_id() {
    let records = reconcile(
        vec![
            named("a"),
            FileDescriptor {
                id: Some(FileId::from("fixed")),
                ..named("b")
            },
            FileDescriptor {
                id: Some(FileId::from("")),
                ..named("c")
            },
            named("d"),
        ],
        &IdGenerator,
    );

    let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), 4);
    assert!(records.iter().all(|r| !r.id.as_str().is_empty()));
    assert_eq!(records[1].id, FileId::from("fixed"));
}

#[test]
fn duplicate_supplied_ids_do_not_collide() {
    let records = reconcile(
        vec![
            FileDescriptor {
                id: Some(FileId::from("same")),
                ..named("a")
            },
            FileDescriptor {
                id: Some(FileId::from("same")),
                ..named("b")
            },
        ],
        &IdGenerator,
    );

    assert_eq!(records[0].id, FileId::from("same"));
    assert_ne!(records[1].id, FileId::from("same"));
}

#[test]
fn supplied_ids_are_stable_across_reconciliations() {
    let first = reconcile(
        vec![FileDescriptor {
            id: Some(FileId::from("keep")),
            ..named("a")
        }],
        &IdGenerator,
    );
    let second = reconcile(
        first.iter().cloned().map(FileDescriptor::from).collect(),
        &IdGenerator,
    );
    assert_eq!(first, second);
}

#[test]
fn missing_ids_are_minted_again_on_each_pass() {
    let input = vec![named("a"), named("b")];
    let first = reconcile(input.clone(), &IdGenerator);
    let second = reconcile(input, &IdGenerator);

    for (a, b) in first.iter().zip(&second) {
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, b.status);
        assert_eq!(a.percent, b.percent);
        assert_eq!(a.name, b.name);
    }
}
