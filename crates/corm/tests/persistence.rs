//! Integration tests for schema sync, save, find, delete and raw filters
//! against SQLite.

mod common;

use common::{open, open_with, post, user, Post, User};
use corm::{Config, Database, ErrorKind, SyncMode, Value};

// ── Save and Find ──────────────────────────────────────────────────────

#[test]
fn test_insert_writes_back_generated_key() {
    let mut db = open();
    let mut alice = user("Alice", 30, true);
    db.save(&mut alice).unwrap();
    assert_eq!(alice.id, 1);
    assert_eq!(db.last_insert_id().unwrap(), 1);

    let mut bob = user("Bob", 25, false);
    db.save(&mut bob).unwrap();
    assert_eq!(bob.id, 2);

    let found = db.find::<User>(2).unwrap().unwrap();
    assert_eq!(found.len(), 1);
    let row = &found[0];
    assert_eq!(row.id, 2);
    assert_eq!(row.name, "Bob");
    assert_eq!(row.email, "bob@example.com");
    assert_eq!(row.age, 25);
    assert!(!row.is_active);
    assert!(row.posts.is_empty());
    db.free_result(found);
}

#[test]
fn test_find_missing_is_none() {
    let mut db = open();
    assert!(db.find::<User>(42).unwrap().is_none());
    assert!(db.find_all::<User>().unwrap().is_none());
    assert!(db.last_error().is_none());
}

#[test]
fn test_save_existing_row_updates() {
    let mut db = open();
    let mut alice = user("Alice", 30, true);
    db.save(&mut alice).unwrap();

    alice.age = 31;
    alice.name = "Alice B".to_string();
    db.save(&mut alice).unwrap();
    // Saving unchanged data again leaves one row.
    db.save(&mut alice).unwrap();
    assert_eq!(alice.id, 1);

    let all = db.find_all::<User>().unwrap().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].age, 31);
    assert_eq!(all[0].name, "Alice B");
}

#[test]
fn test_nullable_column_round_trip() {
    let mut db = open();
    let mut alice = user("Alice", 30, true);
    db.save(&mut alice).unwrap();

    let mut draft = post("Draft", alice.id);
    let mut published = Post {
        body: Some("hello".to_string()),
        ..post("Published", alice.id)
    };
    db.save(&mut draft).unwrap();
    db.save(&mut published).unwrap();

    let posts = db.find_all::<Post>().unwrap().unwrap();
    assert_eq!(posts[0].body, None);
    assert_eq!(posts[1].body.as_deref(), Some("hello"));
    assert!(posts[0].author.is_none());
}

#[test]
fn test_validation_failure_writes_nothing() {
    let mut db = open();
    let mut bad = User {
        email: "not-an-email".to_string(),
        ..user("Mallory", 40, true)
    };
    let err = db.save(&mut bad).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.message, "email: must contain '@'");
    assert_eq!(db.last_error(), Some("email: must contain '@'"));
    assert_eq!(bad.id, 0);
    assert!(db.find_all::<User>().unwrap().is_none());
}

#[test]
fn test_unique_violation_is_exec_error() {
    let mut db = open();
    db.save(&mut user("Alice", 30, true)).unwrap();
    let err = db.save(&mut user("Alice", 31, true)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Exec);
    assert!(err.message.contains("UNIQUE"), "got: {}", err.message);
}

#[test]
fn test_unregistered_model_is_schema_error() {
    let mut db = Database::init(":memory:").unwrap();
    let err = db.save(&mut user("Alice", 30, true)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Schema);
}

// ── Delete ─────────────────────────────────────────────────────────────

#[test]
fn test_delete_then_find_is_none() {
    let mut db = open();
    let mut alice = user("Alice", 30, true);
    db.save(&mut alice).unwrap();

    db.delete::<User>(alice.id).unwrap();
    assert!(db.find::<User>(alice.id).unwrap().is_none());

    let err = db.delete::<User>(alice.id).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.message, "No row in 'User' with id = 1");
}

#[test]
fn test_delete_cascades_to_children() {
    let mut db = open();
    let mut alice = user("Alice", 30, true);
    db.save(&mut alice).unwrap();
    db.save(&mut post("First", alice.id)).unwrap();
    db.save(&mut post("Second", alice.id)).unwrap();

    db.delete::<User>(alice.id).unwrap();
    assert!(db.find_all::<Post>().unwrap().is_none());
}

#[test]
fn test_foreign_key_enforced_by_default() {
    let mut db = open();
    let err = db.save(&mut post("Orphan", 99)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Exec);

    let mut relaxed = open_with(Config {
        foreign_keys: false,
        ..Config::default()
    });
    relaxed.save(&mut post("Orphan", 99)).unwrap();
}

// ── Raw Filters ────────────────────────────────────────────────────────

#[test]
fn test_where_raw_binds_in_order() {
    let mut db = open();
    for (name, age) in [("Ann", 20), ("Ben", 35), ("Cid", 50)] {
        db.save(&mut user(name, age, true)).unwrap();
    }

    let found = db
        .where_raw::<User>("age >= ? AND name <> ?", &[Value::Int(30), Value::from("Cid")])
        .unwrap()
        .unwrap();
    let names: Vec<&str> = found.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Ben"]);

    let none = db.where_raw::<User>("age > ?", &[Value::Int(100)]).unwrap();
    assert!(none.is_none());
}

#[test]
fn test_where_raw_quoted_marker_is_literal() {
    let mut db = open();
    let mut odd = User {
        name: "who?".to_string(),
        ..user("Odd", 20, true)
    };
    db.save(&mut odd).unwrap();

    let found = db
        .where_raw::<User>("name = 'who?' AND age = ?", &[Value::Int(20)])
        .unwrap()
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_where_raw_bad_sql_is_prepare_error() {
    let mut db = open();
    let err = db.where_raw::<User>("age >>> ?", &[Value::Int(1)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Prepare);
    assert!(db.last_error().is_some());
}

// ── Sync and Transactions ──────────────────────────────────────────────

#[test]
fn test_drop_sync_recreates_empty_tables() {
    let mut db = open();
    let mut alice = user("Alice", 30, true);
    db.save(&mut alice).unwrap();
    db.save(&mut post("First", alice.id)).unwrap();

    db.sync(SyncMode::Drop).unwrap();
    assert!(db.find_all::<User>().unwrap().is_none());
    assert!(db.find_all::<Post>().unwrap().is_none());

    // Foreign keys are enforced again afterwards.
    assert!(db.save(&mut post("Orphan", 7)).is_err());
}

#[test]
fn test_migrate_sync_is_unsupported() {
    let mut db = open();
    let err = db.sync(SyncMode::Migrate).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
}

#[test]
fn test_rollback_discards_writes() {
    let mut db = open();
    db.begin().unwrap();
    db.save(&mut user("Alice", 30, true)).unwrap();
    db.rollback().unwrap();
    assert!(db.find_all::<User>().unwrap().is_none());

    db.begin().unwrap();
    db.save(&mut user("Bob", 30, true)).unwrap();
    db.commit().unwrap();
    assert_eq!(db.find_all::<User>().unwrap().unwrap().len(), 1);
}

#[test]
fn test_file_database_persists_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let path = path.to_str().unwrap();

    {
        let mut db = Database::init(path).unwrap();
        db.register::<User>().unwrap();
        db.register::<Post>().unwrap();
        db.sync(SyncMode::Safe).unwrap();
        db.save(&mut user("Alice", 30, true)).unwrap();
        db.close();
    }

    let mut db = Database::init(path).unwrap();
    db.register::<User>().unwrap();
    db.register::<Post>().unwrap();
    db.sync(SyncMode::Safe).unwrap();
    let found = db.find::<User>(1).unwrap().unwrap();
    assert_eq!(found[0].name, "Alice");
}

#[test]
fn test_config_file_drives_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corm.toml");
    std::fs::write(&path, "max_models = 1\nforeign_keys = false\n").unwrap();
    let config = Config::from_file(&path).unwrap();

    let mut db = Database::init_with_config(":memory:", config).unwrap();
    db.register::<User>().unwrap();
    let err = db.register::<Post>().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Capacity);
}
