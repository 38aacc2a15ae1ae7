//! JSON command documents

mod support;

use serde_json::json;
use support::{cache, store};
use tablegate::{run_command, ErrorCode, MetadataObjId, PermKind};

#[test]
fn test_create_and_drop() {
    let (_dir, store) = store();
    let mut cache = cache();

    let reply = run_command(
        &store,
        &mut cache,
        json!({
            "type": "create_select_permission",
            "args": {
                "table": "articles",
                "role": "user",
                "permission": {"columns": ["title", "body"], "filter": {"author_id": {"_eq": "X-Hasura-User-Id"}}},
                "comment": "readers"
            }
        }),
    )
    .unwrap();
    assert_eq!(reply, json!({"message": "success"}));

    let id = MetadataObjId::new("default", "articles", "user", PermKind::Select);
    assert_eq!(store.get(&id).unwrap().unwrap().comment.as_deref(), Some("readers"));
    assert!(cache.descriptor(&id).is_some());

    let reply = run_command(
        &store,
        &mut cache,
        json!({"type": "pg_drop_select_permission", "args": {"source": "default", "table": "articles", "role": "user"}}),
    )
    .unwrap();
    assert_eq!(reply, json!({"message": "success"}));
    assert!(store.get(&id).unwrap().is_none());
}

#[test]
fn test_inconsistent_objects_reported() {
    let (_dir, store) = store();
    let mut cache = cache();

    let reply = run_command(
        &store,
        &mut cache,
        json!({
            "type": "create_select_permission",
            "args": {"table": "articles", "role": "user", "permission": {"columns": "*", "limit": -1}}
        }),
    )
    .unwrap();
    assert_eq!(reply["message"], "success");
    let objects = reply["inconsistent_objects"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["code"], "invalid-limit");
    assert_eq!(objects[0]["path"], "permission.limit");
    assert_eq!(objects[0]["id"]["kind"], "select");
}

#[test]
fn test_errors() {
    let (_dir, store) = store();
    let mut cache = cache();
    let create = json!({
        "type": "create_delete_permission",
        "args": {"table": {"schema": "public", "name": "articles"}, "role": "user", "permission": {"filter": {}}}
    });

    run_command(&store, &mut cache, create.clone()).unwrap();
    let e = run_command(&store, &mut cache, create).unwrap_err();
    assert_eq!(e.code(), ErrorCode::AlreadyExists);
    assert_eq!(e.status_code(), 409);

    let e = run_command(&store, &mut cache, json!({"type": "create_upsert_permission", "args": {}})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::InvalidCommand);

    let e = run_command(
        &store,
        &mut cache,
        json!({"type": "drop_delete_permission", "args": {"table": "articles", "role": "user", "cascade": true}}),
    )
    .unwrap_err();
    assert_eq!(e.code(), ErrorCode::InvalidCommand);
    assert_eq!(e.path().as_deref(), Some("args"));

    let e = run_command(
        &store,
        &mut cache,
        json!({
            "type": "create_select_permission",
            "args": {"table": "articles", "role": "user", "permission": {"columns": "*", "limits": 5}}
        }),
    )
    .unwrap_err();
    assert_eq!(e.code(), ErrorCode::InvalidCommand);
    assert_eq!(e.path().as_deref(), Some("permission"));

    let e = run_command(
        &store,
        &mut cache,
        json!({"type": "drop_select_permission", "args": {"table": "articles", "role": "user"}}),
    )
    .unwrap_err();
    assert_eq!(e.code(), ErrorCode::NotDefined);
}

#[test]
fn test_set_permission_comment() {
    let (_dir, store) = store();
    let mut cache = cache();
    run_command(
        &store,
        &mut cache,
        json!({
            "type": "create_insert_permission",
            "args": {"table": "drafts", "role": "writer", "permission": {"set": {"author_id": "X-Hasura-User-Id"}}}
        }),
    )
    .unwrap();

    run_command(
        &store,
        &mut cache,
        json!({
            "type": "set_permission_comment",
            "args": {"table": "drafts", "role": "writer", "permission": "insert", "comment": "authors only"}
        }),
    )
    .unwrap();
    let id = MetadataObjId::new("default", "drafts", "writer", PermKind::Insert);
    assert_eq!(store.get(&id).unwrap().unwrap().comment.as_deref(), Some("authors only"));

    // `type` is accepted for the kind as well
    run_command(
        &store,
        &mut cache,
        json!({"type": "set_permission_comment", "args": {"table": "drafts", "role": "writer", "type": "insert"}}),
    )
    .unwrap();
    assert_eq!(store.get(&id).unwrap().unwrap().comment, None);
}

#[test]
fn test_bulk_stops_at_first_error() {
    let (_dir, store) = store();
    let mut cache = cache();
    let delete = |role: &str| {
        json!({
            "type": "create_delete_permission",
            "args": {"table": "articles", "role": role, "permission": {}}
        })
    };

    let replies =
        run_command(&store, &mut cache, json!({"type": "bulk", "args": [delete("user"), delete("editor")]})).unwrap();
    assert_eq!(replies, json!([{"message": "success"}, {"message": "success"}]));

    let e = run_command(
        &store,
        &mut cache,
        json!({"type": "bulk", "args": [delete("anon"), delete("user"), delete("guest")]}),
    )
    .unwrap_err();
    assert_eq!(e.code(), ErrorCode::AlreadyExists);
    assert_eq!(e.path().as_deref(), Some("args[1]"));

    let roles: Vec<_> = store.list_permissions(None).unwrap().into_iter().map(|(id, _)| id.role).collect();
    assert_eq!(roles, vec!["user", "editor", "anon"]);
}

#[test]
fn test_track_commands() {
    let (_dir, store) = store();
    let mut cache = cache();
    run_command(&store, &mut cache, json!({"type": "track_table", "args": {"table": "authors"}})).unwrap();
    assert!(store.is_tracked("default", "authors").unwrap());
    run_command(&store, &mut cache, json!({"type": "pg_untrack_table", "args": {"table": "authors"}})).unwrap();
    assert!(!store.is_tracked("default", "authors").unwrap());
}
