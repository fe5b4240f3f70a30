//! 门面接口测试
//! 基于内存远端存储验证数据库/数据表/记录的完整流程

use rat_bitabledb::adapter::ListRecordsRequest;
use rat_bitabledb::{
    BitableConfig, BitableDb, BitableDbError, ClientConfig, DataValue, DbOperations, Field,
    FieldType, MemoryStore, Record, RemoteStore, SearchCmd, Table, get_id, get_int, get_string,
};
use std::collections::HashSet;
use std::sync::Arc;

const DB: &str = "test-database";
const TABLE: &str = "test-table";

async fn setup() -> (Arc<MemoryStore>, BitableDb) {
    let store = Arc::new(MemoryStore::new());
    let db = BitableDb::new(store.clone()).await.expect("初始化失败");
    (store, db)
}

fn users_table() -> Table {
    Table::new(TABLE, vec![Field::string("username"), Field::int("age")])
}

fn user(name: &str, age: i64) -> Record {
    Record::from([
        ("username".to_string(), DataValue::from(name)),
        ("age".to_string(), DataValue::from(age)),
    ])
}

async fn remote_field_names(store: &MemoryStore, db: &BitableDb, table_id: &str) -> Vec<String> {
    let app = db.resolve_database(DB).await.unwrap().unwrap();
    store
        .list_fields(&app, table_id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.field_name)
        .collect()
}

#[tokio::test]
async fn test_save_database_is_idempotent() {
    let (store, db) = setup().await;

    let first = db.save_database(DB).await.unwrap();
    let second = db.save_database(DB).await.unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(store.call_count("create_container"), 1);

    // 新实例缓存为空，应在远端找到已有数据库而不是重复创建
    let other = BitableDb::new(store.clone()).await.unwrap();
    assert_eq!(other.save_database(DB).await.unwrap(), first);
    assert_eq!(store.call_count("create_container"), 1);
}

#[tokio::test]
async fn test_empty_database_name_rejected() {
    let (store, db) = setup().await;
    let err = db.save_database("  ").await.unwrap_err();
    assert!(matches!(err, BitableDbError::ValidationError { .. }));
    assert_eq!(store.call_count("create_container"), 0);
}

#[tokio::test]
async fn test_schema_convergence() {
    let (store, db) = setup().await;

    let report = db.save_table_with_report(DB, &users_table()).await.unwrap();
    assert!(report.table_created);
    assert!(report.identifier_normalized);
    assert!(report.is_converged());
    assert_eq!(
        remote_field_names(&store, &db, &report.table_id).await,
        vec!["id", "username", "age"]
    );

    let widened = Table::new(
        TABLE,
        vec![Field::string("username"), Field::string("passport"), Field::int("age")],
    );
    let second = db.save_table_with_report(DB, &widened).await.unwrap();
    assert_eq!(second.table_id, report.table_id);
    assert!(!second.table_created);
    assert_eq!(second.created, vec!["passport".to_string()]);
    assert!(second.updated.is_empty());
    assert!(second.deleted.is_empty());

    let names = remote_field_names(&store, &db, &report.table_id).await;
    let unique: HashSet<String> = names.iter().cloned().collect();
    let expected: HashSet<String> = ["id", "username", "passport", "age"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(names.len(), unique.len());
    assert_eq!(names[0], "id");
    assert_eq!(unique, expected);
}

#[tokio::test]
async fn test_schema_update_and_delete_fields() {
    let (store, db) = setup().await;
    let table_id = db.save_table(DB, &users_table()).await.unwrap();

    let narrowed = Table::new(TABLE, vec![Field::string("age")]);
    let report = db.save_table_with_report(DB, &narrowed).await.unwrap();
    assert_eq!(report.table_id, table_id);
    assert_eq!(report.updated, vec!["age".to_string()]);
    assert_eq!(report.deleted, vec!["username".to_string()]);

    let app = db.resolve_database(DB).await.unwrap().unwrap();
    let fields = store.list_fields(&app, &table_id).await.unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[1].field_name, "age");
    assert_eq!(fields[1].field_type, FieldType::String.code());

    // 再次对齐不应产生任何字段调用
    store.reset_calls();
    let report = db.save_table_with_report(DB, &narrowed).await.unwrap();
    assert_eq!(report.unchanged, vec!["age".to_string()]);
    assert_eq!(store.call_count("create_field"), 0);
    assert_eq!(store.call_count("update_field"), 0);
    assert_eq!(store.call_count("delete_field"), 0);
}

#[tokio::test]
async fn test_partial_reconciliation_is_reported() {
    let (store, db) = setup().await;
    store.fail_on("create_field");

    let report = db.save_table_with_report(DB, &users_table()).await.unwrap();
    assert!(!report.is_converged());
    assert!(report.identifier_normalized);
    assert_eq!(report.failures.len(), 2);
    assert!(report.created.is_empty());

    store.clear_failures();
    let report = db.save_table_with_report(DB, &users_table()).await.unwrap();
    assert!(report.is_converged());
    assert_eq!(report.created, vec!["username".to_string(), "age".to_string()]);
}

#[tokio::test]
async fn test_table_creation_failure_is_fatal() {
    let (store, db) = setup().await;
    store.fail_on("create_table");
    let err = db.save_table(DB, &users_table()).await.unwrap_err();
    assert!(matches!(err, BitableDbError::RemoteError { .. }));
}

#[tokio::test]
async fn test_identifier_stamping_round_trip() {
    let (store, db) = setup().await;
    db.save_table(DB, &users_table()).await.unwrap();

    let id = db.create(DB, TABLE, user("zhangsan", 12)).await.unwrap();
    assert!(!id.is_empty());

    let records = db.read(DB, TABLE, &[]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(get_id(&records[0]), id);
    assert_eq!(get_string(&records[0], "username"), "zhangsan");

    // 远端的 id 字段已回填为记录 ID
    let app = db.resolve_database(DB).await.unwrap().unwrap();
    let table_id = db.resolve_table(DB, TABLE).await.unwrap().unwrap();
    let page = store
        .list_records(
            &app,
            &table_id,
            &ListRecordsRequest {
                filter: String::new(),
                page_size: 10,
                page_token: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.items[0].fields.get("id"), Some(&DataValue::from(id.as_str())));

    db.update(DB, TABLE, &id, user("zhangsan13", 13)).await.unwrap();
    let records = db.read(DB, TABLE, &[SearchCmd::eq("age", 13)]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(get_id(&records[0]), id);
    assert_eq!(get_string(&records[0], "username"), "zhangsan13");
    assert_eq!(get_int(&records[0], "age"), 13);
    assert!(db.read(DB, TABLE, &[SearchCmd::eq("age", 12)]).await.unwrap().is_empty());

    db.delete(DB, TABLE, &id).await.unwrap();
    assert!(db.read(DB, TABLE, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_with_multiple_conditions() {
    let (_store, db) = setup().await;
    db.save_table(DB, &users_table()).await.unwrap();
    for (name, age) in [("a", 9), ("a", 11), ("b", 20)] {
        db.create(DB, TABLE, user(name, age)).await.unwrap();
    }

    let records = db
        .read(DB, TABLE, &[SearchCmd::new("age", ">", 10), SearchCmd::eq("username", "a")])
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(get_int(&records[0], "age"), 11);
}

#[tokio::test]
async fn test_read_follows_pagination() {
    let store = Arc::new(MemoryStore::new());
    let db = BitableDb::with_config(store.clone(), &ClientConfig { page_size: 2 })
        .await
        .unwrap();
    db.save_table(DB, &users_table()).await.unwrap();
    for age in 0..5 {
        db.create(DB, TABLE, user("u", age)).await.unwrap();
    }

    store.reset_calls();
    let records = db.read(DB, TABLE, &[]).await.unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(store.call_count("list_records"), 3);
}

#[tokio::test]
async fn test_unknown_names_fail_without_extra_calls() {
    let (store, db) = setup().await;

    store.reset_calls();
    let err = db.drop_table("never-saved", TABLE).await.unwrap_err();
    assert!(matches!(err, BitableDbError::DatabaseNotFound { .. }));
    assert!(err.is_not_found());
    assert_eq!(store.total_calls(), store.call_count("list_files"));

    db.save_database(DB).await.unwrap();
    store.reset_calls();
    let err = db.drop_table(DB, "missing").await.unwrap_err();
    assert!(matches!(err, BitableDbError::TableNotFound { .. }));
    assert_eq!(store.total_calls(), store.call_count("list_tables"));

    assert!(db.create(DB, "missing", user("a", 1)).await.unwrap_err().is_not_found());
    assert!(db.read(DB, "missing", &[]).await.unwrap_err().is_not_found());
    assert!(db.update(DB, "missing", "rec", user("a", 1)).await.unwrap_err().is_not_found());
    assert!(db.delete(DB, "missing", "rec").await.unwrap_err().is_not_found());
    assert!(db.list_tables("never-saved").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_list_and_drop_tables() {
    let (_store, db) = setup().await;
    db.save_table(DB, &users_table()).await.unwrap();
    db.save_table(DB, &Table::new("orders", vec![Field::int("amount")]))
        .await
        .unwrap();

    let mut tables = db.list_tables(DB).await.unwrap();
    tables.sort();
    assert_eq!(tables, vec!["orders".to_string(), TABLE.to_string()]);

    db.drop_table(DB, "orders").await.unwrap();
    assert_eq!(db.list_tables(DB).await.unwrap(), vec![TABLE.to_string()]);
    assert_eq!(db.resolve_table(DB, "orders").await.unwrap(), None);

    let err = db.drop_table(DB, "orders").await.unwrap_err();
    assert!(matches!(err, BitableDbError::TableNotFound { .. }));
}

#[tokio::test]
async fn test_field_lookup_failure_skips_stamping() {
    let (store, db) = setup().await;
    db.save_table(DB, &users_table()).await.unwrap();

    store.fail_on("list_fields");
    store.reset_calls();
    let id = db.create(DB, TABLE, user("lisi", 30)).await.unwrap();
    assert_eq!(store.call_count("update_record"), 0);
    store.clear_failures();

    let repaired = db.repair_id_stamps(DB, TABLE).await.unwrap();
    assert_eq!(repaired, 1);
    assert_eq!(db.repair_id_stamps(DB, TABLE).await.unwrap(), 0);

    let records = db.read(DB, TABLE, &[SearchCmd::eq("id", id.as_str())]).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_stamp_failure_keeps_record() {
    let (store, db) = setup().await;
    db.save_table(DB, &users_table()).await.unwrap();

    store.fail_on("update_record");
    let id = db.create(DB, TABLE, user("wangwu", 40)).await.unwrap();
    store.clear_failures();

    assert!(db.read(DB, TABLE, &[SearchCmd::eq("id", id.as_str())]).await.unwrap().is_empty());
    assert_eq!(db.repair_id_stamps(DB, TABLE).await.unwrap(), 1);
    assert_eq!(
        db.read(DB, TABLE, &[SearchCmd::eq("id", id.as_str())]).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_remote_failure_surfaces_on_create() {
    let (store, db) = setup().await;
    db.save_table(DB, &users_table()).await.unwrap();
    store.fail_on("create_record");
    let err = db.create(DB, TABLE, user("a", 1)).await.unwrap_err();
    assert!(matches!(err, BitableDbError::RemoteError { .. }));
}

#[tokio::test]
async fn test_root_lookup_failure_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    store.fail_on("root_folder");
    let err = BitableDb::new(store.clone()).await.unwrap_err();
    assert!(matches!(err, BitableDbError::RemoteError { .. }));
}

#[tokio::test]
async fn test_save_schema_from_config() {
    let config = BitableConfig::from_toml_str(
        r#"
[app]
app_id = "cli_test"
app_secret = "secret"

[[databases]]
name = "crm"

[[databases.tables]]
name = "users"
fields = [{ name = "username", type = "String" }]

[[databases.tables]]
name = "orders"
fields = [{ name = "amount", type = "Int" }, { name = "note", type = "String" }]
"#,
    )
    .unwrap();

    let (_store, db) = setup().await;
    let report = db.save_schema(&config.databases[0]).await.unwrap();
    assert_eq!(report.tables.len(), 2);
    assert!(report.tables.iter().all(|t| t.table_created && t.is_converged()));
    assert_eq!(db.resolve_database("crm").await.unwrap(), Some(report.database_id));

    let mut tables = db.list_tables("crm").await.unwrap();
    tables.sort();
    assert_eq!(tables, vec!["orders".to_string(), "users".to_string()]);
}
