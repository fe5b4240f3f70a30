//! 内存远端存储
//!
//! 在进程内模拟多维表格服务的可观察行为：新建数据表自带一个默认文本字段、
//! 主字段不可删除、按公式语法过滤记录、分页返回结果。
//! 用于测试和离线场景，同时记录每种操作的调用次数，并支持注入失败。

use super::*;
use crate::bitable_error;
use crate::types::DataValue;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rat_logger::debug;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// 新建数据表时自动生成的默认字段名
pub const DEFAULT_FIELD_NAME: &str = "多行文本";

/// 文件夹列表的分页大小
const FILE_PAGE_SIZE: usize = 200;

static CLAUSE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^CurrentValue\.\[([^\]]+)\](>=|<=|!=|=|>|<)(.+)$").expect("过滤条件正则表达式无效")
});

#[derive(Debug, Default)]
struct TableState {
    table_id: String,
    name: String,
    fields: Vec<RemoteField>,
    records: Vec<RemoteRecord>,
}

#[derive(Debug)]
struct MemoryState {
    root: RootFolder,
    files: Vec<DriveFile>,
    apps: HashMap<String, Vec<TableState>>,
}

/// 内存远端存储
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// 操作名 -> 调用次数
    calls: DashMap<String, usize>,
    /// 需要注入失败的操作名
    failures: Mutex<HashSet<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                root: RootFolder {
                    token: new_id("fldcn"),
                    user_id: new_id("ou_"),
                },
                files: Vec::new(),
                apps: HashMap::new(),
            }),
            calls: DashMap::new(),
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// 根文件夹 token
    pub fn root_token(&self) -> String {
        self.state.lock().root.token.clone()
    }

    /// 在指定文件夹下放置一个任意类型的文件，不计入调用次数
    pub fn put_file(&self, name: &str, parent_token: &str, file_type: &str) -> String {
        let token = new_id("bas");
        let mut state = self.state.lock();
        state.files.push(DriveFile {
            name: name.to_string(),
            parent_token: parent_token.to_string(),
            token: token.clone(),
            file_type: file_type.to_string(),
        });
        if file_type == BITABLE_FILE_TYPE {
            state.apps.insert(token.clone(), Vec::new());
        }
        token
    }

    /// 让指定操作在后续调用中失败
    pub fn fail_on(&self, operation: &str) {
        self.failures.lock().insert(operation.to_string());
    }

    /// 清除所有注入的失败
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// 指定操作的调用次数
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.get(operation).map(|c| *c).unwrap_or(0)
    }

    /// 所有操作的调用总次数
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    /// 清零调用计数
    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    fn enter(&self, operation: &str) -> BitableDbResult<()> {
        *self.calls.entry(operation.to_string()).or_insert(0) += 1;
        if self.failures.lock().contains(operation) {
            debug!("注入失败: {}", operation);
            return Err(bitable_error!(remote, operation, "注入的模拟失败"));
        }
        Ok(())
    }
}

fn new_id(prefix: &str) -> String {
    format!("{}{}", prefix, &Uuid::new_v4().simple().to_string()[..14])
}

fn tables_mut<'a>(
    state: &'a mut MemoryState,
    operation: &str,
    app_token: &str,
) -> BitableDbResult<&'a mut Vec<TableState>> {
    state
        .apps
        .get_mut(app_token)
        .ok_or_else(|| bitable_error!(remote, operation, format!("多维表格 {} 不存在", app_token)))
}

fn table_mut<'a>(
    state: &'a mut MemoryState,
    operation: &str,
    app_token: &str,
    table_id: &str,
) -> BitableDbResult<&'a mut TableState> {
    tables_mut(state, operation, app_token)?
        .iter_mut()
        .find(|t| t.table_id == table_id)
        .ok_or_else(|| bitable_error!(remote, operation, format!("数据表 {} 不存在", table_id)))
}

/// 校验写入的字段名都存在且取值与字段类型兼容
fn check_fields(operation: &str, table: &TableState, fields: &Record) -> BitableDbResult<()> {
    for (name, value) in fields {
        let field = table
            .fields
            .iter()
            .find(|f| &f.field_name == name)
            .ok_or_else(|| bitable_error!(remote, operation, format!("FieldNameNotFound: {}", name)))?;
        let compatible = match FieldType::from_code(field.field_type) {
            Some(FieldType::String) => matches!(value, DataValue::String(_) | DataValue::Null),
            Some(FieldType::Int) => {
                matches!(value, DataValue::Int(_) | DataValue::Float(_) | DataValue::Null)
            }
            None => true,
        };
        if !compatible {
            return Err(bitable_error!(
                remote,
                operation,
                format!("字段 {} 的取值类型 {} 与字段类型不符", name, value.type_name())
            ));
        }
    }
    Ok(())
}

/// 单个过滤条件
#[derive(Debug)]
struct Clause {
    key: String,
    operator: String,
    value: DataValue,
}

/// 解析 `AND(clause,clause,...)` 形式的过滤表达式
fn parse_filter(filter: &str) -> BitableDbResult<Vec<Clause>> {
    let filter = filter.trim();
    if filter.is_empty() {
        return Ok(Vec::new());
    }
    let inner = filter
        .strip_prefix("AND(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| bitable_error!(remote, "list_records", format!("InvalidFilter: {}", filter)))?;

    split_clauses(inner)
        .into_iter()
        .map(|clause| -> BitableDbResult<Clause> {
            let caps = CLAUSE_REGEX.captures(clause).ok_or_else(|| {
                bitable_error!(remote, "list_records", format!("InvalidFilter: {}", clause))
            })?;
            Ok(Clause {
                key: caps[1].to_string(),
                operator: caps[2].to_string(),
                value: parse_literal(&caps[3])?,
            })
        })
        .collect()
}

/// 按引号外的逗号切分子句
fn split_clauses(inner: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                clauses.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(&inner[start..]);
    clauses
}

fn parse_literal(raw: &str) -> BitableDbResult<DataValue> {
    if let Some(s) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(DataValue::String(s.to_string()));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(DataValue::Int(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Ok(DataValue::Float(f));
    }
    match raw {
        "true" => Ok(DataValue::Bool(true)),
        "false" => Ok(DataValue::Bool(false)),
        _ => Err(bitable_error!(remote, "list_records", format!("InvalidFilter: 无法解析取值 {}", raw))),
    }
}

fn compare(left: &DataValue, right: &DataValue) -> Option<Ordering> {
    match (left, right) {
        (DataValue::Int(a), DataValue::Int(b)) => Some(a.cmp(b)),
        (DataValue::Int(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
        (DataValue::Float(a), DataValue::Int(b)) => a.partial_cmp(&(*b as f64)),
        (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
        (DataValue::String(a), DataValue::String(b)) => Some(a.cmp(b)),
        (DataValue::Bool(a), DataValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn matches_clause(record: &RemoteRecord, clause: &Clause) -> bool {
    let Some(value) = record.fields.get(&clause.key) else {
        return clause.operator == "!=";
    };
    let ordering = compare(value, &clause.value);
    match clause.operator.as_str() {
        "=" => ordering == Some(Ordering::Equal),
        "!=" => ordering != Some(Ordering::Equal),
        ">" => ordering == Some(Ordering::Greater),
        ">=" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        "<" => ordering == Some(Ordering::Less),
        "<=" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        _ => false,
    }
}

fn parse_offset(operation: &str, page_token: Option<&str>) -> BitableDbResult<usize> {
    match page_token {
        None => Ok(0),
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| bitable_error!(remote, operation, format!("无效的分页标记: {}", token))),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn root_folder(&self) -> BitableDbResult<RootFolder> {
        self.enter("root_folder")?;
        Ok(self.state.lock().root.clone())
    }

    async fn create_container(&self, name: &str, parent_token: &str) -> BitableDbResult<String> {
        self.enter("create_container")?;
        let mut state = self.state.lock();
        if state.root.token != parent_token {
            return Err(bitable_error!(
                remote,
                "create_container",
                format!("文件夹 {} 不存在", parent_token)
            ));
        }
        let token = new_id("bas");
        state.files.push(DriveFile {
            name: name.to_string(),
            parent_token: parent_token.to_string(),
            token: token.clone(),
            file_type: BITABLE_FILE_TYPE.to_string(),
        });
        state.apps.insert(token.clone(), Vec::new());
        debug!("创建多维表格: name={}, token={}", name, token);
        Ok(token)
    }

    async fn list_files(
        &self,
        folder_token: &str,
        page_token: Option<&str>,
    ) -> BitableDbResult<FilePage> {
        self.enter("list_files")?;
        let offset = parse_offset("list_files", page_token)?;
        let state = self.state.lock();
        let files: Vec<DriveFile> = state
            .files
            .iter()
            .filter(|f| f.parent_token == folder_token)
            .cloned()
            .collect();
        let end = (offset + FILE_PAGE_SIZE).min(files.len());
        let has_more = end < files.len();
        Ok(FilePage {
            files: files.get(offset..end).map(<[DriveFile]>::to_vec).unwrap_or_default(),
            has_more,
            page_token: has_more.then(|| end.to_string()),
        })
    }

    async fn list_fields(&self, app_token: &str, table_id: &str) -> BitableDbResult<Vec<RemoteField>> {
        self.enter("list_fields")?;
        let mut state = self.state.lock();
        Ok(table_mut(&mut state, "list_fields", app_token, table_id)?.fields.clone())
    }

    async fn create_field(
        &self,
        app_token: &str,
        table_id: &str,
        name: &str,
        field_type: FieldType,
    ) -> BitableDbResult<String> {
        self.enter("create_field")?;
        let mut state = self.state.lock();
        let table = table_mut(&mut state, "create_field", app_token, table_id)?;
        if table.fields.iter().any(|f| f.field_name == name) {
            return Err(bitable_error!(remote, "create_field", format!("FieldNameDuplicated: {}", name)));
        }
        let field_id = new_id("fld");
        table.fields.push(RemoteField {
            field_id: field_id.clone(),
            field_name: name.to_string(),
            field_type: field_type.code(),
        });
        Ok(field_id)
    }

    async fn update_field(
        &self,
        app_token: &str,
        table_id: &str,
        field_id: &str,
        name: &str,
        field_type: FieldType,
    ) -> BitableDbResult<()> {
        self.enter("update_field")?;
        let mut state = self.state.lock();
        let table = table_mut(&mut state, "update_field", app_token, table_id)?;
        if table
            .fields
            .iter()
            .any(|f| f.field_name == name && f.field_id != field_id)
        {
            return Err(bitable_error!(remote, "update_field", format!("FieldNameDuplicated: {}", name)));
        }
        let field = table
            .fields
            .iter_mut()
            .find(|f| f.field_id == field_id)
            .ok_or_else(|| bitable_error!(remote, "update_field", format!("字段 {} 不存在", field_id)))?;
        let old_name = std::mem::replace(&mut field.field_name, name.to_string());
        field.field_type = field_type.code();
        if old_name != name {
            for record in &mut table.records {
                if let Some(value) = record.fields.remove(&old_name) {
                    record.fields.insert(name.to_string(), value);
                }
            }
        }
        Ok(())
    }

    async fn delete_field(&self, app_token: &str, table_id: &str, field_id: &str) -> BitableDbResult<()> {
        self.enter("delete_field")?;
        let mut state = self.state.lock();
        let table = table_mut(&mut state, "delete_field", app_token, table_id)?;
        let index = table
            .fields
            .iter()
            .position(|f| f.field_id == field_id)
            .ok_or_else(|| bitable_error!(remote, "delete_field", format!("字段 {} 不存在", field_id)))?;
        if index == 0 {
            return Err(bitable_error!(remote, "delete_field", "主字段不能删除"));
        }
        let removed = table.fields.remove(index);
        for record in &mut table.records {
            record.fields.remove(&removed.field_name);
        }
        Ok(())
    }

    async fn create_table(&self, app_token: &str, name: &str) -> BitableDbResult<String> {
        self.enter("create_table")?;
        let mut state = self.state.lock();
        let tables = tables_mut(&mut state, "create_table", app_token)?;
        if tables.iter().any(|t| t.name == name) {
            return Err(bitable_error!(remote, "create_table", format!("TableNameDuplicated: {}", name)));
        }
        let table_id = new_id("tbl");
        tables.push(TableState {
            table_id: table_id.clone(),
            name: name.to_string(),
            fields: vec![RemoteField {
                field_id: new_id("fld"),
                field_name: DEFAULT_FIELD_NAME.to_string(),
                field_type: FieldType::String.code(),
            }],
            records: Vec::new(),
        });
        debug!("创建数据表: app={}, name={}, table_id={}", app_token, name, table_id);
        Ok(table_id)
    }

    async fn list_tables(&self, app_token: &str) -> BitableDbResult<Vec<RemoteTable>> {
        self.enter("list_tables")?;
        let mut state = self.state.lock();
        Ok(tables_mut(&mut state, "list_tables", app_token)?
            .iter()
            .map(|t| RemoteTable {
                table_id: t.table_id.clone(),
                name: t.name.clone(),
            })
            .collect())
    }

    async fn delete_table(&self, app_token: &str, table_id: &str) -> BitableDbResult<()> {
        self.enter("delete_table")?;
        let mut state = self.state.lock();
        let tables = tables_mut(&mut state, "delete_table", app_token)?;
        let before = tables.len();
        tables.retain(|t| t.table_id != table_id);
        if tables.len() == before {
            return Err(bitable_error!(remote, "delete_table", format!("数据表 {} 不存在", table_id)));
        }
        Ok(())
    }

    async fn create_record(
        &self,
        app_token: &str,
        table_id: &str,
        fields: &Record,
    ) -> BitableDbResult<String> {
        self.enter("create_record")?;
        let mut state = self.state.lock();
        let table = table_mut(&mut state, "create_record", app_token, table_id)?;
        check_fields("create_record", table, fields)?;
        let record_id = new_id("rec");
        table.records.push(RemoteRecord {
            record_id: record_id.clone(),
            fields: fields.clone(),
        });
        Ok(record_id)
    }

    async fn list_records(
        &self,
        app_token: &str,
        table_id: &str,
        request: &ListRecordsRequest,
    ) -> BitableDbResult<RecordPage> {
        self.enter("list_records")?;
        let clauses = parse_filter(&request.filter)?;
        let offset = parse_offset("list_records", request.page_token.as_deref())?;
        let page_size = request.page_size.max(1) as usize;

        let mut state = self.state.lock();
        let table = table_mut(&mut state, "list_records", app_token, table_id)?;
        let matched: Vec<RemoteRecord> = table
            .records
            .iter()
            .filter(|r| clauses.iter().all(|c| matches_clause(r, c)))
            .cloned()
            .collect();
        let end = (offset + page_size).min(matched.len());
        let has_more = end < matched.len();
        Ok(RecordPage {
            items: matched.get(offset..end).map(<[RemoteRecord]>::to_vec).unwrap_or_default(),
            has_more,
            page_token: has_more.then(|| end.to_string()),
        })
    }

    async fn update_record(
        &self,
        app_token: &str,
        table_id: &str,
        record_id: &str,
        fields: &Record,
    ) -> BitableDbResult<()> {
        self.enter("update_record")?;
        let mut state = self.state.lock();
        let table = table_mut(&mut state, "update_record", app_token, table_id)?;
        check_fields("update_record", table, fields)?;
        let record = table
            .records
            .iter_mut()
            .find(|r| r.record_id == record_id)
            .ok_or_else(|| bitable_error!(remote, "update_record", format!("RecordIdNotFound: {}", record_id)))?;
        for (name, value) in fields {
            record.fields.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete_record(&self, app_token: &str, table_id: &str, record_id: &str) -> BitableDbResult<()> {
        self.enter("delete_record")?;
        let mut state = self.state.lock();
        let table = table_mut(&mut state, "delete_record", app_token, table_id)?;
        let before = table.records.len();
        table.records.retain(|r| r.record_id != record_id);
        if table.records.len() == before {
            return Err(bitable_error!(remote, "delete_record", format!("RecordIdNotFound: {}", record_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, DataValue)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_new_table_has_default_field() {
        let store = MemoryStore::new();
        let app = store.create_container("crm", &store.root_token()).await.unwrap();
        let table = store.create_table(&app, "users").await.unwrap();

        let fields = store.list_fields(&app, &table).await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field_name, DEFAULT_FIELD_NAME);
        assert!(store.delete_field(&app, &table, &fields[0].field_id).await.is_err());
    }

    #[tokio::test]
    async fn test_find_container_ignores_other_file_types() {
        let store = MemoryStore::new();
        let root = store.root_token();
        store.put_file("crm", &root, "docx");
        assert_eq!(store.find_container_by_name("crm", &root).await.unwrap(), None);

        let token = store.put_file("crm", &root, BITABLE_FILE_TYPE);
        assert_eq!(store.find_container_by_name("crm", &root).await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_filter_evaluation() {
        let store = MemoryStore::new();
        let app = store.create_container("crm", &store.root_token()).await.unwrap();
        let table = store.create_table(&app, "users").await.unwrap();
        store.create_field(&app, &table, "name", FieldType::String).await.unwrap();
        store.create_field(&app, &table, "age", FieldType::Int).await.unwrap();
        for (name, age) in [("a", 9), ("b", 12), ("a,b", 30)] {
            store
                .create_record(&app, &table, &record(&[("name", name.into()), ("age", age.into())]))
                .await
                .unwrap();
        }

        let list = |filter: &str| ListRecordsRequest {
            filter: filter.to_string(),
            page_size: 100,
            page_token: None,
        };
        let page = store
            .list_records(&app, &table, &list("AND(CurrentValue.[age]>10)"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);

        let page = store
            .list_records(&app, &table, &list("AND(CurrentValue.[age]>10,CurrentValue.[name]=\"a,b\")"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);

        assert!(store.list_records(&app, &table, &list("OR(x)")).await.is_err());
    }

    #[tokio::test]
    async fn test_record_pagination() {
        let store = MemoryStore::new();
        let app = store.create_container("crm", &store.root_token()).await.unwrap();
        let table = store.create_table(&app, "logs").await.unwrap();
        for _ in 0..5 {
            store.create_record(&app, &table, &Record::new()).await.unwrap();
        }
        let first = store
            .list_records(
                &app,
                &table,
                &ListRecordsRequest {
                    filter: String::new(),
                    page_size: 3,
                    page_token: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        assert!(first.has_more);

        let second = store
            .list_records(
                &app,
                &table,
                &ListRecordsRequest {
                    filter: String::new(),
                    page_size: 3,
                    page_token: first.page_token,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_failure_injection_and_counters() {
        let store = MemoryStore::new();
        store.fail_on("root_folder");
        assert!(store.root_folder().await.is_err());
        store.clear_failures();
        assert!(store.root_folder().await.is_ok());
        assert_eq!(store.call_count("root_folder"), 2);
        assert_eq!(store.total_calls(), 2);
        store.reset_calls();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_field_type_check_on_write() {
        let store = MemoryStore::new();
        let app = store.create_container("crm", &store.root_token()).await.unwrap();
        let table = store.create_table(&app, "users").await.unwrap();
        store.create_field(&app, &table, "age", FieldType::Int).await.unwrap();

        let err = store
            .create_record(&app, &table, &record(&[("age", "twelve".into())]))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::BitableDbError::RemoteError { .. }));
        assert!(store
            .create_record(&app, &table, &record(&[("missing", 1.into())]))
            .await
            .is_err());
    }
}
