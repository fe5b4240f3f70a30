//! 字段对齐
//!
//! 比较期望的表模式和远端字段列表，生成差异计划并以最少的字段调用使两者一致。
//! 单个字段操作失败只记录告警，不中断后续字段的对齐。

use super::schema::{Field, FieldType, Table};
use crate::adapter::{RemoteField, RemoteStore};
use crate::error::BitableDbResult;
use crate::types::ID_FIELD;
use rat_logger::{debug, info, warn};
use std::collections::HashSet;

/// 字段操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperation {
    /// 将远端字段改名为标识字段
    RenameIdentifier,
    /// 创建标识字段
    CreateIdentifier,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for FieldOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldOperation::RenameIdentifier => "rename_identifier",
            FieldOperation::CreateIdentifier => "create_identifier",
            FieldOperation::Create => "create",
            FieldOperation::Update => "update",
            FieldOperation::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// 单个字段操作失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub operation: FieldOperation,
    pub field: String,
    pub message: String,
}

/// 期望字段的变更
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    /// 新建字段
    Create(Field),
    /// 保留字段 ID，替换字段名和类型
    Update { field_id: String, field: Field },
}

/// 标识字段的处理方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierAction {
    /// 已存在名为 id 的字段
    Keep,
    /// 将首个字段改名为 id
    Rename { field_id: String, old_name: String },
    /// 远端没有任何字段，新建 id 字段
    Create,
}

/// 模式差异
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDiff {
    pub identifier: IdentifierAction,
    /// 按期望顺序排列的新增和修改
    pub changes: Vec<FieldChange>,
    /// 与期望一致的字段
    pub unchanged: Vec<String>,
    /// 期望中被忽略的字段（保留字段名或重复字段名）
    pub skipped: Vec<String>,
    /// 需要删除的多余字段
    pub removed: Vec<RemoteField>,
}

impl SchemaDiff {
    /// 计算远端字段与期望字段之间的差异
    pub fn compute(remote: &[RemoteField], desired: &[Field]) -> Self {
        let identifier_index = remote.iter().position(|f| f.field_name == ID_FIELD);
        let identifier = match (identifier_index, remote.first()) {
            (Some(_), _) => IdentifierAction::Keep,
            (None, Some(first)) => IdentifierAction::Rename {
                field_id: first.field_id.clone(),
                old_name: first.field_name.clone(),
            },
            (None, None) => IdentifierAction::Create,
        };
        let identifier_index = identifier_index.or(if remote.is_empty() { None } else { Some(0) });

        let mut remaining: Vec<&RemoteField> = remote
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != identifier_index)
            .map(|(_, f)| f)
            .collect();

        let mut changes = Vec::new();
        let mut unchanged = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for field in desired {
            if field.name == ID_FIELD || !seen.insert(field.name.as_str()) {
                skipped.push(field.name.clone());
                continue;
            }
            match remaining.iter().position(|r| r.field_name == field.name) {
                Some(index) => {
                    let existing = remaining.remove(index);
                    if existing.field_type == field.field_type.code() {
                        unchanged.push(field.name.clone());
                    } else {
                        changes.push(FieldChange::Update {
                            field_id: existing.field_id.clone(),
                            field: field.clone(),
                        });
                    }
                }
                None => changes.push(FieldChange::Create(field.clone())),
            }
        }

        Self {
            identifier,
            changes,
            unchanged,
            skipped,
            removed: remaining.into_iter().cloned().collect(),
        }
    }

    /// 是否不需要任何远端调用
    pub fn is_empty(&self) -> bool {
        self.identifier == IdentifierAction::Keep && self.changes.is_empty() && self.removed.is_empty()
    }
}

/// 字段对齐结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub table_id: String,
    /// 数据表是否由本次调用新建
    pub table_created: bool,
    /// 是否处理过标识字段（改名或新建）
    pub identifier_normalized: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<String>,
    /// 失败的字段操作
    pub failures: Vec<FieldFailure>,
}

impl ReconcileReport {
    /// 所有字段操作均成功
    pub fn is_converged(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 字段对齐器
pub struct SchemaReconciler<'a> {
    store: &'a dyn RemoteStore,
}

impl<'a> SchemaReconciler<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self { store }
    }

    /// 将远端数据表的字段对齐到期望的表模式
    ///
    /// 读取字段列表失败时返回错误；之后的单个字段操作失败只记录到报告中。
    /// 执行顺序：标识字段 -> 新增/修改 -> 删除
    pub async fn reconcile(
        &self,
        app_token: &str,
        table_id: &str,
        table: &Table,
    ) -> BitableDbResult<ReconcileReport> {
        let remote = self.store.list_fields(app_token, table_id).await?;
        let diff = SchemaDiff::compute(&remote, &table.fields);
        debug!("数据表 {} 字段差异: {:?}", table.name, diff);

        let mut report = ReconcileReport {
            table_id: table_id.to_string(),
            unchanged: diff.unchanged.clone(),
            skipped: diff.skipped.clone(),
            ..Default::default()
        };
        for name in &diff.skipped {
            warn!("数据表 {} 忽略字段 {}: 保留字段名或重复定义", table.name, name);
        }
        if diff.is_empty() {
            debug!("数据表 {} 字段已对齐，无需变更", table.name);
            return Ok(report);
        }

        match &diff.identifier {
            IdentifierAction::Keep => {}
            IdentifierAction::Rename { field_id, old_name } => {
                let result = self
                    .store
                    .update_field(app_token, table_id, field_id, ID_FIELD, FieldType::String)
                    .await;
                match result {
                    Ok(()) => {
                        info!("数据表 {} 首字段 {} 改名为 {}", table.name, old_name, ID_FIELD);
                        report.identifier_normalized = true;
                    }
                    Err(e) => record_failure(&mut report, FieldOperation::RenameIdentifier, old_name, e),
                }
            }
            IdentifierAction::Create => {
                let result = self
                    .store
                    .create_field(app_token, table_id, ID_FIELD, FieldType::String)
                    .await;
                match result {
                    Ok(_) => report.identifier_normalized = true,
                    Err(e) => record_failure(&mut report, FieldOperation::CreateIdentifier, ID_FIELD, e),
                }
            }
        }

        for change in &diff.changes {
            match change {
                FieldChange::Create(field) => {
                    let result = self
                        .store
                        .create_field(app_token, table_id, &field.name, field.field_type)
                        .await;
                    match result {
                        Ok(_) => report.created.push(field.name.clone()),
                        Err(e) => record_failure(&mut report, FieldOperation::Create, &field.name, e),
                    }
                }
                FieldChange::Update { field_id, field } => {
                    let result = self
                        .store
                        .update_field(app_token, table_id, field_id, &field.name, field.field_type)
                        .await;
                    match result {
                        Ok(()) => report.updated.push(field.name.clone()),
                        Err(e) => record_failure(&mut report, FieldOperation::Update, &field.name, e),
                    }
                }
            }
        }

        for field in &diff.removed {
            match self.store.delete_field(app_token, table_id, &field.field_id).await {
                Ok(()) => report.deleted.push(field.field_name.clone()),
                Err(e) => record_failure(&mut report, FieldOperation::Delete, &field.field_name, e),
            }
        }

        if report.is_converged() {
            debug!(
                "数据表 {} 字段对齐完成: 新增={:?}, 修改={:?}, 删除={:?}",
                table.name, report.created, report.updated, report.deleted
            );
        } else {
            warn!("数据表 {} 字段对齐部分失败: {} 个字段操作失败", table.name, report.failures.len());
        }
        Ok(report)
    }
}

fn record_failure(
    report: &mut ReconcileReport,
    operation: FieldOperation,
    field: &str,
    error: crate::error::BitableDbError,
) {
    warn!("字段操作失败: operation={}, field={}, error={}", operation, field, error);
    report.failures.push(FieldFailure {
        operation,
        field: field.to_string(),
        message: error.to_string(),
    });
}
