//! 记录映射
//!
//! 在通用记录和远端记录之间转换，处理合成的 `id` 字段：
//!
//! - 创建：数据表有 `id` 字段时先写入空占位值，拿到远端分配的记录 ID 后
//!   再发起一次只写 `id` 字段的更新，把记录 ID 回填进去。两步之间不是原子的，
//!   第二步失败会留下未回填的记录，可用 `BitableDb::repair_id_stamps` 补齐。
//! - 更新：数据表有 `id` 字段时注入调用方给出的记录 ID。
//! - 读取：每条记录都附带 `id`，取值为远端记录 ID。
//!
//! 数据表没有 `id` 字段时，调用方传入的 `id` 键不会发往远端。

use crate::adapter::{RemoteField, RemoteRecord};
use crate::types::{DataValue, ID_FIELD, Record};

/// 记录映射器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordMapper {
    has_id_field: bool,
}

impl RecordMapper {
    pub fn new(has_id_field: bool) -> Self {
        Self { has_id_field }
    }

    /// 根据远端字段列表构建
    pub fn from_fields(fields: &[RemoteField]) -> Self {
        Self::new(fields.iter().any(|f| f.field_name == ID_FIELD))
    }

    /// 数据表是否有需要回填的 `id` 字段
    pub fn has_id_field(&self) -> bool {
        self.has_id_field
    }

    /// 创建请求的字段
    pub fn create_payload(&self, mut record: Record) -> Record {
        if self.has_id_field {
            record.insert(ID_FIELD.to_string(), DataValue::String(String::new()));
        } else {
            record.remove(ID_FIELD);
        }
        record
    }

    /// 创建后回填 `id` 的更新字段，数据表没有 `id` 字段时返回 None
    pub fn stamp_payload(&self, record_id: &str) -> Option<Record> {
        self.has_id_field.then(|| {
            Record::from([(ID_FIELD.to_string(), DataValue::String(record_id.to_string()))])
        })
    }

    /// 更新请求的字段
    pub fn update_payload(&self, record_id: &str, mut record: Record) -> Record {
        if self.has_id_field {
            record.insert(ID_FIELD.to_string(), DataValue::String(record_id.to_string()));
        } else {
            record.remove(ID_FIELD);
        }
        record
    }

    /// 远端记录转换为通用记录
    pub fn from_remote(&self, remote: RemoteRecord) -> Record {
        let mut record = remote.fields;
        record.insert(ID_FIELD.to_string(), DataValue::String(remote.record_id));
        record
    }

    /// 远端记录的 `id` 字段是否与记录 ID 一致
    pub fn is_stamped(&self, remote: &RemoteRecord) -> bool {
        !self.has_id_field
            || remote.fields.get(ID_FIELD).and_then(DataValue::as_str) == Some(remote.record_id.as_str())
    }
}
