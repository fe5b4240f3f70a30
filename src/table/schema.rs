//! 表模式定义
//!
//! 定义数据库、数据表和字段

use serde::{Deserialize, Serialize};

/// 字段类型，取值即远端服务的字段类型编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 多行文本
    String = 1,
    /// 数字
    Int = 2,
}

impl FieldType {
    /// 远端字段类型编码
    pub fn code(self) -> i32 {
        self as i32
    }

    /// 从远端字段类型编码解析，不支持的类型返回 None
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(FieldType::String),
            2 => Some(FieldType::Int),
            _ => None,
        }
    }
}

/// 字段定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// 字段名
    pub name: String,
    /// 字段类型
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// 文本字段
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// 数字字段
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }
}

/// 数据表定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// 表名
    pub name: String,
    /// 字段列表（有序，字段名唯一）
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Table {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// 数据库定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    /// 数据库名
    pub name: String,
    /// 数据表列表
    #[serde(default)]
    pub tables: Vec<Table>,
}
