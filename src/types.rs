//! 通用数据类型定义
//!
//! 定义记录值、记录映射和查询条件

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 保留的标识字段名
pub const ID_FIELD: &str = "id";

/// 通用数据值类型 - 记录字段的取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮点数
    Float(f64),
    /// 字符串
    String(String),
    /// 其他 JSON 值（人员、附件等复合字段）
    Json(serde_json::Value),
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::Null => write!(f, "null"),
            DataValue::Bool(b) => write!(f, "{}", b),
            DataValue::Int(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::String(s) => write!(f, "{}", s),
            DataValue::Json(json) => write!(f, "{}", json),
        }
    }
}

impl DataValue {
    /// 获取数据类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "null",
            DataValue::Bool(_) => "bool",
            DataValue::Int(_) => "int",
            DataValue::Float(_) => "float",
            DataValue::String(_) => "string",
            DataValue::Json(_) => "json",
        }
    }

    /// 以字符串切片形式读取
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 以整数形式读取
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 转换为 JSON 值
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            DataValue::Null => serde_json::Value::Null,
            DataValue::Bool(b) => serde_json::Value::Bool(*b),
            DataValue::Int(i) => serde_json::Value::from(*i),
            DataValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DataValue::String(s) => serde_json::Value::String(s.clone()),
            DataValue::Json(json) => json.clone(),
        }
    }

    /// 从 JSON 值解析
    pub fn from_json_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DataValue::Null,
            serde_json::Value::Bool(b) => DataValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DataValue::Int(i),
                None => n.as_f64().map(DataValue::Float).unwrap_or(DataValue::Null),
            },
            serde_json::Value::String(s) => DataValue::String(s),
            other => DataValue::Json(other),
        }
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::String(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::String(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        DataValue::from_json_value(value)
    }
}

/// 记录：字段名到字段值的映射
pub type Record = HashMap<String, DataValue>;

/// 将记录转换为 JSON 对象
pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json_value()))
            .collect(),
    )
}

/// 从 JSON 对象构建记录，非对象输入返回 None
pub fn record_from_json(value: serde_json::Value) -> Option<Record> {
    match value {
        serde_json::Value::Object(map) => Some(
            map.into_iter()
                .map(|(k, v)| (k, DataValue::from_json_value(v)))
                .collect(),
        ),
        _ => None,
    }
}

/// 读取字符串字段，不存在或类型不符时返回空字符串
pub fn get_string(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(DataValue::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

/// 读取整数字段，不存在或类型不符时返回 0
pub fn get_int(record: &Record, key: &str) -> i64 {
    record.get(key).and_then(DataValue::as_i64).unwrap_or(0)
}

/// 读取记录标识
pub fn get_id(record: &Record) -> String {
    get_string(record, ID_FIELD)
}

/// 查询条件：`key operator value`，多个条件之间为 AND 关系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCmd {
    /// 字段名
    pub key: String,
    /// 操作符（=、!=、>、>=、<、<=）
    pub operator: String,
    /// 值
    pub value: DataValue,
}

impl SearchCmd {
    /// 创建查询条件
    pub fn new(
        key: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<DataValue>,
    ) -> Self {
        Self {
            key: key.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// 创建等值查询条件
    pub fn eq(key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self::new(key, "=", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_value_type_name() {
        assert_eq!(DataValue::Null.type_name(), "null");
        assert_eq!(DataValue::Int(3).type_name(), "int");
        assert_eq!(DataValue::from("test").type_name(), "string");
    }

    #[test]
    fn test_json_number_mapping() {
        assert_eq!(DataValue::from(serde_json::json!(12)), DataValue::Int(12));
        assert_eq!(DataValue::from(serde_json::json!(1.5)), DataValue::Float(1.5));
        assert!(matches!(
            DataValue::from(serde_json::json!([{"name": "张三"}])),
            DataValue::Json(_)
        ));
    }

    #[test]
    fn test_record_accessors() {
        let mut record = Record::new();
        record.insert("username".to_string(), "zhangsan".into());
        record.insert("age".to_string(), 12.into());
        record.insert(ID_FIELD.to_string(), "rec123".into());

        assert_eq!(get_string(&record, "username"), "zhangsan");
        assert_eq!(get_string(&record, "age"), "");
        assert_eq!(get_int(&record, "age"), 12);
        assert_eq!(get_int(&record, "missing"), 0);
        assert_eq!(get_id(&record), "rec123");
    }

    #[test]
    fn test_record_json_conversion() {
        let json = serde_json::json!({"username": "lisi", "age": 20});
        let record = record_from_json(json.clone()).unwrap();
        assert_eq!(record.get("age"), Some(&DataValue::Int(20)));
        assert_eq!(record_to_json(&record), json);
        assert!(record_from_json(serde_json::json!("oops")).is_none());
    }
}
