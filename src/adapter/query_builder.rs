//! 过滤表达式构建器模块
//!
//! 将通用查询条件转换为多维表格的公式过滤语法，例如
//! `AND(CurrentValue.[age]>10,CurrentValue.[name]="a")`

use crate::types::{DataValue, SearchCmd};

/// 过滤表达式构建器
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    conditions: Vec<SearchCmd>,
}

impl FilterBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// 添加条件
    pub fn condition(mut self, condition: SearchCmd) -> Self {
        self.conditions.push(condition);
        self
    }

    /// 添加多个条件
    pub fn conditions(mut self, conditions: &[SearchCmd]) -> Self {
        self.conditions.extend_from_slice(conditions);
        self
    }

    /// 构建过滤表达式
    ///
    /// 没有条件时返回空字符串；只有一个条件时同样包裹在 `AND(...)` 中，
    /// 与多条件的写法保持一致
    pub fn build(&self) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = self.conditions.iter().map(render_condition).collect();
        format!("AND({})", clauses.join(","))
    }
}

/// 将查询条件列表转换为过滤表达式
pub fn translate(conditions: &[SearchCmd]) -> String {
    FilterBuilder::new().conditions(conditions).build()
}

fn render_condition(condition: &SearchCmd) -> String {
    format!(
        "CurrentValue.[{}]{}{}",
        condition.key,
        condition.operator,
        render_value(&condition.value)
    )
}

fn render_value(value: &DataValue) -> String {
    match value {
        DataValue::String(s) => format!("\"{}\"", s),
        DataValue::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}
