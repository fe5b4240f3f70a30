//! 表管理模块
//!
//! 提供表模式定义以及远端字段与期望模式的对齐功能

pub mod reconciler;
pub mod schema;

pub use reconciler::{
    FieldChange, FieldFailure, FieldOperation, IdentifierAction, ReconcileReport, SchemaDiff,
    SchemaReconciler,
};
pub use schema::{Database, Field, FieldType, Table};
