//! rat_bitabledb - 基于多维表格的数据库抽象层
//!
//! 把多维表格服务当作文档型数据库使用：数据库对应多维表格，数据表对应其中的表，
//! 记录以字段名到字段值的映射读写。核心是字段对齐和合成 `id` 字段的管理，
//! 远端服务通过 [`RemoteStore`] trait 接入。

// 导出所有公共模块
pub mod error;
pub mod types;
pub mod config;
pub mod cache;
pub mod adapter;
pub mod table;
pub mod record;
pub mod db;

// 重新导出常用类型和函数
pub use error::{BitableDbError, BitableDbResult};
pub use types::*;
pub use config::{
    AppCredentials, BitableConfig, BitableConfigBuilder, ClientConfig, LogLevel, LoggingConfig,
    init_logging,
};
pub use cache::{CacheKey, IdentifierCache};
pub use adapter::{FilterBuilder, MemoryStore, RemoteStore, translate};
pub use table::{Database, Field, FieldType, ReconcileReport, SchemaReconciler, Table};
pub use record::RecordMapper;
pub use db::{BitableDb, DbOperations, SchemaReport};

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 获取库信息
pub fn get_info() -> String {
    format!("{} v{}", NAME, VERSION)
}
