//! 错误处理模块
//!
//! 提供统一的错误类型定义和中文错误信息

use thiserror::Error;

/// BitableDb 统一错误类型
#[derive(Error, Debug)]
pub enum BitableDbError {
    /// 数据库不存在
    #[error("数据库[{database}]不存在")]
    DatabaseNotFound { database: String },

    /// 数据表不存在
    #[error("数据表[{database}.{table}]不存在")]
    TableNotFound { database: String, table: String },

    /// 远端服务调用失败
    #[error("远端调用 {operation} 失败: {message}")]
    RemoteError { operation: String, message: String },

    /// 参数校验错误
    #[error("参数校验失败: {field} - {message}")]
    ValidationError { field: String, message: String },

    /// 配置错误
    #[error("配置错误: {message}")]
    ConfigError { message: String },

    /// IO 错误
    #[error("IO 操作失败: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON 序列化错误
    #[error("JSON 处理失败: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML 解析错误
    #[error("TOML 解析失败: {0}")]
    TomlError(#[from] toml::de::Error),

    /// 通用错误
    #[error("操作失败: {0}")]
    Other(#[from] anyhow::Error),
}

impl BitableDbError {
    /// 是否为“数据库或数据表不存在”类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BitableDbError::DatabaseNotFound { .. } | BitableDbError::TableNotFound { .. }
        )
    }
}

/// BitableDb 结果类型别名
pub type BitableDbResult<T> = Result<T, BitableDbError>;

/// 错误构建器 - 提供便捷的错误创建方法
pub struct ErrorBuilder;

impl ErrorBuilder {
    /// 创建数据库不存在错误
    pub fn database_not_found(database: impl Into<String>) -> BitableDbError {
        BitableDbError::DatabaseNotFound {
            database: database.into(),
        }
    }

    /// 创建数据表不存在错误
    pub fn table_not_found(
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> BitableDbError {
        BitableDbError::TableNotFound {
            database: database.into(),
            table: table.into(),
        }
    }

    /// 创建远端调用错误
    pub fn remote_error(
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> BitableDbError {
        BitableDbError::RemoteError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// 创建校验错误
    pub fn validation_error(
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> BitableDbError {
        BitableDbError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn config_error(message: impl Into<String>) -> BitableDbError {
        BitableDbError::ConfigError {
            message: message.into(),
        }
    }
}

/// 便捷宏 - 快速创建错误
#[macro_export]
macro_rules! bitable_error {
    (database_not_found, $db:expr) => {
        $crate::error::ErrorBuilder::database_not_found($db)
    };
    (table_not_found, $db:expr, $table:expr) => {
        $crate::error::ErrorBuilder::table_not_found($db, $table)
    };
    (remote, $op:expr, $msg:expr) => {
        $crate::error::ErrorBuilder::remote_error($op, $msg)
    };
    (validation, $field:expr, $msg:expr) => {
        $crate::error::ErrorBuilder::validation_error($field, $msg)
    };
    (config, $msg:expr) => {
        $crate::error::ErrorBuilder::config_error($msg)
    };
}
