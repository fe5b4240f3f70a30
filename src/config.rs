//! 配置模块
//!
//! 提供应用凭证、客户端参数、日志级别和预置表模式的配置，支持 TOML 文件和构建器两种方式

use crate::bitable_error;
use crate::error::BitableDbResult;
use crate::table::Database;
use rat_logger::{LevelFilter, LoggerBuilder, handler::term::TermConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 记录分页大小的默认值
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// 记录分页大小的上限
pub const MAX_PAGE_SIZE: u32 = 500;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// 应用凭证
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_secret: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"******")
            .finish()
    }
}

/// 客户端参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 读取记录时的分页大小
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitableConfig {
    pub app: AppCredentials,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 启动时需要对齐的数据库模式
    #[serde(default)]
    pub databases: Vec<Database>,
}

impl BitableConfig {
    /// 创建构建器
    pub fn builder() -> BitableConfigBuilder {
        BitableConfigBuilder::new()
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> BitableDbResult<Self> {
        let config: BitableConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> BitableDbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 异步读取 TOML 文件
    pub async fn load(path: impl AsRef<Path>) -> BitableDbResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    /// 校验配置
    pub fn validate(&self) -> BitableDbResult<()> {
        if self.app.app_id.trim().is_empty() {
            return Err(bitable_error!(config, "app_id 不能为空"));
        }
        if self.app.app_secret.trim().is_empty() {
            return Err(bitable_error!(config, "app_secret 不能为空"));
        }
        if self.client.page_size == 0 || self.client.page_size > MAX_PAGE_SIZE {
            return Err(bitable_error!(
                config,
                format!("page_size 必须在 1..={} 之间，当前为 {}", MAX_PAGE_SIZE, self.client.page_size)
            ));
        }
        for database in &self.databases {
            if database.name.trim().is_empty() {
                return Err(bitable_error!(config, "数据库名不能为空"));
            }
        }
        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct BitableConfigBuilder {
    app_id: Option<String>,
    app_secret: Option<String>,
    page_size: Option<u32>,
    log_level: Option<LogLevel>,
    databases: Vec<Database>,
}

impl BitableConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn app_secret(mut self, app_secret: impl Into<String>) -> Self {
        self.app_secret = Some(app_secret.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// 追加预置的数据库模式
    pub fn database(mut self, database: Database) -> Self {
        self.databases.push(database);
        self
    }

    /// 构建配置
    pub fn build(self) -> BitableDbResult<BitableConfig> {
        let config = BitableConfig {
            app: AppCredentials {
                app_id: self
                    .app_id
                    .ok_or_else(|| bitable_error!(config, "缺少 app_id"))?,
                app_secret: self
                    .app_secret
                    .ok_or_else(|| bitable_error!(config, "缺少 app_secret"))?,
            },
            client: ClientConfig {
                page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            },
            logging: LoggingConfig {
                level: self.log_level.unwrap_or_default(),
            },
            databases: self.databases,
        };
        config.validate()?;
        Ok(config)
    }
}

/// 初始化终端日志
///
/// 库内部不会主动初始化日志，由调用者决定是否调用
pub fn init_logging(config: &LoggingConfig) -> BitableDbResult<()> {
    LoggerBuilder::new()
        .with_level(config.level.to_level_filter())
        .add_terminal_with_config(TermConfig::default())
        .init_global_logger()
        .map_err(|e| bitable_error!(config, format!("日志初始化失败: {:?}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Field, Table};
    use std::io::Write;

    const SAMPLE: &str = r#"
[app]
app_id = "cli_a1b2c3"
app_secret = "s3cr3t"

[client]
page_size = 50

[logging]
level = "debug"

[[databases]]
name = "crm"

[[databases.tables]]
name = "users"
fields = [
    { name = "username", type = "String" },
    { name = "age", type = "Int" },
]
"#;

    #[test]
    fn test_parse_toml() {
        let config = BitableConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.client.page_size, 50);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.databases.len(), 1);
        assert_eq!(
            config.databases[0].tables,
            vec![Table::new("users", vec![Field::string("username"), Field::int("age")])]
        );
    }

    #[test]
    fn test_defaults_and_validation() {
        let config = BitableConfig::from_toml_str(
            "[app]\napp_id = \"cli\"\napp_secret = \"x\"\n",
        )
        .unwrap();
        assert_eq!(config.client.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.logging.level, LogLevel::Info);

        let err = BitableConfig::from_toml_str(
            "[app]\napp_id = \"cli\"\napp_secret = \"x\"\n[client]\npage_size = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::BitableDbError::ConfigError { .. }));

        let err = BitableConfig::from_toml_str("[app]\napp_id = 1\n").unwrap_err();
        assert!(matches!(err, crate::error::BitableDbError::TomlError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = BitableConfig::from_file(file.path()).unwrap();
        assert_eq!(config.app.app_id, "cli_a1b2c3");
        assert!(!format!("{:?}", config.app).contains("s3cr3t"));
    }

    #[test]
    fn test_builder() {
        let config = BitableConfig::builder()
            .app_id("cli")
            .app_secret("secret")
            .page_size(20)
            .build()
            .unwrap();
        assert_eq!(config.client.page_size, 20);

        assert!(BitableConfig::builder().app_id("cli").build().is_err());
        assert!(BitableConfig::builder()
            .app_id("cli")
            .app_secret("secret")
            .page_size(MAX_PAGE_SIZE + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_init_logging_maps_errors() {
        let config = LoggingConfig::default();
        // 全局日志器可能已被注册，失败时统一映射为配置错误
        for _ in 0..2 {
            if let Err(err) = init_logging(&config) {
                assert!(matches!(err, crate::error::BitableDbError::ConfigError { .. }));
            }
        }
    }
}
