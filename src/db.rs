//! 数据库门面
//!
//! 组合标识缓存、字段对齐、记录映射和过滤表达式构建，对外提供
//! 数据库 / 数据表 / 记录的 CRUD 接口。
//!
//! 每个操作按顺序等待各次远端调用完成；丢弃返回的 future 即可放弃尚未发出的后续调用。

use crate::adapter::{ListRecordsRequest, RemoteRecord, RemoteStore, RootFolder, translate};
use crate::bitable_error;
use crate::cache::{CacheKey, IdentifierCache};
use crate::config::ClientConfig;
use crate::error::BitableDbResult;
use crate::record::RecordMapper;
use crate::table::{Database, ReconcileReport, SchemaReconciler, Table};
use crate::types::{Record, SearchCmd};
use async_trait::async_trait;
use rat_logger::{debug, error, info, warn};
use std::sync::Arc;

/// 数据库操作接口
#[async_trait]
pub trait DbOperations: Send + Sync {
    /// 数据库不存在时创建，返回 app token
    async fn save_database(&self, database: &str) -> BitableDbResult<String>;

    /// 创建或更新数据表，返回表 ID
    async fn save_table(&self, database: &str, table: &Table) -> BitableDbResult<String>;

    /// 列出数据库下的表名
    async fn list_tables(&self, database: &str) -> BitableDbResult<Vec<String>>;

    /// 删除数据表，数据库或数据表不存在时返回错误
    async fn drop_table(&self, database: &str, table: &str) -> BitableDbResult<()>;

    /// 创建记录，返回远端生成的记录 ID
    async fn create(&self, database: &str, table: &str, record: Record) -> BitableDbResult<String>;

    /// 按条件读取记录，条件之间为 AND 关系
    async fn read(
        &self,
        database: &str,
        table: &str,
        conditions: &[SearchCmd],
    ) -> BitableDbResult<Vec<Record>>;

    /// 按记录 ID 更新
    async fn update(
        &self,
        database: &str,
        table: &str,
        id: &str,
        record: Record,
    ) -> BitableDbResult<()>;

    /// 按记录 ID 删除
    async fn delete(&self, database: &str, table: &str, id: &str) -> BitableDbResult<()>;
}

/// 数据库模式对齐结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub database_id: String,
    pub tables: Vec<ReconcileReport>,
}

/// 基于多维表格的数据库
#[derive(Clone)]
pub struct BitableDb {
    store: Arc<dyn RemoteStore>,
    cache: Arc<IdentifierCache>,
    root: RootFolder,
    page_size: u32,
}

impl std::fmt::Debug for BitableDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitableDb")
            .field("root", &self.root)
            .field("cached_ids", &self.cache.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl BitableDb {
    /// 使用默认客户端参数创建
    pub async fn new(store: Arc<dyn RemoteStore>) -> BitableDbResult<Self> {
        Self::with_config(store, &ClientConfig::default()).await
    }

    /// 使用指定客户端参数创建
    pub async fn with_config(
        store: Arc<dyn RemoteStore>,
        config: &ClientConfig,
    ) -> BitableDbResult<Self> {
        Self::with_cache(store, Arc::new(IdentifierCache::new()), config).await
    }

    /// 使用外部注入的标识缓存创建
    ///
    /// 初始化时查询一次根文件夹，所有数据库都建在根文件夹下；查询失败则创建失败
    pub async fn with_cache(
        store: Arc<dyn RemoteStore>,
        cache: Arc<IdentifierCache>,
        config: &ClientConfig,
    ) -> BitableDbResult<Self> {
        let root = store.root_folder().await.map_err(|e| {
            error!("获取根文件夹失败: {}", e);
            e
        })?;
        info!("BitableDb 初始化完成: root={}, user={}", root.token, root.user_id);
        Ok(Self {
            store,
            cache,
            root,
            page_size: config.page_size,
        })
    }

    /// 根文件夹
    pub fn root(&self) -> &RootFolder {
        &self.root
    }

    /// 标识缓存
    pub fn cache(&self) -> &IdentifierCache {
        &self.cache
    }

    /// 查找数据库，不存在时返回 None
    pub async fn resolve_database(&self, database: &str) -> BitableDbResult<Option<String>> {
        self.cache
            .resolve_database(self.store.as_ref(), &self.root.token, database)
            .await
    }

    /// 查找数据表，数据库或数据表不存在时返回 None
    pub async fn resolve_table(&self, database: &str, table: &str) -> BitableDbResult<Option<String>> {
        match self.resolve_database(database).await? {
            Some(app_token) => {
                self.cache
                    .resolve_table(self.store.as_ref(), database, &app_token, table)
                    .await
            }
            None => Ok(None),
        }
    }

    /// 创建或更新数据表，返回字段对齐的详细结果
    ///
    /// 同一张表上的并发调用串行执行，表只会被创建一次
    pub async fn save_table_with_report(
        &self,
        database: &str,
        table: &Table,
    ) -> BitableDbResult<ReconcileReport> {
        check_name("table", &table.name)?;
        let app_token = self.save_database(database).await?;

        let key = CacheKey::table(database, &table.name);
        let _guard = self.cache.creation_lock(&key).await;
        let existing = self
            .cache
            .resolve_table(self.store.as_ref(), database, &app_token, &table.name)
            .await?;
        let (table_id, table_created) = match existing {
            Some(table_id) => (table_id, false),
            None => {
                let table_id = self
                    .store
                    .create_table(&app_token, &table.name)
                    .await
                    .map_err(|e| {
                        error!("创建数据表失败: database={}, table={}, error={}", database, table.name, e);
                        e
                    })?;
                let table_id = self.cache.store_if_absent(key, table_id);
                info!("创建数据表: {}.{} -> {}", database, table.name, table_id);
                (table_id, true)
            }
        };

        let mut report = SchemaReconciler::new(self.store.as_ref())
            .reconcile(&app_token, &table_id, table)
            .await?;
        report.table_created = table_created;
        Ok(report)
    }

    /// 对齐整个数据库的模式：确保数据库存在，并按顺序对齐其中每张表
    pub async fn save_schema(&self, database: &Database) -> BitableDbResult<SchemaReport> {
        let database_id = self.save_database(&database.name).await?;
        let mut tables = Vec::with_capacity(database.tables.len());
        for table in &database.tables {
            tables.push(self.save_table_with_report(&database.name, table).await?);
        }
        Ok(SchemaReport {
            database_id,
            tables,
        })
    }

    /// 补齐未回填 `id` 的记录，返回修复的记录数
    ///
    /// 用于创建记录时第二步回填失败后的补偿
    pub async fn repair_id_stamps(&self, database: &str, table: &str) -> BitableDbResult<usize> {
        let (app_token, table_id) = self.require_table(database, table).await?;
        let fields = self.store.list_fields(&app_token, &table_id).await?;
        let mapper = RecordMapper::from_fields(&fields);
        if !mapper.has_id_field() {
            return Ok(0);
        }

        let mut repaired = 0;
        for remote in self.list_all_records(&app_token, &table_id, String::new()).await? {
            if mapper.is_stamped(&remote) {
                continue;
            }
            let Some(stamp) = mapper.stamp_payload(&remote.record_id) else {
                continue;
            };
            match self
                .store
                .update_record(&app_token, &table_id, &remote.record_id, &stamp)
                .await
            {
                Ok(()) => repaired += 1,
                Err(e) => warn!("回填记录 id 失败: record={}, error={}", remote.record_id, e),
            }
        }
        info!("数据表 {}.{} 补齐 id 的记录数: {}", database, table, repaired);
        Ok(repaired)
    }

    /// 解析已存在的数据库和数据表，任一不存在时返回对应错误
    async fn require_table(&self, database: &str, table: &str) -> BitableDbResult<(String, String)> {
        let app_token = self
            .resolve_database(database)
            .await?
            .ok_or_else(|| bitable_error!(database_not_found, database))?;
        let table_id = self
            .cache
            .resolve_table(self.store.as_ref(), database, &app_token, table)
            .await?
            .ok_or_else(|| bitable_error!(table_not_found, database, table))?;
        Ok((app_token, table_id))
    }

    /// 读取字段列表构建记录映射器，失败时退化为不回填 `id`
    async fn load_mapper(&self, app_token: &str, table_id: &str) -> RecordMapper {
        match self.store.list_fields(app_token, table_id).await {
            Ok(fields) => RecordMapper::from_fields(&fields),
            Err(e) => {
                warn!("读取字段列表失败，跳过 id 回填: table={}, error={}", table_id, e);
                RecordMapper::default()
            }
        }
    }

    /// 按分页读取全部匹配的记录
    async fn list_all_records(
        &self,
        app_token: &str,
        table_id: &str,
        filter: String,
    ) -> BitableDbResult<Vec<RemoteRecord>> {
        let mut request = ListRecordsRequest {
            filter,
            page_size: self.page_size,
            page_token: None,
        };
        let mut records = Vec::new();
        loop {
            let page = self
                .store
                .list_records(app_token, table_id, &request)
                .await
                .map_err(|e| {
                    error!("读取记录失败: table={}, filter={}, error={}", table_id, request.filter, e);
                    e
                })?;
            records.extend(page.items);
            match page.page_token {
                Some(next) if page.has_more => request.page_token = Some(next),
                _ => return Ok(records),
            }
        }
    }
}

fn check_name(field: &str, name: &str) -> BitableDbResult<()> {
    if name.trim().is_empty() {
        return Err(bitable_error!(validation, field, "名称不能为空"));
    }
    Ok(())
}

#[async_trait]
impl DbOperations for BitableDb {
    async fn save_database(&self, database: &str) -> BitableDbResult<String> {
        check_name("database", database)?;
        if let Some(app_token) = self.resolve_database(database).await? {
            return Ok(app_token);
        }

        let key = CacheKey::database(database);
        let _guard = self.cache.creation_lock(&key).await;
        // 等锁期间可能已由其他调用创建
        if let Some(app_token) = self.resolve_database(database).await? {
            return Ok(app_token);
        }
        let app_token = self
            .store
            .create_container(database, &self.root.token)
            .await
            .map_err(|e| {
                error!("创建数据库失败: database={}, error={}", database, e);
                e
            })?;
        let app_token = self.cache.store_if_absent(key, app_token);
        info!("创建数据库: {} -> {}", database, app_token);
        Ok(app_token)
    }

    async fn save_table(&self, database: &str, table: &Table) -> BitableDbResult<String> {
        Ok(self.save_table_with_report(database, table).await?.table_id)
    }

    async fn list_tables(&self, database: &str) -> BitableDbResult<Vec<String>> {
        let app_token = self
            .resolve_database(database)
            .await?
            .ok_or_else(|| bitable_error!(database_not_found, database))?;
        let tables = self
            .cache
            .refresh_tables(self.store.as_ref(), database, &app_token)
            .await?;
        Ok(tables.into_iter().map(|t| t.name).collect())
    }

    async fn drop_table(&self, database: &str, table: &str) -> BitableDbResult<()> {
        let (app_token, table_id) = self.require_table(database, table).await?;
        self.store
            .delete_table(&app_token, &table_id)
            .await
            .map_err(|e| {
                error!("删除数据表失败: database={}, table={}, error={}", database, table, e);
                e
            })?;
        self.cache.remove(&CacheKey::table(database, table));
        info!("删除数据表: {}.{}", database, table);
        Ok(())
    }

    async fn create(&self, database: &str, table: &str, record: Record) -> BitableDbResult<String> {
        let (app_token, table_id) = self.require_table(database, table).await?;
        let mapper = self.load_mapper(&app_token, &table_id).await;

        let payload = mapper.create_payload(record);
        let record_id = self
            .store
            .create_record(&app_token, &table_id, &payload)
            .await
            .map_err(|e| {
                error!("创建记录失败: database={}, table={}, error={}", database, table, e);
                e
            })?;
        debug!("创建记录: {}.{} -> {}", database, table, record_id);

        if let Some(stamp) = mapper.stamp_payload(&record_id) {
            if let Err(e) = self
                .store
                .update_record(&app_token, &table_id, &record_id, &stamp)
                .await
            {
                warn!(
                    "记录 {} 已创建但回填 id 失败，可调用 repair_id_stamps 补齐: {}",
                    record_id, e
                );
            }
        }
        Ok(record_id)
    }

    async fn read(
        &self,
        database: &str,
        table: &str,
        conditions: &[SearchCmd],
    ) -> BitableDbResult<Vec<Record>> {
        let (app_token, table_id) = self.require_table(database, table).await?;
        let filter = translate(conditions);
        debug!("读取记录: {}.{}, filter={}", database, table, filter);

        let mapper = RecordMapper::default();
        Ok(self
            .list_all_records(&app_token, &table_id, filter)
            .await?
            .into_iter()
            .map(|remote| mapper.from_remote(remote))
            .collect())
    }

    async fn update(
        &self,
        database: &str,
        table: &str,
        id: &str,
        record: Record,
    ) -> BitableDbResult<()> {
        let (app_token, table_id) = self.require_table(database, table).await?;
        let mapper = self.load_mapper(&app_token, &table_id).await;

        let payload = mapper.update_payload(id, record);
        self.store
            .update_record(&app_token, &table_id, id, &payload)
            .await
            .map_err(|e| {
                error!("更新记录失败: database={}, table={}, id={}, error={}", database, table, id, e);
                e
            })
    }

    async fn delete(&self, database: &str, table: &str, id: &str) -> BitableDbResult<()> {
        let (app_token, table_id) = self.require_table(database, table).await?;
        self.store
            .delete_record(&app_token, &table_id, id)
            .await
            .map_err(|e| {
                error!("删除记录失败: database={}, table={}, id={}, error={}", database, table, id, e);
                e
            })
    }
}
