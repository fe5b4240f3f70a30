//! 标识缓存
//!
//! 缓存 数据库名 -> app token 以及 (数据库名, 表名) -> 表 ID 的映射。
//! 未命中时回源查询远端并回填；条目只增不减，只有删表时才显式移除。
//! 同一键上的"查找-创建"通过创建锁串行执行，并发创建同名对象时只有一个调用会真正创建。

use crate::adapter::{RemoteStore, RemoteTable};
use crate::error::BitableDbResult;
use dashmap::DashMap;
use rat_logger::debug;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// 数据库名
    Database(String),
    /// 数据库名 + 表名
    Table { database: String, table: String },
}

impl CacheKey {
    pub fn database(database: &str) -> Self {
        CacheKey::Database(database.to_string())
    }

    pub fn table(database: &str, table: &str) -> Self {
        CacheKey::Table {
            database: database.to_string(),
            table: table.to_string(),
        }
    }
}

/// 并发安全的标识缓存，由每个 `BitableDb` 实例持有
#[derive(Debug, Default)]
pub struct IdentifierCache {
    entries: DashMap<CacheKey, String>,
    creation_locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            creation_locks: DashMap::new(),
        }
    }

    /// 读取缓存
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// 写入缓存，同名对象总是映射到同一个远端 ID，重复写入是幂等的
    pub fn store(&self, key: CacheKey, id: impl Into<String>) {
        self.entries.insert(key, id.into());
    }

    /// 仅在键不存在时写入，返回缓存中最终生效的 ID
    pub fn store_if_absent(&self, key: CacheKey, id: impl Into<String>) -> String {
        self.entries.entry(key).or_insert_with(|| id.into()).value().clone()
    }

    /// 获取键对应的创建锁，持有期间同一键上的其他创建流程等待
    pub async fn creation_lock(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let lock = self
            .creation_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// 移除缓存
    pub fn remove(&self, key: &CacheKey) -> Option<String> {
        self.entries.remove(key).map(|(_, id)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 解析数据库：先查缓存，未命中时在根文件夹下按名称查找
    pub async fn resolve_database(
        &self,
        store: &dyn RemoteStore,
        root_token: &str,
        database: &str,
    ) -> BitableDbResult<Option<String>> {
        let key = CacheKey::database(database);
        if let Some(id) = self.get(&key) {
            debug!("数据库缓存命中: {} -> {}", database, id);
            return Ok(Some(id));
        }

        debug!("数据库缓存未命中，查询远端: {}", database);
        let found = store.find_container_by_name(database, root_token).await?;
        if let Some(id) = &found {
            self.store(key, id.clone());
        }
        Ok(found)
    }

    /// 解析数据表：先查缓存，未命中时拉取该数据库的全部数据表并整体回填
    pub async fn resolve_table(
        &self,
        store: &dyn RemoteStore,
        database: &str,
        app_token: &str,
        table: &str,
    ) -> BitableDbResult<Option<String>> {
        let key = CacheKey::table(database, table);
        if let Some(id) = self.get(&key) {
            debug!("数据表缓存命中: {}.{} -> {}", database, table, id);
            return Ok(Some(id));
        }

        debug!("数据表缓存未命中，刷新表列表: {}.{}", database, table);
        let tables = self.refresh_tables(store, database, app_token).await?;
        Ok(tables
            .into_iter()
            .find(|t| t.name == table)
            .map(|t| t.table_id))
    }

    /// 拉取数据库下的全部数据表并写入缓存
    pub async fn refresh_tables(
        &self,
        store: &dyn RemoteStore,
        database: &str,
        app_token: &str,
    ) -> BitableDbResult<Vec<RemoteTable>> {
        let tables = store.list_tables(app_token).await?;
        for table in &tables {
            self.store(CacheKey::table(database, &table.name), table.table_id.clone());
        }
        Ok(tables)
    }
}
