//! 远端存储适配器模块
//!
//! 定义多维表格服务的原子操作接口，屏蔽传输协议和鉴权细节

use crate::error::BitableDbResult;
use crate::table::FieldType;
use crate::types::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;
mod query_builder;

pub use memory::MemoryStore;
pub use query_builder::*;

/// 云空间中多维表格文件的类型标识
pub const BITABLE_FILE_TYPE: &str = "bitable";

/// 根文件夹元信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFolder {
    /// 根文件夹 token
    pub token: String,
    /// 所有者用户 ID
    pub user_id: String,
}

/// 云空间文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFile {
    pub name: String,
    pub parent_token: String,
    pub token: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

/// 文件夹分页结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilePage {
    pub files: Vec<DriveFile>,
    pub has_more: bool,
    pub page_token: Option<String>,
}

/// 远端字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteField {
    pub field_id: String,
    pub field_name: String,
    /// 远端字段类型编码，可能包含本库不支持的类型
    pub field_type: i32,
}

/// 远端数据表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTable {
    pub table_id: String,
    pub name: String,
}

/// 远端记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub record_id: String,
    pub fields: Record,
}

/// 记录列表请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRecordsRequest {
    /// 过滤表达式，空字符串表示不过滤
    pub filter: String,
    /// 分页大小
    pub page_size: u32,
    /// 分页标记
    pub page_token: Option<String>,
}

/// 记录分页结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub items: Vec<RemoteRecord>,
    pub has_more: bool,
    pub page_token: Option<String>,
}

/// 远端存储trait，定义多维表格服务的原子操作
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 查询根文件夹
    async fn root_folder(&self) -> BitableDbResult<RootFolder>;

    /// 在文件夹下创建多维表格，返回 app token
    async fn create_container(&self, name: &str, parent_token: &str) -> BitableDbResult<String>;

    /// 分页列出文件夹下的文件
    async fn list_files(
        &self,
        folder_token: &str,
        page_token: Option<&str>,
    ) -> BitableDbResult<FilePage>;

    /// 列出字段
    async fn list_fields(&self, app_token: &str, table_id: &str) -> BitableDbResult<Vec<RemoteField>>;

    /// 创建字段，返回字段 ID
    async fn create_field(
        &self,
        app_token: &str,
        table_id: &str,
        name: &str,
        field_type: FieldType,
    ) -> BitableDbResult<String>;

    /// 更新字段名和类型
    async fn update_field(
        &self,
        app_token: &str,
        table_id: &str,
        field_id: &str,
        name: &str,
        field_type: FieldType,
    ) -> BitableDbResult<()>;

    /// 删除字段
    async fn delete_field(&self, app_token: &str, table_id: &str, field_id: &str) -> BitableDbResult<()>;

    /// 创建数据表，返回表 ID
    async fn create_table(&self, app_token: &str, name: &str) -> BitableDbResult<String>;

    /// 列出数据表
    async fn list_tables(&self, app_token: &str) -> BitableDbResult<Vec<RemoteTable>>;

    /// 删除数据表
    async fn delete_table(&self, app_token: &str, table_id: &str) -> BitableDbResult<()>;

    /// 创建记录，返回记录 ID
    async fn create_record(
        &self,
        app_token: &str,
        table_id: &str,
        fields: &Record,
    ) -> BitableDbResult<String>;

    /// 分页列出记录
    async fn list_records(
        &self,
        app_token: &str,
        table_id: &str,
        request: &ListRecordsRequest,
    ) -> BitableDbResult<RecordPage>;

    /// 更新记录
    async fn update_record(
        &self,
        app_token: &str,
        table_id: &str,
        record_id: &str,
        fields: &Record,
    ) -> BitableDbResult<()>;

    /// 删除记录
    async fn delete_record(&self, app_token: &str, table_id: &str, record_id: &str) -> BitableDbResult<()>;

    /// 按名称在文件夹下查找多维表格，只有类型为多维表格的文件才算命中
    async fn find_container_by_name(
        &self,
        name: &str,
        parent_token: &str,
    ) -> BitableDbResult<Option<String>> {
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_files(parent_token, page_token.as_deref()).await?;
            if let Some(file) = page
                .files
                .iter()
                .find(|f| f.name == name && f.file_type == BITABLE_FILE_TYPE)
            {
                return Ok(Some(file.token.clone()));
            }
            match page.page_token {
                Some(next) if page.has_more => page_token = Some(next),
                _ => return Ok(None),
            }
        }
    }
}
