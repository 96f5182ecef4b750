//! 实时数据库访问
//!
//! 核心只依赖 `KeyValueStore` 的四个操作；路径按
//! `users/{uid}/{files|settings|profile|shares}/{id}` 组织。
//! 多个路径之间没有事务保证（删除文件和删除分享是两次独立操作）。

mod memory;
mod realtime;

pub use memory::MemoryStore;
pub use realtime::RealtimeDbClient;

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;

/// 外部键值存储
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 覆盖写入
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// 合并更新（只覆盖给出的字段）
    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError>;

    /// 读取，不存在返回 None
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// 删除
    async fn remove(&self, path: &str) -> Result<(), StoreError>;
}

/// 用户数据分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCollection {
    Files,
    Settings,
    Profile,
    Shares,
}

impl UserCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserCollection::Files => "files",
            UserCollection::Settings => "settings",
            UserCollection::Profile => "profile",
            UserCollection::Shares => "shares",
        }
    }
}

/// users/{uid}/{collection}
pub fn user_path(uid: &str, collection: UserCollection) -> String {
    format!("users/{}/{}", uid, collection.as_str())
}

/// users/{uid}/{collection}/{id}
pub fn user_item_path(uid: &str, collection: UserCollection, id: &str) -> String {
    format!("{}/{}", user_path(uid, collection), id)
}

/// 拆分并校验路径
///
/// Firebase 键不允许包含 . $ # [ ]，也不允许空段
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let invalid = segments.iter().any(|s| {
        s.is_empty() || s.contains(|c| matches!(c, '.' | '$' | '#' | '[' | ']'))
    });
    if invalid {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
