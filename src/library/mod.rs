//! 文件库与分享链接
//!
//! 已上传文件的列表、搜索、分类过滤、下载、删除，以及分享链接的
//! 生成、列出、删除。全部操作都直接读写 `KeyValueStore`。
//!
//! 删除文件时顺带删除指向它的分享链接，这一步是尽力而为：
//! 失败只记录日志，不影响文件删除结果。

mod types;

pub use types::{FileStats, ShareLink, StoredFile, UserSettings};

use crate::config::ShareConfig;
use crate::error::{VaultError, VaultResult};
use crate::store::{user_item_path, user_path, KeyValueStore, UserCollection};
use crate::uploader::{generate_id, FileCategory};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 把集合节点展开为 (键, 记录)，跳过无法解析的子节点
fn children<T: DeserializeOwned>(value: Option<Value>) -> Vec<(String, T)> {
    let Some(Value::Object(map)) = value else {
        return Vec::new();
    };

    map.into_iter()
        .filter_map(|(key, child)| match serde_json::from_value::<T>(child) {
            Ok(record) => Some((key, record)),
            Err(e) => {
                warn!("跳过无法解析的记录 {}: {}", key, e);
                None
            }
        })
        .collect()
}

/// 按文件名或分类搜索（不区分大小写），空查询返回全部
pub fn search_files<'a>(files: &'a [StoredFile], query: &str) -> Vec<&'a StoredFile> {
    let term = query.trim().to_lowercase();
    files
        .iter()
        .filter(|file| {
            term.is_empty()
                || file.name.to_lowercase().contains(&term)
                || file.file_type.as_str().contains(&term)
        })
        .collect()
}

/// 按分类过滤，None 表示全部
pub fn filter_by_type(files: &[StoredFile], category: Option<FileCategory>) -> Vec<&StoredFile> {
    files
        .iter()
        .filter(|file| category.map_or(true, |c| file.file_type == c))
        .collect()
}

/// 文件库
#[derive(Clone)]
pub struct FileLibrary {
    store: Arc<dyn KeyValueStore>,
    share: ShareConfig,
}

impl FileLibrary {
    /// 最近文件默认显示数量
    pub const RECENT_LIMIT: usize = 6;

    pub fn new(store: Arc<dyn KeyValueStore>, share: ShareConfig) -> Self {
        Self { store, share }
    }

    /// 列出全部文件，按上传时间倒序
    pub async fn list_files(&self, uid: &str) -> VaultResult<Vec<StoredFile>> {
        let value = self
            .store
            .read(&user_path(uid, UserCollection::Files))
            .await?;

        let mut files: Vec<StoredFile> = children(value)
            .into_iter()
            .map(|(key, mut file): (String, StoredFile)| {
                file.id = key;
                file
            })
            .collect();
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        debug!("加载文件列表: uid={}, {} 个文件", uid, files.len());
        Ok(files)
    }

    /// 最近上传的文件
    pub async fn recent_files(&self, uid: &str, limit: usize) -> VaultResult<Vec<StoredFile>> {
        let mut files = self.list_files(uid).await?;
        files.truncate(limit);
        Ok(files)
    }

    /// 按分类统计
    pub async fn stats(&self, uid: &str) -> VaultResult<FileStats> {
        Ok(FileStats::from_files(&self.list_files(uid).await?))
    }

    /// 读取单个文件
    pub async fn get_file(&self, uid: &str, file_id: &str) -> VaultResult<StoredFile> {
        let value = self
            .store
            .read(&user_item_path(uid, UserCollection::Files, file_id))
            .await?
            .ok_or_else(|| VaultError::FileNotFound(file_id.to_string()))?;

        let mut file: StoredFile =
            serde_json::from_value(value).map_err(crate::error::StoreError::from)?;
        file.id = file_id.to_string();
        Ok(file)
    }

    /// 下载：读取记录并解码内容
    pub async fn download(&self, uid: &str, file_id: &str) -> VaultResult<(StoredFile, Vec<u8>)> {
        let file = self.get_file(uid, file_id).await?;
        let bytes = file.decode()?;
        Ok((file, bytes))
    }

    /// 下载到本地目录，返回写入的文件路径
    pub async fn download_to(&self, uid: &str, file_id: &str, dir: &Path) -> VaultResult<PathBuf> {
        let (file, bytes) = self.download(uid, file_id).await?;

        // 只取文件名部分，防止记录中的名字带路径
        let name = Path::new(&file.name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| file.id.clone().into());
        let target = dir.join(name);

        tokio::fs::write(&target, &bytes).await?;
        info!("已下载: {} -> {:?}", file.name, target);
        Ok(target)
    }

    /// 删除文件并清理指向它的分享链接，返回清理的分享数量
    pub async fn delete_file(&self, uid: &str, file_id: &str) -> VaultResult<usize> {
        let file = self.get_file(uid, file_id).await?;
        self.store
            .remove(&user_item_path(uid, UserCollection::Files, file_id))
            .await?;
        info!("已删除文件: {} ({})", file.name, file_id);

        Ok(self.delete_file_shares(uid, file_id).await)
    }

    async fn delete_file_shares(&self, uid: &str, file_id: &str) -> usize {
        let shares = match self.list_shares(uid).await {
            Ok(shares) => shares,
            Err(e) => {
                warn!("读取分享链接失败，跳过清理: {}", e);
                return 0;
            }
        };

        let paths: Vec<String> = shares
            .iter()
            .filter(|share| share.file_id == file_id)
            .map(|share| user_item_path(uid, UserCollection::Shares, &share.id))
            .collect();

        let results =
            futures::future::join_all(paths.iter().map(|path| self.store.remove(path))).await;

        let mut removed = 0;
        for (path, result) in paths.iter().zip(results) {
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("删除分享链接失败 {}: {}", path, e),
            }
        }
        removed
    }

    /// 分享地址：{origin}/share.html?file={id}&user={uid}
    pub fn share_url(&self, uid: &str, file_id: &str) -> String {
        format!(
            "{}/share.html?file={}&user={}",
            self.share.origin.trim_end_matches('/'),
            file_id,
            uid
        )
    }

    /// 为文件生成分享链接并保存
    pub async fn create_share(&self, uid: &str, file_id: &str) -> VaultResult<ShareLink> {
        if !self.share.enabled {
            return Err(VaultError::Disabled("File sharing is disabled"));
        }

        let file = self.get_file(uid, file_id).await?;
        let link = ShareLink {
            id: generate_id("share"),
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            shareable_url: self.share_url(uid, &file.id),
            generated_at: chrono::Utc::now().timestamp_millis(),
        };

        let value = serde_json::to_value(&link).map_err(crate::error::StoreError::from)?;
        self.store
            .write(&user_item_path(uid, UserCollection::Shares, &link.id), value)
            .await?;

        info!("已生成分享链接: {} -> {}", file.name, link.shareable_url);
        Ok(link)
    }

    /// 列出分享链接，按生成时间倒序
    pub async fn list_shares(&self, uid: &str) -> VaultResult<Vec<ShareLink>> {
        let value = self
            .store
            .read(&user_path(uid, UserCollection::Shares))
            .await?;

        let mut shares: Vec<ShareLink> = children(value)
            .into_iter()
            .map(|(key, mut share): (String, ShareLink)| {
                share.id = key;
                share
            })
            .collect();
        shares.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(shares)
    }

    pub async fn delete_share(&self, uid: &str, share_id: &str) -> VaultResult<()> {
        self.store
            .remove(&user_item_path(uid, UserCollection::Shares, share_id))
            .await?;
        info!("已删除分享链接: {}", share_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::uploader::FilePayload;

    async fn seed(store: &MemoryStore, uid: &str, id: &str, name: &str, uploaded_at: i64) {
        let payload = FilePayload::from_bytes(name, name.as_bytes().to_vec());
        let data = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            name.as_bytes(),
        );
        let mut record = StoredFile::new(id, &payload, data);
        record.uploaded_at = uploaded_at;
        store
            .write(
                &user_item_path(uid, UserCollection::Files, id),
                serde_json::to_value(&record).unwrap(),
            )
            .await
            .unwrap();
    }

    fn library(store: Arc<MemoryStore>) -> FileLibrary {
        FileLibrary::new(
            store,
            ShareConfig {
                enabled: true,
                origin: "https://vault.test/".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_list_sorted_and_search() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "u1", "f1", "Report.pdf", 100).await;
        seed(&store, "u1", "f2", "main.py", 300).await;
        seed(&store, "u1", "f3", "photo.png", 200).await;

        let lib = library(store);
        let files = lib.list_files("u1").await.unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f2", "f3", "f1"]);

        assert_eq!(search_files(&files, "REPORT").len(), 1);
        // 按分类名匹配
        assert_eq!(search_files(&files, "image")[0].id, "f3");
        assert_eq!(search_files(&files, "  ").len(), 3);
        assert_eq!(filter_by_type(&files, Some(FileCategory::Code))[0].id, "f2");
        assert_eq!(filter_by_type(&files, None).len(), 3);

        assert!(lib.list_files("nobody").await.unwrap().is_empty());
        assert_eq!(lib.recent_files("u1", 2).await.unwrap().len(), 2);
        assert_eq!(lib.stats("u1").await.unwrap().document, 1);
    }

    #[tokio::test]
    async fn test_download_decodes() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "u1", "f1", "hello.txt", 1).await;
        let lib = library(store);

        let (file, bytes) = lib.download("u1", "f1").await.unwrap();
        assert_eq!(file.name, "hello.txt");
        assert_eq!(bytes, b"hello.txt");

        let dir = tempfile::TempDir::new().unwrap();
        let path = lib.download_to("u1", "f1", dir.path()).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello.txt");

        let err = lib.download("u1", "missing").await.unwrap_err();
        assert!(matches!(err, VaultError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_share_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "u1", "f1", "a.txt", 1).await;
        seed(&store, "u1", "f2", "b.txt", 2).await;
        let lib = library(store.clone());

        let link = lib.create_share("u1", "f1").await.unwrap();
        assert!(link.id.starts_with("share_"));
        assert_eq!(link.shareable_url, "https://vault.test/share.html?file=f1&user=u1");
        lib.create_share("u1", "f1").await.unwrap();
        let other = lib.create_share("u1", "f2").await.unwrap();
        assert_eq!(lib.list_shares("u1").await.unwrap().len(), 3);

        // 删除文件时清理它的两个分享链接
        assert_eq!(lib.delete_file("u1", "f1").await.unwrap(), 2);
        let remaining = lib.list_shares("u1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, other.id);

        lib.delete_share("u1", &other.id).await.unwrap();
        assert!(lib.list_shares("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sharing_disabled() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "u1", "f1", "a.txt", 1).await;
        let lib = FileLibrary::new(
            store,
            ShareConfig {
                enabled: false,
                ..ShareConfig::default()
            },
        );
        let err = lib.create_share("u1", "f1").await.unwrap_err();
        assert_eq!(err.to_string(), "File sharing is disabled");
    }
}
