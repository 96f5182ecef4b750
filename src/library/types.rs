// 文件库数据结构（与数据库中的 JSON 字段一一对应）

use crate::uploader::{FileCategory, FilePayload};
use serde::{Deserialize, Serialize};

fn default_chunks() -> u32 {
    1
}

/// 已上传文件记录，位于 users/{uid}/files/{id}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// 文件ID（读取时以数据库键为准）
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// 文件分类
    #[serde(rename = "type", default = "default_category")]
    pub file_type: FileCategory,
    #[serde(default)]
    pub size: u64,
    /// base64 内容
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub mime_type: String,
    /// 上传时间 (Unix 毫秒)
    #[serde(default)]
    pub uploaded_at: i64,
    /// 固定为 1，单次写入
    #[serde(default = "default_chunks")]
    pub chunks: u32,
    #[serde(default)]
    pub compressed: bool,
}

fn default_category() -> FileCategory {
    FileCategory::Other
}

impl StoredFile {
    /// 由上传内容和编码后的数据构造记录
    pub fn new(id: impl Into<String>, payload: &FilePayload, data: String) -> Self {
        Self {
            id: id.into(),
            name: payload.name.clone(),
            file_type: payload.category(),
            size: payload.size,
            data,
            mime_type: payload.mime_type.clone(),
            uploaded_at: chrono::Utc::now().timestamp_millis(),
            chunks: 1,
            compressed: false,
        }
    }

    /// 解码文件内容
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &self.data)
    }

    /// 下载时使用的 MIME 类型
    pub fn effective_mime_type(&self) -> &str {
        if self.mime_type.is_empty() {
            "application/octet-stream"
        } else {
            &self.mime_type
        }
    }
}

/// 分享链接，位于 users/{uid}/shares/{id}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    /// 分享ID（数据库键，不写入记录本身）
    #[serde(default, skip_serializing)]
    pub id: String,
    pub file_id: String,
    #[serde(default)]
    pub file_name: String,
    pub shareable_url: String,
    /// 生成时间 (Unix 毫秒)
    #[serde(default)]
    pub generated_at: i64,
}

/// 用户上传设置，位于 users/{uid}/settings（单位：字节）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub max_file_size: u64,
    pub chunk_size: u64,
    #[serde(default)]
    pub created_at: i64,
}

/// 按分类统计的文件数量
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct FileStats {
    pub total: usize,
    pub total_size: u64,
    pub code: usize,
    pub document: usize,
    pub image: usize,
    pub video: usize,
    pub other: usize,
}

impl FileStats {
    pub fn from_files(files: &[StoredFile]) -> Self {
        let mut stats = FileStats::default();
        for file in files {
            stats.total += 1;
            stats.total_size += file.size;
            match file.file_type {
                FileCategory::Code => stats.code += 1,
                FileCategory::Document => stats.document += 1,
                FileCategory::Image => stats.image += 1,
                FileCategory::Video => stats.video += 1,
                FileCategory::Other => stats.other += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_file_json_shape() {
        let payload = FilePayload::from_bytes("notes.txt", b"hi".to_vec());
        let record = StoredFile::new("file_1_abc", &payload, "aGk=".to_string());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["id"], "file_1_abc");
        assert_eq!(value["type"], "document");
        assert_eq!(value["mimeType"], "text/plain");
        assert_eq!(value["chunks"], 1);
        assert_eq!(value["compressed"], false);
        assert!(value["uploadedAt"].as_i64().unwrap() > 0);
        assert_eq!(record.decode().unwrap(), b"hi");
    }

    #[test]
    fn test_stored_file_lenient_read() {
        let record: StoredFile =
            serde_json::from_value(json!({"name": "x.bin", "type": "archive"})).unwrap();
        assert_eq!(record.file_type, FileCategory::Other);
        assert_eq!(record.chunks, 1);
        assert_eq!(record.effective_mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_share_link_skips_id() {
        let link = ShareLink {
            id: "share_1_x".to_string(),
            file_id: "file_1".to_string(),
            file_name: "a.txt".to_string(),
            shareable_url: "https://v/share.html?file=file_1&user=u1".to_string(),
            generated_at: 5,
        };
        let value = serde_json::to_value(&link).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["fileId"], "file_1");
        assert_eq!(value["shareableUrl"], "https://v/share.html?file=file_1&user=u1");
    }

    #[test]
    fn test_file_stats() {
        let make = |name: &str, size: u64| StoredFile {
            id: name.to_string(),
            name: name.to_string(),
            file_type: FileCategory::from_file_name(name),
            size,
            data: String::new(),
            mime_type: String::new(),
            uploaded_at: 0,
            chunks: 1,
            compressed: false,
        };
        let stats = FileStats::from_files(&[make("a.py", 1), make("b.png", 2), make("c.png", 3)]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.total_size, 6);
        assert_eq!(stats.code, 1);
        assert_eq!(stats.image, 2);
    }
}
