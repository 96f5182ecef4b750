// 上传条目定义
//
// 复用 UploadTask 的设计模式：状态 + mark_* 迁移方法

use super::payload::FilePayload;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 上传条目状态
///
/// pending -> uploading -> {completed | error | cancelled}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Error,
    /// 已取消
    Cancelled,
}

impl TransferStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Error | TransferStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Uploading => "uploading",
            TransferStatus::Completed => "completed",
            TransferStatus::Error => "error",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

/// 生成带前缀的 ID：{prefix}_{毫秒时间戳}_{9 位 base36 随机串}
pub fn generate_id(prefix: &str) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, chrono::Utc::now().timestamp_millis(), suffix)
}

/// 上传条目
#[derive(Debug, Clone)]
pub struct TransferItem {
    /// 条目ID（同时作为数据库中的文件ID）
    pub id: String,
    /// 上传内容
    pub payload: Arc<FilePayload>,
    /// 状态
    pub status: TransferStatus,
    /// 进度 0-100
    pub progress: f64,
    /// 已上传字节
    pub uploaded_bytes: u64,
    /// 声明的分片数，仅用于展示，实际为单次写入
    pub total_chunks: u64,
    /// 创建时间 (Unix 毫秒)
    pub created_at: i64,
    /// 开始上传时间 (Unix 毫秒)
    pub start_time: Option<i64>,
    /// 进入终态时间 (Unix 毫秒)
    pub completed_at: Option<i64>,
    /// 错误信息
    pub error: Option<String>,
}

impl TransferItem {
    /// 创建新的上传条目
    pub fn new(payload: FilePayload, chunk_size: u64) -> Self {
        let total_chunks = if chunk_size == 0 {
            1
        } else {
            payload.size.div_ceil(chunk_size)
        };
        Self {
            id: generate_id("file"),
            payload: Arc::new(payload),
            status: TransferStatus::Pending,
            progress: 0.0,
            uploaded_bytes: 0,
            total_chunks,
            created_at: chrono::Utc::now().timestamp_millis(),
            start_time: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.payload.name
    }

    pub fn size(&self) -> u64 {
        self.payload.size
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) {
        self.status = TransferStatus::Uploading;
        self.start_time = Some(chrono::Utc::now().timestamp_millis());
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self) {
        self.status = TransferStatus::Completed;
        self.progress = 100.0;
        self.uploaded_bytes = self.payload.size;
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) {
        self.status = TransferStatus::Error;
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// 标记为取消
    pub fn mark_cancelled(&mut self) {
        self.status = TransferStatus::Cancelled;
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// 已用时间（秒），未开始为 None
    pub fn elapsed_secs(&self, now_millis: i64) -> Option<f64> {
        self.start_time
            .map(|start| (now_millis - start).max(0) as f64 / 1000.0)
    }

    /// 剩余时间（秒）= elapsed / progress * (100 - progress)
    ///
    /// 进度为 0 时无法估算
    pub fn remaining_secs(&self, now_millis: i64) -> Option<f64> {
        if self.progress <= 0.0 {
            return None;
        }
        let elapsed = self.elapsed_secs(now_millis)?;
        Some(elapsed / self.progress * (100.0 - self.progress))
    }
}
