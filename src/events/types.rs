//! 上传事件类型定义
//!
//! 队列、传输、统计三类事件统一走一个枚举，订阅方按 `event_type` 区分

use crate::uploader::{ProgressSnapshot, TransferStatus};
use serde::{Deserialize, Serialize};

/// 提示级别（对应界面上的短暂通知）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// 上传事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 条目入队
    Enqueued {
        item_id: String,
        file_name: String,
        size: u64,
    },
    /// 状态变更
    StatusChanged {
        item_id: String,
        old_status: TransferStatus,
        new_status: TransferStatus,
    },
    /// 上传完成
    Completed {
        item_id: String,
        file_name: String,
        size: u64,
        /// KB/s
        speed: f64,
        completed_at: i64,
    },
    /// 上传失败
    Failed {
        item_id: String,
        file_name: String,
        error: String,
    },
    /// 条目被取消
    Cancelled { item_id: String },
    /// 条目从等待队列移除（清空队列）
    Removed { item_id: String },
    /// 队列数量变化
    QueueCountChanged { pending: usize, active: usize },
    /// 暂停接纳
    Paused,
    /// 恢复接纳
    Resumed,
    /// 一批上传结束（等待队列和活跃集合同时为空）
    BatchFinished {
        completed: usize,
        failed: usize,
        cancelled: usize,
    },
    /// 提示信息
    Notice { level: NoticeLevel, message: String },
    /// 周期统计
    Stats { snapshot: ProgressSnapshot },
}

impl UploadEvent {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        UploadEvent::Notice {
            level,
            message: message.into(),
        }
    }

    /// 获取条目 ID（队列级事件返回 None）
    pub fn item_id(&self) -> Option<&str> {
        match self {
            UploadEvent::Enqueued { item_id, .. }
            | UploadEvent::StatusChanged { item_id, .. }
            | UploadEvent::Completed { item_id, .. }
            | UploadEvent::Failed { item_id, .. }
            | UploadEvent::Cancelled { item_id }
            | UploadEvent::Removed { item_id } => Some(item_id),
            _ => None,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::Enqueued { .. } => "enqueued",
            UploadEvent::StatusChanged { .. } => "status_changed",
            UploadEvent::Completed { .. } => "completed",
            UploadEvent::Failed { .. } => "failed",
            UploadEvent::Cancelled { .. } => "cancelled",
            UploadEvent::Removed { .. } => "removed",
            UploadEvent::QueueCountChanged { .. } => "queue_count_changed",
            UploadEvent::Paused => "paused",
            UploadEvent::Resumed => "resumed",
            UploadEvent::BatchFinished { .. } => "batch_finished",
            UploadEvent::Notice { .. } => "notice",
            UploadEvent::Stats { .. } => "stats",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_tagged() {
        let event = UploadEvent::StatusChanged {
            item_id: "file_1_abc".to_string(),
            old_status: TransferStatus::Pending,
            new_status: TransferStatus::Uploading,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "status_changed");
        assert_eq!(json["old_status"], "pending");
        assert_eq!(json["new_status"], "uploading");

        let json = serde_json::to_value(UploadEvent::Paused).unwrap();
        assert_eq!(json["event_type"], "paused");
    }

    #[test]
    fn test_helpers() {
        let event = UploadEvent::Cancelled {
            item_id: "file_2".to_string(),
        };
        assert_eq!(event.item_id(), Some("file_2"));
        assert_eq!(event.event_type_name(), "cancelled");

        let event = UploadEvent::QueueCountChanged { pending: 1, active: 2 };
        assert_eq!(event.item_id(), None);
        assert_eq!(event.event_type_name(), "queue_count_changed");
    }
}
