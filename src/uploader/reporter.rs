//! 进度汇报
//!
//! 从队列快照推导展示用的汇总信息：总体百分比、速度文本、
//! 当前条目的已用/剩余时间、队列数量。
//!
//! `ProgressReporter::spawn` 启动固定间隔的统计循环，每个 tick 发布一次
//! `UploadEvent::Stats`，队列空闲（等待和活跃都为空）时自动退出。

use super::queue::{QueueManager, QueueSnapshot};
use super::task::{TransferItem, TransferStatus};
use crate::events::UploadEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 速度文本：1024 KB/s 以下显示 KB/s（取整），否则显示 MB/s（一位小数）
pub fn format_speed(speed_kbps: f64) -> String {
    if speed_kbps < 1024.0 {
        format!("{} KB/s", speed_kbps.round() as i64)
    } else {
        format!("{:.1} MB/s", speed_kbps / 1024.0)
    }
}

/// 时间文本：`45s`、`2m 5s`、`1h 3m`
pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        format!("{}s", seconds.round() as u64)
    } else if seconds < 3600.0 {
        format!(
            "{}m {}s",
            (seconds / 60.0).floor() as u64,
            (seconds % 60.0).round() as u64
        )
    } else {
        format!(
            "{}h {}m",
            (seconds / 3600.0).floor() as u64,
            ((seconds % 3600.0) / 60.0).floor() as u64
        )
    }
}

/// 大小文本：`0 Bytes`、`512 Bytes`、`1.5 KB`、`2 MB`（最多两位小数）
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

/// 速度评级（界面配色用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedRating {
    Excellent,
    Good,
    Medium,
    Slow,
    Poor,
}

impl SpeedRating {
    pub fn from_speed(speed_kbps: f64) -> Self {
        if speed_kbps > 5000.0 {
            SpeedRating::Excellent
        } else if speed_kbps > 1000.0 {
            SpeedRating::Good
        } else if speed_kbps > 500.0 {
            SpeedRating::Medium
        } else if speed_kbps > 100.0 {
            SpeedRating::Slow
        } else {
            SpeedRating::Poor
        }
    }
}

/// 当前展示条目的进度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemProgress {
    pub item_id: String,
    pub file_name: String,
    pub status: TransferStatus,
    pub progress: f64,
    pub uploaded_bytes: u64,
    pub size: u64,
    /// "已上传 / 总大小"
    pub size_text: String,
    pub elapsed_secs: Option<f64>,
    pub elapsed_text: Option<String>,
    /// 进度为 0 时为 None
    pub remaining_secs: Option<f64>,
    pub remaining_text: Option<String>,
}

impl ItemProgress {
    pub fn from_item(item: &TransferItem, now_millis: i64) -> Self {
        let elapsed_secs = item.elapsed_secs(now_millis);
        let remaining_secs = item.remaining_secs(now_millis);
        Self {
            item_id: item.id.clone(),
            file_name: item.name().to_string(),
            status: item.status,
            progress: item.progress,
            uploaded_bytes: item.uploaded_bytes,
            size: item.size(),
            size_text: format!(
                "{} / {}",
                format_file_size(item.uploaded_bytes),
                format_file_size(item.size())
            ),
            elapsed_text: elapsed_secs.map(format_time),
            elapsed_secs,
            remaining_text: remaining_secs.map(format_time),
            remaining_secs,
        }
    }
}

/// 一次统计结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub pending: usize,
    pub active: usize,
    /// pending + active
    pub queue_count: usize,
    pub paused: bool,
    pub total_bytes_expected: u64,
    pub total_bytes_transferred: u64,
    /// 0-100
    pub overall_percent: f64,
    /// KB/s
    pub current_speed: f64,
    pub average_speed: f64,
    pub peak_speed: f64,
    pub current_speed_text: String,
    pub average_speed_text: String,
    pub peak_speed_text: String,
    pub speed_rating: SpeedRating,
    pub current_item: Option<ItemProgress>,
}

impl ProgressSnapshot {
    pub fn from_queue(snapshot: &QueueSnapshot, now_millis: i64) -> Self {
        // cancel_all 会清零预期字节，剩余等待条目完成后已传字节可能超过预期
        let overall_percent = if snapshot.total_bytes_expected == 0 {
            0.0
        } else {
            (snapshot.total_bytes_transferred as f64 / snapshot.total_bytes_expected as f64
                * 100.0)
                .min(100.0)
        };

        Self {
            pending: snapshot.pending,
            active: snapshot.active,
            queue_count: snapshot.pending + snapshot.active,
            paused: snapshot.paused,
            total_bytes_expected: snapshot.total_bytes_expected,
            total_bytes_transferred: snapshot.total_bytes_transferred,
            overall_percent,
            current_speed: snapshot.current_speed,
            average_speed: snapshot.average_speed,
            peak_speed: snapshot.peak_speed,
            current_speed_text: format_speed(snapshot.current_speed),
            average_speed_text: format_speed(snapshot.average_speed),
            peak_speed_text: format_speed(snapshot.peak_speed),
            speed_rating: SpeedRating::from_speed(snapshot.current_speed),
            current_item: snapshot
                .current_item
                .as_ref()
                .map(|item| ItemProgress::from_item(item, now_millis)),
        }
    }

    /// 总体百分比（取整）
    pub fn overall_percent_text(&self) -> String {
        format!("{}%", self.overall_percent.round() as u64)
    }
}

/// 进度汇报器
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    queue: QueueManager,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(queue: QueueManager, interval: Duration) -> Self {
        Self {
            queue,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// 立即计算一次统计
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::from_queue(
            &self.queue.snapshot(),
            chrono::Utc::now().timestamp_millis(),
        )
    }

    /// 启动统计循环，队列空闲或取消令牌触发时退出
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    async fn run(self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!("统计循环启动: 间隔 {:?}", self.interval);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("统计循环已取消");
                    break;
                }
                _ = ticker.tick() => {
                    if self.queue.is_idle() {
                        debug!("队列空闲，统计循环退出");
                        break;
                    }
                    let snapshot = self.snapshot();
                    self.queue.events().publish(UploadEvent::Stats { snapshot });
                }
            }
        }
    }
}
