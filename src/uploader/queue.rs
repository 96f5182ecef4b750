//! 上传队列管理
//!
//! 等待队列（FIFO）+ 活跃集合（不超过 max_parallel）。
//!
//! 所有队列状态都在同一把锁里：
//! - 接纳决策在锁内完成，两次接纳不会交错
//! - 锁内只做簿记和事件发布，不跨 await
//! - 派发（启动传输任务）在释放锁之后进行
//!
//! 传输结果通过 `on_item_terminal` 回到队列，随即继续接纳下一个条目；
//! 等待队列和活跃集合同时为空时视为一批结束，重置统计。

use super::payload::FilePayload;
use super::rate::RateTracker;
use super::task::{TransferItem, TransferStatus};
use crate::events::{EventBus, NoticeLevel, UploadEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 已结束条目的保留数量（仅用于查询和展示）
pub const MAX_HISTORY_ITEMS: usize = 100;

/// 派发给传输执行器的任务
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub item_id: String,
    pub payload: Arc<FilePayload>,
    /// 取消令牌，cancel_all 时触发
    pub cancel_token: CancellationToken,
}

/// 传输结果
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// 写入成功
    Completed {
        bytes: u64,
        /// KB/s
        speed: f64,
    },
    /// 读取/编码/写入失败
    Failed { error: String },
    /// 被取消令牌中止
    Aborted,
}

/// 传输执行器
///
/// 被接纳的条目通过它启动传输，执行完成后必须调用
/// `queue.on_item_terminal` 回报结果
pub trait TransferDispatcher: Send + Sync + 'static {
    fn dispatch(&self, job: TransferJob, queue: QueueManager);
}

/// 队列统计快照
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub active: usize,
    pub max_parallel: usize,
    pub paused: bool,
    pub total_bytes_expected: u64,
    pub total_bytes_transferred: u64,
    /// KB/s
    pub current_speed: f64,
    pub average_speed: f64,
    pub peak_speed: f64,
    /// 当前展示的条目（最近一次被接纳的）
    pub current_item: Option<TransferItem>,
}

struct ActiveTransfer {
    item: TransferItem,
    cancel_token: CancellationToken,
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchCounters {
    completed: usize,
    failed: usize,
    cancelled: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<TransferItem>,
    /// 按接纳顺序
    active: Vec<ActiveTransfer>,
    history: VecDeque<TransferItem>,
    total_bytes_expected: u64,
    total_bytes_transferred: u64,
    paused: bool,
    rate: RateTracker,
    current_item: Option<String>,
    batch: BatchCounters,
    /// 自上次结束后是否有新条目入队
    batch_open: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    fn reset_aggregates(&mut self) {
        self.total_bytes_expected = 0;
        self.total_bytes_transferred = 0;
        self.rate.reset();
    }

    fn push_history(&mut self, item: TransferItem) {
        self.history.push_back(item);
        while self.history.len() > MAX_HISTORY_ITEMS {
            self.history.pop_front();
        }
    }

    fn find_item(&self, item_id: &str) -> Option<&TransferItem> {
        self.active
            .iter()
            .map(|a| &a.item)
            .chain(self.pending.iter())
            .chain(self.history.iter().rev())
            .find(|item| item.id == item_id)
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    max_parallel: usize,
    events: EventBus,
    dispatcher: Arc<dyn TransferDispatcher>,
}

/// 上传队列管理器（可廉价克隆，内部共享状态）
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("QueueManager")
            .field("pending", &state.pending.len())
            .field("active", &state.active.len())
            .field("max_parallel", &self.inner.max_parallel)
            .field("paused", &state.paused)
            .finish()
    }
}

impl QueueManager {
    pub fn new(
        max_parallel: usize,
        events: EventBus,
        dispatcher: Arc<dyn TransferDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                max_parallel: max_parallel.max(1),
                events,
                dispatcher,
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn max_parallel(&self) -> usize {
        self.inner.max_parallel
    }

    fn publish_counts(&self, state: &QueueState) {
        self.inner.events.publish(UploadEvent::QueueCountChanged {
            pending: state.pending.len(),
            active: state.active.len(),
        });
    }

    fn publish_status(&self, item_id: &str, old: TransferStatus, new: TransferStatus) {
        self.inner.events.publish(UploadEvent::StatusChanged {
            item_id: item_id.to_string(),
            old_status: old,
            new_status: new,
        });
    }

    /// 一批结束：重置统计并发布 BatchFinished
    fn finish_batch(&self, state: &mut QueueState) {
        if !state.batch_open {
            return;
        }
        let batch = std::mem::take(&mut state.batch);
        state.batch_open = false;
        state.reset_aggregates();
        state.current_item = None;

        info!(
            "✓ 上传批次结束: 成功 {}, 失败 {}, 取消 {}",
            batch.completed, batch.failed, batch.cancelled
        );
        self.inner.events.publish(UploadEvent::BatchFinished {
            completed: batch.completed,
            failed: batch.failed,
            cancelled: batch.cancelled,
        });
    }

    /// 追加到等待队列尾部，返回条目 ID
    ///
    /// 大小校验由调用方在入队前完成；这里不触发接纳
    pub fn enqueue(&self, item: TransferItem) -> String {
        let item_id = item.id.clone();
        let mut state = self.inner.state.lock();

        state.total_bytes_expected += item.size();
        state.batch_open = true;

        debug!("条目入队: {} ({}, {} bytes)", item_id, item.name(), item.size());
        self.inner.events.publish(UploadEvent::Enqueued {
            item_id: item_id.clone(),
            file_name: item.name().to_string(),
            size: item.size(),
        });

        state.pending.push_back(item);
        self.publish_counts(&state);
        item_id
    }

    /// 接纳等待中的条目直到填满并行槽位
    ///
    /// 暂停、没有空闲槽位或没有等待条目时不做任何改动。返回本次接纳数量
    pub fn admit_next(&self) -> usize {
        let jobs = {
            let mut state = self.inner.state.lock();
            let mut jobs = Vec::new();

            while !state.paused && state.active.len() < self.inner.max_parallel {
                let Some(mut item) = state.pending.pop_front() else {
                    break;
                };

                item.mark_uploading();
                let cancel_token = CancellationToken::new();
                self.publish_status(&item.id, TransferStatus::Pending, TransferStatus::Uploading);

                jobs.push(TransferJob {
                    item_id: item.id.clone(),
                    payload: item.payload.clone(),
                    cancel_token: cancel_token.clone(),
                });
                state.current_item = Some(item.id.clone());
                state.active.push(ActiveTransfer { item, cancel_token });
            }

            if !jobs.is_empty() {
                self.publish_counts(&state);
            }
            jobs
        };

        let admitted = jobs.len();
        for job in jobs {
            debug!("派发上传任务: {}", job.item_id);
            self.inner.dispatcher.dispatch(job, self.clone());
        }
        admitted
    }

    /// 传输结束回报
    ///
    /// 条目已不在活跃集合（例如已被 cancel_all）时结果被吸收，不重复计数；
    /// 无论哪种情况都会继续接纳，并在队列清空时结束本批次
    pub fn on_item_terminal(&self, item_id: &str, outcome: TransferOutcome) {
        {
            let mut state = self.inner.state.lock();
            match state.active.iter().position(|a| a.item.id == item_id) {
                None => {
                    debug!("条目 {} 已不在活跃集合，忽略结果: {:?}", item_id, outcome);
                }
                Some(index) => {
                    let ActiveTransfer { mut item, .. } = state.active.remove(index);
                    let old_status = item.status;

                    match outcome {
                        TransferOutcome::Completed { bytes, speed } => {
                            item.mark_completed();
                            state.total_bytes_transferred += bytes;
                            state.rate.record_sample(speed);
                            state.batch.completed += 1;

                            info!("✓ 上传完成: {} ({:.1} KB/s)", item.name(), speed);
                            self.publish_status(&item.id, old_status, item.status);
                            self.inner.events.publish(UploadEvent::Completed {
                                item_id: item.id.clone(),
                                file_name: item.name().to_string(),
                                size: item.size(),
                                speed,
                                completed_at: item.completed_at.unwrap_or_default(),
                            });
                            self.inner.events.publish(UploadEvent::notice(
                                NoticeLevel::Success,
                                format!("Uploaded: {}", item.name()),
                            ));
                        }
                        TransferOutcome::Failed { error } => {
                            warn!("上传失败: {}: {}", item.name(), error);
                            item.mark_failed(error.clone());
                            state.batch.failed += 1;

                            self.publish_status(&item.id, old_status, item.status);
                            self.inner.events.publish(UploadEvent::Failed {
                                item_id: item.id.clone(),
                                file_name: item.name().to_string(),
                                error,
                            });
                            self.inner.events.publish(UploadEvent::notice(
                                NoticeLevel::Error,
                                format!("Upload failed: {}", item.name()),
                            ));
                        }
                        TransferOutcome::Aborted => {
                            item.mark_cancelled();
                            state.batch.cancelled += 1;

                            self.publish_status(&item.id, old_status, item.status);
                            self.inner.events.publish(UploadEvent::Cancelled {
                                item_id: item.id.clone(),
                            });
                        }
                    }

                    state.push_history(item);
                    self.publish_counts(&state);
                }
            }
        }

        self.admit_next();

        let mut state = self.inner.state.lock();
        if state.is_idle() {
            self.finish_batch(&mut state);
        }
    }

    /// 暂停接纳，进行中的传输不受影响
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if state.paused {
            return;
        }
        state.paused = true;
        info!("上传队列已暂停");
        self.inner.events.publish(UploadEvent::Paused);
        self.inner
            .events
            .publish(UploadEvent::notice(NoticeLevel::Info, "Uploads paused"));
    }

    /// 恢复接纳并立即填充空闲槽位，返回接纳数量
    pub fn resume(&self) -> usize {
        {
            let mut state = self.inner.state.lock();
            if state.paused {
                state.paused = false;
                info!("上传队列已恢复");
                self.inner.events.publish(UploadEvent::Resumed);
                self.inner
                    .events
                    .publish(UploadEvent::notice(NoticeLevel::Success, "Uploads resumed"));
            }
        }
        self.admit_next()
    }

    /// 取消活跃集合中的全部条目（触发取消令牌），等待队列不变，统计归零
    ///
    /// 不会接纳新条目。返回取消数量
    pub fn cancel_all(&self) -> usize {
        let mut state = self.inner.state.lock();
        let cancelled = self.cancel_active_locked(&mut state);
        self.inner.events.publish(UploadEvent::notice(
            NoticeLevel::Warning,
            "All uploads cancelled",
        ));
        cancelled
    }

    /// 清空等待队列并取消全部活跃条目，返回移除的等待条目数量
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();

        let removed: Vec<TransferItem> = state.pending.drain(..).collect();
        for item in &removed {
            self.inner.events.publish(UploadEvent::Removed {
                item_id: item.id.clone(),
            });
        }

        self.cancel_active_locked(&mut state);
        info!("上传队列已清空: 移除 {} 个等待条目", removed.len());
        self.inner.events.publish(UploadEvent::notice(
            NoticeLevel::Warning,
            "All uploads cancelled",
        ));
        self.inner
            .events
            .publish(UploadEvent::notice(NoticeLevel::Info, "Upload queue cleared"));
        removed.len()
    }

    fn cancel_active_locked(&self, state: &mut QueueState) -> usize {
        let active: Vec<ActiveTransfer> = state.active.drain(..).collect();
        let cancelled = active.len();

        for ActiveTransfer {
            mut item,
            cancel_token,
        } in active
        {
            cancel_token.cancel();
            let old_status = item.status;
            item.mark_cancelled();
            state.batch.cancelled += 1;

            self.publish_status(&item.id, old_status, item.status);
            self.inner.events.publish(UploadEvent::Cancelled {
                item_id: item.id.clone(),
            });
            state.push_history(item);
        }

        if cancelled > 0 {
            info!("已取消 {} 个进行中的上传", cancelled);
        }

        state.reset_aggregates();
        self.publish_counts(state);
        if state.pending.is_empty() {
            self.finish_batch(state);
        }
        cancelled
    }

    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().is_idle()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    /// 查找条目（等待、活跃或最近结束的）
    pub fn get_item(&self, item_id: &str) -> Option<TransferItem> {
        self.inner.state.lock().find_item(item_id).cloned()
    }

    /// 列出条目：活跃（接纳顺序）、等待（队列顺序）、最近结束（新的在前）
    pub fn items(&self) -> Vec<TransferItem> {
        let state = self.inner.state.lock();
        state
            .active
            .iter()
            .map(|a| a.item.clone())
            .chain(state.pending.iter().cloned())
            .chain(state.history.iter().rev().cloned())
            .collect()
    }

    /// 统计快照（读取当前速度会更新峰值）
    pub fn snapshot(&self) -> QueueSnapshot {
        let mut state = self.inner.state.lock();
        let current_speed = state.rate.current_speed();
        let current_item = state
            .current_item
            .as_deref()
            .and_then(|id| state.find_item(id))
            .cloned();

        QueueSnapshot {
            pending: state.pending.len(),
            active: state.active.len(),
            max_parallel: self.inner.max_parallel,
            paused: state.paused,
            total_bytes_expected: state.total_bytes_expected,
            total_bytes_transferred: state.total_bytes_transferred,
            current_speed,
            average_speed: state.rate.average_speed(),
            peak_speed: state.rate.peak_speed(),
            current_item,
        }
    }
}
