// 上传模块
//
// 数据流：
// - 调用方校验大小（SizeLimits）后把条目放入队列（QueueManager）
// - 队列按 FIFO 接纳，不超过 max_parallel 个条目同时上传
// - 每个被接纳的条目交给 TransferWorker 执行，结果回报队列并触发下一次接纳
// - 完成的条目向 RateTracker 提供速度样本
// - ProgressReporter 按固定间隔从队列快照推导展示用的统计

pub mod payload;
pub mod queue;
pub mod rate;
pub mod reporter;
pub mod task;
pub mod validation;
pub mod worker;

pub use payload::{guess_mime_type, FileCategory, FilePayload, PayloadSource};
pub use queue::{
    QueueManager, QueueSnapshot, TransferDispatcher, TransferJob, TransferOutcome,
    MAX_HISTORY_ITEMS,
};
pub use rate::{RateTracker, SpeedSample, CURRENT_SPEED_WINDOW, MAX_SPEED_SAMPLES};
pub use reporter::{
    format_file_size, format_speed, format_time, ItemProgress, ProgressReporter,
    ProgressSnapshot, SpeedRating,
};
pub use task::{generate_id, TransferItem, TransferStatus};
pub use validation::SizeLimits;
pub use worker::TransferWorker;
