// EM Vault Rust Library
// 文件库客户端核心库：上传队列、速率统计、实时数据库存取

// 认证模块
pub mod auth;

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 事件模块
pub mod events;

// 文件库与分享链接
pub mod library;

// 日志系统
pub mod logging;

// 会话
pub mod session;

// 实时数据库访问
pub mod store;

// 上传模块
pub mod uploader;

// 导出常用类型
pub use auth::{FirebaseAuthClient, IdentityProvider, MemoryIdentityProvider, UserHandle};
pub use config::AppConfig;
pub use error::{StoreError, VaultError, VaultResult};
pub use events::{EventBus, NoticeLevel, UploadEvent};
pub use library::{FileLibrary, ShareLink, StoredFile};
pub use session::{AddFilesReport, VaultSession};
pub use store::{KeyValueStore, MemoryStore, RealtimeDbClient};
pub use uploader::{
    FilePayload, ProgressSnapshot, QueueManager, RateTracker, SizeLimits, TransferItem,
    TransferStatus, TransferWorker,
};
