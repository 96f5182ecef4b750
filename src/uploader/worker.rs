//! 传输执行器
//!
//! 每个被接纳的条目启动一个 tokio 任务：
//! 1. 读取内容（内存或本地文件）
//! 2. 在阻塞线程池中做 base64 编码
//! 3. 整条记录一次写入 users/{uid}/files/{itemId}
//! 4. 以写入耗时计算速度，回报队列
//!
//! 任何一步失败都转为条目级的 Failed 结果，不重试，不影响队列。
//! 取消令牌触发时立即放弃当前步骤并回报 Aborted。

use super::queue::{QueueManager, TransferDispatcher, TransferJob, TransferOutcome};
use crate::auth::UserHandle;
use crate::error::{StoreError, VaultError, VaultResult};
use crate::library::StoredFile;
use crate::store::{user_item_path, KeyValueStore, UserCollection};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info};

/// 最小计时（秒），避免极快写入时除零
const MIN_ELAPSED_SECS: f64 = 0.001;

/// 传输执行器
#[derive(Clone)]
pub struct TransferWorker {
    /// 数据库句柄，未初始化时为 None
    store: Option<Arc<dyn KeyValueStore>>,
    /// 当前登录用户
    auth_state: watch::Receiver<Option<UserHandle>>,
}

impl TransferWorker {
    pub fn new(
        store: Option<Arc<dyn KeyValueStore>>,
        auth_state: watch::Receiver<Option<UserHandle>>,
    ) -> Self {
        Self { store, auth_state }
    }

    /// 执行一个条目，结果总会转换为 TransferOutcome
    pub async fn run(&self, job: &TransferJob) -> TransferOutcome {
        tokio::select! {
            biased;
            _ = job.cancel_token.cancelled() => {
                info!("上传已取消: {} ({})", job.payload.name, job.item_id);
                TransferOutcome::Aborted
            }
            result = self.execute(job) => match result {
                Ok(speed) => TransferOutcome::Completed {
                    bytes: job.payload.size,
                    speed,
                },
                Err(e) => TransferOutcome::Failed {
                    error: e.to_string(),
                },
            },
        }
    }

    /// 读取、编码、写入，返回速度（KB/s）
    async fn execute(&self, job: &TransferJob) -> VaultResult<f64> {
        let payload = &job.payload;

        let bytes = payload
            .read_bytes()
            .await
            .map_err(|e| VaultError::Transfer(format!("读取文件失败: {}", e)))?;

        // 大小校验和字节统计都基于入队时的大小
        if bytes.len() as u64 != payload.size {
            return Err(VaultError::Transfer(format!(
                "文件在入队后被修改: {} (入队时 {} 字节, 当前 {} 字节)",
                payload.name,
                payload.size,
                bytes.len()
            )));
        }

        let data = tokio::task::spawn_blocking(move || {
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes)
        })
        .await
        .map_err(|e| VaultError::Transfer(format!("编码任务执行失败: {}", e)))?;
        debug!("编码完成: {} ({} 字符)", payload.name, data.len());

        let (store, uid) = self.target()?;
        let record = StoredFile::new(job.item_id.clone(), payload, data);
        let value = serde_json::to_value(&record).map_err(StoreError::from)?;

        let started = Instant::now();
        store
            .write(&user_item_path(&uid, UserCollection::Files, &job.item_id), value)
            .await?;
        let elapsed = started.elapsed().as_secs_f64().max(MIN_ELAPSED_SECS);

        Ok(payload.size as f64 / 1024.0 / elapsed)
    }

    /// 写入目标：数据库句柄 + 当前用户 ID
    fn target(&self) -> VaultResult<(Arc<dyn KeyValueStore>, String)> {
        let uid = self
            .auth_state
            .borrow()
            .as_ref()
            .map(|user| user.uid.clone());

        match (&self.store, uid) {
            (Some(store), Some(uid)) => Ok((store.clone(), uid)),
            _ => Err(VaultError::StoreUnavailable),
        }
    }
}

impl TransferDispatcher for TransferWorker {
    fn dispatch(&self, job: TransferJob, queue: QueueManager) {
        let worker = self.clone();
        tokio::spawn(async move {
            let outcome = worker.run(&job).await;
            queue.on_item_terminal(&job.item_id, outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, UploadEvent};
    use crate::store::MemoryStore;
    use crate::uploader::{FilePayload, TransferItem, TransferStatus};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn job(name: &str, bytes: &[u8]) -> TransferJob {
        TransferJob {
            item_id: "file_1_test".to_string(),
            payload: Arc::new(FilePayload::from_bytes(name, bytes.to_vec())),
            cancel_token: CancellationToken::new(),
        }
    }

    fn signed_in() -> watch::Receiver<Option<UserHandle>> {
        let (tx, rx) = watch::channel(Some(UserHandle::new("u1", "a@royalvault.app")));
        // 发送端丢弃后接收端仍保留最后的值
        drop(tx);
        rx
    }

    #[tokio::test]
    async fn test_run_writes_record() {
        let store = Arc::new(MemoryStore::new());
        let worker = TransferWorker::new(Some(store.clone()), signed_in());

        let outcome = worker.run(&job("hello.txt", b"hello")).await;
        match outcome {
            TransferOutcome::Completed { bytes, speed } => {
                assert_eq!(bytes, 5);
                assert!(speed > 0.0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let value = store.read("users/u1/files/file_1_test").await.unwrap().unwrap();
        assert_eq!(value["name"], "hello.txt");
        assert_eq!(value["data"], "aGVsbG8=");
        assert_eq!(value["size"], 5);
        assert_eq!(value["type"], "document");
    }

    #[tokio::test]
    async fn test_missing_user_or_store() {
        let (_tx, rx) = watch::channel(None);
        let worker = TransferWorker::new(Some(Arc::new(MemoryStore::new())), rx);
        assert_eq!(
            worker.run(&job("a.txt", b"x")).await,
            TransferOutcome::Failed {
                error: "Not authenticated or database not initialized".to_string()
            }
        );

        let worker = TransferWorker::new(None, signed_in());
        assert!(matches!(
            worker.run(&job("a.txt", b"x")).await,
            TransferOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_write_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let worker = TransferWorker::new(Some(store.clone()), signed_in());

        assert!(matches!(
            worker.run(&job("a.txt", b"x")).await,
            TransferOutcome::Failed { .. }
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let worker = TransferWorker::new(Some(Arc::new(MemoryStore::new())), signed_in());
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, b"data").unwrap();
        let payload = FilePayload::from_path(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let job = TransferJob {
            item_id: "file_2_test".to_string(),
            payload: Arc::new(payload),
            cancel_token: CancellationToken::new(),
        };
        match worker.run(&job).await {
            TransferOutcome::Failed { error } => assert!(error.contains("读取文件失败")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_changed_after_enqueue_fails() {
        let store = Arc::new(MemoryStore::new());
        let worker = TransferWorker::new(Some(store.clone()), signed_in());
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("grow.txt");
        std::fs::write(&path, b"data").unwrap();
        let payload = FilePayload::from_path(&path).await.unwrap();
        assert_eq!(payload.size, 4);

        // 入队后文件变大
        std::fs::write(&path, vec![1u8; 4096]).unwrap();

        let job = TransferJob {
            item_id: "file_3_test".to_string(),
            payload: Arc::new(payload),
            cancel_token: CancellationToken::new(),
        };
        match worker.run(&job).await {
            TransferOutcome::Failed { error } => {
                assert!(error.contains("入队时 4 字节"), "{}", error);
                assert!(error.contains("当前 4096 字节"), "{}", error);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = Arc::new(MemoryStore::new());
        let worker = TransferWorker::new(Some(store.clone()), signed_in());
        let job = job("a.txt", b"x");
        job.cancel_token.cancel();

        assert_eq!(worker.run(&job).await, TransferOutcome::Aborted);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_reports_to_queue() {
        let store = Arc::new(MemoryStore::new());
        let worker = Arc::new(TransferWorker::new(Some(store.clone()), signed_in()));
        let queue = QueueManager::new(2, EventBus::default(), worker);
        let mut rx = queue.events().subscribe();

        let mut ids = Vec::new();
        for name in ["a.txt", "b.txt", "c.txt"] {
            let item = TransferItem::new(FilePayload::from_bytes(name, vec![7u8; 64]), 256 * 1024);
            ids.push(queue.enqueue(item));
        }
        queue.admit_next();

        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(UploadEvent::BatchFinished { completed, .. }) = rx.recv().await {
                    return completed;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(completed, 3);
        assert_eq!(store.write_count(), 3);
        for id in ids {
            assert_eq!(queue.get_item(&id).unwrap().status, TransferStatus::Completed);
        }
    }
}
