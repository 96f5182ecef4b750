//! 会话
//!
//! `VaultSession` 持有一次登录会话需要的全部状态：身份服务、数据库句柄、
//! 事件总线、上传队列、大小限制和统计循环。没有全局单例，
//! 构造时队列为空、统计归零；`shutdown` 停止统计循环并清空队列。

use crate::auth::{derive_vault_email, AuthError, IdentityProvider, UserHandle, UserProfile};
use crate::config::AppConfig;
use crate::error::{StoreError, VaultError, VaultResult};
use crate::events::{EventBus, NoticeLevel, UploadEvent};
use crate::library::{FileLibrary, ShareLink, StoredFile, UserSettings};
use crate::store::{user_path, KeyValueStore, UserCollection};
use crate::uploader::{
    FilePayload, ProgressReporter, ProgressSnapshot, QueueManager, SizeLimits, TransferItem,
    TransferWorker,
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 添加文件的结果
#[derive(Debug, Default)]
pub struct AddFilesReport {
    /// 入队的条目 ID
    pub added: Vec<String>,
    /// 未通过校验的文件
    pub rejected: Vec<VaultError>,
}

struct StatsTicker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 文件库会话
pub struct VaultSession {
    config: AppConfig,
    identity: Arc<dyn IdentityProvider>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: EventBus,
    queue: QueueManager,
    limits: RwLock<SizeLimits>,
    ticker: Mutex<Option<StatsTicker>>,
}

impl VaultSession {
    /// 创建会话
    ///
    /// `store` 为 None 时上传条目会以 StoreUnavailable 失败
    pub fn new(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let events = EventBus::default();
        let worker = Arc::new(TransferWorker::new(store.clone(), identity.subscribe()));
        let queue = QueueManager::new(
            config.upload.effective_max_parallel(),
            events.clone(),
            worker,
        );
        let limits = SizeLimits::from_config(&config.upload);

        info!(
            "会话已创建: 并发 {}, 单文件上限 {}MB, 存储 {}",
            queue.max_parallel(),
            limits.max_file_size_mb(),
            if store.is_some() { "已连接" } else { "未初始化" }
        );

        Self {
            config,
            identity,
            store,
            events,
            queue,
            limits: RwLock::new(limits),
            ticker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn limits(&self) -> SizeLimits {
        *self.limits.read()
    }

    pub fn current_user(&self) -> Option<UserHandle> {
        self.identity.current_user()
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.events.publish(UploadEvent::notice(level, message));
    }

    fn require_user(&self) -> VaultResult<UserHandle> {
        self.current_user().ok_or(VaultError::StoreUnavailable)
    }

    fn require_store(&self) -> VaultResult<&Arc<dyn KeyValueStore>> {
        self.store.as_ref().ok_or(VaultError::StoreUnavailable)
    }

    // ========== 上传 ==========

    /// 校验并加入上传队列
    ///
    /// 超限的文件逐个发出错误提示，不入队；自动上传开启且未暂停时立即开始
    pub fn add_files(&self, payloads: Vec<FilePayload>) -> AddFilesReport {
        let limits = self.limits();
        let mut report = AddFilesReport::default();

        for payload in payloads {
            if let Err(e) = limits.validate(&payload) {
                warn!("文件未通过校验: {}", e);
                self.notify(NoticeLevel::Error, e.to_string());
                report.rejected.push(e);
                continue;
            }
            let item = TransferItem::new(payload, limits.chunk_size);
            report.added.push(self.queue.enqueue(item));
        }

        if !report.added.is_empty() {
            self.notify(
                NoticeLevel::Success,
                format!("Added {} file(s) to upload queue", report.added.len()),
            );
            if self.config.upload.auto_upload && !self.queue.is_paused() {
                self.start_uploads();
            }
        }
        report
    }

    /// 读取本地文件并加入上传队列，无法读取的路径计入 rejected
    pub async fn add_paths(&self, paths: &[PathBuf]) -> AddFilesReport {
        let mut payloads = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();
        for path in paths {
            match FilePayload::from_path(path).await {
                Ok(payload) => payloads.push(payload),
                Err(e) => {
                    warn!("无法读取文件 {:?}: {}", path, e);
                    self.notify(NoticeLevel::Error, format!("Cannot read {}: {}", path.display(), e));
                    unreadable.push(VaultError::Io(e));
                }
            }
        }

        let mut report = self.add_files(payloads);
        report.rejected.extend(unreadable);
        report
    }

    /// 接纳等待中的条目并启动统计循环
    pub fn start_uploads(&self) -> usize {
        let admitted = self.queue.admit_next();
        self.restart_ticker();
        admitted
    }

    pub fn pause(&self) {
        self.queue.pause();
    }

    pub fn resume(&self) -> usize {
        let admitted = self.queue.resume();
        self.restart_ticker();
        admitted
    }

    pub fn cancel_all(&self) -> usize {
        let cancelled = self.queue.cancel_all();
        if self.queue.is_idle() {
            self.stop_ticker();
        }
        cancelled
    }

    pub fn clear(&self) -> usize {
        let removed = self.queue.clear();
        self.stop_ticker();
        removed
    }

    /// 当前统计
    pub fn progress(&self) -> ProgressSnapshot {
        ProgressReporter::new(self.queue.clone(), self.stats_interval()).snapshot()
    }

    fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.config.upload.stats_interval_ms.max(1))
    }

    /// 停止旧的统计循环，队列非空时启动新的
    ///
    /// 旧循环可能已判定队列空闲但尚未退出，不能用 is_finished 判断是否复用
    fn restart_ticker(&self) {
        let mut ticker = self.ticker.lock();
        if let Some(previous) = ticker.take() {
            previous.cancel.cancel();
            if !previous.handle.is_finished() {
                debug!("停止仍在运行的统计循环");
            }
        }
        if self.queue.is_idle() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle =
            ProgressReporter::new(self.queue.clone(), self.stats_interval()).spawn(cancel.clone());
        *ticker = Some(StatsTicker { cancel, handle });
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.cancel.cancel();
        }
    }

    /// 停止统计循环并清空队列
    pub fn shutdown(&self) {
        self.stop_ticker();
        if !self.queue.is_idle() {
            self.queue.clear();
        }
        info!("会话已关闭");
    }

    // ========== 认证 ==========

    fn vault_email(&self, username: &str, phone: &str) -> String {
        derive_vault_email(username, phone, &self.config.auth.email_domain)
    }

    fn auth_failed(&self, error: AuthError) -> VaultError {
        let message = error.user_message(self.config.auth.password_min_length);
        warn!("认证失败: {}", message);
        self.notify(NoticeLevel::Error, message);
        VaultError::Auth(error)
    }

    /// 用户名 + 手机号登录（邮箱由二者拼接）
    pub async fn sign_in(
        &self,
        username: &str,
        phone: &str,
        password: &str,
    ) -> VaultResult<UserHandle> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(self.missing_fields());
        }
        let email = self.vault_email(username, phone);
        self.sign_in_with_email(&email, password).await
    }

    /// 邮箱登录，成功后加载用户设置
    pub async fn sign_in_with_email(&self, email: &str, password: &str) -> VaultResult<UserHandle> {
        let user = self
            .identity
            .sign_in(email, password)
            .await
            .map_err(|e| self.auth_failed(e))?;

        info!("✓ 登录成功: {}", user.email);
        self.notify(NoticeLevel::Success, "Login successful!");

        if let Err(e) = self.load_user_settings().await {
            warn!("加载用户设置失败: {}", e);
        }
        Ok(user)
    }

    /// 注册：创建账号后写入资料和默认设置
    pub async fn sign_up(
        &self,
        username: &str,
        phone: &str,
        password: &str,
    ) -> VaultResult<UserHandle> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(self.missing_fields());
        }
        if phone.trim().is_empty() {
            let message = "Phone number is required for signup";
            self.notify(NoticeLevel::Error, message);
            return Err(VaultError::Validation {
                file_name: String::new(),
                message: message.to_string(),
            });
        }

        let email = self.vault_email(username, phone);
        let user = self
            .identity
            .sign_up(&email, password)
            .await
            .map_err(|e| self.auth_failed(e))?;

        match &self.store {
            Some(store) => {
                let now = chrono::Utc::now().timestamp_millis();
                let profile = UserProfile {
                    username: username.trim().to_string(),
                    phone: phone.trim().to_string(),
                    email: email.clone(),
                    created_at: now,
                };
                let limits = self.limits();
                let settings = UserSettings {
                    max_file_size: limits.max_file_size,
                    chunk_size: limits.chunk_size,
                    created_at: now,
                };

                store
                    .write(
                        &user_path(&user.uid, UserCollection::Profile),
                        serde_json::to_value(&profile).map_err(StoreError::from)?,
                    )
                    .await?;
                store
                    .write(
                        &user_path(&user.uid, UserCollection::Settings),
                        serde_json::to_value(settings).map_err(StoreError::from)?,
                    )
                    .await?;
            }
            None => warn!("数据库未初始化，跳过写入用户资料"),
        }

        info!("✓ 注册成功: {}", user.email);
        self.notify(NoticeLevel::Success, "Account created successfully!");
        Ok(user)
    }

    fn missing_fields(&self) -> VaultError {
        let message = "Please fill in all required fields";
        self.notify(NoticeLevel::Error, message);
        VaultError::Validation {
            file_name: String::new(),
            message: message.to_string(),
        }
    }

    /// 退出登录，大小限制恢复为配置默认值
    pub async fn sign_out(&self) -> VaultResult<()> {
        self.identity.sign_out().await?;
        *self.limits.write() = SizeLimits::from_config(&self.config.upload);
        self.notify(NoticeLevel::Info, "Logged out successfully");
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> VaultResult<()> {
        let email = email.trim();
        if email.is_empty() {
            let message = "Please enter your email";
            self.notify(NoticeLevel::Error, message);
            return Err(VaultError::Validation {
                file_name: String::new(),
                message: message.to_string(),
            });
        }

        match self.identity.send_password_reset(email).await {
            Ok(()) => {
                self.notify(
                    NoticeLevel::Success,
                    "Password reset email sent! Check your inbox.",
                );
                Ok(())
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, e.reset_message());
                Err(VaultError::Auth(e))
            }
        }
    }

    // ========== 用户设置与资料 ==========

    /// 读取用户设置并应用到大小限制，没有设置时保持不变
    pub async fn load_user_settings(&self) -> VaultResult<Option<UserSettings>> {
        let user = self.require_user()?;
        let store = self.require_store()?;

        let Some(value) = store
            .read(&user_path(&user.uid, UserCollection::Settings))
            .await?
        else {
            return Ok(None);
        };

        let settings: UserSettings = serde_json::from_value(value).map_err(StoreError::from)?;
        let limits = self
            .limits()
            .with_user_settings(settings.max_file_size, settings.chunk_size);
        *self.limits.write() = limits;

        info!(
            "已加载用户设置: 单文件上限 {}MB, 分片 {}KB",
            limits.max_file_size_mb(),
            limits.chunk_size / 1024
        );
        Ok(Some(settings))
    }

    /// 更新上传设置（单文件上限截断到绝对上限）
    pub async fn update_settings(&self, max_file_size_mb: u64, chunk_size_kb: u64) -> VaultResult<SizeLimits> {
        let user = self.require_user()?;
        let store = self.require_store()?;

        let max_file_size_mb = if max_file_size_mb == 0 { 1 } else { max_file_size_mb };
        let chunk_size_kb = if chunk_size_kb == 0 { 256 } else { chunk_size_kb };
        let limits = self
            .limits()
            .with_user_settings(max_file_size_mb * 1024 * 1024, chunk_size_kb * 1024);

        store
            .update(
                &user_path(&user.uid, UserCollection::Settings),
                json!({
                    "maxFileSize": limits.max_file_size,
                    "chunkSize": limits.chunk_size,
                    "lastUpdated": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await?;

        *self.limits.write() = limits;
        self.notify(NoticeLevel::Success, "Settings saved successfully!");
        Ok(limits)
    }

    pub async fn load_profile(&self) -> VaultResult<Option<UserProfile>> {
        let user = self.require_user()?;
        let store = self.require_store()?;
        match store
            .read(&user_path(&user.uid, UserCollection::Profile))
            .await?
        {
            Some(value) => Ok(Some(serde_json::from_value(value).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    pub async fn update_username(&self, username: &str) -> VaultResult<()> {
        let user = self.require_user()?;
        let store = self.require_store()?;
        store
            .update(
                &user_path(&user.uid, UserCollection::Profile),
                json!({
                    "username": username.trim(),
                    "updatedAt": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        self.notify(NoticeLevel::Success, "Username updated");
        Ok(())
    }

    // ========== 文件库 ==========

    fn library(&self) -> VaultResult<(FileLibrary, String)> {
        let user = self.require_user()?;
        let store = self.require_store()?.clone();
        Ok((FileLibrary::new(store, self.config.share.clone()), user.uid))
    }

    pub async fn list_files(&self) -> VaultResult<Vec<StoredFile>> {
        let (library, uid) = self.library()?;
        library.list_files(&uid).await
    }

    pub async fn download_file(&self, file_id: &str, dir: &Path) -> VaultResult<PathBuf> {
        let (library, uid) = self.library()?;
        match library.download_to(&uid, file_id, dir).await {
            Ok(path) => {
                self.notify(NoticeLevel::Success, format!("Downloaded: {}", path.display()));
                Ok(path)
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, "Download failed");
                Err(e)
            }
        }
    }

    pub async fn delete_file(&self, file_id: &str) -> VaultResult<()> {
        let (library, uid) = self.library()?;
        let file = library.get_file(&uid, file_id).await?;
        match library.delete_file(&uid, file_id).await {
            Ok(_) => {
                self.notify(NoticeLevel::Success, format!("Deleted: {}", file.name));
                Ok(())
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, "Delete failed");
                Err(e)
            }
        }
    }

    pub async fn create_share(&self, file_id: &str) -> VaultResult<ShareLink> {
        let (library, uid) = self.library()?;
        library.create_share(&uid, file_id).await.map_err(|e| {
            self.notify(NoticeLevel::Error, e.to_string());
            e
        })
    }

    pub async fn list_shares(&self) -> VaultResult<Vec<ShareLink>> {
        let (library, uid) = self.library()?;
        library.list_shares(&uid).await
    }

    pub async fn delete_share(&self, share_id: &str) -> VaultResult<()> {
        let (library, uid) = self.library()?;
        library.delete_share(&uid, share_id).await?;
        self.notify(NoticeLevel::Info, "Share link deleted");
        Ok(())
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
