// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// Firebase 服务配置
    #[serde(default)]
    pub firebase: FirebaseConfig,
    /// 认证配置
    #[serde(default)]
    pub auth: AuthConfig,
    /// 分享配置
    #[serde(default)]
    pub share: ShareConfig,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// 只读取配置文件中的 [log] 段
    ///
    /// 在加载完整配置之前调用；文件不存在或无法解析时返回默认配置
    pub async fn load_from_config_file(path: &str) -> Self {
        if let Ok(content) = fs::read_to_string(path).await {
            if let Ok(config) = toml::from_str::<toml::Value>(&content) {
                if let Some(log_table) = config.get("log") {
                    if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                        return log_config;
                    }
                }
            }
        }

        LogConfig::default()
    }
}

/// 上传配置
///
/// 入队前的大小校验和队列并发度都从这里读取，运行期间不再重新推导
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// 默认单文件大小上限 (MB)，用户设置可以覆盖
    pub default_max_size_mb: u64,
    /// 单文件大小硬上限 (MB)，实时数据库单节点限制
    pub max_allowed_size_mb: u64,
    /// 分片大小 (KB)，只用于计算 total_chunks
    pub chunk_size_kb: u64,
    /// 最大同时上传文件数
    pub max_parallel_uploads: usize,
    /// 添加文件后是否自动开始上传
    pub auto_upload: bool,
    /// 统计刷新间隔（毫秒）
    pub stats_interval_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            default_max_size_mb: 1,
            max_allowed_size_mb: 10,
            chunk_size_kb: 256,
            max_parallel_uploads: 2,
            auto_upload: true,
            stats_interval_ms: 1000,
        }
    }
}

impl UploadConfig {
    /// 默认单文件上限（字节）
    pub fn default_max_size_bytes(&self) -> u64 {
        self.default_max_size_mb * 1024 * 1024
    }

    /// 单文件硬上限（字节）
    pub fn max_allowed_size_bytes(&self) -> u64 {
        self.max_allowed_size_mb * 1024 * 1024
    }

    /// 分片大小（字节）
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_kb * 1024
    }

    /// 并发度至少为 1
    pub fn effective_max_parallel(&self) -> usize {
        self.max_parallel_uploads.max(1)
    }
}

/// Firebase 服务配置
///
/// `api_key` 为空时 CLI 使用内存存储（离线模式）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    /// Web API Key
    pub api_key: String,
    /// 实时数据库地址，如 https://xxx-default-rtdb.firebasedatabase.app
    pub database_url: String,
    /// HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl FirebaseConfig {
    /// 是否配置了远程服务
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.database_url.trim().is_empty()
    }

    /// 请求超时，未配置时 60 秒
    pub fn request_timeout(&self) -> std::time::Duration {
        let secs = if self.request_timeout_secs == 0 {
            60
        } else {
            self.request_timeout_secs
        };
        std::time::Duration::from_secs(secs)
    }
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 密码最小长度（用于错误提示）
    pub password_min_length: usize,
    /// 用户名 + 手机号登录时拼接的邮箱域名
    pub email_domain: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_min_length: 6,
            email_domain: "royalvault.app".to_string(),
        }
    }
}

/// 分享配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// 是否启用分享
    pub enabled: bool,
    /// 分享链接的站点地址
    pub origin: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origin: "https://EMvault.example.com".to_string(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        if config.upload.max_parallel_uploads == 0 {
            anyhow::bail!("配置文件中的 max_parallel_uploads 必须大于 0");
        }

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                // 首次启动：写出默认配置，方便用户修改
                if !std::path::Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {:#}", e);
                    }
                }

                default_config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload.default_max_size_mb, 1);
        assert_eq!(config.upload.max_allowed_size_mb, 10);
        assert_eq!(config.upload.chunk_size_kb, 256);
        assert_eq!(config.upload.max_parallel_uploads, 2);
        assert!(config.upload.auto_upload);
        assert_eq!(config.upload.stats_interval_ms, 1000);
        assert_eq!(config.auth.password_min_length, 6);
        assert!(!config.firebase.is_configured());
    }

    #[test]
    fn test_size_helpers() {
        let upload = UploadConfig::default();
        assert_eq!(upload.default_max_size_bytes(), 1024 * 1024);
        assert_eq!(upload.max_allowed_size_bytes(), 10 * 1024 * 1024);
        assert_eq!(upload.chunk_size_bytes(), 256 * 1024);

        let zero = UploadConfig {
            max_parallel_uploads: 0,
            ..Default::default()
        };
        assert_eq!(zero.effective_max_parallel(), 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config").join("app.toml");
        let path = path.to_str().unwrap();

        let mut config = AppConfig::default();
        config.upload.max_parallel_uploads = 4;
        config.firebase.api_key = "key".to_string();
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.upload.max_parallel_uploads, 4);
        assert_eq!(loaded.firebase.api_key, "key");
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[upload]\nmax_parallel_uploads = 3\n").unwrap();

        let loaded = AppConfig::load_from_file(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(loaded.upload.max_parallel_uploads, 3);
        assert_eq!(loaded.upload.chunk_size_kb, 256);
        assert!(loaded.log.enabled);
    }

    #[tokio::test]
    async fn test_zero_parallel_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[upload]\nmax_parallel_uploads = 0\n").unwrap();

        assert!(AppConfig::load_from_file(path.to_str().unwrap())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_log_config_read_before_full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        // 其它段无法解析时仍能拿到 [log] 段
        std::fs::write(
            &path,
            "[upload]\nmax_parallel_uploads = \"many\"\n\n[log]\nenabled = false\nlevel = \"debug\"\n",
        )
        .unwrap();
        let path_str = path.to_str().unwrap();

        let log = LogConfig::load_from_config_file(path_str).await;
        assert!(!log.enabled);
        assert_eq!(log.level, "debug");
        assert_eq!(log.retention_days, 7);
        assert!(AppConfig::load_from_file(path_str).await.is_err());

        // 缺失或损坏的文件回退到默认值
        let missing = LogConfig::load_from_config_file(
            dir.path().join("missing.toml").to_str().unwrap(),
        )
        .await;
        assert!(missing.enabled);
        std::fs::write(&path, "not = [valid").unwrap();
        assert_eq!(LogConfig::load_from_config_file(path_str).await.level, "info");
    }

    #[tokio::test]
    async fn test_load_or_default_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.toml");
        let path_str = path.to_str().unwrap();

        let config = AppConfig::load_or_default(path_str).await;
        assert_eq!(config.upload.max_parallel_uploads, 2);
        assert!(path.exists());
    }
}
