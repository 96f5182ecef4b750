//! 日志系统配置
//!
//! 支持控制台输出和文件持久化，按天滚动，启动时清理过期日志

use crate::config::LogConfig;
use chrono::Local;
use std::fs;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀，完整文件名: em-vault.YYYY-MM-DD.log
const LOG_FILE_PREFIX: &str = "em-vault";
const LOG_FILE_SUFFIX: &str = "log";
const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// # Arguments
/// * `config` - 日志配置
///
/// # Returns
/// * `LogGuard` - 日志守卫，需要保持存活直到程序结束
pub fn init_logging(config: &LogConfig) -> LogGuard {
    // 环境变量 RUST_LOG 优先
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_ansi(true);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    }

    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}", config.log_dir, e);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return LogGuard { _file_guard: None };
    }

    let appender = match RollingBuilder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(&config.log_dir)
    {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("创建日志文件失败: {}, 回退到仅控制台输出", e);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            return LogGuard { _file_guard: None };
        }
    };

    let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);

    // 文件输出层（不带 ANSI 颜色）
    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}",
        config.log_dir, config.retention_days, config.level
    );

    cleanup_old_logs(&config.log_dir, config.retention_days);

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 清理过期日志文件
fn cleanup_old_logs(log_dir: &Path, retention_days: u32) {
    let today = Local::now().date_naive();
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return;
        }
    };

    let mut deleted_count = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };

        let Some(file_date) = extract_date_from_filename(filename) else {
            continue;
        };

        if today.signed_duration_since(file_date) > retention {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e);
            } else {
                deleted_count += 1;
                tracing::debug!("已删除过期日志文件: {:?}", path);
            }
        }
    }

    if deleted_count > 0 {
        info!("已清理 {} 个过期日志文件", deleted_count);
    }
}

/// 从文件名中提取日期：em-vault.YYYY-MM-DD.log -> YYYY-MM-DD
fn extract_date_from_filename(filename: &str) -> Option<chrono::NaiveDate> {
    let name = filename.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    let name = name.strip_suffix(LOG_FILE_SUFFIX)?.strip_suffix('.')?;
    chrono::NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_extract_date() {
        assert_eq!(
            extract_date_from_filename("em-vault.2024-03-05.log"),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(extract_date_from_filename("other.2024-03-05.log"), None);
        assert_eq!(extract_date_from_filename("em-vault.log"), None);
    }

    #[test]
    fn test_cleanup_old_logs() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = dir.path().join("em-vault.2000-01-01.log");
        let today = dir
            .path()
            .join(format!("em-vault.{}.log", Local::now().format("%Y-%m-%d")));
        let unrelated = dir.path().join("notes.txt");
        for p in [&old, &today, &unrelated] {
            fs::write(p, b"x").unwrap();
        }

        cleanup_old_logs(dir.path(), 7);

        assert!(!old.exists());
        assert!(today.exists());
        assert!(unrelated.exists());
    }
}
