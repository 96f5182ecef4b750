// 入队前的大小校验

use super::payload::FilePayload;
use super::reporter::format_file_size;
use crate::config::UploadConfig;
use crate::error::VaultError;

const MB: u64 = 1024 * 1024;

/// 上传大小限制（单位：字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// 用户设置的单文件上限，不超过 max_allowed_size
    pub max_file_size: u64,
    /// 数据库允许的绝对上限
    pub max_allowed_size: u64,
    /// 声明的分片大小
    pub chunk_size: u64,
}

impl SizeLimits {
    pub fn from_config(config: &UploadConfig) -> Self {
        let max_allowed_size = config.max_allowed_size_bytes();
        Self {
            max_file_size: config.default_max_size_bytes().min(max_allowed_size),
            max_allowed_size,
            chunk_size: config.chunk_size_bytes(),
        }
    }

    /// 应用用户设置：单文件上限截断到绝对上限，0 值忽略
    pub fn with_user_settings(mut self, max_file_size: u64, chunk_size: u64) -> Self {
        if max_file_size > 0 {
            self.max_file_size = max_file_size.min(self.max_allowed_size);
        }
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    /// 单文件上限（MB，四舍五入）
    pub fn max_file_size_mb(&self) -> u64 {
        (self.max_file_size as f64 / MB as f64).round() as u64
    }

    pub fn max_allowed_size_mb(&self) -> u64 {
        (self.max_allowed_size as f64 / MB as f64).round() as u64
    }

    /// 校验单个文件，先检查用户上限再检查绝对上限
    pub fn validate(&self, payload: &FilePayload) -> Result<(), VaultError> {
        if payload.size > self.max_file_size {
            return Err(VaultError::Validation {
                file_name: payload.name.clone(),
                message: format!(
                    "\"{}\" exceeds {}MB limit ({})",
                    payload.name,
                    self.max_file_size_mb(),
                    format_file_size(payload.size)
                ),
            });
        }

        if payload.size > self.max_allowed_size {
            return Err(VaultError::Validation {
                file_name: payload.name.clone(),
                message: format!(
                    "\"{}\" is too large. Max {}MB.",
                    payload.name,
                    self.max_allowed_size_mb()
                ),
            });
        }

        Ok(())
    }
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}
