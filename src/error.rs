//! 错误类型定义
//!
//! - `VaultError`: 上传、文件库、会话层统一错误
//! - `StoreError`: 实时数据库读写错误
//!
//! 认证错误见 `auth::AuthError`

use crate::auth::AuthError;
use thiserror::Error;

/// 实时数据库错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 未登录或缺少访问令牌
    #[error("未登录或数据库未初始化")]
    NotAuthenticated,
    /// 路径非法（空段、包含 Firebase 保留字符等）
    #[error("非法数据库路径: {0}")]
    InvalidPath(String),
    /// 服务端返回非 2xx 状态
    #[error("数据库请求失败: HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// 网络错误
    #[error("网络错误: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON 序列化/反序列化失败
    #[error("数据格式错误: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 其他错误（测试桩、注入故障等）
    #[error("{0}")]
    Other(String),
}

/// 统一业务错误
#[derive(Debug, Error)]
pub enum VaultError {
    /// 文件超出大小限制，入队前拒绝
    #[error("{message}")]
    Validation { file_name: String, message: String },
    /// 读取/编码/写入失败，对应条目进入 error 状态
    #[error("上传失败: {0}")]
    Transfer(String),
    /// 身份服务错误
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// 传输时没有登录用户或存储句柄
    #[error("Not authenticated or database not initialized")]
    StoreUnavailable,
    /// 数据库错误
    #[error(transparent)]
    Store(#[from] StoreError),
    /// 文件库中找不到文件
    #[error("文件不存在: {0}")]
    FileNotFound(String),
    /// 存储的文件数据不是合法的 base64
    #[error("文件数据损坏: {0}")]
    Decode(#[from] base64::DecodeError),
    /// 本地文件读写失败
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
    /// 功能被配置关闭
    #[error("{0}")]
    Disabled(&'static str),
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_status_display() {
        let err = StoreError::Status {
            status: 401,
            body: "Permission denied".into(),
        };
        assert_eq!(err.to_string(), "数据库请求失败: HTTP 401: Permission denied");
    }
}
