// 认证模块数据类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 已登录用户句柄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHandle {
    /// 用户ID（数据库路径 users/{uid}/... 使用）
    pub uid: String,
    /// 登录邮箱
    pub email: String,
    /// ID Token（访问实时数据库时携带），离线模式为 None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl UserHandle {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            id_token: None,
        }
    }

    /// 邮箱 @ 前的部分，作为默认显示名
    pub fn display_name(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// 用户资料，存储于 users/{uid}/profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub phone: String,
    pub email: String,
    pub created_at: i64,
}

/// 身份服务错误码（封闭集合）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    NetworkRequestFailed,
    OperationNotAllowed,
    /// 未识别的错误码，保留原始值
    Unknown(String),
}

impl AuthErrorCode {
    /// 解析错误码
    ///
    /// 同时接受 SDK 风格（auth/wrong-password）和 REST 风格（INVALID_PASSWORD）
    pub fn parse(code: &str) -> Self {
        // REST 接口的 WEAK_PASSWORD 会带说明: "WEAK_PASSWORD : Password should be ..."
        let code = code.split(" : ").next().unwrap_or(code).trim();
        match code {
            "auth/email-already-in-use" | "EMAIL_EXISTS" => Self::EmailAlreadyInUse,
            "auth/invalid-email" | "INVALID_EMAIL" | "MISSING_EMAIL" => Self::InvalidEmail,
            "auth/weak-password" | "WEAK_PASSWORD" => Self::WeakPassword,
            "auth/user-not-found" | "EMAIL_NOT_FOUND" => Self::UserNotFound,
            "auth/wrong-password" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
                Self::WrongPassword
            }
            "auth/too-many-requests" | "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyRequests,
            "auth/network-request-failed" => Self::NetworkRequestFailed,
            "auth/operation-not-allowed" | "OPERATION_NOT_ALLOWED" | "PASSWORD_LOGIN_DISABLED" => {
                Self::OperationNotAllowed
            }
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// 身份服务错误
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AuthError {
    pub code: AuthErrorCode,
    /// 原始错误信息
    pub message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: &str) -> Self {
        Self::new(AuthErrorCode::parse(code), code)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::NetworkRequestFailed, message)
    }

    /// 登录/注册失败时展示给用户的提示
    pub fn user_message(&self, password_min_length: usize) -> String {
        match &self.code {
            AuthErrorCode::EmailAlreadyInUse => {
                "Email already in use. Try logging in instead.".to_string()
            }
            AuthErrorCode::InvalidEmail => {
                "Invalid email format. Please check your username and phone number.".to_string()
            }
            AuthErrorCode::WeakPassword => format!(
                "Password should be at least {} characters long.",
                password_min_length
            ),
            AuthErrorCode::UserNotFound => "No account found. Please sign up first.".to_string(),
            AuthErrorCode::WrongPassword => "Incorrect password. Please try again.".to_string(),
            AuthErrorCode::TooManyRequests => {
                "Too many failed attempts. Please try again later.".to_string()
            }
            AuthErrorCode::NetworkRequestFailed => {
                "Network error. Please check your internet connection.".to_string()
            }
            AuthErrorCode::OperationNotAllowed => {
                "Email/password authentication is not enabled. Please contact support."
                    .to_string()
            }
            AuthErrorCode::Unknown(_) => format!("Error: {}", self.message),
        }
    }

    /// 重置密码失败时的提示（文案与登录不同）
    pub fn reset_message(&self) -> String {
        match &self.code {
            AuthErrorCode::UserNotFound => "No account found with this email".to_string(),
            AuthErrorCode::InvalidEmail => "Invalid email address".to_string(),
            _ => format!("Error sending reset email: {}", self.message),
        }
    }
}

/// 规范化用户名：小写、连续空白转为 '.'、去掉 [a-z0-9.] 以外的字符
pub fn clean_username(username: &str) -> String {
    username
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(".")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.')
        .collect()
}

/// 只保留手机号中的数字
pub fn clean_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// 用户名 + 手机号拼接登录邮箱
///
/// `"John Doe", "+1 (555) 010"` -> `john.doe.1555010@royalvault.app`
pub fn derive_vault_email(username: &str, phone: &str, domain: &str) -> String {
    format!("{}.{}@{}", clean_username(username), clean_phone(phone), domain)
}
