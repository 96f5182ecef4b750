// 认证模块
//
// 身份服务只通过 `IdentityProvider` 接口访问：
// - `FirebaseAuthClient`: Identity Toolkit REST 接口
// - `MemoryIdentityProvider`: 内存实现（离线模式、测试）

pub mod firebase;
pub mod memory;
pub mod types;

pub use firebase::FirebaseAuthClient;
pub use memory::MemoryIdentityProvider;
pub use types::{
    clean_phone, clean_username, derive_vault_email, AuthError, AuthErrorCode, UserHandle,
    UserProfile,
};

use async_trait::async_trait;
use tokio::sync::watch;

/// 外部身份服务
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 邮箱密码登录
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, AuthError>;

    /// 注册新用户（成功后处于登录状态）
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, AuthError>;

    /// 退出登录
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// 发送重置密码邮件
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// 订阅登录状态变化，当前值即为当前用户
    fn subscribe(&self) -> watch::Receiver<Option<UserHandle>>;

    /// 当前用户
    fn current_user(&self) -> Option<UserHandle> {
        self.subscribe().borrow().clone()
    }
}
