// 内存身份服务
//
// 离线模式和测试使用，行为与远程服务的错误码保持一致

use super::{AuthError, AuthErrorCode, IdentityProvider, UserHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::info;

struct Account {
    uid: String,
    password: String,
}

/// 内存身份服务
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    min_password_length: usize,
    state_tx: watch::Sender<Option<UserHandle>>,
    /// 已发送的重置邮件（测试检查用）
    reset_requests: Mutex<Vec<String>>,
}

impl MemoryIdentityProvider {
    pub fn new(min_password_length: usize) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            min_password_length,
            state_tx,
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    /// 直接设置当前用户（跳过密码校验）
    pub fn force_sign_in(&self, user: UserHandle) {
        self.state_tx.send_replace(Some(user));
    }

    pub fn reset_requests(&self) -> Vec<String> {
        self.reset_requests.lock().clone()
    }

    fn validate_email(email: &str) -> Result<(), AuthError> {
        let valid = match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.'),
            None => false,
        };
        if valid {
            Ok(())
        } else {
            Err(AuthError::new(AuthErrorCode::InvalidEmail, "auth/invalid-email"))
        }
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new(6)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, AuthError> {
        Self::validate_email(email)?;

        let user = {
            let accounts = self.accounts.lock();
            let account = accounts
                .get(email)
                .ok_or_else(|| AuthError::from_code("auth/user-not-found"))?;
            if account.password != password {
                return Err(AuthError::from_code("auth/wrong-password"));
            }
            UserHandle::new(account.uid.clone(), email)
        };

        info!("用户登录: uid={}", user.uid);
        self.state_tx.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, AuthError> {
        Self::validate_email(email)?;
        if password.chars().count() < self.min_password_length {
            return Err(AuthError::from_code("auth/weak-password"));
        }

        let user = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(email) {
                return Err(AuthError::from_code("auth/email-already-in-use"));
            }
            let uid = format!("uid_{}", accounts.len() + 1);
            accounts.insert(
                email.to_string(),
                Account {
                    uid: uid.clone(),
                    password: password.to_string(),
                },
            );
            UserHandle::new(uid, email)
        };

        info!("用户注册: uid={}", user.uid);
        self.state_tx.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state_tx.send_replace(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        Self::validate_email(email)?;
        if !self.accounts.lock().contains_key(email) {
            return Err(AuthError::from_code("auth/user-not-found"));
        }
        self.reset_requests.lock().push(email.to_string());
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserHandle>> {
        self.state_tx.subscribe()
    }
}
