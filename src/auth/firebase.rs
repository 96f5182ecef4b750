// Firebase Identity Toolkit 客户端
//
// 只实现邮箱密码登录相关的四个接口，令牌刷新不在范围内

use super::{AuthError, IdentityProvider, UserHandle};
use crate::config::FirebaseConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

/// 登录/注册接口返回
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    id_token: String,
}

/// 错误响应: {"error": {"code": 400, "message": "EMAIL_EXISTS"}}
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Firebase 身份服务客户端
pub struct FirebaseAuthClient {
    client: Client,
    api_key: String,
    base_url: String,
    state_tx: watch::Sender<Option<UserHandle>>,
}

impl FirebaseAuthClient {
    pub fn new(config: &FirebaseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let (state_tx, _) = watch::channel(None);

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: IDENTITY_TOOLKIT_BASE.to_string(),
            state_tx,
        })
    }

    /// 替换接口地址（本地模拟器）
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{}?key={}", self.base_url, method, self.api_key)
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<String, AuthError> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::network(e.to_string()))?;

        if status.is_success() {
            Ok(text)
        } else {
            debug!("身份服务返回错误: method={}, status={}", method, status);
            Err(parse_error_body(&text))
        }
    }

    async fn password_request(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<UserHandle, AuthError> {
        let text = self
            .post(
                method,
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;

        let parsed: SignInResponse = serde_json::from_str(&text)
            .map_err(|e| AuthError::from_code(&format!("INVALID_RESPONSE: {}", e)))?;

        let user = UserHandle {
            uid: parsed.local_id,
            email: parsed.email,
            id_token: Some(parsed.id_token),
        };
        self.state_tx.send_replace(Some(user.clone()));
        Ok(user)
    }
}

/// 解析错误响应，无法解析时按网络错误处理
fn parse_error_body(text: &str) -> AuthError {
    match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(envelope) => AuthError::from_code(&envelope.error.message),
        Err(_) => {
            warn!("无法解析身份服务错误响应: {}", text);
            AuthError::network(text.to_string())
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, AuthError> {
        let user = self
            .password_request("signInWithPassword", email, password)
            .await?;
        info!("✓ 登录成功: uid={}", user.uid);
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, AuthError> {
        let user = self.password_request("signUp", email, password).await?;
        info!("✓ 注册成功: uid={}", user.uid);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // REST 接口无服务端会话，丢弃本地令牌即可
        self.state_tx.send_replace(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.post(
            "sendOobCode",
            json!({ "requestType": "PASSWORD_RESET", "email": email }),
        )
        .await?;
        info!("重置密码邮件已发送");
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserHandle>> {
        self.state_tx.subscribe()
    }
}
