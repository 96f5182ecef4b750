// Firebase 实时数据库 REST 客户端
//
// PUT/PATCH/GET/DELETE {database_url}/{path}.json?auth={id_token}

use super::{split_path, KeyValueStore};
use crate::auth::UserHandle;
use crate::config::FirebaseConfig;
use crate::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

/// 实时数据库客户端
///
/// 令牌从身份服务的登录状态中读取，未登录时所有请求返回 NotAuthenticated
#[derive(Clone)]
pub struct RealtimeDbClient {
    client: Client,
    database_url: String,
    auth_state: watch::Receiver<Option<UserHandle>>,
}

impl RealtimeDbClient {
    pub fn new(
        config: &FirebaseConfig,
        auth_state: watch::Receiver<Option<UserHandle>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            database_url: config.database_url.trim_end_matches('/').to_string(),
            auth_state,
        })
    }

    fn id_token(&self) -> Result<String, StoreError> {
        self.auth_state
            .borrow()
            .as_ref()
            .and_then(|user| user.id_token.clone())
            .ok_or(StoreError::NotAuthenticated)
    }

    fn url(&self, path: &str) -> Result<String, StoreError> {
        let segments = split_path(path)?;
        Ok(format!("{}/{}.json", self.database_url, segments.join("/")))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, StoreError> {
        let url = self.url(path)?;
        let token = self.id_token()?;
        debug!("数据库请求: {} {}", method, url);

        let mut builder = self
            .client
            .request(method, url)
            .query(&[("auth", token.as_str())]);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl KeyValueStore for RealtimeDbClient {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.request(Method::PUT, path, Some(&value)).await?;
        Ok(())
    }

    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> {
        self.request(Method::PATCH, path, Some(&partial)).await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self.request(Method::GET, path, None).await?;
        let value: Value = response.json().await?;
        // 不存在的节点返回 null
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.request(Method::DELETE, path, None).await?;
        Ok(())
    }
}
