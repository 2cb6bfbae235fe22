//! 共享的 HTTP 调用封装
//!
//! 所有远端 API 都通过 `ApiClient::post` 发送 JSON 请求：附带 operationID、
//! 套上统一超时，并交给 `handle_http_response` 做状态码与 errCode 校验。

use crate::hub::error::ApiError;
use crate::hub::timeout::with_timeout;
use crate::hub::types::handle_http_response;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// 带 base_url 与超时配置的 HTTP 客户端
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_base_url: String,
    timeout: Duration,
}

impl ApiClient {
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// 创建带 Bearer token 默认头的 reqwest 客户端
    pub fn authorized_http_client(token: &str) -> Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                        .context("无效的 token")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")
    }

    pub fn base_url(&self) -> &str {
        &self.api_base_url
    }

    /// 发送 POST 请求，返回 data 字段（可能为 None）
    pub async fn post<B, T>(&self, path: &str, body: &B, operation_name: &str) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.api_base_url, path);
        debug!(
            "[HTTP] 📡 {} 请求URL: {}, 操作ID: {}",
            operation_name, url, operation_id
        );

        with_timeout(self.timeout, operation_name, async {
            let response = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("operationID", &operation_id)
                .json(body)
                .send()
                .await
                .map_err(ApiError::from)?;
            let api_resp = handle_http_response::<T>(response, operation_name).await?;
            Ok::<_, anyhow::Error>(api_resp.data)
        })
        .await
    }

    /// 发送 POST 请求，要求响应必须包含 data
    pub async fn post_data<B, T>(&self, path: &str, body: &B, operation_name: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post::<B, T>(path, body, operation_name)
            .await?
            .ok_or_else(|| ApiError::Decode(format!("{}响应中缺少 data 字段", operation_name)).into())
    }

    /// 发送 POST 请求，忽略 data
    pub async fn post_unit<B>(&self, path: &str, body: &B, operation_name: &str) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.post::<B, serde_json::Value>(path, body, operation_name)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(reqwest::Client::new(), server.uri(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn post_returns_data_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ping"))
            .and(header_exists("operationID"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 0, "errMsg": "", "data": {"value": 7}
            })))
            .mount(&server)
            .await;

        let data: serde_json::Value = client_for(&server)
            .post_data("/ping", &json!({}), "ping")
            .await
            .unwrap();
        assert_eq!(data["value"], 7);
    }

    #[tokio::test]
    async fn business_error_code_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 1004, "errMsg": "record not found", "data": null
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .post_unit("/ping", &json!({}), "ping")
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ApiError>(),
            Some(&ApiError::Business {
                code: 1004,
                message: "record not found".to_string()
            })
        );
    }

    #[tokio::test]
    async fn http_429_is_too_many_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .post_unit("/anything", &json!({}), "ping")
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ApiError>(),
            Some(&ApiError::TooManyRequests)
        );
    }

    #[tokio::test]
    async fn missing_data_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 0, "errMsg": ""
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .post_data::<_, serde_json::Value>("/x", &json!({}), "x")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::Decode(_))
        ));
    }
}
