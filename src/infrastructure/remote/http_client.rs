use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// HTTP 客户端包装器
///
/// 所有请求共享一个连接池；构造时显式传入，不使用全局实例。
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// 创建新的 HTTP 客户端
    pub fn new(user_agent: &str) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::config(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self { client })
    }

    /// HEAD 请求（带超时）
    pub async fn head(&self, url: &str, timeout: Duration) -> AppResult<Response> {
        let response = self.client.head(url).timeout(timeout).send().await?;
        Ok(response)
    }

    /// GET 请求
    pub async fn get(&self, url: &str) -> AppResult<Response> {
        let response = self.client.get(url).send().await?;
        Ok(response)
    }

    /// GET 请求并返回状态码与正文
    pub async fn get_text(&self, url: &str) -> AppResult<(StatusCode, String)> {
        let response = self.get(url).await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// 从响应头读取 Content-Length
    pub fn content_length(response: &Response) -> Option<u64> {
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }
}
