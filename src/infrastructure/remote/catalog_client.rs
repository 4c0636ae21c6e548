use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;
use std::time::{Duration, Instant};

use super::download::{self, DownloadSummary};
use super::http_client::HttpClient;
use super::listing;
use crate::catalog::{Mirror, ProbeResult, Region, Snapshot};
use crate::core::constants::network::PROBE_TIMEOUT_SECS;
use crate::error::{AppError, AppResult};

/// 下载进度回调：`(已接收字节, 总字节)`，总字节未知时为 0
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// 区域目录后端
///
/// 默认实现解析 HTML 目录页；其他后端（如 JSON 索引）实现同一接口即可替换。
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// 测量镜像延迟；任何失败都返回不可用，延迟未知
    async fn probe_latency(&self, mirror: &Mirror) -> ProbeResult;

    /// 列出镜像上的快照，最新在前
    async fn list_snapshots(&self, mirror: &Mirror) -> AppResult<Vec<Snapshot>>;

    /// 列出快照中的区域，按名称排序
    async fn list_regions(&self, mirror: &Mirror, snapshot: &Snapshot) -> AppResult<Vec<Region>>;

    /// 读取远程文件大小，失败时返回 None
    async fn head_file_size(&self, url: &str) -> Option<u64>;

    /// 检查地址是否存在：200 返回 true，其他状态返回 false，网络失败返回错误
    async fn check_exists(&self, url: &str) -> AppResult<bool>;

    /// 流式下载到 `dest`
    async fn stream_download(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressFn<'_>,
    ) -> AppResult<DownloadSummary>;

    /// 区域文件的下载地址
    fn region_url(&self, mirror: &Mirror, snapshot: &Snapshot, region: &Region) -> String {
        let folder = mirror.snapshot_url(snapshot.version());
        url::Url::parse(&folder)
            .and_then(|base| base.join(&region.file_name))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{folder}{}", region.file_name))
    }
}

/// 基于 HTML 目录页的实现
pub struct HttpCatalogClient {
    http: HttpClient,
    probe_timeout: Duration,
}

impl HttpCatalogClient {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    async fn fetch_listing(&self, url: &str) -> AppResult<String> {
        let (status, body) = self.http.get_text(url).await?;
        if status != StatusCode::OK {
            return Err(AppError::Catalog {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn probe_latency(&self, mirror: &Mirror) -> ProbeResult {
        let started = Instant::now();
        match self.http.head(&mirror.base_url, self.probe_timeout).await {
            Ok(response) if response.status() == StatusCode::OK => {
                let latency_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(mirror = %mirror.name, latency_ms, "镜像测速完成");
                ProbeResult {
                    latency_ms: Some(latency_ms),
                    available: true,
                }
            }
            Ok(response) => {
                tracing::debug!(mirror = %mirror.name, status = %response.status(), "镜像返回异常状态");
                ProbeResult::unavailable()
            }
            Err(e) => {
                tracing::debug!(mirror = %mirror.name, error = %e, "镜像不可达");
                ProbeResult::unavailable()
            }
        }
    }

    async fn list_snapshots(&self, mirror: &Mirror) -> AppResult<Vec<Snapshot>> {
        let body = self.fetch_listing(&mirror.base_url).await?;
        let snapshots = listing::parse_snapshot_listing(&body);
        tracing::info!(mirror = %mirror.name, count = snapshots.len(), "已获取快照列表");
        Ok(snapshots)
    }

    async fn list_regions(&self, mirror: &Mirror, snapshot: &Snapshot) -> AppResult<Vec<Region>> {
        let url = mirror.snapshot_url(snapshot.version());
        let body = self.fetch_listing(&url).await?;

        // 大目录页的正则匹配较重，放到阻塞线程池执行
        let regions = tokio::task::spawn_blocking(move || listing::parse_region_listing(&body))
            .await
            .map_err(|e| AppError::network(format!("解析区域列表失败: {e}")))?;

        tracing::info!(
            mirror = %mirror.name,
            snapshot = %snapshot.version(),
            count = regions.len(),
            "已获取区域列表"
        );
        Ok(regions)
    }

    async fn head_file_size(&self, url: &str) -> Option<u64> {
        match self.http.head(url, self.probe_timeout).await {
            Ok(response) if response.status() == StatusCode::OK => {
                HttpClient::content_length(&response)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(url, error = %e, "HEAD 请求失败");
                None
            }
        }
    }

    async fn check_exists(&self, url: &str) -> AppResult<bool> {
        let response = self.http.head(url, self.probe_timeout).await?;
        Ok(response.status() == StatusCode::OK)
    }

    async fn stream_download(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressFn<'_>,
    ) -> AppResult<DownloadSummary> {
        download::stream_download(&self.http, url, dest, progress).await
    }
}
