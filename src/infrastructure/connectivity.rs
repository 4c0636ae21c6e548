use async_trait::async_trait;
use std::time::Duration;
use tokio::net::lookup_host;

/// 连通性检测
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// 通过解析知名主机判断是否在线
pub struct DnsConnectivity {
    host: String,
    timeout: Duration,
}

impl DnsConnectivity {
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for DnsConnectivity {
    async fn is_online(&self) -> bool {
        let target = format!("{}:443", self.host);
        match tokio::time::timeout(self.timeout, lookup_host(target)).await {
            Ok(Ok(mut addresses)) => {
                let online = addresses.next().is_some();
                tracing::debug!(host = %self.host, online, "DNS 连通性检测完成");
                online
            }
            Ok(Err(e)) => {
                tracing::debug!(host = %self.host, error = %e, "DNS 解析失败，视为离线");
                false
            }
            Err(_) => {
                tracing::debug!(host = %self.host, "DNS 解析超时，视为离线");
                false
            }
        }
    }
}

/// 固定结果
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub bool);

#[async_trait]
impl ConnectivityProbe for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.0
    }
}
