use futures_util::future::join_all;

use super::catalog_client::CatalogClient;
use crate::catalog::Mirror;

/// 镜像选择器：并发测速并挑选最快的可用镜像
///
/// 不缓存测速结果，每次需要新数据时重新调用 [`MirrorSelector::measure_latencies`]。
#[derive(Debug, Clone)]
pub struct MirrorSelector {
    mirrors: Vec<Mirror>,
}

impl MirrorSelector {
    pub fn new(mirrors: Vec<Mirror>) -> Self {
        Self { mirrors }
    }

    pub fn mirrors(&self) -> &[Mirror] {
        &self.mirrors
    }

    /// 并发测量所有镜像，全部完成后才写回结果
    pub async fn measure_latencies(&mut self, client: &dyn CatalogClient) {
        let probes = self.mirrors.iter().map(|mirror| client.probe_latency(mirror));
        let results = join_all(probes).await;

        for (mirror, result) in self.mirrors.iter_mut().zip(results) {
            mirror.latency_ms = result.latency_ms;
            mirror.available = result.available;
            tracing::info!(
                mirror = %mirror.name,
                latency_ms = ?mirror.latency_ms,
                available = mirror.available,
                "镜像测速"
            );
        }
    }

    /// 延迟最低的可用镜像；延迟未知视为无穷大，相同时取配置顺序靠前者
    pub fn fastest_available(&self) -> Option<&Mirror> {
        fastest_available(&self.mirrors)
    }
}

pub fn fastest_available(mirrors: &[Mirror]) -> Option<&Mirror> {
    let mut best: Option<&Mirror> = None;
    for mirror in mirrors.iter().filter(|m| m.available) {
        let latency = mirror.latency_ms.unwrap_or(u64::MAX);
        match best {
            Some(current) if current.latency_ms.unwrap_or(u64::MAX) <= latency => {}
            _ => best = Some(mirror),
        }
    }
    best
}
