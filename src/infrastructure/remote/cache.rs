use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::catalog_client::CatalogClient;
use crate::catalog::{Mirror, Region, Snapshot};
use crate::core::constants::cache::{CATALOG_FORMAT_VERSION, CATALOG_KEY};
use crate::error::AppResult;
use crate::infrastructure::storage::KeyValueStore;

/// 最近一次成功获取的目录（单槽位，不保留历史）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCatalog {
    pub mirror_name: String,
    pub mirror_base_url: String,
    pub snapshot_version: String,
    pub regions: Vec<Region>,
    pub captured_at: DateTime<Utc>,
}

impl CachedCatalog {
    pub fn new(mirror: &Mirror, snapshot: &Snapshot, regions: Vec<Region>) -> Self {
        Self {
            mirror_name: mirror.name.clone(),
            mirror_base_url: mirror.base_url.clone(),
            snapshot_version: snapshot.version().to_string(),
            regions,
            captured_at: Utc::now(),
        }
    }

    /// 缓存中的镜像（延迟未知，视为可用）
    pub fn mirror(&self) -> Mirror {
        let mut mirror = Mirror::new(&self.mirror_name, &self.mirror_base_url);
        mirror.available = true;
        mirror
    }

    pub fn snapshot(&self) -> AppResult<Snapshot> {
        Snapshot::parse(&self.snapshot_version)
    }

    /// 用于校验的快照目录地址
    pub fn validation_url(&self) -> String {
        format!("{}{}/", self.mirror_base_url, self.snapshot_version)
    }
}

/// 持久化格式外层，带版本号
#[derive(Serialize, Deserialize)]
struct StoredCatalog {
    format_version: u32,
    catalog: CachedCatalog,
}

/// 校验时遇到网络失败的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorPolicy {
    /// 仍然信任缓存（偏向离线可用）
    TrustCache,
    /// 视为缓存失效
    Invalidate,
}

impl NetworkErrorPolicy {
    pub fn from_trust_flag(trust: bool) -> Self {
        if trust {
            Self::TrustCache
        } else {
            Self::Invalidate
        }
    }
}

/// 本地目录缓存
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    on_network_error: NetworkErrorPolicy,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            on_network_error: NetworkErrorPolicy::TrustCache,
        }
    }

    pub fn with_network_error_policy(mut self, policy: NetworkErrorPolicy) -> Self {
        self.on_network_error = policy;
        self
    }

    /// 读取缓存；不存在、损坏或格式版本不符时返回 None
    pub fn load(&self) -> Option<CachedCatalog> {
        let json = self.store.get_string(CATALOG_KEY)?;
        let stored: StoredCatalog = match serde_json::from_str(&json) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "目录缓存已损坏，忽略");
                return None;
            }
        };

        if stored.format_version != CATALOG_FORMAT_VERSION {
            tracing::info!(
                found = stored.format_version,
                expected = CATALOG_FORMAT_VERSION,
                "目录缓存格式版本不符，忽略"
            );
            return None;
        }
        if stored.catalog.regions.is_empty() {
            return None;
        }

        Some(stored.catalog)
    }

    /// 覆盖写入缓存；区域列表为空时不写入
    pub fn save(&self, catalog: &CachedCatalog) -> AppResult<()> {
        if catalog.regions.is_empty() {
            tracing::debug!("区域列表为空，不写入缓存");
            return Ok(());
        }
        let stored = StoredCatalog {
            format_version: CATALOG_FORMAT_VERSION,
            catalog: catalog.clone(),
        };
        let json = serde_json::to_string(&stored)?;
        self.store.set_string(CATALOG_KEY, &json)?;
        tracing::debug!(
            mirror = %catalog.mirror_name,
            snapshot = %catalog.snapshot_version,
            regions = catalog.regions.len(),
            "💾 目录缓存已保存"
        );
        Ok(())
    }

    pub fn clear(&self) -> AppResult<()> {
        self.store.remove(CATALOG_KEY)
    }

    /// `now - captured_at > max_age` 时过期，恰好等于时不算过期
    pub fn is_stale(catalog: &CachedCatalog, max_age: Duration) -> bool {
        Self::is_stale_at(catalog, max_age, Utc::now())
    }

    pub fn is_stale_at(catalog: &CachedCatalog, max_age: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(catalog.captured_at) > max_age
    }

    /// 远程确认缓存中的快照目录仍然存在
    ///
    /// 200 为有效，其他状态为无效；网络失败时按策略处理（默认信任缓存）。
    pub async fn validate(&self, catalog: &CachedCatalog, client: &dyn CatalogClient) -> bool {
        let url = catalog.validation_url();
        match client.check_exists(&url).await {
            Ok(valid) => {
                if !valid {
                    tracing::info!(url = %url, "缓存的快照已不存在");
                }
                valid
            }
            Err(e) => {
                let trusted = self.on_network_error == NetworkErrorPolicy::TrustCache;
                tracing::info!(url = %url, error = %e, trusted, "校验缓存时网络失败");
                trusted
            }
        }
    }
}
