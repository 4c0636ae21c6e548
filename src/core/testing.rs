//! 测试用的目录后端替身

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::catalog::{Mirror, ProbeResult, Region, Snapshot};
use crate::error::{AppError, AppResult};
use crate::infrastructure::remote::{CatalogClient, DownloadSummary, ProgressFn};

#[derive(Default)]
struct FakeState {
    probes: HashMap<String, ProbeResult>,
    snapshots: Vec<Snapshot>,
    regions: Vec<Region>,
    listing_status: Option<u16>,
    sizes: HashMap<String, u64>,
    /// `None` 表示网络失败
    exists: HashMap<String, Option<bool>>,
    payload: Vec<u8>,
    failing_downloads: HashSet<String>,
}

/// 可编排的内存目录后端
///
/// 未设置测速结果的镜像视为不可用；未设置的存在性检查返回 true。
#[derive(Default)]
pub struct FakeCatalogClient {
    state: Mutex<FakeState>,
    gate: Option<Arc<Semaphore>>,
    pub snapshot_calls: AtomicUsize,
    pub region_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
}

impl FakeCatalogClient {
    pub fn new() -> Self {
        let client = Self::default();
        client.set_payload(b"region-bytes");
        client
    }

    /// 每次下载需先从 `gate` 取得一个许可
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_probe(&self, base_url: &str, result: ProbeResult) {
        self.state().probes.insert(base_url.to_string(), result);
    }

    pub fn set_snapshots(&self, versions: &[&str]) {
        let mut snapshots: Vec<Snapshot> = versions
            .iter()
            .map(|v| Snapshot::parse(v).unwrap())
            .collect();
        crate::catalog::snapshot::sort_newest_first(&mut snapshots);
        self.state().snapshots = snapshots;
    }

    pub fn set_regions(&self, regions: Vec<Region>) {
        self.state().regions = regions;
    }

    pub fn fail_listings(&self, status: u16) {
        self.state().listing_status = Some(status);
    }

    pub fn set_size(&self, url: &str, size: u64) {
        self.state().sizes.insert(url.to_string(), size);
    }

    pub fn set_exists(&self, url: &str, exists: Option<bool>) {
        self.state().exists.insert(url.to_string(), exists);
    }

    pub fn set_payload(&self, payload: &[u8]) {
        self.state().payload = payload.to_vec();
    }

    pub fn fail_download(&self, url: &str) {
        self.state().failing_downloads.insert(url.to_string());
    }

    pub fn listing_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst) + self.region_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogClient for FakeCatalogClient {
    async fn probe_latency(&self, mirror: &Mirror) -> ProbeResult {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.state()
            .probes
            .get(&mirror.base_url)
            .copied()
            .unwrap_or_else(ProbeResult::unavailable)
    }

    async fn list_snapshots(&self, mirror: &Mirror) -> AppResult<Vec<Snapshot>> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        match state.listing_status {
            Some(status) => Err(AppError::Catalog {
                url: mirror.base_url.clone(),
                status,
            }),
            None => Ok(state.snapshots.clone()),
        }
    }

    async fn list_regions(&self, mirror: &Mirror, snapshot: &Snapshot) -> AppResult<Vec<Region>> {
        self.region_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        match state.listing_status {
            Some(status) => Err(AppError::Catalog {
                url: mirror.snapshot_url(snapshot.version()),
                status,
            }),
            None => Ok(state.regions.clone()),
        }
    }

    async fn head_file_size(&self, url: &str) -> Option<u64> {
        self.state().sizes.get(url).copied()
    }

    async fn check_exists(&self, url: &str) -> AppResult<bool> {
        match self.state().exists.get(url).copied() {
            Some(Some(exists)) => Ok(exists),
            Some(None) => Err(AppError::network("connection refused")),
            None => Ok(true),
        }
    }

    async fn stream_download(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressFn<'_>,
    ) -> AppResult<DownloadSummary> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| AppError::network(e.to_string()))?
                .forget();
        }

        let (payload, fails) = {
            let state = self.state();
            (state.payload.clone(), state.failing_downloads.contains(url))
        };
        if fails {
            return Err(AppError::Download {
                url: url.to_string(),
                status: 404,
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &payload).await?;

        let total = payload.len() as u64;
        progress(total / 2, total);
        progress(total, total);

        Ok(DownloadSummary {
            path: dest.to_path_buf(),
            bytes_written: total,
            sha256: hex::encode(Sha256::digest(&payload)),
        })
    }
}
