use chrono::Duration as ChronoDuration;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use super::admission::{admit, check_capacity, AdmissionDecision, AdmissionLimits, Rejection};
use super::constants::cache::DEFAULT_MAX_AGE_HOURS;
use super::phase::Phase;
use super::session::{DownloadSession, RegionProgress};
use crate::catalog::{snapshot, Mirror, Region, Snapshot};
use crate::error::{AppError, AppResult};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::connectivity::ConnectivityProbe;
use crate::infrastructure::disk::DiskSpaceProvider;
use crate::infrastructure::map_engine::MapRegistrar;
use crate::infrastructure::remote::mirror_selector::fastest_available;
use crate::infrastructure::remote::{
    CachedCatalog, CatalogClient, DownloadSummary, LocalCache, MirrorSelector, NetworkErrorPolicy,
};
use crate::infrastructure::storage::KeyValueStore;
use crate::registry::{sweep_partial_downloads, InstalledRegionRecord, InstalledRegistry};
use crate::utils::{AppPaths, FileSystemUtils};

pub type PhaseListener = Arc<dyn Fn(Phase) + Send + Sync>;
pub type ProgressListener = Arc<dyn Fn(&str, RegionProgress) + Send + Sync>;
/// 剩余空间偏低时的确认回调，参数为下载后剩余字节数
pub type ConfirmFn = dyn Fn(u64) -> bool + Send + Sync;

/// 协调器依赖的外部组件
pub struct CoordinatorDeps {
    pub client: Arc<dyn CatalogClient>,
    pub store: Arc<dyn KeyValueStore>,
    pub disk: Arc<dyn DiskSpaceProvider>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub registrar: Arc<dyn MapRegistrar>,
}

/// 协调器参数
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub mirrors: Vec<Mirror>,
    pub cache_max_age: ChronoDuration,
    pub network_error_policy: NetworkErrorPolicy,
    pub limits: AdmissionLimits,
}

impl CoordinatorOptions {
    pub fn new(mirrors: Vec<Mirror>) -> Self {
        Self {
            mirrors,
            cache_max_age: ChronoDuration::hours(DEFAULT_MAX_AGE_HOURS),
            network_error_policy: NetworkErrorPolicy::TrustCache,
            limits: AdmissionLimits::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mirrors: config.mirror_list(),
            cache_max_age: config.cache.max_age(),
            network_error_policy: NetworkErrorPolicy::from_trust_flag(
                config.cache.trust_cache_on_network_error,
            ),
            limits: AdmissionLimits::default(),
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    mirrors: Vec<Mirror>,
    mirror: Option<Mirror>,
    snapshot: Option<Snapshot>,
    snapshots: Vec<Snapshot>,
    regions: Vec<Region>,
    online: bool,
    from_cache: bool,
    /// 本地维护的可用空间，每次 init 重新查询
    available_space: Option<u64>,
    phase: Phase,
    current_error: Option<String>,
}

/// 下载请求的结果
#[derive(Debug)]
pub enum DownloadStart {
    Started(DownloadHandle),
    Rejected(Rejection),
}

/// 已开始的下载任务
#[derive(Debug)]
pub struct DownloadHandle {
    region: String,
    task: JoinHandle<AppResult<InstalledRegionRecord>>,
}

impl DownloadHandle {
    pub fn region(&self) -> &str {
        &self.region
    }

    /// 等待下载结束
    pub async fn wait(self) -> AppResult<InstalledRegionRecord> {
        self.task.await.map_err(|e| {
            AppError::Io(std::io::Error::other(format!("下载任务异常终止: {e}")))
        })?
    }
}

/// 本地清理结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub partial_files: Vec<PathBuf>,
    pub orphaned: Vec<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 占用中的下载名额
///
/// 未显式释放就被丢弃时（任务 panic）按失败释放。
struct InFlightSlot<'a> {
    session: &'a Mutex<DownloadSession>,
    region: &'a str,
    released: bool,
}

impl<'a> InFlightSlot<'a> {
    fn new(session: &'a Mutex<DownloadSession>, region: &'a str) -> Self {
        Self {
            session,
            region,
            released: false,
        }
    }

    fn succeed(mut self) {
        self.released = true;
        lock(self.session).finish_success(self.region);
    }

    fn fail(mut self, message: String) {
        self.released = true;
        lock(self.session).finish_failure(self.region, message);
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!(region = %self.region, "下载任务异常终止，释放下载名额");
            lock(self.session).finish_failure(self.region, "下载任务异常终止".to_string());
        }
    }
}

/// 下载协调器
///
/// 负责目录加载（缓存 → 连通性 → 镜像/快照/区域）、下载准入与安装记录更新。
pub struct DownloadCoordinator {
    paths: AppPaths,
    client: Arc<dyn CatalogClient>,
    disk: Arc<dyn DiskSpaceProvider>,
    connectivity: Arc<dyn ConnectivityProbe>,
    registrar: Arc<dyn MapRegistrar>,
    cache: LocalCache,
    registry: InstalledRegistry,
    cache_max_age: ChronoDuration,
    limits: AdmissionLimits,
    state: Mutex<CatalogState>,
    session: Mutex<DownloadSession>,
    background: Mutex<Option<JoinHandle<()>>>,
    phase_listeners: Mutex<Vec<PhaseListener>>,
    progress_listeners: Mutex<Vec<ProgressListener>>,
}

impl DownloadCoordinator {
    pub fn new(paths: AppPaths, deps: CoordinatorDeps, options: CoordinatorOptions) -> Self {
        let cache = LocalCache::new(deps.store.clone())
            .with_network_error_policy(options.network_error_policy);
        let registry = InstalledRegistry::load(deps.store);

        Self {
            paths,
            client: deps.client,
            disk: deps.disk,
            connectivity: deps.connectivity,
            registrar: deps.registrar,
            cache,
            registry,
            cache_max_age: options.cache_max_age,
            limits: options.limits,
            state: Mutex::new(CatalogState {
                mirrors: options.mirrors,
                ..CatalogState::default()
            }),
            session: Mutex::new(DownloadSession::default()),
            background: Mutex::new(None),
            phase_listeners: Mutex::new(Vec::new()),
            progress_listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn registry(&self) -> &InstalledRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    /// 最近一次 init 失败的原因
    pub fn current_error(&self) -> Option<String> {
        lock(&self.state).current_error.clone()
    }

    pub fn is_online(&self) -> bool {
        lock(&self.state).online
    }

    /// 当前目录是否来自本地缓存
    pub fn is_from_cache(&self) -> bool {
        lock(&self.state).from_cache
    }

    pub fn mirror(&self) -> Option<Mirror> {
        lock(&self.state).mirror.clone()
    }

    /// 最近一次测速后的镜像列表
    pub fn mirrors(&self) -> Vec<Mirror> {
        lock(&self.state).mirrors.clone()
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        lock(&self.state).snapshot.clone()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        lock(&self.state).snapshots.clone()
    }

    pub fn regions(&self) -> Vec<Region> {
        lock(&self.state).regions.clone()
    }

    pub fn available_space(&self) -> Option<u64> {
        lock(&self.state).available_space
    }

    /// 按规范名称或展示名称（忽略大小写）查找区域
    pub fn find_region(&self, query: &str) -> Option<Region> {
        let state = lock(&self.state);
        state
            .regions
            .iter()
            .find(|r| r.name == query)
            .or_else(|| {
                state
                    .regions
                    .iter()
                    .find(|r| r.display_name().eq_ignore_ascii_case(query))
            })
            .cloned()
    }

    pub fn in_flight(&self) -> Vec<String> {
        lock(&self.session).in_flight()
    }

    pub fn progress(&self, region: &str) -> Option<RegionProgress> {
        lock(&self.session).progress(region)
    }

    /// 区域最近一次下载失败的原因
    pub fn region_error(&self, region: &str) -> Option<String> {
        lock(&self.session).error(region)
    }

    pub fn on_phase(&self, listener: PhaseListener) {
        lock(&self.phase_listeners).push(listener);
    }

    pub fn on_progress(&self, listener: ProgressListener) {
        lock(&self.progress_listeners).push(listener);
    }

    fn set_phase(&self, phase: Phase) {
        lock(&self.state).phase = phase;
        tracing::info!(phase = ?phase, "{}", phase);
        let listeners = lock(&self.phase_listeners).clone();
        for listener in listeners {
            listener(phase);
        }
    }

    /// 加载区域目录
    ///
    /// 失败时记录为当前错误并返回，不自动重试。
    pub async fn init(self: &Arc<Self>, force_refresh: bool) -> AppResult<()> {
        lock(&self.state).current_error = None;
        match self.refresh(force_refresh).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "加载区域目录失败");
                lock(&self.state).current_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn refresh(self: &Arc<Self>, force_refresh: bool) -> AppResult<()> {
        self.prune().await?;
        let available = self.disk.available_or_abundant(&self.paths.maps_dir());
        lock(&self.state).available_space = Some(available);

        let online = self.connectivity.is_online().await;
        lock(&self.state).online = online;
        tracing::info!(online, "连通性检测");

        if !force_refresh {
            self.set_phase(Phase::CheckingCache);
            if let Some(cached) = self.cache.load() {
                if self.adopt_cache(cached, online).await {
                    return Ok(());
                }
            }
        }

        self.full_refresh(online).await
    }

    /// 清理残留的临时文件与孤立记录
    ///
    /// 有下载进行中时不清理临时文件。
    pub async fn prune(&self) -> AppResult<PruneReport> {
        let maps_dir = self.paths.maps_dir();
        tokio::fs::create_dir_all(&maps_dir).await?;

        let idle = lock(&self.session).in_flight_count() == 0;
        let partial_files = if idle {
            sweep_partial_downloads(&maps_dir)
        } else {
            Vec::new()
        };
        let orphaned = self.registry.prune_orphaned()?;

        Ok(PruneReport {
            partial_files,
            orphaned,
        })
    }

    /// 尝试使用缓存；返回 false 表示需要完整刷新
    async fn adopt_cache(self: &Arc<Self>, cached: CachedCatalog, online: bool) -> bool {
        self.set_phase(Phase::LoadingFromCache);
        let snapshot = match cached.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "缓存中的快照版本无效");
                return false;
            }
        };

        if online {
            if LocalCache::is_stale(&cached, self.cache_max_age) {
                tracing::info!(captured_at = %cached.captured_at, "目录缓存已过期");
                return false;
            }
            self.set_phase(Phase::ValidatingCache);
            if !self.cache.validate(&cached, self.client.as_ref()).await {
                return false;
            }
        } else {
            tracing::info!("离线，直接使用缓存的目录");
        }

        let mirror = cached.mirror();
        {
            let mut state = lock(&self.state);
            state.snapshots = vec![snapshot.clone()];
            state.mirror = Some(mirror.clone());
            state.snapshot = Some(snapshot);
            state.regions = cached.regions;
            state.from_cache = true;
        }
        if online {
            self.spawn_snapshot_refresh(mirror);
        }
        self.set_phase(Phase::Done);
        true
    }

    /// 后台刷新快照列表，失败时忽略
    fn spawn_snapshot_refresh(self: &Arc<Self>, mirror: Mirror) {
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            match coordinator.client.list_snapshots(&mirror).await {
                Ok(snapshots) if !snapshots.is_empty() => {
                    let mut state = lock(&coordinator.state);
                    if let (Some(newest), Some(current)) =
                        (snapshots.first(), state.snapshot.as_ref())
                    {
                        if newest > current {
                            tracing::info!(latest = %newest, current = %current, "镜像上有更新的快照");
                        }
                    }
                    state.snapshots = snapshots;
                }
                Ok(_) => tracing::debug!(mirror = %mirror.name, "后台刷新未返回快照"),
                Err(e) => tracing::debug!(mirror = %mirror.name, error = %e, "后台刷新快照失败"),
            }
        });
        *lock(&self.background) = Some(handle);
    }

    /// 等待后台快照刷新结束
    pub async fn wait_background_refresh(&self) {
        let handle = lock(&self.background).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// 并发测量所有镜像延迟并保存结果
    pub async fn measure_mirrors(&self) -> Vec<Mirror> {
        let mut selector = MirrorSelector::new(self.mirrors());
        selector.measure_latencies(self.client.as_ref()).await;
        let measured = selector.mirrors().to_vec();
        lock(&self.state).mirrors = measured.clone();
        measured
    }

    async fn full_refresh(&self, online: bool) -> AppResult<()> {
        if !online {
            return Err(AppError::Offline);
        }

        self.set_phase(Phase::MeasuringLatencies);
        let mirrors = self.measure_mirrors().await;

        self.set_phase(Phase::SelectingMirror);
        let mirror = fastest_available(&mirrors)
            .cloned()
            .ok_or(AppError::NoMirrorAvailable)?;
        tracing::info!(mirror = %mirror.name, latency_ms = ?mirror.latency_ms, "🚀 选用镜像");

        self.set_phase(Phase::LoadingSnapshots);
        let snapshots = self.client.list_snapshots(&mirror).await?;
        let latest = snapshot::latest(&snapshots)
            .cloned()
            .ok_or_else(|| AppError::NoSnapshots {
                mirror: mirror.name.clone(),
            })?;

        self.set_phase(Phase::LoadingRegions);
        let regions = self.client.list_regions(&mirror, &latest).await?;
        tracing::info!(snapshot = %latest, regions = regions.len(), "区域列表已加载");

        let catalog = CachedCatalog::new(&mirror, &latest, regions.clone());
        if let Err(e) = self.cache.save(&catalog) {
            tracing::warn!(error = %e, "写入目录缓存失败");
        }

        {
            let mut state = lock(&self.state);
            state.snapshots = snapshots;
            state.mirror = Some(mirror);
            state.snapshot = Some(latest);
            state.regions = regions;
            state.from_cache = false;
        }
        self.set_phase(Phase::Done);
        Ok(())
    }

    /// 请求下载一个区域
    ///
    /// 准入被拒绝时返回 [`DownloadStart::Rejected`]；剩余空间偏低时先调用 `confirm`。
    pub async fn download_region(
        self: &Arc<Self>,
        region: &Region,
        confirm: &ConfirmFn,
    ) -> AppResult<DownloadStart> {
        {
            let session = lock(&self.session);
            if session.is_in_flight(&region.name) {
                return Ok(DownloadStart::Rejected(Rejection::AlreadyInFlight));
            }
            if let Some(rejection) = check_capacity(self.limits.ceiling, session.in_flight_count())
            {
                return Ok(DownloadStart::Rejected(rejection));
            }
        }

        let (mirror, snapshot, available) = {
            let state = lock(&self.state);
            match (&state.mirror, &state.snapshot) {
                (Some(mirror), Some(snapshot)) => {
                    (mirror.clone(), snapshot.clone(), state.available_space)
                }
                _ => return Err(AppError::not_found("区域目录（请先加载目录）")),
            }
        };

        let url = self.client.region_url(&mirror, &snapshot, region);
        let file_size = match region.size {
            Some(size) => size,
            None => self.client.head_file_size(&url).await.unwrap_or(0),
        };
        let available = match available {
            Some(available) => available,
            None => {
                let queried = self.disk.available_or_abundant(&self.paths.maps_dir());
                lock(&self.state).available_space = Some(queried);
                queried
            }
        };

        let in_flight = lock(&self.session).in_flight_count();
        match admit(&self.limits, in_flight, available, file_size) {
            AdmissionDecision::Admit => {}
            AdmissionDecision::AdmitWithWarning { remaining } => {
                if !confirm(remaining) {
                    return Ok(DownloadStart::Rejected(Rejection::NotConfirmed { remaining }));
                }
            }
            AdmissionDecision::Reject(rejection) => {
                tracing::info!(region = %region.name, reason = %rejection, "拒绝下载");
                return Ok(DownloadStart::Rejected(rejection));
            }
        }

        // 解析大小期间可能有其他请求被接纳，登记时再检查一次
        let begun = lock(&self.session).try_begin(&region.name, self.limits.ceiling);
        if let Err(rejection) = begun {
            return Ok(DownloadStart::Rejected(rejection));
        }

        let dest = self
            .paths
            .region_path(snapshot.version(), &region.local_file_name());
        tracing::info!(region = %region.name, url = %url, size = file_size, "⬇️ 开始下载");

        let coordinator = Arc::clone(self);
        let name = region.name.clone();
        let version = snapshot.version().to_string();
        let task = tokio::spawn(async move {
            coordinator.run_download(name, version, url, dest).await
        });

        Ok(DownloadStart::Started(DownloadHandle {
            region: region.name.clone(),
            task,
        }))
    }

    async fn run_download(
        &self,
        name: String,
        version: String,
        url: String,
        dest: PathBuf,
    ) -> AppResult<InstalledRegionRecord> {
        let slot = InFlightSlot::new(&self.session, &name);
        let on_progress = |received: u64, total: u64| self.report_progress(&name, received, total);
        let result = match self.client.stream_download(&url, &dest, &on_progress).await {
            Ok(summary) => self.complete_download(&name, &version, summary),
            Err(e) => Err(e),
        };

        match &result {
            Ok(record) => {
                slot.succeed();
                tracing::info!(region = %name, bytes = record.size_bytes, "✅ 下载完成");
            }
            Err(e) => {
                slot.fail(e.to_string());
                tracing::warn!(region = %name, error = %e, "下载失败");
            }
        }
        result
    }

    fn complete_download(
        &self,
        name: &str,
        version: &str,
        summary: DownloadSummary,
    ) -> AppResult<InstalledRegionRecord> {
        let code = self.registrar.register_map(&summary.path);
        if code != 0 {
            tracing::warn!(region = %name, code, "地图引擎注册失败");
        }

        let record = InstalledRegionRecord::downloaded(
            name,
            version,
            summary.bytes_written,
            summary.path,
            Some(summary.sha256),
        );
        self.registry.upsert(record.clone())?;

        if let Some(space) = lock(&self.state).available_space.as_mut() {
            *space = space.saturating_sub(record.size_bytes);
        }
        Ok(record)
    }

    fn report_progress(&self, name: &str, received: u64, total: u64) {
        let updated = lock(&self.session).record_progress(name, received, total);
        if !updated {
            return;
        }
        let listeners = lock(&self.progress_listeners).clone();
        for listener in listeners {
            listener(name, RegionProgress { received, total });
        }
    }

    /// 删除已下载的区域；随应用分发的区域不能删除
    pub fn delete_region(&self, name: &str) -> AppResult<InstalledRegionRecord> {
        if lock(&self.session).is_in_flight(name) {
            return Err(AppError::validation("region", format!("{name} 正在下载中")));
        }
        let record = self
            .registry
            .by_region(name)
            .ok_or_else(|| AppError::not_found(format!("已安装区域 {name}")))?;
        if record.bundled {
            return Err(AppError::validation(
                "region",
                format!("{name} 随应用分发，不能删除"),
            ));
        }

        FileSystemUtils::remove_file_if_exists(&record.file_path)?;
        if let Some(parent) = record.file_path.parent() {
            FileSystemUtils::remove_dir_if_empty(parent);
        }
        self.registry.remove(name)?;

        if let Some(space) = lock(&self.state).available_space.as_mut() {
            *space = space.saturating_add(record.size_bytes);
        }
        tracing::info!(region = %name, "🗑️ 已删除区域");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProbeResult;
    use crate::core::testing::FakeCatalogClient;
    use crate::infrastructure::connectivity::StaticConnectivity;
    use crate::infrastructure::disk::FixedDiskSpace;
    use crate::infrastructure::map_engine::LoggingRegistrar;
    use crate::infrastructure::storage::MemoryStore;
    use sha2::{Digest, Sha256};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * MB;
    const MIRROR_A: &str = "https://a.example/maps/";
    const MIRROR_B: &str = "https://b.example/maps/";

    fn region(name: &str, size: Option<u64>) -> Region {
        Region::from_file_name(&format!("{name}.mwm"), size)
    }

    fn client() -> FakeCatalogClient {
        let client = FakeCatalogClient::new();
        client.set_probe(MIRROR_A, ProbeResult { latency_ms: Some(120), available: true });
        client.set_probe(MIRROR_B, ProbeResult { latency_ms: Some(40), available: true });
        client.set_snapshots(&["250101", "250301"]);
        client.set_regions(vec![
            region("Austria", Some(10)),
            region("Belgium", Some(20)),
            region("Chile", Some(30)),
            region("Denmark", Some(40)),
        ]);
        client
    }

    fn seed_cache(store: &Arc<MemoryStore>, captured_at: chrono::DateTime<chrono::Utc>) {
        let mut catalog = CachedCatalog::new(
            &Mirror::new("a", MIRROR_A),
            &Snapshot::parse("250101").unwrap(),
            vec![region("Austria", Some(10))],
        );
        catalog.captured_at = captured_at;
        LocalCache::new(store.clone()).save(&catalog).unwrap();
    }

    struct Fixture {
        _dir: TempDir,
        client: Arc<FakeCatalogClient>,
        store: Arc<MemoryStore>,
        coordinator: Arc<DownloadCoordinator>,
    }

    fn build(client: FakeCatalogClient, store: Arc<MemoryStore>, online: bool, space: Option<u64>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(client);
        let deps = CoordinatorDeps {
            client: client.clone(),
            store: store.clone(),
            disk: Arc::new(FixedDiskSpace(space)),
            connectivity: Arc::new(StaticConnectivity(online)),
            registrar: Arc::new(LoggingRegistrar),
        };
        let options = CoordinatorOptions::new(vec![Mirror::new("a", MIRROR_A), Mirror::new("b", MIRROR_B)]);
        let coordinator = Arc::new(DownloadCoordinator::new(AppPaths::new(dir.path()), deps, options));
        Fixture {
            _dir: dir,
            client,
            store,
            coordinator,
        }
    }

    fn fixture(online: bool) -> Fixture {
        build(client(), Arc::new(MemoryStore::new()), online, None)
    }

    async fn ready(client: FakeCatalogClient, space: Option<u64>) -> Fixture {
        let f = build(client, Arc::new(MemoryStore::new()), true, space);
        f.coordinator.init(false).await.unwrap();
        f
    }

    fn yes(_: u64) -> bool {
        true
    }

    fn no(_: u64) -> bool {
        false
    }

    fn started(start: DownloadStart) -> DownloadHandle {
        match start {
            DownloadStart::Started(handle) => handle,
            DownloadStart::Rejected(r) => panic!("unexpected rejection: {r}"),
        }
    }

    #[tokio::test]
    async fn test_full_refresh_selects_fastest_mirror_and_caches() {
        let f = fixture(true);
        f.coordinator.init(false).await.unwrap();

        assert_eq!(f.coordinator.mirror().unwrap().name, "b");
        assert_eq!(f.coordinator.snapshot().unwrap().version(), "250301");
        assert_eq!(f.coordinator.regions().len(), 4);
        assert_eq!(f.coordinator.phase(), Phase::Done);
        assert!(!f.coordinator.is_from_cache());
        assert!(f.coordinator.current_error().is_none());

        let cached = LocalCache::new(f.store.clone()).load().unwrap();
        assert_eq!(cached.mirror_name, "b");
        assert_eq!(cached.snapshot_version, "250301");
    }

    #[tokio::test]
    async fn test_phase_listener_sees_sequence() {
        let f = fixture(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.coordinator
            .on_phase(Arc::new(move |phase: Phase| sink.lock().unwrap().push(phase)));

        f.coordinator.init(false).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Phase::CheckingCache,
                Phase::MeasuringLatencies,
                Phase::SelectingMirror,
                Phase::LoadingSnapshots,
                Phase::LoadingRegions,
                Phase::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_without_cache_fails() {
        let f = fixture(false);
        let err = f.coordinator.init(false).await.unwrap_err();
        assert!(matches!(err, AppError::Offline));
        assert!(err.is_retryable());
        assert!(f.coordinator.current_error().is_some());
    }

    #[tokio::test]
    async fn test_offline_uses_cache_without_network() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now() - chrono::Duration::hours(72));
        let f = build(client(), store, false, None);

        f.coordinator.init(false).await.unwrap();
        assert!(f.coordinator.is_from_cache());
        assert_eq!(f.coordinator.snapshot().unwrap().version(), "250101");
        assert_eq!(f.client.listing_calls(), 0);
        assert_eq!(f.client.probe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.coordinator.phase(), Phase::Done);
    }

    #[tokio::test]
    async fn test_valid_cache_online_refreshes_snapshots_in_background() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now());
        let f = build(client(), store, true, None);

        f.coordinator.init(false).await.unwrap();
        assert!(f.coordinator.is_from_cache());
        assert_eq!(f.client.probe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.client.region_calls.load(Ordering::SeqCst), 0);

        f.coordinator.wait_background_refresh().await;
        assert_eq!(f.client.snapshot_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.coordinator.snapshots()[0].version(), "250301");
        assert_eq!(f.coordinator.snapshot().unwrap().version(), "250101");
    }

    #[tokio::test]
    async fn test_background_refresh_errors_are_swallowed() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now());
        let client = client();
        client.fail_listings(503);
        let f = build(client, store, true, None);

        f.coordinator.init(false).await.unwrap();
        f.coordinator.wait_background_refresh().await;
        assert!(f.coordinator.current_error().is_none());
        assert_eq!(f.coordinator.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_cache_triggers_full_refresh() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now());
        let client = client();
        client.set_exists("https://a.example/maps/250101/", Some(false));
        let f = build(client, store, true, None);

        f.coordinator.init(false).await.unwrap();
        assert!(!f.coordinator.is_from_cache());
        assert_eq!(f.coordinator.mirror().unwrap().name, "b");
        assert_eq!(f.coordinator.snapshot().unwrap().version(), "250301");
    }

    #[tokio::test]
    async fn test_cache_trusted_when_validation_cannot_reach_mirror() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now());
        let client = client();
        client.set_exists("https://a.example/maps/250101/", None);
        let f = build(client, store, true, None);

        f.coordinator.init(false).await.unwrap();
        assert!(f.coordinator.is_from_cache());
    }

    #[tokio::test]
    async fn test_stale_cache_online_triggers_full_refresh() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now() - chrono::Duration::hours(48));
        let f = build(client(), store, true, None);

        f.coordinator.init(false).await.unwrap();
        assert!(!f.coordinator.is_from_cache());
        assert_eq!(f.coordinator.snapshot().unwrap().version(), "250301");
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_cache() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now());
        let f = build(client(), store, true, None);

        f.coordinator.init(true).await.unwrap();
        assert!(!f.coordinator.is_from_cache());
        assert_eq!(f.client.region_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_mirror_available() {
        let client = FakeCatalogClient::new();
        let f = build(client, Arc::new(MemoryStore::new()), true, None);

        let err = f.coordinator.init(false).await.unwrap_err();
        assert!(matches!(err, AppError::NoMirrorAvailable));
        assert!(f.coordinator.mirrors().iter().all(|m| !m.available));
    }

    #[tokio::test]
    async fn test_empty_snapshot_listing_fails() {
        let client = client();
        client.set_snapshots(&[]);
        let f = build(client, Arc::new(MemoryStore::new()), true, None);

        let err = f.coordinator.init(false).await.unwrap_err();
        assert!(matches!(err, AppError::NoSnapshots { .. }));
    }

    #[tokio::test]
    async fn test_catalog_error_surfaces() {
        let client = client();
        client.fail_listings(500);
        let f = build(client, Arc::new(MemoryStore::new()), true, None);

        let err = f.coordinator.init(false).await.unwrap_err();
        assert!(matches!(err, AppError::Catalog { status: 500, .. }));
        assert!(f.coordinator.current_error().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_init_prunes_orphans_and_sweeps_partials() {
        let store = Arc::new(MemoryStore::new());
        seed_cache(&store, chrono::Utc::now());
        let f = build(client(), store, false, None);

        let maps = f.coordinator.paths().maps_dir();
        let partial = maps.join("250101").join("Belgium.mwm.downloading");
        std::fs::create_dir_all(partial.parent().unwrap()).unwrap();
        std::fs::write(&partial, b"half").unwrap();
        f.coordinator
            .registry()
            .upsert(InstalledRegionRecord::downloaded(
                "Chile",
                "250101",
                3,
                maps.join("250101").join("Chile.mwm"),
                None,
            ))
            .unwrap();

        f.coordinator.init(false).await.unwrap();
        assert!(!partial.exists());
        assert!(!f.coordinator.registry().is_installed("Chile"));
    }

    #[tokio::test]
    async fn test_download_records_actual_bytes() {
        let client = client();
        client.set_payload(b"hello");
        let f = ready(client, Some(10 * GB)).await;

        let handle = started(
            f.coordinator
                .download_region(&region("Austria", Some(10)), &yes)
                .await
                .unwrap(),
        );
        assert_eq!(handle.region(), "Austria");
        let record = handle.wait().await.unwrap();

        assert_eq!(record.size_bytes, 5);
        assert_eq!(record.snapshot_version, "250301");
        assert_eq!(record.sha256.as_deref(), Some(hex::encode(Sha256::digest(b"hello")).as_str()));
        assert!(record.file_path.ends_with("maps/250301/Austria.mwm"));
        assert!(record.file_path.is_file());
        assert!(f.coordinator.registry().is_installed("Austria"));
        assert_eq!(f.coordinator.available_space(), Some(10 * GB - 5));
        assert!(f.coordinator.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_progress_listener_is_monotonic() {
        let f = ready(client(), None).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.coordinator.on_progress(Arc::new(move |name: &str, progress: RegionProgress| {
            sink.lock().unwrap().push((name.to_string(), progress.received));
        }));

        started(
            f.coordinator
                .download_region(&region("Austria", Some(10)), &yes)
                .await
                .unwrap(),
        )
        .wait()
        .await
        .unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(seen.iter().all(|(name, _)| name == "Austria"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fourth_download_rejected_until_one_finishes() {
        let gate = Arc::new(Semaphore::new(0));
        let client = FakeCatalogClient::gated(gate.clone());
        client.set_probe(MIRROR_A, ProbeResult { latency_ms: Some(10), available: true });
        client.set_snapshots(&["250101"]);
        client.set_regions(vec![region("Austria", Some(10))]);
        let f = ready(client, None).await;

        let mut handles = Vec::new();
        for name in ["Austria", "Belgium", "Chile"] {
            let start = f
                .coordinator
                .download_region(&region(name, Some(10)), &yes)
                .await
                .unwrap();
            handles.push(started(start));
        }
        assert_eq!(f.coordinator.in_flight().len(), 3);

        let fourth = f
            .coordinator
            .download_region(&region("Denmark", Some(10)), &yes)
            .await
            .unwrap();
        assert!(matches!(
            fourth,
            DownloadStart::Rejected(Rejection::AtCapacity { ceiling: 3 })
        ));

        gate.add_permits(1);
        for _ in 0..500 {
            if f.coordinator.in_flight().len() < 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(f.coordinator.in_flight().len(), 2);

        let fourth = f
            .coordinator
            .download_region(&region("Denmark", Some(10)), &yes)
            .await
            .unwrap();
        handles.push(started(fourth));

        gate.add_permits(10);
        for handle in handles {
            handle.wait().await.unwrap();
        }
        assert_eq!(f.coordinator.registry().downloaded_count(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplicate_request_rejected_while_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let client = FakeCatalogClient::gated(gate.clone());
        client.set_probe(MIRROR_A, ProbeResult { latency_ms: Some(10), available: true });
        client.set_snapshots(&["250101"]);
        client.set_regions(vec![region("Austria", Some(10))]);
        let f = ready(client, None).await;

        let first = started(
            f.coordinator
                .download_region(&region("Austria", Some(10)), &yes)
                .await
                .unwrap(),
        );
        let second = f
            .coordinator
            .download_region(&region("Austria", Some(10)), &yes)
            .await
            .unwrap();
        assert!(matches!(second, DownloadStart::Rejected(Rejection::AlreadyInFlight)));

        assert!(f.coordinator.delete_region("Austria").is_err());

        gate.add_permits(1);
        first.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_low_space_requires_confirmation() {
        let available = GB + 50 * MB;
        let f = ready(client(), Some(available)).await;
        let big = region("Austria", Some(100 * MB));

        let declined = f.coordinator.download_region(&big, &no).await.unwrap();
        match declined {
            DownloadStart::Rejected(Rejection::NotConfirmed { remaining }) => {
                assert_eq!(remaining, available - 100 * MB)
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(f.coordinator.in_flight().is_empty());

        let accepted = f.coordinator.download_region(&big, &yes).await.unwrap();
        started(accepted).wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_space_rejected() {
        let f = ready(client(), Some(200 * MB)).await;
        let start = f
            .coordinator
            .download_region(&region("Austria", Some(100 * MB)), &yes)
            .await
            .unwrap();
        assert!(matches!(
            start,
            DownloadStart::Rejected(Rejection::InsufficientSpace { .. })
        ));
    }

    #[tokio::test]
    async fn test_size_resolved_by_head_when_missing() {
        let client = client();
        client.set_size("https://b.example/maps/250301/Austria.mwm", 100 * MB);
        let f = ready(client, Some(200 * MB)).await;

        let start = f
            .coordinator
            .download_region(&region("Austria", None), &yes)
            .await
            .unwrap();
        assert!(matches!(
            start,
            DownloadStart::Rejected(Rejection::InsufficientSpace { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_download_records_error() {
        let client = client();
        client.fail_download("https://b.example/maps/250301/Belgium.mwm");
        let f = ready(client, None).await;

        let handle = started(
            f.coordinator
                .download_region(&region("Belgium", Some(20)), &yes)
                .await
                .unwrap(),
        );
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, AppError::Download { status: 404, .. }));
        assert!(f.coordinator.region_error("Belgium").is_some());
        assert!(f.coordinator.in_flight().is_empty());
        assert!(!f.coordinator.registry().is_installed("Belgium"));

        let ok = f
            .coordinator
            .download_region(&region("Austria", Some(10)), &yes)
            .await
            .unwrap();
        started(ok).wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_listener_releases_download_slot() {
        let f = ready(client(), None).await;
        f.coordinator.on_progress(Arc::new(|name: &str, _: RegionProgress| {
            if name == "Austria" {
                panic!("listener failure");
            }
        }));

        let handle = started(
            f.coordinator
                .download_region(&region("Austria", Some(10)), &yes)
                .await
                .unwrap(),
        );
        assert!(matches!(handle.wait().await, Err(AppError::Io(_))));
        assert!(f.coordinator.in_flight().is_empty());
        assert!(f.coordinator.region_error("Austria").is_some());

        let ok = f
            .coordinator
            .download_region(&region("Belgium", Some(20)), &yes)
            .await
            .unwrap();
        started(ok).wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_download_before_init_fails() {
        let f = fixture(true);
        let err = f
            .coordinator
            .download_region(&region("Austria", Some(10)), &yes)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_region() {
        let f = ready(client(), Some(10 * GB)).await;
        let record = started(
            f.coordinator
                .download_region(&region("Austria", Some(10)), &yes)
                .await
                .unwrap(),
        )
        .wait()
        .await
        .unwrap();

        let deleted = f.coordinator.delete_region("Austria").unwrap();
        assert_eq!(deleted.region_name, "Austria");
        assert!(!record.file_path.exists());
        assert!(!f.coordinator.registry().is_installed("Austria"));
        assert_eq!(f.coordinator.available_space(), Some(10 * GB));

        assert!(matches!(
            f.coordinator.delete_region("Austria"),
            Err(AppError::NotFound { .. })
        ));

        let bundled = f.coordinator.paths().root().join("World.mwm");
        std::fs::write(&bundled, b"world").unwrap();
        f.coordinator.registry().register_bundled("World", &bundled).unwrap();
        assert!(matches!(
            f.coordinator.delete_region("World"),
            Err(AppError::Validation { .. })
        ));
        assert!(bundled.exists());
    }

    #[tokio::test]
    async fn test_find_region_by_display_name() {
        let client = client();
        client.set_regions(vec![region("Germany_Berlin", Some(1))]);
        let f = ready(client, None).await;

        assert!(f.coordinator.find_region("Germany_Berlin").is_some());
        assert!(f.coordinator.find_region("germany berlin").is_some());
        assert!(f.coordinator.find_region("France").is_none());
    }
}
