use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::cli::commands::*;
use crate::cli::output::{InstalledSummary, OutputFormat, RegionListing, FORMATTER};
use crate::core::{
    CoordinatorDeps, CoordinatorOptions, DownloadCoordinator, DownloadStart, RegionProgress,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::connectivity::DnsConnectivity;
use crate::infrastructure::disk::SysinfoDiskSpace;
use crate::infrastructure::map_engine::LoggingRegistrar;
use crate::infrastructure::remote::mirror_selector::fastest_available;
use crate::infrastructure::remote::{HttpCatalogClient, HttpClient, LocalCache};
use crate::infrastructure::storage::JsonFileStore;
use crate::utils::{format_bytes, AppPaths};

/// 命令处理器
pub struct CommandHandler {
    config: AppConfig,
    coordinator: Arc<DownloadCoordinator>,
}

fn create_progress_bar(multi: &MultiProgress, region: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta}) {percent}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(region.to_string());
    pb
}

/// 在终端询问是否继续
fn prompt_low_space(region: &str, remaining: u64) -> bool {
    print!(
        "⚠️  下载 {region} 后仅剩 {} 磁盘空间，是否继续? [y/N] ",
        format_bytes(remaining)
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// 低空间确认；终端读取是阻塞操作，放到 `block_in_place` 中执行
fn confirm_low_space(
    assume_yes: bool,
    region: &str,
    remaining: u64,
    ask: impl FnOnce(&str, u64) -> bool,
) -> bool {
    assume_yes || tokio::task::block_in_place(|| ask(region, remaining))
}

impl CommandHandler {
    /// 创建新的命令处理器
    pub fn new(config_path: Option<&Path>) -> AppResult<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load()?,
        };

        let paths = AppPaths::new(config.resolve_data_dir()?);
        std::fs::create_dir_all(paths.root())?;
        tracing::debug!(data_dir = %paths.root().display(), "数据目录");

        let store = Arc::new(JsonFileStore::open(paths.preferences_file())?);
        let http = HttpClient::new(&config.network.user_agent)?;
        let client =
            HttpCatalogClient::new(http).with_probe_timeout(config.network.probe_timeout());
        let connectivity = DnsConnectivity::new(
            &config.network.connectivity_host,
            config.network.connectivity_timeout(),
        );

        let deps = CoordinatorDeps {
            client: Arc::new(client),
            store,
            disk: Arc::new(SysinfoDiskSpace),
            connectivity: Arc::new(connectivity),
            registrar: Arc::new(LoggingRegistrar),
        };
        let coordinator = Arc::new(DownloadCoordinator::new(
            paths,
            deps,
            CoordinatorOptions::from_config(&config),
        ));

        Ok(Self {
            config,
            coordinator,
        })
    }

    /// 处理命令
    pub async fn handle_command(&mut self, command: Commands) -> AppResult<()> {
        match command {
            Commands::Mirrors { json } => self.handle_mirrors(OutputFormat::from_json_flag(json)).await,
            Commands::Snapshots { json } => {
                self.handle_snapshots(OutputFormat::from_json_flag(json)).await
            }
            Commands::Regions {
                refresh,
                filter,
                json,
            } => {
                self.handle_regions(refresh, filter.as_deref(), OutputFormat::from_json_flag(json))
                    .await
            }
            Commands::Download { regions, yes } => self.handle_download(&regions, yes).await,
            Commands::Installed { json } => self.handle_installed(OutputFormat::from_json_flag(json)),
            Commands::Remove { region } => self.handle_remove(&region),
            Commands::Prune => self.handle_prune().await,
            Commands::Bundle { name, path } => self.handle_bundle(&name, &path),
            Commands::Cache { action } => self.handle_cache_command(action),
        }
    }

    async fn handle_mirrors(&self, format: OutputFormat) -> AppResult<()> {
        let mirrors = self.coordinator.measure_mirrors().await;
        let fastest = fastest_available(&mirrors).map(|m| m.name.clone());
        let output = FORMATTER.format_mirrors(&mirrors, fastest.as_deref(), format)?;
        print!("{output}");
        Ok(())
    }

    async fn handle_snapshots(&self, format: OutputFormat) -> AppResult<()> {
        self.coordinator.init(false).await?;
        self.coordinator.wait_background_refresh().await;

        let mirror = self
            .coordinator
            .mirror()
            .ok_or(AppError::NoMirrorAvailable)?;
        let current = self.coordinator.snapshot();
        let output = FORMATTER.format_snapshots(
            &mirror.name,
            &self.coordinator.snapshots(),
            current.as_ref(),
            format,
        )?;
        print!("{output}");
        Ok(())
    }

    async fn handle_regions(
        &self,
        refresh: bool,
        filter: Option<&str>,
        format: OutputFormat,
    ) -> AppResult<()> {
        self.coordinator.init(refresh).await?;

        let mut regions = self.coordinator.regions();
        if let Some(filter) = filter {
            let needle = filter.to_lowercase();
            regions.retain(|r| {
                r.display_name().to_lowercase().contains(&needle)
                    || r.name.to_lowercase().contains(&needle)
            });
        }

        let installed: HashSet<String> = self
            .coordinator
            .registry()
            .all()
            .into_iter()
            .map(|r| r.region_name)
            .collect();
        let mirror = self.coordinator.mirror().map(|m| m.name).unwrap_or_default();
        let snapshot = self
            .coordinator
            .snapshot()
            .map(|s| s.version().to_string())
            .unwrap_or_default();
        let listing = RegionListing {
            mirror: &mirror,
            snapshot: &snapshot,
            from_cache: self.coordinator.is_from_cache(),
        };

        let output = FORMATTER.format_regions(&listing, &regions, &installed, format)?;
        print!("{output}");
        Ok(())
    }

    async fn handle_download(&self, names: &[String], yes: bool) -> AppResult<()> {
        self.coordinator.init(false).await?;

        let multi = MultiProgress::new();
        let bars: Arc<Mutex<HashMap<String, ProgressBar>>> = Arc::new(Mutex::new(HashMap::new()));
        let sink = bars.clone();
        self.coordinator
            .on_progress(Arc::new(move |name: &str, progress: RegionProgress| {
                let bars = sink.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(pb) = bars.get(name) {
                    if progress.total > 0 {
                        pb.set_length(progress.total);
                    }
                    pb.set_position(progress.received);
                }
            }));

        let mut handles = Vec::new();
        let mut failed = 0usize;
        for name in names {
            let Some(region) = self.coordinator.find_region(name) else {
                eprintln!("❌ 未找到区域: {name}");
                failed += 1;
                continue;
            };

            let pb = create_progress_bar(&multi, &region.display_name());
            bars.lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(region.name.clone(), pb.clone());

            let label = region.display_name();
            let confirm =
                move |remaining: u64| confirm_low_space(yes, &label, remaining, prompt_low_space);
            match self.coordinator.download_region(&region, &confirm).await? {
                DownloadStart::Started(handle) => handles.push((handle, pb)),
                DownloadStart::Rejected(rejection) => {
                    pb.finish_and_clear();
                    eprintln!("⏸️  {}: {rejection}", region.display_name());
                    failed += 1;
                }
            }
        }

        for (handle, pb) in handles {
            let region = handle.region().to_string();
            match handle.wait().await {
                Ok(record) => {
                    pb.finish_with_message(format!("✅ {region}"));
                    println!(
                        "✅ {region} 下载完成 ({}) -> {}",
                        format_bytes(record.size_bytes),
                        record.file_path.display()
                    );
                }
                Err(e) => {
                    pb.abandon_with_message(format!("❌ {region}"));
                    eprintln!("❌ {region} 下载失败: {e}");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(AppError::validation(
                "regions",
                format!("{failed} 个区域未能完成下载"),
            ));
        }
        Ok(())
    }

    fn handle_installed(&self, format: OutputFormat) -> AppResult<()> {
        let registry = self.coordinator.registry();
        let summary = InstalledSummary {
            total_bytes: registry.total_installed_bytes(),
            downloaded: registry.downloaded_count(),
            bundled: registry.bundled_count(),
        };
        let output = FORMATTER.format_installed(&registry.all(), summary, format)?;
        print!("{output}");
        Ok(())
    }

    fn handle_remove(&self, region: &str) -> AppResult<()> {
        let record = self.coordinator.delete_region(region)?;
        print!(
            "{}",
            FORMATTER.format_success(
                &format!(
                    "🗑️  已删除 {}，释放 {}",
                    record.region_name,
                    format_bytes(record.size_bytes)
                ),
                OutputFormat::Text
            )
        );
        Ok(())
    }

    async fn handle_prune(&self) -> AppResult<()> {
        let report = self.coordinator.prune().await?;
        print!("{}", FORMATTER.format_prune(&report, OutputFormat::Text)?);
        Ok(())
    }

    fn handle_bundle(&self, name: &str, path: &Path) -> AppResult<()> {
        let record = self.coordinator.registry().register_bundled(name, path)?;
        print!(
            "{}",
            FORMATTER.format_success(
                &format!(
                    "📦 已登记内置区域 {} ({})",
                    record.region_name,
                    format_bytes(record.size_bytes)
                ),
                OutputFormat::Text
            )
        );
        Ok(())
    }

    fn handle_cache_command(&self, action: CacheCommands) -> AppResult<()> {
        let cache = self.coordinator.cache();
        match action {
            CacheCommands::Show { json } => {
                let cached = cache.load();
                let stale = cached
                    .as_ref()
                    .map(|c| LocalCache::is_stale(c, self.config.cache.max_age()))
                    .unwrap_or(false);
                let output = FORMATTER.format_cache(
                    cached.as_ref(),
                    stale,
                    OutputFormat::from_json_flag(json),
                )?;
                print!("{output}");
            }
            CacheCommands::Clear => {
                cache.clear()?;
                print!(
                    "{}",
                    FORMATTER.format_success("🧹 目录缓存已清除", OutputFormat::Text)
                );
            }
        }
        Ok(())
    }
}
