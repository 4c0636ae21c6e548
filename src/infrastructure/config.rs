use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::Mirror;
use crate::core::constants::{cache, defaults, network};
use crate::error::{AppError, AppResult};

/// 配置文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 数据目录，缺省为 `~/.mapdrop`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<MirrorConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// 镜像配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub name: String,
    pub url: String,
}

/// 目录缓存策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
    /// 校验缓存时网络失败是否仍信任缓存
    #[serde(default = "default_true")]
    pub trust_cache_on_network_error: bool,
}

/// 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_connectivity_host")]
    pub connectivity_host: String,
    #[serde(default = "default_connectivity_timeout")]
    pub connectivity_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_mirrors() -> Vec<MirrorConfig> {
    defaults::DEFAULT_MIRRORS
        .iter()
        .map(|(name, url)| MirrorConfig {
            name: name.to_string(),
            url: url.to_string(),
        })
        .collect()
}

fn default_max_age_hours() -> i64 {
    cache::DEFAULT_MAX_AGE_HOURS
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout() -> u64 {
    network::PROBE_TIMEOUT_SECS
}

fn default_connectivity_host() -> String {
    network::CONNECTIVITY_HOST.to_string()
}

fn default_connectivity_timeout() -> u64 {
    network::CONNECTIVITY_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    network::USER_AGENT.to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            trust_cache_on_network_error: true,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            connectivity_host: default_connectivity_host(),
            connectivity_timeout_secs: default_connectivity_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            mirrors: default_mirrors(),
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> ChronoDuration {
        ChronoDuration::hours(self.max_age_hours.clamp(0, cache::MAX_AGE_HOURS_LIMIT))
    }
}

impl NetworkConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity_timeout_secs)
    }
}

impl AppConfig {
    /// 从默认路径加载配置，不存在时写入默认配置
    pub fn load() -> AppResult<Self> {
        Self::load_from(&get_config_path()?)
    }

    /// 从指定文件加载配置
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            let config = AppConfig::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| AppError::config(format!("解析配置文件失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_content = toml::to_string_pretty(self)
            .map_err(|e| AppError::config(format!("序列化配置失败: {e}")))?;
        fs::write(path, toml_content)?;
        Ok(())
    }

    fn validate(&self) -> AppResult<()> {
        if self.mirrors.is_empty() {
            return Err(AppError::validation("mirrors", "至少需要配置一个镜像"));
        }
        for mirror in &self.mirrors {
            url::Url::parse(&mirror.url).map_err(|e| {
                AppError::validation("mirrors", format!("镜像 {} 地址无效: {e}", mirror.name))
            })?;
        }
        if !(0..=cache::MAX_AGE_HOURS_LIMIT).contains(&self.cache.max_age_hours) {
            return Err(AppError::validation(
                "cache.max_age_hours",
                format!("必须在 0 到 {} 之间", cache::MAX_AGE_HOURS_LIMIT),
            ));
        }
        Ok(())
    }

    /// 配置中的镜像列表
    pub fn mirror_list(&self) -> Vec<Mirror> {
        self.mirrors
            .iter()
            .map(|m| Mirror::new(&m.name, &m.url))
            .collect()
    }

    /// 数据目录
    pub fn resolve_data_dir(&self) -> AppResult<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_config_dir(),
        }
    }
}

/// 获取配置文件路径
pub fn get_config_path() -> AppResult<PathBuf> {
    Ok(get_config_dir()?.join(defaults::CONFIG_FILE))
}

/// 获取配置目录
pub fn get_config_dir() -> AppResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| AppError::config("无法获取用户主目录"))?;
    Ok(home_dir.join(defaults::DEFAULT_CONFIG_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.mirrors.len(), defaults::DEFAULT_MIRRORS.len());
        assert_eq!(config.cache.max_age_hours, 24);
        assert!(config.cache.trust_cache_on_network_error);
        assert_eq!(config.network.probe_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[[mirrors]]
name = "local"
url = "http://127.0.0.1:8080/maps"

[cache]
trust_cache_on_network_error = false
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        let mirrors = config.mirror_list();
        assert_eq!(mirrors.len(), 1);
        assert_eq!(mirrors[0].base_url, "http://127.0.0.1:8080/maps/");
        assert!(!config.cache.trust_cache_on_network_error);
        assert_eq!(config.cache.max_age_hours, 24);
        assert_eq!(config.network.connectivity_host, network::CONNECTIVITY_HOST);
    }

    #[test]
    fn test_cache_age_out_of_range_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        for hours in [-1, cache::MAX_AGE_HOURS_LIMIT + 1, i64::MAX] {
            fs::write(&path, format!("[cache]\nmax_age_hours = {hours}\n")).unwrap();
            assert!(matches!(
                AppConfig::load_from(&path),
                Err(AppError::Validation { .. })
            ));
        }

        let huge = CacheConfig {
            max_age_hours: i64::MAX,
            ..CacheConfig::default()
        };
        assert_eq!(huge.max_age(), ChronoDuration::hours(cache::MAX_AGE_HOURS_LIMIT));
    }

    #[test]
    fn test_invalid_mirror_url_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[[mirrors]]\nname = \"bad\"\nurl = \"not a url\"\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(AppError::Validation { .. })
        ));
    }
}
