use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::constants::registry::BUNDLED_SNAPSHOT;

/// 已安装区域的元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRegionRecord {
    /// 区域名称（唯一键）
    pub region_name: String,
    /// 快照版本，随应用分发的区域为 `"bundled"`
    pub snapshot_version: String,
    pub size_bytes: u64,
    pub installed_at: DateTime<Utc>,
    /// 区域文件的绝对路径
    pub file_path: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub bundled: bool,
}

impl InstalledRegionRecord {
    /// 下载完成的区域
    pub fn downloaded(
        region_name: &str,
        snapshot_version: &str,
        size_bytes: u64,
        file_path: PathBuf,
        sha256: Option<String>,
    ) -> Self {
        Self {
            region_name: region_name.to_string(),
            snapshot_version: snapshot_version.to_string(),
            size_bytes,
            installed_at: Utc::now(),
            file_path,
            sha256,
            bundled: false,
        }
    }

    /// 随应用分发的区域
    pub fn bundled(region_name: &str, size_bytes: u64, file_path: PathBuf) -> Self {
        Self {
            region_name: region_name.to_string(),
            snapshot_version: BUNDLED_SNAPSHOT.to_string(),
            size_bytes,
            installed_at: Utc::now(),
            file_path,
            sha256: None,
            bundled: true,
        }
    }
}
