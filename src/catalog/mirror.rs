use serde::{Deserialize, Serialize};

/// 托管数据快照的 HTTP 镜像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    pub name: String,
    /// 镜像根地址，始终以 `/` 结尾
    pub base_url: String,
    /// 最近一次测得的延迟（毫秒）
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub available: bool,
}

impl Mirror {
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: normalize_base_url(base_url),
            latency_ms: None,
            available: false,
        }
    }

    /// 快照目录地址：`base_url + version + "/"`
    pub fn snapshot_url(&self, version: &str) -> String {
        format!("{}{}/", self.base_url, version)
    }
}

/// 单次测速结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub latency_ms: Option<u64>,
    pub available: bool,
}

impl ProbeResult {
    pub fn unavailable() -> Self {
        Self {
            latency_ms: None,
            available: false,
        }
    }
}

pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
