use serde::{Deserialize, Serialize};

use crate::core::constants::download::REGION_EXTENSION;

/// 可下载的单个地理区域数据包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// 规范名称（文件名去掉扩展名，保持目录中的编码形式）
    pub name: String,
    /// 目录中的文件名（如 `Germany_Berlin.mwm`）
    pub file_name: String,
    /// 目录中标注的字节数
    #[serde(default)]
    pub size: Option<u64>,
}

impl Region {
    /// 从目录中的文件名构造区域
    pub fn from_file_name(file_name: &str, size: Option<u64>) -> Self {
        let suffix = format!(".{REGION_EXTENSION}");
        let name = file_name
            .strip_suffix(&suffix)
            .unwrap_or(file_name)
            .to_string();
        Self {
            name,
            file_name: file_name.to_string(),
            size,
        }
    }

    /// 展示名称：百分号解码后将下划线替换为空格
    pub fn display_name(&self) -> String {
        display_name_of(&self.name)
    }

    /// 本地保存使用的文件名（已解码）
    pub fn local_file_name(&self) -> String {
        urlencoding::decode(&self.file_name)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| self.file_name.clone())
    }
}

pub fn display_name_of(name: &str) -> String {
    let decoded = urlencoding::decode(name)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| name.to_string());
    decoded.replace('_', " ")
}

/// 按展示名称字母序排列
pub fn sort_by_display_name(regions: &mut [Region]) {
    regions.sort_by_cached_key(|r| (r.display_name().to_lowercase(), r.name.clone()));
}
