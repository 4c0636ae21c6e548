//! 镜像目录页（HTML 自动索引）解析
//!
//! 镜像服务器返回的是 nginx/Apache 风格的目录列表，这里用正则提取条目：
//!
//! ```text
//! <a href="250101/">250101/</a>            01-Jan-2025 03:12       -
//! <a href="./250214/">250214/</a>          14-Feb-2025 03:12       -
//! <a href="Austria.mwm">Austria.mwm</a>    01-Jan-2025 03:12   612345678
//! ```

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::catalog::region::sort_by_display_name;
use crate::catalog::snapshot::sort_newest_first;
use crate::catalog::{Region, Snapshot};

fn snapshot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // 兼容 href="250101/" 与 href="./250101/"（以及带绝对路径前缀的写法）
    PATTERN.get_or_init(|| {
        Regex::new(r#"href\s*=\s*["'](?:\./|/(?:[^"'/]+/)*)?(\d{6})/?["']"#)
            .expect("snapshot pattern")
    })
}

fn sized_region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // 文件名 + 同一行内的日期、时间与字节数；带单位的大小（如 612M）不匹配
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"href\s*=\s*["'](?:\./)?([^"'/?#]+\.mwm)["'][^>]*>[^<]*</a>[ \t]+\S+[ \t]+\S+[ \t]+(\d+)[ \t]*(?:\r?\n|<|$)"#,
        )
        .expect("sized region pattern")
    })
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"href\s*=\s*["'](?:\./)?([^"'/?#]+\.mwm)["']"#).expect("region pattern")
    })
}

/// 解析镜像根目录，返回按日期降序排列的快照
///
/// 无法解析为有效日期的目录被跳过，不影响其他条目。
pub fn parse_snapshot_listing(html: &str) -> Vec<Snapshot> {
    let versions: BTreeSet<&str> = snapshot_pattern()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    let mut snapshots: Vec<Snapshot> = versions
        .into_iter()
        .filter_map(|version| match Snapshot::parse(version) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::debug!(version, error = %e, "跳过无效的快照目录");
                None
            }
        })
        .collect();

    sort_newest_first(&mut snapshots);
    snapshots
}

/// 解析快照目录，返回按展示名称排序的区域
///
/// 先用带字节数的模式匹配；没有任何匹配时退回只取文件名的模式。
/// 同一页面中未标注大小的条目同样保留（大小为 None）。
pub fn parse_region_listing(html: &str) -> Vec<Region> {
    let mut entries: BTreeMap<String, Option<u64>> = BTreeMap::new();

    for caps in sized_region_pattern().captures_iter(html) {
        let size = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok());
        entries.insert(caps[1].to_string(), size);
    }

    if entries.is_empty() {
        tracing::debug!("目录中没有大小标注，使用文件名模式解析");
    }

    for caps in region_pattern().captures_iter(html) {
        entries.entry(caps[1].to_string()).or_insert(None);
    }

    let mut regions: Vec<Region> = entries
        .into_iter()
        .map(|(file_name, size)| Region::from_file_name(&file_name, size))
        .collect();

    sort_by_display_name(&mut regions);
    regions
}
