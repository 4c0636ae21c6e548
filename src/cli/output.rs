use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write;

use crate::catalog::{Mirror, Region, Snapshot};
use crate::core::PruneReport;
use crate::error::AppResult;
use crate::infrastructure::remote::CachedCatalog;
use crate::registry::InstalledRegionRecord;
use crate::utils::format_bytes;

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// 区域列表的上下文
#[derive(Debug, Clone, Serialize)]
pub struct RegionListing<'a> {
    pub mirror: &'a str,
    pub snapshot: &'a str,
    pub from_cache: bool,
}

/// 已安装区域的汇总
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InstalledSummary {
    pub total_bytes: u64,
    pub downloaded: usize,
    pub bundled: usize,
}

#[derive(Serialize)]
struct RegionRow<'a> {
    name: &'a str,
    display_name: String,
    file_name: &'a str,
    size: Option<u64>,
    installed: bool,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> AppResult<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

/// 输出格式化器
pub struct OutputFormatter;

impl OutputFormatter {
    /// 格式化镜像测速结果
    pub fn format_mirrors(
        &self,
        mirrors: &[Mirror],
        fastest: Option<&str>,
        format: OutputFormat,
    ) -> AppResult<String> {
        match format {
            OutputFormat::Text => {
                let mut output = String::from("镜像测速结果:\n");
                for mirror in mirrors {
                    let marker = if Some(mirror.name.as_str()) == fastest { "⭐" } else { "  " };
                    let latency = match (mirror.available, mirror.latency_ms) {
                        (true, Some(ms)) => format!("{ms} ms"),
                        (true, None) => "未知".to_string(),
                        (false, _) => "不可用".to_string(),
                    };
                    let _ = writeln!(output, "{marker} {:<12} {:<10} {}", mirror.name, latency, mirror.base_url);
                }
                if fastest.is_none() {
                    output.push_str("❌ 没有可用的镜像\n");
                }
                Ok(output)
            }
            OutputFormat::Json => to_json(&serde_json::json!({
                "fastest": fastest,
                "mirrors": mirrors,
            })),
        }
    }

    /// 格式化快照列表
    pub fn format_snapshots(
        &self,
        mirror: &str,
        snapshots: &[Snapshot],
        current: Option<&Snapshot>,
        format: OutputFormat,
    ) -> AppResult<String> {
        match format {
            OutputFormat::Text => {
                let mut output = format!("镜像 {mirror} 上的快照:\n");
                if snapshots.is_empty() {
                    output.push_str("  (无)\n");
                }
                for snapshot in snapshots {
                    let marker = if Some(snapshot) == current { "*" } else { " " };
                    let _ = writeln!(output, "{marker} {}  {}", snapshot.version(), snapshot.formatted_date());
                }
                Ok(output)
            }
            OutputFormat::Json => to_json(&serde_json::json!({
                "mirror": mirror,
                "current": current,
                "snapshots": snapshots,
            })),
        }
    }

    /// 格式化区域列表，已安装的区域带标记
    pub fn format_regions(
        &self,
        listing: &RegionListing<'_>,
        regions: &[Region],
        installed: &HashSet<String>,
        format: OutputFormat,
    ) -> AppResult<String> {
        match format {
            OutputFormat::Text => {
                let source = if listing.from_cache { "（缓存）" } else { "" };
                let mut output = format!(
                    "镜像 {} / 快照 {}{}，共 {} 个区域:\n",
                    listing.mirror,
                    listing.snapshot,
                    source,
                    regions.len()
                );
                for region in regions {
                    let marker = if installed.contains(&region.name) { "✓" } else { " " };
                    let size = region.size.map(format_bytes).unwrap_or_else(|| "-".to_string());
                    let _ = writeln!(output, "{marker} {:<40} {:>10}", region.display_name(), size);
                }
                Ok(output)
            }
            OutputFormat::Json => {
                let rows: Vec<RegionRow<'_>> = regions
                    .iter()
                    .map(|r| RegionRow {
                        name: &r.name,
                        display_name: r.display_name(),
                        file_name: &r.file_name,
                        size: r.size,
                        installed: installed.contains(&r.name),
                    })
                    .collect();
                to_json(&serde_json::json!({
                    "mirror": listing.mirror,
                    "snapshot": listing.snapshot,
                    "from_cache": listing.from_cache,
                    "regions": rows,
                }))
            }
        }
    }

    /// 格式化已安装区域
    pub fn format_installed(
        &self,
        records: &[InstalledRegionRecord],
        summary: InstalledSummary,
        format: OutputFormat,
    ) -> AppResult<String> {
        match format {
            OutputFormat::Text => {
                if records.is_empty() {
                    return Ok("尚未安装任何区域\n".to_string());
                }
                let mut output = String::from("已安装的区域:\n");
                for record in records {
                    let kind = if record.bundled { "内置" } else { "下载" };
                    let _ = writeln!(
                        output,
                        "  {:<32} {:<8} {:<4} {:>10}  {}",
                        record.region_name,
                        record.snapshot_version,
                        kind,
                        format_bytes(record.size_bytes),
                        record.installed_at.format("%Y-%m-%d %H:%M")
                    );
                }
                let _ = writeln!(
                    output,
                    "共 {}（下载 {} 个，内置 {} 个）",
                    format_bytes(summary.total_bytes),
                    summary.downloaded,
                    summary.bundled
                );
                Ok(output)
            }
            OutputFormat::Json => to_json(&serde_json::json!({
                "summary": summary,
                "regions": records,
            })),
        }
    }

    /// 格式化缓存内容
    pub fn format_cache(
        &self,
        cached: Option<&CachedCatalog>,
        stale: bool,
        format: OutputFormat,
    ) -> AppResult<String> {
        match format {
            OutputFormat::Text => match cached {
                None => Ok("没有目录缓存\n".to_string()),
                Some(catalog) => Ok(format!(
                    "镜像: {} ({})\n快照: {}\n区域: {} 个\n时间: {}{}\n",
                    catalog.mirror_name,
                    catalog.mirror_base_url,
                    catalog.snapshot_version,
                    catalog.regions.len(),
                    catalog.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    if stale { "（已过期）" } else { "" }
                )),
            },
            OutputFormat::Json => to_json(&serde_json::json!({
                "cache": cached,
                "stale": stale,
            })),
        }
    }

    /// 格式化清理结果
    pub fn format_prune(&self, report: &PruneReport, format: OutputFormat) -> AppResult<String> {
        match format {
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "🧹 已删除 {} 个未完成的下载", report.partial_files.len());
                let _ = writeln!(output, "🧹 已清理 {} 条孤立记录", report.orphaned.len());
                for name in &report.orphaned {
                    let _ = writeln!(output, "  - {name}");
                }
                Ok(output)
            }
            OutputFormat::Json => to_json(report),
        }
    }

    /// 格式化错误信息
    pub fn format_error(&self, error: &str, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => format!("Error: {error}\n"),
            OutputFormat::Json => {
                let json_output = serde_json::json!({
                    "error": error,
                    "success": false
                });
                format!("{json_output}\n")
            }
        }
    }

    /// 格式化成功信息
    pub fn format_success(&self, message: &str, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => format!("{message}\n"),
            OutputFormat::Json => {
                let json_output = serde_json::json!({
                    "message": message,
                    "success": true
                });
                format!("{json_output}\n")
            }
        }
    }
}

/// 默认输出格式化器实例
pub static FORMATTER: OutputFormatter = OutputFormatter;
