use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::utils::paths::is_partial_file;
use crate::utils::FileSystemUtils;

/// 删除地图目录下残留的 `*.downloading` 临时文件
///
/// 上次运行中断的下载会留下这些文件，启动时在清理孤立记录之前调用。
/// 返回被删除的路径；单个文件删除失败只记录警告。
pub fn sweep_partial_downloads(maps_dir: &Path) -> Vec<PathBuf> {
    if !maps_dir.exists() {
        return Vec::new();
    }

    let mut removed = Vec::new();
    for entry in WalkDir::new(maps_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_partial_file(e.path()))
    {
        match FileSystemUtils::remove_file_if_exists(entry.path()) {
            Ok(true) => removed.push(entry.into_path()),
            Ok(false) => {}
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "无法删除临时文件"),
        }
    }

    if !removed.is_empty() {
        tracing::info!(count = removed.len(), "🧹 已清理未完成的下载");
    }
    removed
}
