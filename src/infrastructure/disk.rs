use std::path::Path;
use sysinfo::Disks;

/// 查询失败时假定的可用空间
pub const ABUNDANT_SPACE_BYTES: u64 = u64::MAX;

/// 磁盘剩余空间查询
pub trait DiskSpaceProvider: Send + Sync {
    /// 返回 `path` 所在磁盘的可用字节数，无法查询时返回 None
    fn available_bytes(&self, path: &Path) -> Option<u64>;

    /// 带兜底的查询：失败时视为空间充足
    fn available_or_abundant(&self, path: &Path) -> u64 {
        self.available_bytes(path).unwrap_or_else(|| {
            tracing::warn!(path = %path.display(), "无法查询磁盘空间，按空间充足处理");
            ABUNDANT_SPACE_BYTES
        })
    }
}

/// 基于 sysinfo 的实现：选择挂载点与目标路径匹配最长的磁盘
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoDiskSpace;

impl DiskSpaceProvider for SysinfoDiskSpace {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();

        let mut best: Option<(usize, u64)> = None;
        for disk in disks.list() {
            let mount = disk.mount_point();
            if target.starts_with(mount) {
                let score = mount.as_os_str().len();
                match best {
                    Some((best_score, _)) if best_score >= score => {}
                    _ => best = Some((score, disk.available_space())),
                }
            }
        }

        best.map(|(_, available)| available)
    }
}

/// 固定值实现
#[derive(Debug, Clone, Copy)]
pub struct FixedDiskSpace(pub Option<u64>);

impl DiskSpaceProvider for FixedDiskSpace {
    fn available_bytes(&self, _path: &Path) -> Option<u64> {
        self.0
    }
}
