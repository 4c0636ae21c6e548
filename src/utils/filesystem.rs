use std::fs;
use std::io;
use std::path::Path;

/// 文件系统工具
pub struct FileSystemUtils;

impl FileSystemUtils {
    /// 安全地删除文件，文件不存在时返回 false
    pub fn remove_file_if_exists(path: &Path) -> Result<bool, io::Error> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 获取文件大小
    pub fn file_size(path: &Path) -> Result<u64, io::Error> {
        Ok(fs::metadata(path)?.len())
    }

    /// 路径存在且是普通文件
    pub fn is_existing_file(path: &Path) -> bool {
        path.is_file()
    }

    /// 删除空目录（非空或不存在时忽略）
    pub fn remove_dir_if_empty(path: &Path) {
        let is_empty = fs::read_dir(path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            let _ = fs::remove_dir(path);
        }
    }
}

/// 以 MB 为单位展示字节数
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
