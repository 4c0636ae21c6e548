use std::path::{Path, PathBuf};

use crate::core::constants::{defaults, download::PARTIAL_EXTENSION};

/// 应用可写目录布局
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 下载的区域文件所在目录
    pub fn maps_dir(&self) -> PathBuf {
        self.root.join(defaults::MAPS_DIR)
    }

    /// 偏好存储文件
    pub fn preferences_file(&self) -> PathBuf {
        self.root.join(defaults::PREFERENCES_FILE)
    }

    /// 区域文件的目标路径：`maps/<snapshot>/<file_name>`
    pub fn region_path(&self, snapshot: &str, file_name: &str) -> PathBuf {
        self.maps_dir().join(snapshot).join(sanitize_file_name(file_name))
    }
}

/// 下载中的临时文件路径
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    dest.with_file_name(name)
}

/// 是否为下载中的临时文件
pub fn is_partial_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(PARTIAL_EXTENSION)
}

/// 去掉路径分隔符，防止目录中的文件名逃逸出目标目录
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
