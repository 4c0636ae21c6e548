//! 应用程序常量定义
//!
//! 本模块包含全局使用的常量，避免魔数并提供统一的配置值。

/// 网络相关常量
pub mod network {
    /// 镜像测速（HEAD 请求）超时时间（秒）
    pub const PROBE_TIMEOUT_SECS: u64 = 10;
    /// 连通性检测（DNS 解析）超时时间（秒）
    pub const CONNECTIVITY_TIMEOUT_SECS: u64 = 3;
    /// 连通性检测使用的知名主机
    pub const CONNECTIVITY_HOST: &str = "google.com";
    /// 默认 User-Agent
    pub const USER_AGENT: &str = concat!("mapdrop/", env!("CARGO_PKG_VERSION"));
}

/// 缓存相关常量
pub mod cache {
    /// 目录缓存默认最长有效期（小时）
    pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;
    /// 目录缓存有效期上限（小时）
    pub const MAX_AGE_HOURS_LIMIT: i64 = 24 * 365;
    /// 目录缓存的存储键
    pub const CATALOG_KEY: &str = "cached_catalog";
    /// 目录缓存格式版本，不一致时视为无缓存
    pub const CATALOG_FORMAT_VERSION: u32 = 1;
}

/// 已安装区域记录相关常量
pub mod registry {
    /// 已安装区域集合的存储键
    pub const INSTALLED_KEY: &str = "installed_regions";
    /// 已安装区域存储格式版本
    pub const INSTALLED_FORMAT_VERSION: u32 = 1;
    /// 随应用分发的区域使用的快照标记
    pub const BUNDLED_SNAPSHOT: &str = "bundled";
}

/// 下载准入相关常量
pub mod download {
    /// 同时进行的下载数量上限
    pub const MAX_CONCURRENT_DOWNLOADS: usize = 3;
    /// 下载后剩余空间的绝对下限（字节）
    pub const DISK_FLOOR_BYTES: u64 = 128 * 1024 * 1024; // 128MB
    /// 下载后剩余空间低于该值时需要用户确认（字节）
    pub const DISK_WARNING_BYTES: u64 = 1024 * 1024 * 1024; // 1GB
    /// 下载中的临时文件扩展名
    pub const PARTIAL_EXTENSION: &str = "downloading";
    /// 区域文件扩展名
    pub const REGION_EXTENSION: &str = "mwm";
}

/// 日志相关常量
pub mod log {
    /// 默认日志级别
    pub const DEFAULT_LOG_LEVEL: &str = "info";
    /// 日志过滤环境变量
    pub const LOG_ENV: &str = "MAPDROP_LOG";
}

/// 版本信息常量
pub mod version {
    /// 应用程序名称
    pub const APP_NAME: &str = "mapdrop";
    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// 默认配置值
pub mod defaults {
    /// 默认配置目录（相对用户主目录）
    pub const DEFAULT_CONFIG_DIR: &str = ".mapdrop";
    /// 配置文件名
    pub const CONFIG_FILE: &str = "config.toml";
    /// 偏好存储文件名
    pub const PREFERENCES_FILE: &str = "preferences.json";
    /// 区域文件目录名
    pub const MAPS_DIR: &str = "maps";
    /// 默认镜像列表（名称, 根地址）
    pub const DEFAULT_MIRRORS: &[(&str, &str)] = &[
        ("wfr", "https://omaps.wfr.software/maps/"),
        ("webfreak", "https://omaps.webfreak.org/maps/"),
    ];
}
