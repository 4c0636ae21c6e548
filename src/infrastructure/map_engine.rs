use std::path::Path;

/// 外部地图引擎的注册回调
///
/// 返回值为引擎的结果码，只用于日志与展示，不影响已安装区域记录。
pub trait MapRegistrar: Send + Sync {
    fn register_map(&self, path: &Path) -> i32;
}

/// 未接入引擎时使用：仅记录日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRegistrar;

impl MapRegistrar for LoggingRegistrar {
    fn register_map(&self, path: &Path) -> i32 {
        tracing::info!(path = %path.display(), "未接入地图引擎，跳过注册");
        0
    }
}
