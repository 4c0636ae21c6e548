use std::io;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 列目录（镜像根目录 / 快照目录）时服务器返回非 200
    #[error("目录请求失败: {url} (HTTP {status})")]
    Catalog { url: String, status: u16 },

    /// 开始下载时服务器返回非 200，此时尚未写入任何字节
    #[error("下载请求失败: {url} (HTTP {status})")]
    Download { url: String, status: u16 },

    #[error("网络错误: {message}")]
    Network { message: String },

    #[error("配置错误: {message}")]
    Config { message: String },

    #[error("快照版本格式错误: {version} - {reason}")]
    SnapshotFormat { version: String, reason: String },

    #[error("当前处于离线状态")]
    Offline,

    #[error("没有可用的镜像")]
    NoMirrorAvailable,

    #[error("镜像 {mirror} 上没有找到任何快照")]
    NoSnapshots { mirror: String },

    #[error("未找到请求的资源: {resource}")]
    NotFound { resource: String },

    #[error("验证错误: {field} - {reason}")]
    Validation { field: String, reason: String },
}

/// 应用程序 Result 类型
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// 发现阶段的失败是否可由用户手动重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Catalog { .. }
                | Self::Offline
                | Self::NoMirrorAvailable
                | Self::NoSnapshots { .. }
        )
    }

    /// 针对错误给出的处理建议
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Offline => vec!["检查网络连接后重试", "已下载的区域在离线时仍可使用"],
            Self::NoMirrorAvailable => vec![
                "所有镜像均无响应，请稍后重试",
                "在 ~/.mapdrop/config.toml 中添加其他镜像",
            ],
            Self::Catalog { .. } | Self::Network { .. } => {
                vec!["镜像可能暂时不可用，请稍后重试", "使用 --refresh 强制重新选择镜像"]
            }
            Self::Download { .. } => vec!["该区域文件可能已从镜像移除，请刷新区域列表"],
            Self::NoSnapshots { .. } => vec!["镜像目录可能正在同步，请稍后重试"],
            _ => Vec::new(),
        }
    }

    /// 获取用户友好的错误消息
    pub fn user_message(&self) -> String {
        let mut msg = format!("❌ {}\n", self);
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            msg.push_str("💡 建议:\n");
            for suggestion in suggestions {
                msg.push_str(&format!("  • {}\n", suggestion));
            }
        }
        if self.is_retryable() {
            msg.push_str("↻ 可以重新执行该命令重试\n");
        }
        msg
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("连接超时: {err}")
        } else if err.is_connect() {
            format!("连接失败: {err}")
        } else {
            format!("网络请求失败: {err}")
        };
        Self::Network { message }
    }
}

impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.user_message()
    }
}
