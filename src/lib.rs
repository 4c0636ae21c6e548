// 核心模块
pub mod catalog;
pub mod cli;
pub mod core;
pub mod error;
pub mod infrastructure;
pub mod registry;
pub mod utils;

// 重新导出常用类型
pub use catalog::{Mirror, Region, Snapshot};
pub use core::{DownloadCoordinator, DownloadStart, Phase, Rejection};
pub use error::{AppError, AppResult};
pub use registry::{InstalledRegionRecord, InstalledRegistry};
// 使用命名空间导入常量，避免与 infrastructure 中的模块名冲突
pub use core::constants as app_constants;
