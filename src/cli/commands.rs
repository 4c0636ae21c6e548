use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mapdrop CLI 应用程序
#[derive(Parser)]
#[command(name = "mapdrop")]
#[command(about = "离线地图区域包管理工具：镜像测速、快照目录与受控下载", long_about = None)]
#[command(version)]
pub struct Cli {
    /// 使用指定的配置文件
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 顶级命令
#[derive(Subcommand)]
pub enum Commands {
    /// 测量所有镜像的延迟
    Mirrors {
        /// JSON 格式输出
        #[arg(long)]
        json: bool,
    },
    /// 列出当前镜像上的快照
    Snapshots {
        /// JSON 格式输出
        #[arg(long)]
        json: bool,
    },
    /// 加载区域目录并列出区域
    Regions {
        /// 忽略缓存，重新选择镜像并加载
        #[arg(long)]
        refresh: bool,
        /// 只显示名称包含该文本的区域
        #[arg(short, long)]
        filter: Option<String>,
        /// JSON 格式输出
        #[arg(long)]
        json: bool,
    },
    /// 下载区域
    Download {
        /// 区域名称（可多个）
        #[arg(required = true)]
        regions: Vec<String>,
        /// 剩余空间偏低时不再询问
        #[arg(short, long)]
        yes: bool,
    },
    /// 列出已安装的区域
    Installed {
        /// JSON 格式输出
        #[arg(long)]
        json: bool,
    },
    /// 删除已下载的区域
    Remove {
        /// 区域名称
        region: String,
    },
    /// 清理未完成的下载与孤立记录
    Prune,
    /// 登记随应用分发的区域文件
    Bundle {
        /// 区域名称
        name: String,
        /// 区域文件路径
        path: PathBuf,
    },
    /// 目录缓存管理
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

/// 目录缓存命令
#[derive(Subcommand)]
pub enum CacheCommands {
    /// 显示缓存内容
    Show {
        /// JSON 格式输出
        #[arg(long)]
        json: bool,
    },
    /// 清除缓存
    Clear,
}
