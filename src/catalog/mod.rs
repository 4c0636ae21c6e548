//! 目录数据模型：镜像、快照与区域

pub mod mirror;
pub mod region;
pub mod snapshot;

pub use mirror::{Mirror, ProbeResult};
pub use region::Region;
pub use snapshot::Snapshot;
