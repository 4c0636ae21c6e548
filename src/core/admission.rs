//! 下载准入控制
//!
//! 纯函数，不依赖界面状态：根据并发上限与磁盘剩余空间给出三态决策。

use serde::Serialize;
use std::fmt;

use crate::core::constants::download::{
    DISK_FLOOR_BYTES, DISK_WARNING_BYTES, MAX_CONCURRENT_DOWNLOADS,
};
use crate::utils::format_bytes;

/// 准入阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    /// 同时下载数量上限
    pub ceiling: usize,
    /// 下载后剩余空间的绝对下限
    pub floor_bytes: u64,
    /// 下载后剩余空间低于该值时需要确认
    pub warning_bytes: u64,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            ceiling: MAX_CONCURRENT_DOWNLOADS,
            floor_bytes: DISK_FLOOR_BYTES,
            warning_bytes: DISK_WARNING_BYTES,
        }
    }
}

/// 拒绝下载的原因，不是错误，用于向用户展示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// 同时下载数已达上限
    AtCapacity { ceiling: usize },
    /// 下载后剩余空间低于下限
    InsufficientSpace { remaining: u64, floor: u64 },
    /// 剩余空间偏低且用户未确认
    NotConfirmed { remaining: u64 },
    /// 该区域已在下载中
    AlreadyInFlight,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtCapacity { ceiling } => {
                write!(f, "已有 {ceiling} 个下载在进行，请等待其中一个完成后重试")
            }
            Self::InsufficientSpace { remaining, floor } => write!(
                f,
                "磁盘空间不足：下载后仅剩 {}，至少需要保留 {}",
                format_bytes(*remaining),
                format_bytes(*floor)
            ),
            Self::NotConfirmed { remaining } => write!(
                f,
                "下载后仅剩 {} 磁盘空间，已取消",
                format_bytes(*remaining)
            ),
            Self::AlreadyInFlight => write!(f, "该区域正在下载中"),
        }
    }
}

/// 准入决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit,
    /// 可以下载，但需要用户先确认
    AdmitWithWarning { remaining: u64 },
    Reject(Rejection),
}

/// 只检查并发上限
pub fn check_capacity(ceiling: usize, in_flight: usize) -> Option<Rejection> {
    (in_flight >= ceiling).then_some(Rejection::AtCapacity { ceiling })
}

/// 计算准入决策
///
/// `remaining = available - file_size`：低于下限拒绝，低于警戒线需要确认。
pub fn admit(
    limits: &AdmissionLimits,
    in_flight: usize,
    available: u64,
    file_size: u64,
) -> AdmissionDecision {
    if let Some(rejection) = check_capacity(limits.ceiling, in_flight) {
        return AdmissionDecision::Reject(rejection);
    }

    let remaining = available.saturating_sub(file_size);
    if remaining < limits.floor_bytes {
        AdmissionDecision::Reject(Rejection::InsufficientSpace {
            remaining,
            floor: limits.floor_bytes,
        })
    } else if remaining < limits.warning_bytes {
        AdmissionDecision::AdmitWithWarning { remaining }
    } else {
        AdmissionDecision::Admit
    }
}
