use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::admission::{check_capacity, Rejection};

/// 单个区域的下载进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegionProgress {
    pub received: u64,
    /// 总字节数，未知时为 0
    pub total: u64,
}

impl RegionProgress {
    /// 完成百分比，总数未知时返回 None
    pub fn percent(&self) -> Option<f64> {
        (self.total > 0).then(|| self.received as f64 * 100.0 / self.total as f64)
    }
}

/// 下载会话状态（仅内存，不持久化）
///
/// 下载结束（成功或失败）时移除该区域的进度，失败原因保留到下一次尝试。
#[derive(Debug, Default)]
pub struct DownloadSession {
    in_flight: HashSet<String>,
    progress: HashMap<String, RegionProgress>,
    errors: HashMap<String, String>,
}

impl DownloadSession {
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, region: &str) -> bool {
        self.in_flight.contains(region)
    }

    pub fn in_flight(&self) -> Vec<String> {
        let mut names: Vec<String> = self.in_flight.iter().cloned().collect();
        names.sort();
        names
    }

    /// 登记为下载中；重复登记或已达上限时拒绝
    pub fn try_begin(&mut self, region: &str, ceiling: usize) -> Result<(), Rejection> {
        if self.is_in_flight(region) {
            return Err(Rejection::AlreadyInFlight);
        }
        if let Some(rejection) = check_capacity(ceiling, self.in_flight.len()) {
            return Err(rejection);
        }
        self.in_flight.insert(region.to_string());
        self.progress
            .insert(region.to_string(), RegionProgress::default());
        self.errors.remove(region);
        Ok(())
    }

    /// 记录进度；接收字节数只增不减
    pub fn record_progress(&mut self, region: &str, received: u64, total: u64) -> bool {
        match self.progress.get_mut(region) {
            Some(entry) if received >= entry.received => {
                entry.received = received;
                entry.total = total;
                true
            }
            _ => false,
        }
    }

    pub fn finish_success(&mut self, region: &str) {
        self.in_flight.remove(region);
        self.progress.remove(region);
    }

    pub fn finish_failure(&mut self, region: &str, message: String) {
        self.in_flight.remove(region);
        self.progress.remove(region);
        self.errors.insert(region.to_string(), message);
    }

    pub fn progress(&self, region: &str) -> Option<RegionProgress> {
        self.progress.get(region).copied()
    }

    pub fn error(&self, region: &str) -> Option<String> {
        self.errors.get(region).cloned()
    }
}
