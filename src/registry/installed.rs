use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::record::InstalledRegionRecord;
use crate::core::constants::registry::{INSTALLED_FORMAT_VERSION, INSTALLED_KEY};
use crate::error::{AppError, AppResult};
use crate::infrastructure::storage::KeyValueStore;
use crate::utils::FileSystemUtils;

#[derive(Serialize, Deserialize)]
struct StoredRegistry {
    format_version: u32,
    regions: Vec<InstalledRegionRecord>,
}

/// 已安装区域登记表
///
/// 以区域名为键，同名写入会覆盖旧记录。每次修改都整体写回存储。
pub struct InstalledRegistry {
    store: Arc<dyn KeyValueStore>,
    records: Mutex<BTreeMap<String, InstalledRegionRecord>>,
}

impl InstalledRegistry {
    /// 从存储加载；数据损坏时从空表开始
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let records = store
            .get_string(INSTALLED_KEY)
            .map(|json| decode(&json))
            .unwrap_or_default();

        Self {
            store,
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, InstalledRegionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, records: &BTreeMap<String, InstalledRegionRecord>) -> AppResult<()> {
        let stored = StoredRegistry {
            format_version: INSTALLED_FORMAT_VERSION,
            regions: records.values().cloned().collect(),
        };
        let json = serde_json::to_string(&stored)?;
        self.store.set_string(INSTALLED_KEY, &json)
    }

    /// 对当前集合做一次修改并整体写回
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, InstalledRegionRecord>) -> T,
    ) -> AppResult<T> {
        let mut records = self.lock();
        let mut next = records.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *records = next;
        Ok(out)
    }

    /// 所有记录（按区域名排序）
    pub fn all(&self) -> Vec<InstalledRegionRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn by_region(&self, name: &str) -> Option<InstalledRegionRecord> {
        self.lock().get(name).cloned()
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// 插入或覆盖同名记录
    pub fn upsert(&self, record: InstalledRegionRecord) -> AppResult<()> {
        let name = record.region_name.clone();
        self.mutate(|records| {
            records.insert(record.region_name.clone(), record);
        })?;
        tracing::debug!(region = %name, "已更新安装记录");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> AppResult<Option<InstalledRegionRecord>> {
        if !self.is_installed(name) {
            return Ok(None);
        }
        self.mutate(|records| records.remove(name))
    }

    /// 登记随应用分发的区域文件
    pub fn register_bundled(&self, name: &str, path: &Path) -> AppResult<InstalledRegionRecord> {
        let size = FileSystemUtils::file_size(path).map_err(|e| {
            AppError::validation("path", format!("无法读取区域文件 {}: {e}", path.display()))
        })?;
        let absolute = path.canonicalize()?;
        let record = InstalledRegionRecord::bundled(name, size, absolute);
        self.upsert(record.clone())?;
        Ok(record)
    }

    /// 有记录但文件已不存在的区域
    ///
    /// 应用重装会清空文件而保留偏好存储，此时留下的记录即为孤立记录。
    pub fn find_orphaned(&self) -> Vec<String> {
        self.lock()
            .values()
            .filter(|record| !FileSystemUtils::is_existing_file(&record.file_path))
            .map(|record| record.region_name.clone())
            .collect()
    }

    /// 删除当前所有孤立记录，返回被删除的区域名
    pub fn prune_orphaned(&self) -> AppResult<Vec<String>> {
        if self.find_orphaned().is_empty() {
            return Ok(Vec::new());
        }
        // 在同一次加锁内重新判断，避免误删期间写入的新记录
        let orphaned = self.mutate(|records| {
            let orphaned: Vec<String> = records
                .values()
                .filter(|record| !FileSystemUtils::is_existing_file(&record.file_path))
                .map(|record| record.region_name.clone())
                .collect();
            for name in &orphaned {
                records.remove(name);
            }
            orphaned
        })?;
        if orphaned.is_empty() {
            return Ok(orphaned);
        }
        tracing::info!(count = orphaned.len(), regions = ?orphaned, "🧹 已清理孤立的安装记录");
        Ok(orphaned)
    }

    pub fn total_installed_bytes(&self) -> u64 {
        self.lock().values().map(|r| r.size_bytes).sum()
    }

    pub fn downloaded_count(&self) -> usize {
        self.lock().values().filter(|r| !r.bundled).count()
    }

    pub fn bundled_count(&self) -> usize {
        self.lock().values().filter(|r| r.bundled).count()
    }
}

fn decode(json: &str) -> BTreeMap<String, InstalledRegionRecord> {
    let stored: StoredRegistry = match serde_json::from_str(json) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(error = %e, "安装记录已损坏，按空表处理");
            return BTreeMap::new();
        }
    };
    if stored.format_version != INSTALLED_FORMAT_VERSION {
        tracing::warn!(
            found = stored.format_version,
            expected = INSTALLED_FORMAT_VERSION,
            "安装记录格式版本不符，按空表处理"
        );
        return BTreeMap::new();
    }
    stored
        .regions
        .into_iter()
        .map(|record| (record.region_name.clone(), record))
        .collect()
}
