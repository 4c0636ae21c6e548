use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::AppError;

/// 数据快照：镜像上以 YYMMDD 命名的一次完整发布
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Snapshot {
    version: String,
    date: NaiveDate,
}

impl Snapshot {
    /// 解析六位日期版本号（如 `250101`），两位年份按 20YY 处理
    pub fn parse(version: &str) -> Result<Self, AppError> {
        let invalid = |reason: &str| AppError::SnapshotFormat {
            version: version.to_string(),
            reason: reason.to_string(),
        };

        if version.len() != 6 || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("必须是 6 位数字"));
        }

        let year: i32 = version[0..2].parse().map_err(|_| invalid("年份无效"))?;
        let month: u32 = version[2..4].parse().map_err(|_| invalid("月份无效"))?;
        let day: u32 = version[4..6].parse().map_err(|_| invalid("日期无效"))?;

        let date = NaiveDate::from_ymd_opt(2000 + year, month, day)
            .ok_or_else(|| invalid("不是有效的日历日期"))?;

        Ok(Self {
            version: version.to_string(),
            date,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// 由日期重新格式化出的 YYMMDD
    pub fn formatted_date(&self) -> String {
        format!(
            "{:02}{:02}{:02}",
            self.date.year() % 100,
            self.date.month(),
            self.date.day()
        )
    }
}

impl Ord for Snapshot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for Snapshot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.date.format("%Y-%m-%d"))
    }
}

impl TryFrom<String> for Snapshot {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Snapshot> for String {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.version
    }
}

/// 按日期降序排列（最新在前）
pub fn sort_newest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| b.cmp(a));
}

/// 最新的快照
pub fn latest(snapshots: &[Snapshot]) -> Option<&Snapshot> {
    snapshots.iter().max()
}
