use serde::Serialize;
use std::fmt;

/// 目录加载阶段，仅用于进度展示
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    CheckingCache,
    LoadingFromCache,
    ValidatingCache,
    MeasuringLatencies,
    SelectingMirror,
    LoadingSnapshots,
    LoadingRegions,
    Done,
}

impl Phase {
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Idle => "空闲",
            Phase::CheckingCache => "检查缓存",
            Phase::LoadingFromCache => "读取缓存",
            Phase::ValidatingCache => "校验缓存",
            Phase::MeasuringLatencies => "测量镜像延迟",
            Phase::SelectingMirror => "选择镜像",
            Phase::LoadingSnapshots => "加载快照列表",
            Phase::LoadingRegions => "加载区域列表",
            Phase::Done => "完成",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
