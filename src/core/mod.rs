pub mod admission;
pub mod constants;
pub mod coordinator;
pub mod phase;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{admit, AdmissionDecision, AdmissionLimits, Rejection};
pub use coordinator::{
    ConfirmFn, CoordinatorDeps, CoordinatorOptions, DownloadCoordinator, DownloadHandle,
    DownloadStart, PhaseListener, ProgressListener, PruneReport,
};
pub use phase::Phase;
pub use session::{DownloadSession, RegionProgress};
