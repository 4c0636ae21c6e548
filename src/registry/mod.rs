pub mod installed;
pub mod record;
pub mod sweep;

pub use installed::InstalledRegistry;
pub use record::InstalledRegionRecord;
pub use sweep::sweep_partial_downloads;
