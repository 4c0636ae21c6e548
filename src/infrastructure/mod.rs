pub mod config;
pub mod connectivity;
pub mod disk;
pub mod map_engine;
pub mod remote;
pub mod storage;

pub use config::*;
pub use connectivity::*;
pub use disk::*;
pub use map_engine::*;
pub use remote::*;
pub use storage::*;
