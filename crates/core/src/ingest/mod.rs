pub mod file;
pub mod provider;

pub use file::FileSnapshotProvider;
pub use provider::{HttpJsonSnapshotProvider, SnapshotProvider};
