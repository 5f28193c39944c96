//! Orchestrators - drive collaborators and fold their events into progress
//! boards.
//!
//! # Modules
//!
//! - `download` - Concurrent, settle-all archive downloads
//! - `install` - Batched install over one multiplexed event stream
//! - `maintenance` - Verify/repair and the operation gate

pub mod download;
pub mod install;
pub mod maintenance;

pub use download::{download_all, select_link, DownloadOptions, DownloadOutcome};
pub use install::{install_patches, InstallReport};
pub use maintenance::{needing_repair, OperationGate, RepairOutcome};
