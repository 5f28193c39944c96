//! hdpatcher Library
//!
//! Core functionality for selecting, planning and installing optional HD
//! content-patch modules into a game installation.

pub mod app;
pub mod app_state;
pub mod catalog;
pub mod cli;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod local;
pub mod logic;
pub mod orchestrator;
pub mod presets;
pub mod progress;
pub mod report;
pub mod services;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use app::{ApplyReport, Patcher, PatcherOptions};
pub use app_state::{AppStage, AppStateMachine, AppTransitionError};
pub use catalog::{Catalog, CatalogFile, DownloadLink, Group, Module};
pub use config_file::PatcherConfig;
pub use error::{PatcherError, Result};
pub use presets::Preset;
pub use progress::{ProgressBoard, ProgressEvent, ProgressRecord};
pub use services::Services;
pub use session::Session;
pub use types::{ModuleId, OperationId, ProgressStatus, Provider, VerifyStatus};

// Selection rules and planning
pub use engine::plan::{plan, WorkItem, WorkPlan};
pub use logic::resolver::Selection;
