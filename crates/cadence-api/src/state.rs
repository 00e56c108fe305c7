//! Application state shared by every handler.

use cadence_core::Config;
use cadence_services::{CleanupService, FileValidationService, StorageService};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub storage: StorageService,
    pub validation: Arc<FileValidationService>,
    pub cleanup: Arc<CleanupService>,
}
