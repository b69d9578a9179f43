//! Application state management

use std::sync::Arc;

use crate::sync::SyncService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    sync: SyncService,
}

impl AppState {
    /// Create a new application state
    pub fn new(sync: SyncService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { sync }),
        }
    }

    /// Get the sync service
    pub fn sync(&self) -> &SyncService {
        &self.inner.sync
    }
}
