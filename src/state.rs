//! Application state management

use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::dispatch::Dispatcher;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: ArtifactStore,
    dispatcher: Arc<dyn Dispatcher>,
}

impl AppState {
    /// Create a new application state
    ///
    /// The dispatcher is built once by the caller and shared by every
    /// request; nothing here may replace or resize it.
    pub fn new(config: Config, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let store = ArtifactStore::new(config.storage.work_dir.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                dispatcher,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the artifact store
    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    /// Get the worker dispatcher
    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.inner.dispatcher.as_ref()
    }

    /// Drain and stop the dispatcher
    pub async fn shutdown(&self) {
        self.inner.dispatcher.shutdown().await;
    }
}
