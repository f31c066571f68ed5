//! Application state management

use itl_core::AppConfig;
use itl_graph::{GraphStore, GraphView, MemoryGraphStore};
use itl_sync::{ImageStore, SyncOptions, SyncPipeline};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Graph store backend
    pub store: Arc<dyn GraphStore>,
    /// Bulk import/export pipeline
    pub pipeline: SyncPipeline,
    /// Read-side projections
    pub view: GraphView,
}

impl AppState {
    /// Create new application state over an opened store
    pub fn new(config: AppConfig, store: Arc<dyn GraphStore>) -> Self {
        let images = ImageStore::from_config(&config.content, &config.server.public_base_url);
        let pipeline = SyncPipeline::new(store.clone(), images, SyncOptions::from(&config.sync));

        Self {
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
            view: GraphView::new(store.clone()),
            store,
            pipeline,
            config,
        }
    }

    /// State backed by a fresh in-memory store
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(MemoryGraphStore::new()))
    }

    /// Image asset manager
    pub fn images(&self) -> &ImageStore {
        self.pipeline.images()
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
