//! Shared fixtures for spatial-recon integration tests
//!
//! - RecordingUpdater: accepts every batch and remembers what it applied
//! - FailingUpdater: refuses every batch

#![allow(dead_code)]

use async_trait::async_trait;
use spatial_common::models::ARChange;
use spatial_common::{Error, Result};
use spatial_recon::sync::{SyncConfig, SyncEngine};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Updater that accepts everything
#[derive(Default)]
pub struct RecordingUpdater {
    applied: Mutex<Vec<ARChange>>,
    batches: AtomicUsize,
    /// Artificial latency per batch, to widen race windows
    delay: Option<Duration>,
}

impl RecordingUpdater {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn applied(&self) -> Vec<ARChange> {
        self.applied.lock().unwrap().clone()
    }

    pub fn applied_ids(&self) -> Vec<String> {
        self.applied().into_iter().map(|c| c.id).collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl spatial_recon::sync::BimUpdater for RecordingUpdater {
    async fn update_equipment(&self, change: &ARChange) -> Result<()> {
        self.applied.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn add_equipment(&self, change: &ARChange) -> Result<()> {
        self.applied.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn remove_equipment(&self, change: &ARChange) -> Result<()> {
        self.applied.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn batch_update(&self, changes: &[ARChange]) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.applied.lock().unwrap().extend(changes.iter().cloned());
        Ok(())
    }
}

/// Updater whose store is permanently unavailable
#[derive(Default)]
pub struct FailingUpdater {
    attempts: AtomicUsize,
}

impl FailingUpdater {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl spatial_recon::sync::BimUpdater for FailingUpdater {
    async fn update_equipment(&self, _change: &ARChange) -> Result<()> {
        Err(Error::Collaborator("model store unavailable".to_string()))
    }

    async fn add_equipment(&self, _change: &ARChange) -> Result<()> {
        Err(Error::Collaborator("model store unavailable".to_string()))
    }

    async fn remove_equipment(&self, _change: &ARChange) -> Result<()> {
        Err(Error::Collaborator("model store unavailable".to_string()))
    }

    async fn batch_update(&self, _changes: &[ARChange]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Collaborator("model store unavailable".to_string()))
    }
}

/// Engine with `config`, backed by a fresh recording updater
pub fn recording_engine(config: SyncConfig) -> (Arc<SyncEngine>, Arc<RecordingUpdater>) {
    let updater = Arc::new(RecordingUpdater::default());
    let engine = SyncEngine::new(config, updater.clone()).unwrap();
    (Arc::new(engine), updater)
}

/// Poll `check` every 50 ms until it holds or `limit` elapses
pub async fn wait_until<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
