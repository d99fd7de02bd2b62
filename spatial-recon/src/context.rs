//! Per-building composition root
//!
//! Wires the translator, confidence manager, coverage tracker, anchor
//! registry and sync engine of one building around a shared event bus.
//! Each component keeps its own lock; the context holds no state of its own.

use crate::anchors::AnchorRegistry;
use crate::confidence::ConfidenceManager;
use crate::config::ReconConfig;
use crate::coordinates::{CoordinateTranslator, MovementThresholds};
use crate::coverage::CoverageTracker;
use crate::sync::{BimUpdater, SyncEngine};
use chrono::Duration;
use spatial_common::db::{AnchorStore, RegionStore};
use spatial_common::events::EventBus;
use spatial_common::{Error, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Optional persistence backends for a building
#[derive(Clone, Default)]
pub struct Stores {
    pub regions: Option<Arc<dyn RegionStore>>,
    pub anchors: Option<Arc<dyn AnchorStore>>,
}

impl Stores {
    /// Use one backend for both regions and anchors
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: RegionStore + AnchorStore + 'static,
    {
        Self {
            regions: Some(store.clone()),
            anchors: Some(store),
        }
    }
}

pub struct BuildingContext {
    building_id: String,
    events: Arc<EventBus>,
    translator: Arc<RwLock<CoordinateTranslator>>,
    confidence: Arc<ConfidenceManager>,
    coverage: Arc<CoverageTracker>,
    anchors: Arc<AnchorRegistry>,
    sync: Arc<SyncEngine>,
}

impl BuildingContext {
    /// In-memory context
    pub fn new(config: &ReconConfig, updater: Arc<dyn BimUpdater>) -> Result<Self> {
        Self::with_stores(config, updater, Stores::default())
    }

    /// Context mirroring regions and anchors into `stores`
    ///
    /// Call [`restore`](Self::restore) afterwards to load previously
    /// persisted state.
    pub fn with_stores(
        config: &ReconConfig,
        updater: Arc<dyn BimUpdater>,
        stores: Stores,
    ) -> Result<Self> {
        let building_id = config.building.id.clone();
        let events = Arc::new(EventBus::default());

        let translator = CoordinateTranslator::with_settings(
            config.building.translator.clone(),
            config.thresholds,
        )?;
        let floor_height = translator.settings().floor_height;
        let translator = Arc::new(RwLock::new(translator));

        let confidence = Arc::new(
            ConfidenceManager::new(config.confidence.clone())?.with_event_bus(Arc::clone(&events)),
        );

        let mut coverage =
            CoverageTracker::new(building_id.clone(), config.coverage.clone(), floor_height)?
                .with_event_bus(Arc::clone(&events));
        if let Some(store) = stores.regions {
            coverage = coverage.with_store(store);
        }

        let mut anchors = AnchorRegistry::new(building_id.clone(), config.anchors)?
            .with_event_bus(Arc::clone(&events));
        if let Some(store) = stores.anchors {
            anchors = anchors.with_store(store);
        }
        let anchors = Arc::new(anchors);

        let sync = SyncEngine::new(config.sync.clone(), updater)?
            .with_translator(Arc::clone(&translator))
            .with_confidence_manager(Arc::clone(&confidence))
            .with_anchor_registry(Arc::clone(&anchors))
            .with_event_bus(Arc::clone(&events));

        info!("Building context ready for {}", building_id);
        Ok(Self {
            building_id,
            events,
            translator,
            confidence,
            coverage: Arc::new(coverage),
            anchors,
            sync: Arc::new(sync),
        })
    }

    /// Load persisted regions and anchors
    ///
    /// # Returns
    /// `(regions, anchors)` restored.
    pub async fn restore(&self) -> Result<(usize, usize)> {
        let regions = self.coverage.load_from_store().await?;
        let anchors = self.anchors.load_from_store().await?;
        Ok((regions, anchors))
    }

    /// Start background syncing
    pub async fn start(&self) -> Result<()> {
        self.sync.start().await
    }

    /// Stop background syncing
    pub async fn close(&self) {
        self.sync.close().await;
    }

    pub fn building_id(&self) -> &str {
        &self.building_id
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn translator(&self) -> &Arc<RwLock<CoordinateTranslator>> {
        &self.translator
    }

    pub fn confidence(&self) -> &Arc<ConfidenceManager> {
        &self.confidence
    }

    pub fn coverage(&self) -> &Arc<CoverageTracker> {
        &self.coverage
    }

    pub fn anchors(&self) -> &Arc<AnchorRegistry> {
        &self.anchors
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    // ------------------------------------------------------------------
    // Runtime configuration
    // ------------------------------------------------------------------

    pub async fn set_thresholds(&self, thresholds: MovementThresholds) -> Result<()> {
        let values = [
            thresholds.grid_unit_threshold,
            thresholds.room_change_threshold,
            thresholds.rotation_threshold,
        ];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::validation("movement thresholds must be non-negative"));
        }
        self.translator.write().await.set_thresholds(thresholds);
        info!("Movement thresholds updated for {}", self.building_id);
        Ok(())
    }

    pub async fn set_decay_rate(&self, decay_rate: f64) -> Result<()> {
        self.confidence.set_decay_rate(decay_rate).await
    }

    pub async fn set_verify_threshold(&self, threshold: Duration) -> Result<()> {
        self.confidence.set_verify_threshold(threshold).await
    }

    pub async fn set_grid_scale(&self, grid_scale: f64) -> Result<()> {
        self.translator.write().await.set_grid_scale(grid_scale)
    }

    /// Change the storey height used for floor indices and per-floor coverage
    pub async fn set_floor_height(&self, floor_height: f64) -> Result<()> {
        self.translator.write().await.set_floor_height(floor_height)?;
        self.coverage.set_floor_height(floor_height).await
    }
}
