//! Change Sync Engine
//!
//! Accepts proposed equipment edits from AR sessions, queues them per
//! session, and flushes them in batches to the authoritative building model.
//!
//! Every [`ARChange`] moves from Pending to exactly one of Applied or
//! Rejected:
//! - Rejected on record when its confidence is below the required minimum
//!   or its anchor is not tracking
//! - Rejected during sync when a more trusted change to the same equipment
//!   wins the batch, or when the collaborator refuses the batch
//! - Rejected when evicted from a full normal-priority lane
//! - Applied when its batch is accepted
//!
//! A sync pass stages the changes it drains until their batch finishes, so a
//! pass cut short at shutdown leaves them pending for the next one.
//!
//! Two background tasks drive syncing once [`SyncEngine::start`] is called:
//! a periodic loop and a bounded worker for critical changes. Both go through
//! the per-session in-flight guard, so a session is never synced twice
//! concurrently.

use super::conflict::{resolve_conflicts, Resolution};
use super::policy::{exceeds_threshold, is_critical};
use super::queue::{ChangeQueue, Lane};
use super::BimUpdater;
use crate::anchors::AnchorRegistry;
use crate::confidence::{Aspect, ConfidenceManager};
use crate::coordinates::CoordinateTranslator;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use spatial_common::events::{EventBus, SpatialEvent};
use spatial_common::models::{ARChange, ChangeType, ConfidenceLevel, DataSource};
use spatial_common::{time, uuid_utils, Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound for the time threshold (ten years)
const MAX_TIME_THRESHOLD_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Sync engine configuration (`[sync]` config section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the background sync loop
    pub sync_interval_secs: u64,
    /// A session with pending changes syncs once this long has passed since its last sync
    pub time_threshold_secs: u64,
    /// Changes per collaborator batch; also the pending count that forces a sync
    pub batch_size: usize,
    /// Minimum move distance (m) for the high-priority lane
    pub position_threshold: f64,
    /// Minimum rotation (degrees) for the high-priority lane
    pub rotation_threshold: f64,
    /// Changes below this confidence are rejected on record
    pub confidence_required: f64,
    /// Capacity of each session's normal-priority lane
    pub max_queue_size: usize,
    /// Terminal changes remembered per session
    pub history_size: usize,
    /// Pending immediate-sync requests before new ones fall back to the periodic loop
    pub immediate_queue_capacity: usize,
    /// How long `close` waits for each background task
    pub shutdown_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 30,
            time_threshold_secs: 30,
            batch_size: 50,
            position_threshold: 0.1,
            rotation_threshold: 5.0,
            confidence_required: 0.7,
            max_queue_size: 1000,
            history_size: 100,
            immediate_queue_capacity: 64,
            shutdown_timeout_secs: 5,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(Error::validation("sync interval must be at least one second"));
        }
        if self.max_queue_size == 0 {
            return Err(Error::validation("max queue size must be positive"));
        }
        if self.immediate_queue_capacity == 0 {
            return Err(Error::validation("immediate queue capacity must be positive"));
        }
        self.thresholds().validate()
    }

    pub fn thresholds(&self) -> SyncThresholds {
        SyncThresholds {
            position_threshold: self.position_threshold,
            rotation_threshold: self.rotation_threshold,
            confidence_required: self.confidence_required,
            time_threshold_secs: self.time_threshold_secs,
            batch_size: self.batch_size,
        }
    }
}

/// Runtime-adjustable subset of [`SyncConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncThresholds {
    pub position_threshold: f64,
    pub rotation_threshold: f64,
    pub confidence_required: f64,
    pub time_threshold_secs: u64,
    pub batch_size: usize,
}

impl SyncThresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.position_threshold.is_finite() || self.position_threshold < 0.0 {
            return Err(Error::validation("position threshold must be non-negative"));
        }
        if !self.rotation_threshold.is_finite() || self.rotation_threshold < 0.0 {
            return Err(Error::validation("rotation threshold must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.confidence_required) {
            return Err(Error::validation("required confidence must be within [0, 1]"));
        }
        if self.batch_size == 0 {
            return Err(Error::validation("batch size must be positive"));
        }
        if self.time_threshold_secs > MAX_TIME_THRESHOLD_SECS {
            return Err(Error::validation("time threshold is unreasonably large"));
        }
        Ok(())
    }

    fn time_threshold(&self) -> Duration {
        Duration::seconds(self.time_threshold_secs.min(MAX_TIME_THRESHOLD_SECS) as i64)
    }
}

/// Where a recorded change went
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub change_id: String,
    pub lane: Lane,
    /// An immediate sync was requested for the session
    pub critical: bool,
}

/// Per-session sync counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub session_id: String,
    pub pending: usize,
    pub high_priority_pending: usize,
    pub applied: u64,
    pub rejected: u64,
    pub last_sync: Option<DateTime<Utc>>,
    /// Last sync (or registration) plus the time threshold
    pub next_sync: DateTime<Utc>,
}

/// Result of one `sync_session` pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub batches: usize,
    pub applied: usize,
    pub rejected: usize,
}

struct SessionState {
    queue: ChangeQueue,
    /// Drained from the queue by a sync pass but not yet terminal, in
    /// batch order. Left in place if the pass is cut short, so the next
    /// pass retries them first.
    in_flight: Vec<ARChange>,
    /// Terminal changes, oldest first
    history: VecDeque<ARChange>,
    history_size: usize,
    applied: u64,
    rejected: u64,
    registered_at: DateTime<Utc>,
    last_sync: Option<DateTime<Utc>>,
}

impl SessionState {
    fn record_terminal(&mut self, change: ARChange) {
        if change.applied {
            self.applied += 1;
        } else if change.rejected {
            self.rejected += 1;
        }
        if self.history_size == 0 {
            return;
        }
        while self.history.len() >= self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(change);
    }

    /// Changes not yet terminal, staged ones included
    fn pending(&self) -> usize {
        self.queue.len() + self.in_flight.len()
    }

    fn should_sync(&self, thresholds: &SyncThresholds, now: DateTime<Utc>) -> bool {
        let pending = self.pending();
        if pending == 0 {
            return false;
        }
        let since = self.last_sync.unwrap_or(self.registered_at);
        now - since >= thresholds.time_threshold() || pending >= thresholds.batch_size
    }
}

struct Session {
    id: String,
    state: RwLock<SessionState>,
    /// Held for the duration of a sync pass
    sync_guard: Mutex<()>,
}

/// Per-building change synchronization
pub struct SyncEngine {
    config: SyncConfig,
    thresholds: RwLock<SyncThresholds>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    updater: Arc<dyn BimUpdater>,
    translator: Option<Arc<RwLock<CoordinateTranslator>>>,
    confidence: Option<Arc<ConfidenceManager>>,
    anchors: Option<Arc<AnchorRegistry>>,
    events: Option<Arc<EventBus>>,
    cancel: CancellationToken,
    immediate_tx: Mutex<Option<mpsc::Sender<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, updater: Arc<dyn BimUpdater>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            thresholds: RwLock::new(config.thresholds()),
            config,
            sessions: RwLock::new(HashMap::new()),
            updater,
            translator: None,
            confidence: None,
            anchors: None,
            events: None,
            cancel: CancellationToken::new(),
            immediate_tx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Also treat translator-significant moves as exceeding the position threshold
    pub fn with_translator(mut self, translator: Arc<RwLock<CoordinateTranslator>>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Report applied changes to `manager` as AR-verified position confidence
    pub fn with_confidence_manager(mut self, manager: Arc<ConfidenceManager>) -> Self {
        self.confidence = Some(manager);
        self
    }

    /// Resolve anchor-relative positions through `registry`
    pub fn with_anchor_registry(mut self, registry: Arc<AnchorRegistry>) -> Self {
        self.anchors = Some(registry);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn sync_thresholds(&self) -> SyncThresholds {
        *self.thresholds.read().await
    }

    pub async fn set_sync_thresholds(&self, thresholds: SyncThresholds) -> Result<()> {
        thresholds.validate()?;
        *self.thresholds.write().await = thresholds;
        info!(
            "Sync thresholds updated: position {} m, rotation {} deg, confidence {}, batch {}",
            thresholds.position_threshold,
            thresholds.rotation_threshold,
            thresholds.confidence_required,
            thresholds.batch_size
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub async fn register_session(&self, session_id: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(Error::validation("session ID must not be empty"));
        }
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(Error::validation(format!(
                "session '{}' is already registered",
                session_id
            )));
        }
        let session = Session {
            id: session_id.to_string(),
            state: RwLock::new(SessionState {
                queue: ChangeQueue::new(self.config.max_queue_size),
                in_flight: Vec::new(),
                history: VecDeque::new(),
                history_size: self.config.history_size,
                applied: 0,
                rejected: 0,
                registered_at: time::now(),
                last_sync: None,
            }),
            sync_guard: Mutex::new(()),
        };
        sessions.insert(session_id.to_string(), Arc::new(session));
        info!("Session {} registered", session_id);
        Ok(())
    }

    /// Remove a session, discarding its pending changes
    pub async fn unregister_session(&self, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| Error::not_found("session", session_id))?;

        let discarded = {
            let mut state = session.state.write().await;
            let staged = state.in_flight.len();
            state.in_flight.clear();
            state.queue.clear() + staged
        };
        if discarded > 0 {
            warn!(
                "Session {} unregistered with {} pending change(s); discarded",
                session_id, discarded
            );
        } else {
            info!("Session {} unregistered", session_id);
        }
        Ok(())
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn session(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::not_found("session", session_id))
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Submit a proposed change
    ///
    /// The caller's `change` reflects the outcome: on rejection it is marked
    /// Rejected with a reason, and when it was anchor-relative its positions
    /// are rewritten to world coordinates.
    ///
    /// # Errors
    /// - `Validation` for a malformed or already-terminal change
    /// - `NotFound` for an unknown session or anchor
    /// - `Rejected` when confidence is below the required minimum or the
    ///   change's anchor is not tracking; the change is marked Rejected too
    pub async fn record_change(&self, change: &mut ARChange) -> Result<RecordOutcome> {
        validate_change(change)?;
        if change.id.trim().is_empty() {
            change.id = uuid_utils::generate_id();
        }
        let session = self.session(&change.session_id).await?;
        let thresholds = *self.thresholds.read().await;

        if change.confidence < thresholds.confidence_required {
            let reason = format!(
                "confidence {:.2} below required {:.2}",
                change.confidence, thresholds.confidence_required
            );
            return self.reject_on_record(&session, change, reason).await;
        }

        match self.resolve_anchor(change).await {
            Ok(()) => {}
            Err(Error::Rejected(reason)) => {
                return self.reject_on_record(&session, change, reason).await;
            }
            Err(e) => return Err(e),
        }

        let exceeds = match &self.translator {
            Some(translator) => {
                let translator = translator.read().await;
                exceeds_threshold(
                    change,
                    thresholds.position_threshold,
                    thresholds.rotation_threshold,
                    Some(&*translator),
                )
            }
            None => exceeds_threshold(
                change,
                thresholds.position_threshold,
                thresholds.rotation_threshold,
                None,
            ),
        };
        let lane = if exceeds { Lane::High } else { Lane::Normal };
        let critical = is_critical(change);

        let evicted = {
            let mut state = session.state.write().await;
            let evicted = state.queue.push(change.clone(), lane).map(|mut old| {
                old.mark_rejected("dropped from full normal-priority queue");
                old
            });
            if let Some(old) = &evicted {
                state.record_terminal(old.clone());
            }
            evicted
        };

        if let Some(old) = evicted {
            warn!(
                "Session {} normal queue full; dropped oldest change {}",
                session.id, old.id
            );
            self.emit_rejected(&session.id, &old);
        }

        debug!(
            "Change {} ({} {}) queued in {:?} lane{}",
            change.id,
            change.change_type,
            change.equipment_id,
            lane,
            if critical { ", critical" } else { "" }
        );
        self.emit(SpatialEvent::ChangeRecorded {
            session_id: session.id.clone(),
            change_id: change.id.clone(),
            change_type: change.change_type,
            high_priority: lane == Lane::High,
            critical,
            timestamp: time::now(),
        });

        if critical {
            self.request_immediate_sync(&session.id).await;
        }

        Ok(RecordOutcome {
            change_id: change.id.clone(),
            lane,
            critical,
        })
    }

    async fn reject_on_record(
        &self,
        session: &Session,
        change: &mut ARChange,
        reason: String,
    ) -> Result<RecordOutcome> {
        change.mark_rejected(reason.clone());
        session.state.write().await.record_terminal(change.clone());
        warn!("Change {} rejected: {}", change.id, reason);
        self.emit_rejected(&session.id, change);
        Err(Error::Rejected(reason))
    }

    /// Rewrite anchor-relative positions to world coordinates
    ///
    /// Both positions are resolved before either is written.
    async fn resolve_anchor(&self, change: &mut ARChange) -> Result<()> {
        let Some(anchor_id) = change.anchor_id.clone() else {
            return Ok(());
        };
        let Some(anchors) = &self.anchors else {
            return Err(Error::validation(format!(
                "change {} is relative to anchor '{}' but no anchor registry is attached",
                change.id, anchor_id
            )));
        };

        let old = match change.old_position {
            Some(p) => Some(anchors.resolve_world(&anchor_id, p).await?),
            None => None,
        };
        let new = match change.new_position {
            Some(p) => Some(anchors.resolve_world(&anchor_id, p).await?),
            None => None,
        };
        change.old_position = old;
        change.new_position = new;
        Ok(())
    }

    async fn request_immediate_sync(&self, session_id: &str) {
        let tx = self.immediate_tx.lock().await.clone();
        let Some(tx) = tx else {
            debug!("Sync engine not running; {} waits for an explicit sync", session_id);
            return;
        };
        match tx.try_send(session_id.to_string()) {
            Ok(()) => debug!("Immediate sync requested for {}", session_id),
            Err(TrySendError::Full(_)) => warn!(
                "Immediate sync queue full; {} will sync on the periodic loop",
                session_id
            ),
            Err(TrySendError::Closed(_)) => debug!("Immediate sync worker stopped"),
        }
    }

    // ------------------------------------------------------------------
    // Syncing
    // ------------------------------------------------------------------

    /// Flush a session's pending changes to the building model
    ///
    /// Waits for any sync already in flight for the same session.
    pub async fn sync_session(&self, session_id: &str) -> Result<SyncReport> {
        let session = self.session(session_id).await?;
        Ok(self.sync(&session).await)
    }

    async fn sync(&self, session: &Session) -> SyncReport {
        let _in_flight = session.sync_guard.lock().await;
        let batch_size = self.thresholds.read().await.batch_size.max(1);
        let staged = {
            let mut state = session.state.write().await;
            let drained = state.queue.drain();
            state.in_flight.extend(drained);
            state.in_flight.len()
        };

        let mut report = SyncReport::default();
        if staged == 0 {
            return report;
        }
        debug!("Syncing {} change(s) for session {}", staged, session.id);

        loop {
            let batch: Vec<ARChange> = {
                let state = session.state.read().await;
                state.in_flight.iter().take(batch_size).cloned().collect()
            };
            if batch.is_empty() {
                break;
            }
            self.sync_batch(session, batch, &mut report).await;
        }

        session.state.write().await.last_sync = Some(time::now());
        info!(
            "Session {} synced: {} applied, {} rejected in {} batch(es)",
            session.id, report.applied, report.rejected, report.batches
        );
        report
    }

    /// Resolve and submit one batch taken from the front of the staged changes
    ///
    /// The batch leaves the staging area in the same locked step that records
    /// its terminal states, so a pass cancelled mid-batch leaves every change
    /// either staged or finished.
    async fn sync_batch(&self, session: &Session, batch: Vec<ARChange>, report: &mut SyncReport) {
        report.batches += 1;
        let batch_len = batch.len();
        let Resolution {
            mut kept,
            superseded,
        } = resolve_conflicts(batch);

        let mut finished: Vec<ARChange> = Vec::with_capacity(batch_len);
        for (mut loser, winner) in superseded {
            loser.mark_rejected(format!("superseded by change {}", winner));
            debug!("Change {} superseded by {}", loser.id, winner);
            finished.push(loser);
        }
        let superseded_count = finished.len();

        let outcome = self.updater.batch_update(&kept).await;
        match &outcome {
            Ok(()) => {
                for change in &mut kept {
                    change.mark_applied();
                }
            }
            Err(e) => {
                let reason = e.to_string();
                for change in &mut kept {
                    change.mark_rejected(reason.clone());
                }
            }
        }
        finished.extend(kept.iter().cloned());

        {
            let mut state = session.state.write().await;
            let done = batch_len.min(state.in_flight.len());
            state.in_flight.drain(..done);
            for change in finished.iter().cloned() {
                state.record_terminal(change);
            }
        }

        for loser in &finished[..superseded_count] {
            self.emit_rejected(&session.id, loser);
        }
        report.rejected += superseded_count;

        match outcome {
            Ok(()) => {
                report.applied += kept.len();
                self.emit(SpatialEvent::BatchApplied {
                    session_id: session.id.clone(),
                    change_count: kept.len(),
                    timestamp: time::now(),
                });
                self.feed_confidence(&kept).await;
            }
            Err(e) => {
                let reason = e.to_string();
                error!(
                    "Batch of {} change(s) for session {} rejected: {}",
                    kept.len(),
                    session.id,
                    reason
                );
                report.rejected += kept.len();
                self.emit(SpatialEvent::BatchRejected {
                    session_id: session.id.clone(),
                    change_count: kept.len(),
                    error: reason,
                    timestamp: time::now(),
                });
            }
        }
    }

    async fn feed_confidence(&self, applied: &[ARChange]) {
        let Some(manager) = &self.confidence else {
            return;
        };
        for change in applied.iter().filter(|c| c.change_type != ChangeType::Remove) {
            let level = ConfidenceLevel::from_score(change.confidence);
            if let Err(e) = manager
                .update_confidence(&change.equipment_id, Aspect::Position, level, DataSource::ArVerified)
                .await
            {
                warn!(
                    "Failed to record confidence for {}: {}",
                    change.equipment_id, e
                );
            }
        }
    }

    async fn sync_due_sessions(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let thresholds = *self.thresholds.read().await;
        let now = time::now();

        for session in sessions {
            let due = session.state.read().await.should_sync(&thresholds, now);
            if due {
                self.sync(&session).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn get_sync_status(&self, session_id: &str) -> Result<SyncStatus> {
        let session = self.session(session_id).await?;
        let time_threshold = self.thresholds.read().await.time_threshold();
        let state = session.state.read().await;
        Ok(SyncStatus {
            session_id: session.id.clone(),
            pending: state.pending(),
            high_priority_pending: state.queue.high_len(),
            applied: state.applied,
            rejected: state.rejected,
            last_sync: state.last_sync,
            next_sync: state.last_sync.unwrap_or(state.registered_at) + time_threshold,
        })
    }

    /// A pending or recently finished change
    pub async fn get_change(&self, session_id: &str, change_id: &str) -> Result<ARChange> {
        let session = self.session(session_id).await?;
        let state = session.state.read().await;
        state
            .queue
            .find(change_id)
            .or_else(|| state.in_flight.iter().find(|c| c.id == change_id))
            .or_else(|| state.history.iter().rev().find(|c| c.id == change_id))
            .cloned()
            .ok_or_else(|| Error::not_found("change", change_id))
    }

    /// Recently finished changes, oldest first
    pub async fn recent_changes(&self, session_id: &str) -> Result<Vec<ARChange>> {
        let session = self.session(session_id).await?;
        let state = session.state.read().await;
        Ok(state.history.iter().cloned().collect())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Spawn the periodic loop and the immediate-sync worker
    ///
    /// # Errors
    /// `Validation` if the engine is already running or was closed.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() || self.cancel.is_cancelled() {
            return Err(Error::validation("sync engine already started or closed"));
        }

        let (tx, rx) = mpsc::channel(self.config.immediate_queue_capacity);
        *self.immediate_tx.lock().await = Some(tx);
        tasks.push(self.spawn_periodic_loop());
        tasks.push(self.spawn_immediate_worker(rx));

        info!(
            "Sync engine started (interval: {}s, time threshold: {}s, batch size: {})",
            self.config.sync_interval_secs,
            self.config.time_threshold_secs,
            self.config.batch_size
        );
        Ok(())
    }

    fn spawn_periodic_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let token = self.cancel.clone();
        let period = time::secs_to_duration(self.config.sync_interval_secs);

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => engine.sync_due_sessions().await,
                }
            }
            debug!("Periodic sync loop stopped");
        })
    }

    fn spawn_immediate_worker(self: &Arc<Self>, mut rx: mpsc::Receiver<String>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let token = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    request = rx.recv() => match request {
                        Some(session_id) => {
                            if let Err(e) = engine.sync_session(&session_id).await {
                                warn!("Immediate sync for {} skipped: {}", session_id, e);
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("Immediate sync worker stopped");
        })
    }

    /// Stop background syncing and wait for the tasks to finish
    ///
    /// Tasks still running after the shutdown timeout are aborted. Changes an
    /// aborted task had taken for a batch stay pending, as do queued ones, and
    /// can still be flushed with `sync_session`.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().await);
        self.immediate_tx.lock().await.take();

        let timeout = time::secs_to_duration(self.config.shutdown_timeout_secs);
        let mut aborted = false;
        for handle in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Sync task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Sync task did not stop within {:?}; aborting", timeout);
                    abort.abort();
                    aborted = true;
                }
            }
        }

        if aborted {
            let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
            for session in sessions {
                let staged = session.state.read().await.in_flight.len();
                if staged > 0 {
                    warn!(
                        "Session {}: {} change(s) interrupted mid-sync remain pending",
                        session.id, staged
                    );
                }
            }
        }
        info!("Sync engine closed");
    }

    fn emit_rejected(&self, session_id: &str, change: &ARChange) {
        self.emit(SpatialEvent::ChangeRejected {
            session_id: session_id.to_string(),
            change_id: change.id.clone(),
            reason: change.rejection_reason.clone().unwrap_or_default(),
            timestamp: time::now(),
        });
    }

    fn emit(&self, event: SpatialEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }
}

fn validate_change(change: &ARChange) -> Result<()> {
    if change.equipment_id.trim().is_empty() {
        return Err(Error::validation("equipment ID must not be empty"));
    }
    if !(0.0..=1.0).contains(&change.confidence) {
        return Err(Error::validation(format!(
            "change confidence must be within [0, 1], got {}",
            change.confidence
        )));
    }
    if !change.is_pending() {
        return Err(Error::validation(format!(
            "change {} is already {:?}",
            change.id,
            change.status()
        )));
    }
    Ok(())
}
