//! Authoritative building-model collaborator

use async_trait::async_trait;
use spatial_common::models::{ARChange, ChangeType};
use spatial_common::Result;
use tracing::info;

/// Applies accepted changes to the authoritative building model
///
/// Implementations report failures as `Error::Collaborator`. The sync engine
/// never retries; a failed batch is rejected as a whole.
#[async_trait]
pub trait BimUpdater: Send + Sync {
    /// Apply a move, rotation or attribute modification
    async fn update_equipment(&self, change: &ARChange) -> Result<()>;

    async fn add_equipment(&self, change: &ARChange) -> Result<()>;

    async fn remove_equipment(&self, change: &ARChange) -> Result<()>;

    /// Apply a whole batch
    ///
    /// The default dispatches each change in order and stops at the first
    /// failure. Stores with real transactions should override this so a
    /// failed batch leaves no partial writes behind.
    async fn batch_update(&self, changes: &[ARChange]) -> Result<()> {
        for change in changes {
            match change.change_type {
                ChangeType::Add => self.add_equipment(change).await?,
                ChangeType::Remove => self.remove_equipment(change).await?,
                ChangeType::Move | ChangeType::Rotate | ChangeType::Modify => {
                    self.update_equipment(change).await?
                }
            }
        }
        Ok(())
    }
}

/// Updater that only logs what it would apply
///
/// Used by the daemon when no building-model backend is wired in.
#[derive(Debug, Default)]
pub struct LoggingUpdater;

#[async_trait]
impl BimUpdater for LoggingUpdater {
    async fn update_equipment(&self, change: &ARChange) -> Result<()> {
        info!(
            "BIM update: {} {} -> {:?}",
            change.change_type, change.equipment_id, change.new_position
        );
        Ok(())
    }

    async fn add_equipment(&self, change: &ARChange) -> Result<()> {
        info!("BIM add: {} at {:?}", change.equipment_id, change.new_position);
        Ok(())
    }

    async fn remove_equipment(&self, change: &ARChange) -> Result<()> {
        info!("BIM remove: {}", change.equipment_id);
        Ok(())
    }
}
