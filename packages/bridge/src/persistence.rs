//! Durable storage of the runtime's filesystem.
//!
//! Every persistence failure is logged and swallowed by the bridge: data
//! loss is an accepted risk of the host storage model, never a failed call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Storage quota report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub supported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<u64>,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Flush runtime filesystem state to durable storage.
    async fn save(&self) -> Result<(), PersistenceError>;

    /// Restore previously saved state into the runtime filesystem.
    async fn load(&self) -> Result<(), PersistenceError>;

    async fn clear(&self) -> Result<(), PersistenceError>;

    async fn usage_info(&self) -> Result<StorageUsage, PersistenceError>;
}

/// Used when the host offers no durable storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

#[async_trait]
impl Persistence for NoPersistence {
    async fn save(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn load(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn usage_info(&self) -> Result<StorageUsage, PersistenceError> {
        Ok(StorageUsage::default())
    }
}
