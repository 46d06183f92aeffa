//! Periodic DNS convergence.
//!
//! The scheduler only decides *when* to converge. What convergence does is
//! up to the [`DnsVersionConverger`]; whether the persisted schema is current
//! is answered by a [`MigrationCheck`].

mod scheduler;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub use scheduler::{SchedulerSettings, SyncDnsScheduler};

/// Brings every instance's DNS records up to the latest version.
///
/// Must be idempotent: the scheduler calls it on a fixed interval.
#[async_trait]
pub trait DnsVersionConverger: Send + Sync {
    async fn update_instances_based_on_strategy(&self) -> Result<()>;
}

/// Reports whether all schema migrations have been applied.
#[async_trait]
pub trait MigrationCheck: Send + Sync {
    async fn is_current(&self) -> Result<bool>;
}

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The schema never became current within the allowed attempts.
    #[error("migrations not current during sync dns scheduler start after {attempts} attempts")]
    MigrationsNotCurrent { attempts: u32 },

    /// Convergence cannot run on a zero interval.
    #[error("sync dns interval must be non-zero")]
    ZeroInterval,

    /// The migration check itself failed.
    #[error("migration check failed: {0}")]
    MigrationCheck(#[source] anyhow::Error),

    /// A convergence pass failed.
    #[error("dns convergence failed: {0}")]
    Converge(#[source] anyhow::Error),
}
