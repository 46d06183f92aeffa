//! DNS sync scheduler worker.
//!
//! Verifies the schema before starting, then converges DNS on a periodic
//! interval until stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::{DnsVersionConverger, MigrationCheck, SchedulerError};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Time between convergence passes.
    pub interval: Duration,

    /// Schema verification attempts before giving up.
    pub migration_check_attempts: u32,

    /// Delay between schema verification attempts.
    pub migration_check_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            migration_check_attempts: 5,
            migration_check_delay: Duration::from_secs(1),
        }
    }
}

/// Converges DNS on an interval, gated on the schema being current.
pub struct SyncDnsScheduler {
    converger: Arc<dyn DnsVersionConverger>,
    migrations: Arc<dyn MigrationCheck>,
    settings: SchedulerSettings,
    shutdown: watch::Sender<bool>,
}

impl SyncDnsScheduler {
    pub fn new(
        converger: Arc<dyn DnsVersionConverger>,
        migrations: Arc<dyn MigrationCheck>,
        settings: SchedulerSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            converger,
            migrations,
            settings,
            shutdown,
        }
    }

    /// Refuse to proceed unless the schema is confirmed current.
    pub async fn prep(&self) -> Result<(), SchedulerError> {
        let attempts = self.settings.migration_check_attempts.max(1);

        for attempt in 1..=attempts {
            if self
                .migrations
                .is_current()
                .await
                .map_err(SchedulerError::MigrationCheck)?
            {
                return Ok(());
            }

            if attempt < attempts {
                warn!(attempt, attempts, "Migrations not current, waiting");
                tokio::time::sleep(self.settings.migration_check_delay).await;
            }
        }

        error!(
            attempts,
            "Migrations not current during sync dns scheduler start"
        );
        Err(SchedulerError::MigrationsNotCurrent { attempts })
    }

    /// Verify the schema, then converge every interval until [`stop`] is
    /// called. The first pass runs one interval after start.
    ///
    /// [`stop`]: SyncDnsScheduler::stop
    #[instrument(skip(self), fields(interval_secs = self.settings.interval.as_secs()))]
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.settings.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        self.prep().await?;

        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }

        info!("Starting sync dns scheduler");

        let mut interval = tokio::time::interval(self.settings.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.converge_now().await {
                        error!(error = %e, "DNS convergence pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Sync dns scheduler shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run a single convergence pass.
    pub async fn converge_now(&self) -> Result<(), SchedulerError> {
        self.converger
            .update_instances_based_on_strategy()
            .await
            .map_err(SchedulerError::Converge)
    }
}
