use std::time::Duration;

use anyhow::{bail, Context, Result};
use fleet_spec::dns::DEFAULT_ROOT_DOMAIN;

use crate::dns_sync::SchedulerSettings;
use crate::renderer::RenderSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub dns_domain_name: String,

    /// Settings for embedders running a [`SyncDnsScheduler`]; the `director`
    /// binary only renders.
    ///
    /// [`SyncDnsScheduler`]: crate::dns_sync::SyncDnsScheduler
    pub dns_sync: SchedulerSettings,
    pub render_max_in_flight: usize,
    pub render_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("FLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let dns_domain_name =
            lookup("FLEET_DNS_DOMAIN_NAME").unwrap_or_else(|| DEFAULT_ROOT_DOMAIN.to_string());

        let interval_secs: u64 = parse_or(&lookup, "FLEET_DNS_SYNC_INTERVAL_SECS", 10)?;
        if interval_secs == 0 {
            bail!("FLEET_DNS_SYNC_INTERVAL_SECS must be at least 1");
        }
        let migration_check_attempts: u32 = parse_or(&lookup, "FLEET_MIGRATION_CHECK_ATTEMPTS", 5)?;
        let migration_check_delay_ms: u64 =
            parse_or(&lookup, "FLEET_MIGRATION_CHECK_DELAY_MS", 1000)?;

        let render_max_in_flight: usize = parse_or(&lookup, "FLEET_RENDER_MAX_IN_FLIGHT", 1)?;
        if render_max_in_flight == 0 {
            bail!("FLEET_RENDER_MAX_IN_FLIGHT must be at least 1");
        }
        let render_timeout_secs: u64 = parse_or(&lookup, "FLEET_RENDER_TIMEOUT_SECS", 60)?;

        Ok(Self {
            log_level,
            dns_domain_name,
            dns_sync: SchedulerSettings {
                interval: Duration::from_secs(interval_secs),
                migration_check_attempts,
                migration_check_delay: Duration::from_millis(migration_check_delay_ms),
            },
            render_max_in_flight,
            render_timeout: Duration::from_secs(render_timeout_secs),
        })
    }

    /// Settings for a render batch in the given mode.
    pub fn render_settings(&self, mode: fleet_spec::ProjectionMode) -> RenderSettings {
        RenderSettings {
            dns_domain_name: self.dns_domain_name.clone(),
            mode,
            max_in_flight: self.render_max_in_flight,
            render_timeout: self.render_timeout,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
