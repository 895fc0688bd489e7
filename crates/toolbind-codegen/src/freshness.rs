//! Freshness orchestration — decides, per host and per startup, whether to
//! regenerate bindings, reuse them, or fall back to a previous generation.
//!
//! Staleness is advisory and never fatal on its own; absence is fatal
//! unless generation succeeds. Partial success across hosts is a
//! first-class, reportable outcome.

use crate::generator::{manifest_path, BindingGenerator, GenerationResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use toolbind_core::{Error, HostDescriptor, HostsConfig, Result};
use toolbind_mcp::Catalog;
use tracing::{debug, error, info, warn};

const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// Retrieves a host's catalog. The production implementation opens a
/// transport and introspects; tests substitute their own.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches the host's current tool catalog.
    async fn fetch(&self, host: &HostDescriptor) -> Result<Catalog>;
}

/// Freshness classification of one host's bindings at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No binding manifest or no metadata on disk.
    Missing,
    /// Metadata age exceeds the staleness threshold.
    Stale,
    /// Metadata age is within the threshold.
    Fresh,
}

/// Per-host outcome of [`BindingManager::ensure_bindings`].
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    /// Usable bindings exist on disk for this host.
    pub ready: bool,
    /// The bindings are a previous generation kept after a failed refresh.
    pub degraded: bool,
    pub tool_count: usize,
}

/// Aggregate outcome across all configured hosts.
#[derive(Debug, Clone, Serialize, Default)]
pub struct EnsureReport {
    /// True iff every host reached a usable state (degraded included).
    pub success: bool,
    pub hosts: Vec<HostReport>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Orchestrates binding freshness for every configured host.
pub struct BindingManager {
    config: HostsConfig,
    generator: BindingGenerator,
    source: Arc<dyn CatalogSource>,
    max_age: chrono::Duration,
}

impl BindingManager {
    /// Manager over the given configuration, writing bindings under
    /// `out_dir`, introspecting hosts over their configured transports.
    pub fn new(config: HostsConfig, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            generator: BindingGenerator::new(out_dir),
            source: Arc::new(crate::catalog::TransportCatalogSource::default()),
            max_age: chrono::Duration::days(DEFAULT_MAX_AGE_DAYS),
        }
    }

    /// Substitutes the catalog source (tests, alternative protocols).
    pub fn with_catalog_source(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.source = source;
        self
    }

    /// Overrides the staleness threshold.
    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// The generator this manager writes through.
    pub fn generator(&self) -> &BindingGenerator {
        &self.generator
    }

    /// Classifies one host's bindings as missing, stale, or fresh.
    pub async fn classify(&self, host: &str) -> Freshness {
        if !manifest_path(&self.generator.host_dir(host)).exists() {
            return Freshness::Missing;
        }
        match self.generator.read_metadata(host).await {
            None => Freshness::Missing,
            Some(metadata) => {
                let age = Utc::now() - metadata.generated_at;
                if age > self.max_age {
                    Freshness::Stale
                } else {
                    Freshness::Fresh
                }
            }
        }
    }

    /// Ensures every configured host has usable bindings, regenerating the
    /// missing and stale ones. The whole regeneration batch runs under
    /// `timeout`; hosts not finished when it expires are treated exactly
    /// like generation failures.
    pub async fn ensure_bindings(&self, force: bool, timeout: Duration) -> EnsureReport {
        let mut report = EnsureReport {
            success: true,
            ..EnsureReport::default()
        };

        let mut hosts: Vec<HostDescriptor> = self.config.hosts().cloned().collect();
        hosts.sort_by(|a, b| a.name.cmp(&b.name));

        let mut pending = Vec::new();
        for host in hosts {
            let state = self.classify(&host.name).await;
            if state == Freshness::Fresh && !force {
                let tool_count = self
                    .generator
                    .read_metadata(&host.name)
                    .await
                    .map_or(0, |m| m.tool_count);
                debug!(host = %host.name, "bindings fresh, skipping regeneration");
                report.hosts.push(HostReport {
                    host: host.name.clone(),
                    ready: true,
                    degraded: false,
                    tool_count,
                });
            } else {
                debug!(host = %host.name, state = ?state, force, "bindings need regeneration");
                pending.push(host);
            }
        }

        let outcomes: Arc<Mutex<HashMap<String, Result<GenerationResult>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        {
            let outcomes = outcomes.clone();
            let batch = async {
                for host in &pending {
                    let result = self.regenerate(host).await;
                    outcomes.lock().await.insert(host.name.clone(), result);
                }
            };
            if tokio::time::timeout(timeout, batch).await.is_err() {
                warn!(timeout_ms = timeout.as_millis() as u64, "binding regeneration batch timed out");
            }
        }

        let mut outcomes = outcomes.lock().await;
        for host in &pending {
            match outcomes.remove(&host.name) {
                Some(Ok(result)) => {
                    report.hosts.push(HostReport {
                        host: host.name.clone(),
                        ready: true,
                        degraded: false,
                        tool_count: result.metadata.tool_count,
                    });
                }
                Some(Err(e)) => self.fallback_or_fatal(host, &e, &mut report).await,
                None => {
                    let e = Error::timeout("generate", timeout);
                    self.fallback_or_fatal(host, &e, &mut report).await;
                }
            }
        }

        report.hosts.sort_by(|a, b| a.host.cmp(&b.host));
        info!(
            hosts = report.hosts.len(),
            success = report.success,
            warnings = report.warnings.len(),
            errors = report.errors.len(),
            "binding freshness pass complete"
        );
        report
    }

    async fn regenerate(&self, host: &HostDescriptor) -> Result<GenerationResult> {
        let catalog = self.source.fetch(host).await?;
        self.generator
            .generate(&host.name, &catalog.tools, catalog.instructions.as_deref())
            .await
    }

    /// A failed regeneration degrades to existing bindings when any are on
    /// disk; a host with neither is a hard error.
    async fn fallback_or_fatal(&self, host: &HostDescriptor, e: &Error, report: &mut EnsureReport) {
        if manifest_path(&self.generator.host_dir(&host.name)).exists() {
            warn!(host = %host.name, error = %e, "regeneration failed, falling back to existing bindings");
            report.warnings.push(format!(
                "host '{}': regeneration failed ({e}); using existing bindings",
                host.name
            ));
            let tool_count = self
                .generator
                .read_metadata(&host.name)
                .await
                .map_or(0, |m| m.tool_count);
            report.hosts.push(HostReport {
                host: host.name.clone(),
                ready: true,
                degraded: true,
                tool_count,
            });
        } else {
            error!(host = %host.name, error = %e, "generation failed with no bindings to fall back to");
            report.errors.push(format!("host '{}': {e}", host.name));
            report.hosts.push(HostReport {
                host: host.name.clone(),
                ready: false,
                degraded: false,
                tool_count: 0,
            });
            report.success = false;
        }
    }
}
