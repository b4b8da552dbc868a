//! Cleanup - the reconciliation pass and the daily scheduler that triggers it
//!
//! The pass drops empty or nameless platforms, deletes tags whose owner no longer
//! resolves, and refreshes cached display names. Each distinct owner is looked up at
//! most once per pass.
//!
//! Only a definitive "unresolvable" answer deletes anything. A lookup *failure* aborts
//! the pass before it is saved, so a flaky resolver cannot wipe valid tags.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace};

use super::service::TagService;
use crate::collab::IdentityResolver;
use crate::config::TagsConfig;
use crate::error::{Result, TagsError};
use crate::types::{CleanupReport, Directory};

/// Reconcile `directory` in place against the identity resolver
pub async fn reconcile(
    directory: &mut Directory,
    resolver: &dyn IdentityResolver,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    // owner id → resolved name, None = unresolvable
    let mut verdicts: HashMap<String, Option<String>> = HashMap::new();

    let names: Vec<String> = directory.platforms.keys().cloned().collect();
    for name in names {
        let Some(platform) = directory.platforms.get(&name) else {
            continue;
        };

        if platform.users.is_empty() || platform.name.is_empty() {
            if let Some(role) = directory.platforms.remove(&name).and_then(|p| p.role) {
                report.orphaned_roles.push(role);
            }
            info!(platform = %name, "Removed empty platform");
            report.removed_platforms.push(name);
            continue;
        }

        let owners: Vec<String> = platform.users.keys().cloned().collect();
        for owner in owners {
            let verdict = match verdicts.get(&owner) {
                Some(cached) => cached.clone(),
                None => {
                    let fresh = resolver.resolve(&owner).await?;
                    report.resolver_calls += 1;
                    verdicts.insert(owner.clone(), fresh.clone());
                    fresh
                }
            };

            match verdict {
                Some(display_name) => {
                    let entry = directory
                        .platforms
                        .get_mut(&name)
                        .and_then(|p| p.users.get_mut(&owner));
                    if let Some(entry) = entry {
                        if entry.display_name != display_name {
                            entry.display_name = display_name;
                            report.refreshed_names += 1;
                        }
                    }
                }
                None => {
                    let removed = directory.remove_user(&name, &owner)?;
                    info!(platform = %name, owner_id = %owner, "Removed invalid user");
                    report.removed_tags.push((name.clone(), owner));
                    if removed.platform_removed {
                        info!(platform = %name, "Removed empty platform");
                        report.removed_platforms.push(name.clone());
                        report.orphaned_roles.extend(removed.orphaned_role);
                    }
                }
            }
        }
    }

    Ok(report)
}

/// Wall clock, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fires every `tick` and runs cleanup when the UTC hour equals `target_hour`
pub struct CleanupScheduler {
    service: Arc<TagService>,
    clock: Arc<dyn Clock>,
    target_hour: u32,
    tick: Duration,
}

impl CleanupScheduler {
    pub fn new(service: Arc<TagService>, config: &TagsConfig) -> Self {
        Self {
            service,
            clock: Arc::new(SystemClock),
            target_hour: config.clean_hour_utc,
            tick: config.clean_tick(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start ticking in the background. The first tick is one `tick` from now.
    pub fn start(self) -> SchedulerHandle {
        info!(
            target_hour = self.target_hour,
            tick_secs = self.tick.as_secs(),
            "Cleanup scheduler started"
        );
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("Cleanup scheduler stopped");
                        break;
                    }
                }
            }
        });

        SchedulerHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// One tick: run the pass if this is the target hour. Failures are logged, never
    /// raised; the next matching hour tries again.
    pub async fn on_tick(&self) -> Option<CleanupReport> {
        let hour = self.clock.now().hour();
        if hour != self.target_hour {
            trace!(hour, target_hour = self.target_hour, "Not cleanup hour");
            return None;
        }

        info!("Running scheduled cleanup");
        match self.service.run_cleanup().await {
            Ok(report) => {
                info!(
                    removed_platforms = report.removed_platforms.len(),
                    removed_tags = report.removed_tags.len(),
                    refreshed = report.refreshed_names,
                    "Scheduled cleanup done"
                );
                Some(report)
            }
            Err(TagsError::CleanBusy) => {
                debug!("Cleanup already running, skipping tick");
                None
            }
            Err(TagsError::NoTags) => {
                debug!("Nothing to clean yet");
                None
            }
            Err(e) => {
                error!(error = %e, "Scheduled cleanup failed");
                None
            }
        }
    }
}

/// Stops the scheduler on `shutdown`, or when dropped
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "Cleanup scheduler task failed");
        }
    }
}
