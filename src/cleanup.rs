//! Periodic retention jobs.
//!
//! Two independent tasks share the same period:
//! - soft-delete of accounts left unverified past the retention window
//! - permanent removal of accounts soft-deleted past the grace period
//!
//! The purge task is offset so that, within one period, the soft-delete
//! pass runs first. A failed pass is logged and retried on the next tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::auth::services::AuthService;
use crate::error::AuthError;

const PURGE_OFFSET: Duration = Duration::from_secs(60);

pub struct CleanupScheduler {
    auth: AuthService,
    interval: Duration,
    purge_offset: Duration,
}

impl CleanupScheduler {
    pub fn new(auth: AuthService, interval_hours: u64) -> Self {
        Self::with_interval(auth, Duration::from_secs(interval_hours.max(1) * 60 * 60))
    }

    pub fn with_interval(auth: AuthService, interval: Duration) -> Self {
        Self {
            auth,
            interval,
            purge_offset: PURGE_OFFSET.min(interval / 2),
        }
    }

    pub async fn run_soft_delete(&self) -> Result<u64, AuthError> {
        let affected = self.auth.soft_delete_unverified_users().await?;
        info!(affected, "soft-deleted unverified users");
        Ok(affected)
    }

    pub async fn run_purge(&self) -> Result<u64, AuthError> {
        let affected = self.auth.permanently_delete_users().await?;
        info!(affected, "purged soft-deleted users");
        Ok(affected)
    }

    /// Spawns both jobs; the first run happens one period after start.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        let scheduler = std::sync::Arc::new(self);
        let period = scheduler.interval;

        let soft_delete = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Err(e) = scheduler.run_soft_delete().await {
                        error!(error = %e, "soft-delete job failed");
                    }
                }
            })
        };

        let purge = tokio::spawn(async move {
            let start = Instant::now() + period + scheduler.purge_offset;
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.run_purge().await {
                    error!(error = %e, "purge job failed");
                }
            }
        });

        info!(?period, "cleanup scheduler started");
        vec![soft_delete, purge]
    }
}
