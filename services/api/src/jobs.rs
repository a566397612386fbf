//! Background jobs: outbox delivery and payment reconciliation

use anyhow::Result;
use stays::{OutboxRelay, PaymentService};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Schedules both jobs and starts the scheduler.
///
/// The returned scheduler must be kept alive for the jobs to keep running.
pub async fn start(
    relay: OutboxRelay,
    payments: PaymentService,
    outbox_schedule: &str,
    reconcile_schedule: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let outbox_job = Job::new_async(outbox_schedule, move |_, _| {
        let relay = relay.clone();
        Box::pin(async move {
            match relay.relay_once().await {
                Ok(0) => {}
                Ok(count) => info!("Delivered {} outbox events", count),
                Err(e) => error!("Failed to drain outbox: {}", e),
            }
        })
    })?;

    let reconcile_job = Job::new_async(reconcile_schedule, move |_, _| {
        let payments = payments.clone();
        Box::pin(async move {
            match payments.reconcile_pending().await {
                Ok(0) => {}
                Ok(count) => info!("Confirmed {} bookings from payment sessions", count),
                Err(e) => error!("Failed to reconcile payment sessions: {}", e),
            }
        })
    })?;

    scheduler.add(outbox_job).await?;
    scheduler.add(reconcile_job).await?;
    scheduler.start().await?;

    info!(
        "Started background jobs (outbox: {}, reconcile: {})",
        outbox_schedule, reconcile_schedule
    );
    Ok(scheduler)
}
