//! Scheduled escrow auto-release

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use super::service::PaymentService;

/// Start a scheduler that runs the auto-release sweep on `cron`
/// (six fields, seconds first). Keep the returned scheduler alive for as
/// long as the sweep should run.
pub async fn start_escrow_release_job(
    payment_service: Arc<PaymentService>,
    cron: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow!("Failed to create job scheduler: {:?}", e))?;

    let job = Job::new_async(cron, move |_id, _scheduler| {
        let payment_service = payment_service.clone();
        Box::pin(async move {
            run_sweep(&payment_service).await;
        })
    })
    .map_err(|e| anyhow!("Invalid escrow release schedule '{}': {:?}", cron, e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow!("Failed to register escrow release job: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow!("Failed to start job scheduler: {:?}", e))?;

    tracing::info!(schedule = %cron, "Escrow auto-release scheduled");

    Ok(scheduler)
}

async fn run_sweep(payment_service: &PaymentService) {
    match payment_service.auto_release_escrow().await {
        Ok(summary) if !summary.failed.is_empty() => {
            tracing::warn!(
                released = summary.released.len(),
                failed = summary.failed.len(),
                "Escrow sweep completed with failures"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Escrow sweep could not run: {}", e);
        }
    }
}
