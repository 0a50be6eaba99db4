use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use redis_client::RedisManager;

use crate::dead_letter;
use crate::dispatcher::{failure_outcome, Dispatcher, JobOutcome};
use crate::idempotency::IdempotencyStore;
use crate::job::NotificationJob;
use crate::mailer::Mailer;
use crate::render::Renderer;

pub const JOB_STREAM: &str = "notification_jobs";

/// Wall-clock limits for one delivery attempt. Exceeding the soft limit
/// aborts the attempt cleanly as a retryable timeout; the hard limit
/// forcibly terminates a wedged attempt task.
#[derive(Debug, Clone, Copy)]
pub struct AttemptLimits {
    pub soft: Duration,
    pub hard: Duration,
}

impl Default for AttemptLimits {
    fn default() -> Self {
        Self {
            soft: Duration::from_secs(60),
            hard: Duration::from_secs(120),
        }
    }
}

pub async fn start_notification_consumer<S, R, M>(
    dispatcher: Arc<Dispatcher<S, R, M>>,
    limits: AttemptLimits,
) where
    S: IdempotencyStore + Send + Sync + 'static,
    R: Renderer + Send + Sync + 'static,
    M: Mailer + Send + Sync + 'static,
{
    let redis_manager = match RedisManager::global() {
        Some(rm) => rm,
        None => {
            error!("Redis manager not initialized, cannot start notification consumer");
            return;
        }
    };

    info!("Starting notification consumer for stream: {}", JOB_STREAM);
    let mut last_id = "0".to_string();

    loop {
        match redis_manager.stream_read(JOB_STREAM, &mut last_id, 10).await {
            Ok(messages) => {
                for (msg_id, fields) in messages {
                    let data = match fields.get("data") {
                        Some(data) => data.clone(),
                        None => {
                            error!("Missing data field in stream entry {}", msg_id);
                            continue;
                        }
                    };

                    let job: NotificationJob = match serde_json::from_str(&data) {
                        Ok(job) => job,
                        Err(e) => {
                            error!("Failed to parse job from entry {}: {}", msg_id, e);
                            continue;
                        }
                    };

                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        run_attempt(dispatcher, job, limits).await;
                    });
                }
            }
            Err(e) => {
                error!("Error reading from stream {}: {}", JOB_STREAM, e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn run_attempt<S, R, M>(
    dispatcher: Arc<Dispatcher<S, R, M>>,
    job: NotificationJob,
    limits: AttemptLimits,
) where
    S: IdempotencyStore + Send + Sync + 'static,
    R: Renderer + Send + Sync + 'static,
    M: Mailer + Send + Sync + 'static,
{
    let soft = limits.soft;
    let attempt_job = job.clone();
    let attempt_dispatcher = dispatcher.clone();
    let mut attempt = tokio::spawn(async move {
        match tokio::time::timeout(soft, attempt_dispatcher.process(&attempt_job)).await {
            Ok(outcome) => outcome,
            Err(_) => failure_outcome(
                &attempt_job,
                format!("Attempt exceeded soft time limit of {:?}", soft),
            ),
        }
    });

    let outcome = tokio::select! {
        joined = &mut attempt => match joined {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome(&job, format!("Attempt task failed: {}", e)),
        },
        _ = tokio::time::sleep(limits.hard) => {
            attempt.abort();
            failure_outcome(
                &job,
                format!("Attempt exceeded hard time limit of {:?}", limits.hard),
            )
        }
    };

    handle_outcome(job, outcome).await;
}

async fn handle_outcome(job: NotificationJob, outcome: JobOutcome) {
    match outcome {
        JobOutcome::Sent | JobOutcome::Duplicate => {}
        JobOutcome::Retry { error, delay } => {
            warn!(
                "Job {} attempt {} failed, retrying in {:?}: {}",
                job.job_id, job.attempt_count, delay, error
            );
            let retried = job.next_attempt();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = publish_job(&retried).await {
                    error!(
                        "Failed to reschedule job {} (key {}): {}",
                        retried.job_id, retried.idempotency_key, e
                    );
                }
            });
        }
        JobOutcome::Terminal { error } => {
            if let Err(e) = dead_letter::send_to_dlq(&job, &error).await {
                error!("Failed to dead-letter job {}: {}", job.job_id, e);
            }
        }
    }
}

pub async fn publish_job(job: &NotificationJob) -> Result<(), String> {
    let redis_manager = RedisManager::global()
        .ok_or_else(|| "Redis manager not initialized".to_string())?;

    let job_json =
        serde_json::to_string(job).map_err(|e| format!("Failed to serialize job: {}", e))?;

    redis_manager
        .stream_add(JOB_STREAM, &[("data", &job_json)])
        .await
        .map_err(|e| format!("Failed to publish job: {}", e))
}
