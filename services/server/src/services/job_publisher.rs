use email_worker::consumer::JOB_STREAM;
use email_worker::job::NotificationJob;
use log::{error, warn};
use redis_client::RedisManager;

/// Called strictly after commit: a job must never exist for rolled-back
/// data. Publish failure is reported to the caller, never to the client as
/// a registration failure.
pub async fn publish_notification_job(job: &NotificationJob) -> Result<(), String> {
    let redis_manager = match RedisManager::global() {
        Some(rm) => rm,
        None => {
            warn!("Redis manager not initialized, cannot publish notification job");
            return Err("Redis manager not initialized".into());
        }
    };

    let job_json = match serde_json::to_string(job) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize notification job: {}", e);
            return Err(format!("Failed to serialize job: {}", e));
        }
    };

    match redis_manager
        .stream_add(JOB_STREAM, &[("data", &job_json)])
        .await
    {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("Failed to publish notification job to stream: {}", e);
            Err(format!("Failed to publish job: {}", e))
        }
    }
}
