use log::{error, info};
use redis_client::RedisManager;

use crate::job::NotificationJob;

const DLQ_STREAM: &str = "notification_jobs:dlq";

/// Terminal jobs land here for operator inspection; they are never
/// resurrected automatically.
pub async fn send_to_dlq(job: &NotificationJob, error: &str) -> Result<(), String> {
    let redis_manager = match RedisManager::global() {
        Some(rm) => rm,
        None => {
            error!("Redis manager not initialized, cannot send to DLQ");
            return Err("Redis manager not initialized".into());
        }
    };

    let job_json = serde_json::to_string(job)
        .map_err(|e| format!("Failed to serialize job for DLQ: {}", e))?;

    let dlq_message = serde_json::json!({
        "job_id": job.job_id,
        "job_type": job.payload.kind(),
        "idempotency_key": job.idempotency_key,
        "attempt_count": job.attempt_count,
        "job": job_json,
        "error": error,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    let dlq_json = serde_json::to_string(&dlq_message)
        .map_err(|e| format!("Failed to serialize DLQ message: {}", e))?;

    match redis_manager
        .stream_add(DLQ_STREAM, &[("data", &dlq_json)])
        .await
    {
        Ok(_) => {
            info!(
                "Sent failed job to DLQ: job_id={}, error={}",
                job.job_id, error
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send job to DLQ: {}", e);
            Err(format!("Failed to send to DLQ: {}", e))
        }
    }
}
