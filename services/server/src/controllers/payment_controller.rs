use actix_web::{get, post, web, HttpResponse, Responder};
use email_worker::job::{
    NotificationJob, ParticipantFacts, PaymentVerificationPayload, TeamVerificationFacts,
};
use log::error;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{ParticipantRow, TeamRow};
use crate::services::job_publisher::publish_notification_job;
use crate::services::validation;
use crate::types::registration_types::PaymentVerificationRequest;

#[post("/payment/verify")]
pub async fn verify_payment(
    db_pool: web::Data<PgPool>,
    req: web::Json<PaymentVerificationRequest>,
) -> impl Responder {
    let mut tx = match db_pool.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            error!("Failed to start verification transaction: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to update payment verification"
            }));
        }
    };

    // Locked read-modify-write: the flag toggle and the team cascade must
    // observe a consistent state under concurrent verifications.
    let participant = match sqlx::query_as::<_, ParticipantRow>(
        "SELECT id, f_name, l_name, email, phone, institution, payment_verified \
         FROM participants WHERE id = $1 FOR UPDATE",
    )
    .bind(req.id)
    .fetch_optional(&mut *tx)
    .await
    {
        Ok(Some(participant)) => participant,
        Ok(None) => {
            let _ = tx.rollback().await;
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "error": "Participant not found"
            }));
        }
        Err(e) => {
            let _ = tx.rollback().await;
            error!("Failed to load participant {}: {}", req.id, e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to update payment verification"
            }));
        }
    };

    let new_state = !participant.payment_verified;

    if let Err(e) = sqlx::query("UPDATE participants SET payment_verified = $1 WHERE id = $2")
        .bind(new_state)
        .bind(participant.id)
        .execute(&mut *tx)
        .await
    {
        let _ = tx.rollback().await;
        error!("Failed to update participant {}: {}", participant.id, e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": "Failed to update payment verification"
        }));
    }

    // A leader's verification carries the whole team.
    let team = match sqlx::query_as::<_, TeamRow>(
        "SELECT id, team_name, payment_verified FROM teams \
         WHERE id = (SELECT team_id FROM team_members \
                     WHERE email = $1 AND is_leader = TRUE LIMIT 1) \
         FOR UPDATE",
    )
    .bind(&participant.email)
    .fetch_optional(&mut *tx)
    .await
    {
        Ok(team) => team,
        Err(e) => {
            let _ = tx.rollback().await;
            error!("Failed to look up team for {}: {}", participant.email, e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to update payment verification"
            }));
        }
    };

    if let Some(team) = &team {
        if let Err(e) = sqlx::query("UPDATE teams SET payment_verified = $1 WHERE id = $2")
            .bind(new_state)
            .bind(team.id)
            .execute(&mut *tx)
            .await
        {
            let _ = tx.rollback().await;
            error!("Failed to update team {}: {}", team.id, e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to update payment verification"
            }));
        }
    }

    // Notification facts are denormalized before commit so the jobs never
    // re-read state that later toggles may have changed.
    let jobs = if new_state {
        match build_verification_jobs(&mut tx, &participant, team.as_ref()).await {
            Ok(jobs) => jobs,
            Err(e) => {
                let _ = tx.rollback().await;
                error!("Failed to prepare verification notifications: {}", e);
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "error": "Failed to update payment verification"
                }));
            }
        }
    } else {
        Vec::new()
    };

    if let Err(e) = tx.commit().await {
        error!("Failed to commit payment verification: {}", e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": "Failed to update payment verification"
        }));
    }

    // Un-verifying notifies nobody; verification mails go out once per
    // false->true edge.
    let mut all_queued = true;
    for job in &jobs {
        if let Err(e) = publish_notification_job(job).await {
            error!("Failed to queue verification email: {}", e);
            all_queued = false;
        }
    }
    let email_status = email_status_for(new_state, all_queued);

    let mut data = json!({
        "participant": {
            "id": participant.id,
            "name": participant.full_name(),
            "payment_verified": new_state
        },
        "email_status": email_status
    });

    let mut message = format!("Payment verification updated for {}", participant.full_name());
    if let Some(team) = &team {
        data["team"] = json!({
            "id": team.id,
            "name": team.team_name,
            "payment_verified": new_state
        });
        message.push_str(&format!(" and team {}", team.team_name));
    }

    HttpResponse::Ok().json(json!({
        "success": true,
        "message": message,
        "data": data
    }))
}

async fn build_verification_jobs(
    tx: &mut Transaction<'_, Postgres>,
    participant: &ParticipantRow,
    team: Option<&TeamRow>,
) -> Result<Vec<NotificationJob>, String> {
    let segments: Vec<String> = sqlx::query_scalar(
        "SELECT s.segment_name FROM registrations r \
         JOIN segments s ON s.id = r.segment_id \
         WHERE r.participant_id = $1",
    )
    .bind(participant.id)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| format!("Failed to load segments: {}", e))?;

    let competitions: Vec<String> = sqlx::query_scalar(
        "SELECT c.competition_name FROM competition_registrations cr \
         JOIN competitions c ON c.id = cr.competition_id \
         WHERE cr.participant_id = $1",
    )
    .bind(participant.id)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| format!("Failed to load competitions: {}", e))?;

    let facts = ParticipantFacts {
        id: participant.id,
        name: participant.full_name(),
        email: participant.email.clone(),
        phone: participant.phone.clone(),
        institution: participant.institution.clone(),
    };

    let mut jobs = vec![NotificationJob::payment_verification(
        PaymentVerificationPayload {
            participant: facts.clone(),
            segments: segments.clone(),
            competitions: competitions.clone(),
            team: None,
        },
    )];

    if let Some(team) = team {
        let member_emails: Vec<String> = sqlx::query_scalar(
            "SELECT email FROM team_members WHERE team_id = $1 AND email <> ''",
        )
        .bind(team.id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| format!("Failed to load team member emails: {}", e))?;

        jobs.push(NotificationJob::payment_verification(
            PaymentVerificationPayload {
                participant: facts,
                segments,
                competitions,
                team: Some(TeamVerificationFacts {
                    id: team.id,
                    name: team.team_name.clone(),
                    member_emails,
                }),
            },
        ));
    }

    Ok(jobs)
}

/// Delivery reporting for the verification endpoint: notifications exist
/// only on the false->true transition.
fn email_status_for(new_state: bool, all_queued: bool) -> &'static str {
    if !new_state {
        "skipped"
    } else if all_queued {
        "queued"
    } else {
        "failed"
    }
}

#[get("/coupon/{code}")]
pub async fn validate_coupon(db_pool: web::Data<PgPool>, path: web::Path<String>) -> impl Responder {
    let code = path.into_inner();

    match validation::find_coupon(&db_pool, &code).await {
        Ok(Some(coupon)) if coupon.remaining_uses > 0 => HttpResponse::Ok().json(json!({
            "success": true,
            "coupon": {
                "code": coupon.code,
                "discount": coupon.discount,
                "remaining_uses": coupon.remaining_uses
            }
        })),
        Ok(Some(coupon)) => HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": format!("Coupon '{}' has no remaining uses", coupon.code)
        })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": format!("Invalid coupon code: {}", code)
        })),
        Err(e) => {
            error!("Coupon validation failed for {}: {}", code, e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to validate coupon"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::email_status_for;

    #[test]
    fn unverifying_skips_notifications() {
        assert_eq!(email_status_for(false, true), "skipped");
        assert_eq!(email_status_for(false, false), "skipped");
    }

    #[test]
    fn verifying_reports_queue_outcome() {
        assert_eq!(email_status_for(true, true), "queued");
        assert_eq!(email_status_for(true, false), "failed");
    }
}
