use actix_web::{get, post, web, HttpResponse, Responder};
use email_worker::job::{
    MemberFacts, NotificationJob, ParticipantFacts, PaymentFacts, RegistrationPayload,
    TeamBroadcastPayload, TeamFacts,
};
use log::error;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::services::job_publisher::publish_notification_job;
use crate::services::validation::{self, ResolvedRegistration, ValidationFailure};
use crate::services::coupon_ledger;
use crate::types::registration_types::{
    ParticipantInput, RegistrationRequest, TeamMemberInput,
};

#[get("/register")]
pub async fn registration_info() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Registration endpoint is ready",
        "method": "POST",
        "endpoint": "/register"
    }))
}

#[post("/register")]
pub async fn register(
    db_pool: web::Data<PgPool>,
    req: web::Json<RegistrationRequest>,
) -> impl Responder {
    let req = req.into_inner();

    let resolved = match validation::validate_registration(&db_pool, &req).await {
        Ok(resolved) => resolved,
        Err(ValidationFailure::Invalid(errors)) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "errors": errors
            }));
        }
        Err(ValidationFailure::Internal(e)) => {
            error!("Registration validation failed: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Registration failed"
            }));
        }
    };

    let mut tx = match db_pool.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            error!("Failed to start registration transaction: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to start the database transaction"
            }));
        }
    };

    let participant_id = match create_participant(&mut tx, &req.participant).await {
        Ok(id) => id,
        Err(e) => return rollback_with_error(tx, "create participant", e).await,
    };

    let coupon_id = resolved.coupon.as_ref().map(|c| c.id);
    if let Err(e) = create_payment(&mut tx, &req, Some(participant_id), None, coupon_id).await {
        return rollback_with_error(tx, "record payment", e).await;
    }

    for segment in &resolved.segments {
        let result = sqlx::query(
            "INSERT INTO registrations (participant_id, segment_id) VALUES ($1, $2)",
        )
        .bind(participant_id)
        .bind(segment.id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            return rollback_with_error(tx, "register segments", e.to_string()).await;
        }
    }

    for competition in &resolved.competitions {
        let result = sqlx::query(
            "INSERT INTO competition_registrations (participant_id, competition_id) VALUES ($1, $2)",
        )
        .bind(participant_id)
        .bind(competition.id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            return rollback_with_error(tx, "register competitions", e.to_string()).await;
        }
    }

    let mut team_ctx: Option<(i64, String, Vec<MemberFacts>)> = None;
    if let Some(team_block) = &req.team_competition {
        let (team_id, members) = match create_team(&mut tx, &req, &resolved).await {
            Ok(created) => created,
            Err(e) => return rollback_with_error(tx, "create team", e).await,
        };
        team_ctx = Some((team_id, team_block.team.team_name.clone(), members));
    }

    if let Some(coupon) = &resolved.coupon {
        match coupon_ledger::decrement(&mut tx, coupon.id).await {
            Ok(true) => {}
            Ok(false) => {
                let _ = tx.rollback().await;
                return HttpResponse::BadRequest().json(json!({
                    "success": false,
                    "errors": {
                        "coupon": format!("Coupon '{}' has no remaining uses", coupon.code)
                    }
                }));
            }
            Err(e) => return rollback_with_error(tx, "redeem coupon", e).await,
        }
    }

    if let Err(e) = tx.commit().await {
        error!("Failed to commit registration: {}", e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": "Registration failed",
            "details": e.to_string()
        }));
    }

    // Jobs are enqueued only for committed data; publish failure degrades
    // to email_queued=false, never to a failed registration.
    let email_queued = enqueue_confirmation_jobs(&req, &resolved, participant_id, &team_ctx).await;

    let mut data = json!({
        "participant": {
            "id": participant_id,
            "name": display_name(&req.participant),
            "email": req.participant.email,
            "payment_verified": false
        },
        "payment": {
            "trx_id": req.payment.trx_id,
            "amount": req.payment.amount
        },
        "segments": req.segment,
        "competitions": req.competition,
        "email_queued": email_queued
    });

    if let (Some((team_id, team_name, members)), Some(team_block)) =
        (&team_ctx, &req.team_competition)
    {
        data["team"] = json!({
            "id": team_id,
            "name": team_name,
            "payment_verified": false,
            "members_count": members.len(),
            "competitions": team_block.competition
        });
        data["team_payment"] = json!({
            "trx_id": req.payment.trx_id,
            "amount": req.payment.amount
        });
    }

    HttpResponse::Created().json(json!({
        "success": true,
        "message": "Registration completed successfully",
        "data": data
    }))
}

async fn rollback_with_error(
    tx: Transaction<'_, Postgres>,
    step: &str,
    error: String,
) -> HttpResponse {
    let _ = tx.rollback().await;
    error!("Registration failed ({}): {}", step, error);
    HttpResponse::InternalServerError().json(json!({
        "success": false,
        "error": "Registration failed",
        "details": error
    }))
}

async fn create_participant(
    tx: &mut Transaction<'_, Postgres>,
    input: &ParticipantInput,
) -> Result<i64, String> {
    let (f_name, l_name) = split_full_name(&input.full_name);

    sqlx::query_scalar::<_, i64>(
        "INSERT INTO participants \
         (f_name, l_name, gender, email, phone, age, institution, institution_id, \
          address, guardian_phone, t_shirt_size, payment_verified) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE) \
         RETURNING id",
    )
    .bind(f_name)
    .bind(l_name)
    .bind(&input.gender)
    .bind(&input.email)
    .bind(&input.phone)
    .bind(input.age)
    .bind(&input.institution)
    .bind(&input.institution_id)
    .bind(input.address.clone().unwrap_or_default())
    .bind(input.guardian_phone.clone().unwrap_or_default())
    .bind(input.t_shirt_size.clone().unwrap_or_default())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| format!("Failed to create participant: {}", e))
}

async fn create_payment(
    tx: &mut Transaction<'_, Postgres>,
    req: &RegistrationRequest,
    participant_id: Option<i64>,
    team_id: Option<i64>,
    coupon_id: Option<i64>,
) -> Result<i64, String> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO payments (participant_id, team_id, phone, amount, method, trx_id, coupon_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(participant_id)
    .bind(team_id)
    .bind(&req.payment.phone)
    .bind(req.payment.amount)
    .bind(req.payment.method.clone().unwrap_or_default())
    .bind(&req.payment.trx_id)
    .bind(coupon_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| format!("Failed to record payment: {}", e))
}

/// Creates the team, its members (the registering participant copied in as
/// leader), the team payment, the competition rows and the award project.
async fn create_team(
    tx: &mut Transaction<'_, Postgres>,
    req: &RegistrationRequest,
    resolved: &ResolvedRegistration,
) -> Result<(i64, Vec<MemberFacts>), String> {
    let team_block = req
        .team_competition
        .as_ref()
        .ok_or_else(|| "Missing team competition block".to_string())?;

    let team_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO teams (team_name, payment_verified) VALUES ($1, FALSE) RETURNING id",
    )
    .bind(&team_block.team.team_name)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| format!("Failed to create team: {}", e))?;

    let mut members = Vec::with_capacity(team_block.team.members.len() + 1);

    let leader = leader_member_input(&req.participant);
    create_team_member(tx, team_id, &leader, true).await?;
    members.push(MemberFacts {
        name: display_name(&req.participant),
        email: req.participant.email.clone(),
        institution: req.participant.institution.clone(),
        is_leader: true,
    });

    for member in &team_block.team.members {
        create_team_member(tx, team_id, member, false).await?;
        let (f_name, l_name) = split_full_name(&member.full_name);
        members.push(MemberFacts {
            name: format!("{} {}", f_name, l_name).trim_end().to_string(),
            email: member.email.clone().unwrap_or_default(),
            institution: member.institution.clone(),
            is_leader: false,
        });
    }

    create_payment(tx, req, None, Some(team_id), None).await?;

    for competition in &resolved.team_competitions {
        sqlx::query(
            "INSERT INTO team_competition_registrations (team_id, competition_id) VALUES ($1, $2)",
        )
        .bind(team_id)
        .bind(competition.id)
        .execute(&mut **tx)
        .await
        .map_err(|e| format!("Failed to register team competitions: {}", e))?;
    }

    if let Some(award) = &req.award_project {
        sqlx::query(
            "INSERT INTO award_projects \
             (team_id, project_name, project_type, project_description, pitch_deck, video_link) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(team_id)
        .bind(&award.project_name)
        .bind(&award.project_type)
        .bind(&award.project_description)
        .bind(award.pitch_deck.clone().unwrap_or_default())
        .bind(award.video_link.clone().unwrap_or_default())
        .execute(&mut **tx)
        .await
        .map_err(|e| format!("Failed to record award project: {}", e))?;
    }

    Ok((team_id, members))
}

async fn create_team_member(
    tx: &mut Transaction<'_, Postgres>,
    team_id: i64,
    member: &TeamMemberInput,
    is_leader: bool,
) -> Result<(), String> {
    let (f_name, l_name) = split_full_name(&member.full_name);

    sqlx::query(
        "INSERT INTO team_members \
         (team_id, f_name, l_name, gender, email, phone, age, institution, institution_id, \
          address, t_shirt_size, is_leader) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(team_id)
    .bind(f_name)
    .bind(l_name)
    .bind(&member.gender)
    .bind(member.email.clone().unwrap_or_default())
    .bind(&member.phone)
    .bind(member.age)
    .bind(&member.institution)
    .bind(&member.institution_id)
    .bind(member.address.clone().unwrap_or_default())
    .bind(member.t_shirt_size.clone().unwrap_or_default())
    .bind(is_leader)
    .execute(&mut **tx)
    .await
    .map(|_| ())
    .map_err(|e| format!("Failed to create team member: {}", e))
}

fn leader_member_input(participant: &ParticipantInput) -> TeamMemberInput {
    TeamMemberInput {
        full_name: participant.full_name.clone(),
        gender: participant.gender.clone(),
        email: Some(participant.email.clone()),
        phone: participant.phone.clone(),
        age: participant.age,
        institution: participant.institution.clone(),
        institution_id: participant.institution_id.clone(),
        address: participant.address.clone(),
        t_shirt_size: participant.t_shirt_size.clone(),
    }
}

async fn enqueue_confirmation_jobs(
    req: &RegistrationRequest,
    resolved: &ResolvedRegistration,
    participant_id: i64,
    team_ctx: &Option<(i64, String, Vec<MemberFacts>)>,
) -> bool {
    let payment = PaymentFacts {
        trx_id: req.payment.trx_id.clone(),
        amount: req.payment.amount,
        phone: req.payment.phone.clone(),
    };
    let team_competition_names: Vec<String> = resolved
        .team_competitions
        .iter()
        .map(|c| c.competition_name.clone())
        .collect();

    let registration_job = NotificationJob::registration_confirmation(RegistrationPayload {
        participant: ParticipantFacts {
            id: participant_id,
            name: display_name(&req.participant),
            email: req.participant.email.clone(),
            phone: req.participant.phone.clone(),
            institution: req.participant.institution.clone(),
        },
        payment: payment.clone(),
        segments: resolved.segments.iter().map(|s| s.segment_name.clone()).collect(),
        competitions: resolved
            .competitions
            .iter()
            .map(|c| c.competition_name.clone())
            .collect(),
        team: team_ctx
            .as_ref()
            .map(|(id, name, _)| TeamFacts { id: *id, name: name.clone() }),
        team_members: team_ctx
            .as_ref()
            .map(|(_, _, members)| members.clone())
            .unwrap_or_default(),
        team_competitions: team_competition_names.clone(),
    });

    let mut email_queued = true;
    if let Err(e) = publish_notification_job(&registration_job).await {
        error!("Failed to queue registration email: {}", e);
        email_queued = false;
    }

    if let Some((team_id, team_name, members)) = team_ctx {
        let broadcast_job = NotificationJob::team_registration_broadcast(TeamBroadcastPayload {
            team: TeamFacts {
                id: *team_id,
                name: team_name.clone(),
            },
            members: members.clone(),
            team_competitions: team_competition_names,
            payment,
        });

        if let Err(e) = publish_notification_job(&broadcast_job).await {
            error!("Failed to queue team broadcast email: {}", e);
            email_queued = false;
        }
    }

    email_queued
}

fn display_name(participant: &ParticipantInput) -> String {
    let (f_name, l_name) = split_full_name(&participant.full_name);
    format!("{} {}", f_name, l_name).trim_end().to_string()
}

/// First whitespace-delimited token becomes the forename; everything after
/// it the surname. A single-token name yields an empty surname.
pub fn split_full_name(full_name: &str) -> (String, String) {
    let trimmed = full_name.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim_start().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::split_full_name;

    #[test]
    fn splits_on_first_space_only() {
        assert_eq!(
            split_full_name("Ada Lovelace"),
            ("Ada".to_string(), "Lovelace".to_string())
        );
        assert_eq!(
            split_full_name("Augusta Ada King-Noel"),
            ("Augusta".to_string(), "Ada King-Noel".to_string())
        );
    }

    #[test]
    fn single_token_yields_empty_surname() {
        assert_eq!(split_full_name("Plato"), ("Plato".to_string(), String::new()));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            split_full_name("  Ada   Lovelace  "),
            ("Ada".to_string(), "Lovelace".to_string())
        );
    }
}
