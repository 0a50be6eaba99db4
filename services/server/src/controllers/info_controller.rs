use actix_web::{get, web, HttpResponse, Responder};
use email_worker::job::EntityRef;
use log::error;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::models::{ParticipantRow, TeamMemberRow, TeamRow};

#[get("/info/{id}")]
pub async fn entity_info(db_pool: web::Data<PgPool>, path: web::Path<String>) -> impl Responder {
    let entity = match path.into_inner().parse::<EntityRef>() {
        Ok(entity) => entity,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "Invalid ID format. Use 'p_' for participant or 't_' for team"
            }));
        }
    };

    let result = match entity {
        EntityRef::Participant(id) => participant_info(&db_pool, id).await,
        EntityRef::Team(id) => team_info_by_id(&db_pool, id).await,
    };

    match result {
        Ok(Some(data)) => HttpResponse::Ok().json(data),
        Ok(None) => {
            let missing = match entity {
                EntityRef::Participant(_) => "No participant with the ID",
                EntityRef::Team(_) => "No team with the ID",
            };
            HttpResponse::NotFound().json(json!({
                "success": false,
                "error": missing
            }))
        }
        Err(e) => {
            error!("Failed to fetch entity info: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to fetch participant/team info"
            }))
        }
    }
}

/// Allowance check used by the gate scanners: is this entity registered for
/// the segment / solo competition / team competition code in the URL.
#[get("/check/{page}/{event}/{id}")]
pub async fn check_allowance(
    db_pool: web::Data<PgPool>,
    path: web::Path<(String, String, String)>,
) -> impl Responder {
    let (page, event, id) = path.into_inner();

    let entity = match id.parse::<EntityRef>() {
        Ok(entity) => entity,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "Invalid ID format. Use 'p_' for participant or 't_' for team"
            }));
        }
    };

    let allowed = match (page.as_str(), entity) {
        ("segment", EntityRef::Participant(id)) => {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM registrations r \
                 JOIN segments s ON s.id = r.segment_id \
                 WHERE r.participant_id = $1 AND s.code = $2)",
            )
            .bind(id)
            .bind(&event)
            .fetch_one(db_pool.get_ref())
            .await
        }
        ("solo", EntityRef::Participant(id)) => {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM competition_registrations cr \
                 JOIN competitions c ON c.id = cr.competition_id \
                 WHERE cr.participant_id = $1 AND c.code = $2)",
            )
            .bind(id)
            .bind(&event)
            .fetch_one(db_pool.get_ref())
            .await
        }
        ("team", entity) => {
            // Scanning a member's personal code at a team event resolves
            // through their team membership.
            let team_id = match resolve_team_id(&db_pool, entity).await {
                Ok(team_id) => team_id,
                Err(e) => {
                    error!("Failed to resolve team: {}", e);
                    return HttpResponse::InternalServerError().json(json!({
                        "success": false,
                        "error": "Failed to fetch participant/team info"
                    }));
                }
            };

            match team_id {
                Some(team_id) => {
                    sqlx::query_scalar::<_, bool>(
                        "SELECT EXISTS(SELECT 1 FROM team_competition_registrations tcr \
                         JOIN team_competitions tc ON tc.id = tcr.competition_id \
                         WHERE tcr.team_id = $1 AND tc.code = $2)",
                    )
                    .bind(team_id)
                    .bind(&event)
                    .fetch_one(db_pool.get_ref())
                    .await
                }
                None => Ok(false),
            }
        }
        ("segment" | "solo", EntityRef::Team(_)) => Ok(false),
        _ => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "Invalid page type"
            }));
        }
    };

    match allowed {
        Ok(allowed) => HttpResponse::Ok().json(json!({"allowed": allowed})),
        Err(e) => {
            error!("Failed to check allowance: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to fetch participant/team info"
            }))
        }
    }
}

async fn resolve_team_id(pool: &PgPool, entity: EntityRef) -> Result<Option<i64>, String> {
    match entity {
        EntityRef::Team(id) => Ok(Some(id)),
        EntityRef::Participant(id) => sqlx::query_scalar::<_, i64>(
            "SELECT tm.team_id FROM team_members tm \
             JOIN participants p ON p.email = tm.email \
             WHERE p.id = $1 LIMIT 1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("Failed to resolve team membership: {}", e)),
    }
}

async fn participant_info(pool: &PgPool, id: i64) -> Result<Option<Value>, String> {
    let participant = sqlx::query_as::<_, ParticipantRow>(
        "SELECT id, f_name, l_name, email, phone, institution, payment_verified \
         FROM participants WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("Failed to load participant: {}", e))?;

    let participant = match participant {
        Some(participant) => participant,
        None => return Ok(None),
    };

    let segment_list: Vec<String> = sqlx::query_scalar(
        "SELECT s.segment_name FROM registrations r \
         JOIN segments s ON s.id = r.segment_id WHERE r.participant_id = $1",
    )
    .bind(participant.id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to load segments: {}", e))?;

    let comp_list: Vec<String> = sqlx::query_scalar(
        "SELECT c.competition_name FROM competition_registrations cr \
         JOIN competitions c ON c.id = cr.competition_id WHERE cr.participant_id = $1",
    )
    .bind(participant.id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to load competitions: {}", e))?;

    let gift_list: Vec<String> = sqlx::query_scalar(
        "SELECT g.gift_name FROM gift_status gs \
         JOIN gifts g ON g.id = gs.gift_id WHERE gs.participant_id = $1",
    )
    .bind(participant.id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to load gifts: {}", e))?;

    let entry_status: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM entry_status WHERE participant_id = $1)",
    )
    .bind(participant.id)
    .fetch_one(pool)
    .await
    .map_err(|e| format!("Failed to check entry status: {}", e))?;

    let mut response = json!({
        "participant": {
            "id": participant.id,
            "f_name": participant.f_name,
            "l_name": participant.l_name,
            "email": participant.email,
            "phone": participant.phone,
            "institution": participant.institution,
            "payment_verified": participant.payment_verified,
            "segment_list": segment_list,
            "comp_list": comp_list,
            "gift_list": gift_list,
            "entry_status": entry_status
        }
    });

    let team = sqlx::query_as::<_, TeamRow>(
        "SELECT t.id, t.team_name, t.payment_verified FROM teams t \
         JOIN team_members tm ON tm.team_id = t.id \
         WHERE tm.email = $1 LIMIT 1",
    )
    .bind(&participant.email)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("Failed to load team: {}", e))?;

    if let Some(team) = team {
        response["team"] = team_details(pool, &team).await?;
    }

    Ok(Some(response))
}

async fn team_info_by_id(pool: &PgPool, id: i64) -> Result<Option<Value>, String> {
    let team = sqlx::query_as::<_, TeamRow>(
        "SELECT id, team_name, payment_verified FROM teams WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("Failed to load team: {}", e))?;

    match team {
        Some(team) => Ok(Some(json!({"team": team_details(pool, &team).await?}))),
        None => Ok(None),
    }
}

async fn team_details(pool: &PgPool, team: &TeamRow) -> Result<Value, String> {
    let members = sqlx::query_as::<_, TeamMemberRow>(
        "SELECT id, team_id, f_name, l_name, email, phone, institution, is_leader \
         FROM team_members WHERE team_id = $1 ORDER BY is_leader DESC, id",
    )
    .bind(team.id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to load team members: {}", e))?;

    let comp_list: Vec<String> = sqlx::query_scalar(
        "SELECT tc.competition_name FROM team_competition_registrations tcr \
         JOIN team_competitions tc ON tc.id = tcr.competition_id WHERE tcr.team_id = $1",
    )
    .bind(team.id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to load team competitions: {}", e))?;

    let gift_list: Vec<String> = sqlx::query_scalar(
        "SELECT g.gift_name FROM gift_status gs \
         JOIN gifts g ON g.id = gs.gift_id WHERE gs.team_id = $1",
    )
    .bind(team.id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to load team gifts: {}", e))?;

    let entry_status: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM entry_status WHERE team_id = $1)")
            .bind(team.id)
            .fetch_one(pool)
            .await
            .map_err(|e| format!("Failed to check team entry status: {}", e))?;

    Ok(json!({
        "id": team.id,
        "team_name": team.team_name,
        "payment_verified": team.payment_verified,
        "comp_list": comp_list,
        "gift_list": gift_list,
        "entry_status": entry_status,
        "members": members.iter().map(|m| json!({
            "id": m.id,
            "full_name": m.full_name(),
            "email": m.email,
            "phone": m.phone,
            "institution": m.institution,
            "is_leader": m.is_leader
        })).collect::<Vec<_>>()
    }))
}
