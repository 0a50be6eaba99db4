use actix_web::{get, post, web, HttpResponse, Responder};
use email_worker::job::EntityRef;
use log::error;
use serde_json::json;
use sqlx::PgPool;

use crate::models::{ParticipantRow, TeamRow};

#[get("/recordentry/{id}")]
pub async fn entry_status(db_pool: web::Data<PgPool>, path: web::Path<String>) -> impl Responder {
    let entity = match path.into_inner().parse::<EntityRef>() {
        Ok(entity) => entity,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "Invalid ID format. Use 'p_' for participant or 't_' for team"
            }));
        }
    };

    match has_entry(&db_pool, entity).await {
        Ok(true) => HttpResponse::Ok().json(json!({"success": true})),
        Ok(false) => HttpResponse::NotFound().json(json!({"success": false})),
        Err(e) => {
            error!("Failed to check entry status: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to check entry status"
            }))
        }
    }
}

#[post("/recordentry/{id}")]
pub async fn record_entry(db_pool: web::Data<PgPool>, path: web::Path<String>) -> impl Responder {
    let entity = match path.into_inner().parse::<EntityRef>() {
        Ok(entity) => entity,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "Invalid ID format. Use 'p_' for participant or 't_' for team"
            }));
        }
    };

    let label = match entity_label(&db_pool, entity).await {
        Ok(Some(label)) => label,
        Ok(None) => {
            let missing = match entity {
                EntityRef::Participant(_) => "No participant with the ID",
                EntityRef::Team(_) => "No team with the ID",
            };
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "error": missing
            }));
        }
        Err(e) => {
            error!("Failed to load entity for entry: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to record entry"
            }));
        }
    };

    // Double scans answer idempotently instead of erroring.
    match has_entry(&db_pool, entity).await {
        Ok(true) => {
            return HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Already recorded entry",
                "data": label
            }));
        }
        Ok(false) => {}
        Err(e) => {
            error!("Failed to check entry status: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to record entry"
            }));
        }
    }

    let insert = match entity {
        EntityRef::Participant(id) => {
            sqlx::query("INSERT INTO entry_status (participant_id) VALUES ($1)")
                .bind(id)
                .execute(db_pool.get_ref())
                .await
        }
        EntityRef::Team(id) => sqlx::query("INSERT INTO entry_status (team_id) VALUES ($1)")
            .bind(id)
            .execute(db_pool.get_ref())
            .await,
    };

    match insert {
        Ok(_) => HttpResponse::Created().json(json!({
            "success": true,
            "data": label
        })),
        Err(e) => {
            error!("Failed to record entry: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to record entry"
            }))
        }
    }
}

async fn has_entry(pool: &PgPool, entity: EntityRef) -> Result<bool, String> {
    let query = match entity {
        EntityRef::Participant(_) => {
            "SELECT EXISTS(SELECT 1 FROM entry_status WHERE participant_id = $1)"
        }
        EntityRef::Team(_) => "SELECT EXISTS(SELECT 1 FROM entry_status WHERE team_id = $1)",
    };
    let id = match entity {
        EntityRef::Participant(id) | EntityRef::Team(id) => id,
    };

    sqlx::query_scalar::<_, bool>(query)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to check entry status: {}", e))
}

async fn entity_label(
    pool: &PgPool,
    entity: EntityRef,
) -> Result<Option<serde_json::Value>, String> {
    match entity {
        EntityRef::Participant(id) => {
            let participant = sqlx::query_as::<_, ParticipantRow>(
                "SELECT id, f_name, l_name, email, phone, institution, payment_verified \
                 FROM participants WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| format!("Failed to load participant: {}", e))?;

            Ok(participant.map(|p| {
                json!({"p_name": p.full_name(), "t_name": serde_json::Value::Null})
            }))
        }
        EntityRef::Team(id) => {
            let team = sqlx::query_as::<_, TeamRow>(
                "SELECT id, team_name, payment_verified FROM teams WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| format!("Failed to load team: {}", e))?;

            let team = match team {
                Some(team) => team,
                None => return Ok(None),
            };

            let member_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM team_members WHERE team_id = $1",
            )
            .bind(team.id)
            .fetch_one(pool)
            .await
            .map_err(|e| format!("Failed to count team members: {}", e))?;

            Ok(Some(json!({
                "p_name": serde_json::Value::Null,
                "t_name": format!("{} ({} members)", team.team_name, member_count)
            })))
        }
    }
}
