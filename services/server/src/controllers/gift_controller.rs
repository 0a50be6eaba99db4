use std::collections::BTreeMap;

use actix_web::{get, post, web, HttpResponse, Responder};
use email_worker::job::EntityRef;
use log::error;
use serde_json::json;
use sqlx::PgPool;

use crate::models::GiftRow;
use crate::types::registration_types::GiftReceivedRequest;

#[get("/gifts/{id}")]
pub async fn gifts_status(db_pool: web::Data<PgPool>, path: web::Path<String>) -> impl Responder {
    let entity = match path.into_inner().parse::<EntityRef>() {
        Ok(entity) => entity,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "Invalid ID format. Use 'p_' for participant or 't_' for team"
            }));
        }
    };

    if let Err(resp) = ensure_entity_exists(&db_pool, entity).await {
        return resp;
    }

    let all_gifts = match sqlx::query_as::<_, GiftRow>("SELECT id, gift_name FROM gifts")
        .fetch_all(db_pool.get_ref())
        .await
    {
        Ok(gifts) => gifts,
        Err(e) => {
            error!("Failed to load gifts: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to fetch gifts status"
            }));
        }
    };

    let received: Vec<String> = match received_gift_names(&db_pool, entity).await {
        Ok(received) => received,
        Err(e) => {
            error!("Failed to load received gifts: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to fetch gifts status"
            }));
        }
    };

    let mut status: BTreeMap<String, u8> = BTreeMap::new();
    for gift in &all_gifts {
        status.insert(gift.gift_name.to_lowercase(), 0);
    }
    for name in received {
        status.insert(name.to_lowercase(), 1);
    }

    HttpResponse::Ok().json(status)
}

#[post("/gifts/{id}")]
pub async fn mark_gift_received(
    db_pool: web::Data<PgPool>,
    path: web::Path<String>,
    body: web::Json<GiftReceivedRequest>,
) -> impl Responder {
    let entity = match path.into_inner().parse::<EntityRef>() {
        Ok(entity) => entity,
        Err(_) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "Invalid ID format. Use 'p_' for participant or 't_' for team"
            }));
        }
    };

    if body.gift_name.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": "gift_name is required in request body"
        }));
    }

    if let Err(resp) = ensure_entity_exists(&db_pool, entity).await {
        return resp;
    }

    let gift = match sqlx::query_as::<_, GiftRow>(
        "SELECT id, gift_name FROM gifts WHERE LOWER(gift_name) = LOWER($1)",
    )
    .bind(body.gift_name.trim())
    .fetch_optional(db_pool.get_ref())
    .await
    {
        Ok(Some(gift)) => gift,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "error": format!("Gift '{}' not found", body.gift_name.trim())
            }));
        }
        Err(e) => {
            error!("Failed to look up gift: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to update gift status"
            }));
        }
    };

    let already = match gift_already_received(&db_pool, entity, gift.id).await {
        Ok(already) => already,
        Err(e) => {
            error!("Failed to check gift status: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to update gift status"
            }));
        }
    };

    if already {
        return HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!("{} already marked as received", gift.gift_name)
        }));
    }

    let insert = match entity {
        EntityRef::Participant(id) => {
            sqlx::query("INSERT INTO gift_status (participant_id, gift_id) VALUES ($1, $2)")
                .bind(id)
                .bind(gift.id)
                .execute(db_pool.get_ref())
                .await
        }
        EntityRef::Team(id) => {
            sqlx::query("INSERT INTO gift_status (team_id, gift_id) VALUES ($1, $2)")
                .bind(id)
                .bind(gift.id)
                .execute(db_pool.get_ref())
                .await
        }
    };

    match insert {
        Ok(_) => HttpResponse::Created().json(json!({
            "success": true,
            "message": format!("{} marked as received successfully", gift.gift_name)
        })),
        Err(e) => {
            error!("Failed to update gift status: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to update gift status"
            }))
        }
    }
}

async fn ensure_entity_exists(pool: &PgPool, entity: EntityRef) -> Result<(), HttpResponse> {
    let (query, id, missing) = match entity {
        EntityRef::Participant(id) => (
            "SELECT EXISTS(SELECT 1 FROM participants WHERE id = $1)",
            id,
            "No participant with the ID",
        ),
        EntityRef::Team(id) => (
            "SELECT EXISTS(SELECT 1 FROM teams WHERE id = $1)",
            id,
            "No team with the ID",
        ),
    };

    match sqlx::query_scalar::<_, bool>(query).bind(id).fetch_one(pool).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(HttpResponse::NotFound().json(json!({
            "success": false,
            "error": missing
        }))),
        Err(e) => {
            error!("Failed to check entity: {}", e);
            Err(HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Failed to fetch gifts status"
            })))
        }
    }
}

async fn received_gift_names(pool: &PgPool, entity: EntityRef) -> Result<Vec<String>, String> {
    let query = match entity {
        EntityRef::Participant(_) => {
            "SELECT g.gift_name FROM gift_status gs \
             JOIN gifts g ON g.id = gs.gift_id WHERE gs.participant_id = $1"
        }
        EntityRef::Team(_) => {
            "SELECT g.gift_name FROM gift_status gs \
             JOIN gifts g ON g.id = gs.gift_id WHERE gs.team_id = $1"
        }
    };
    let id = match entity {
        EntityRef::Participant(id) | EntityRef::Team(id) => id,
    };

    sqlx::query_scalar::<_, String>(query)
        .bind(id)
        .fetch_all(pool)
        .await
        .map_err(|e| format!("Failed to load received gifts: {}", e))
}

async fn gift_already_received(
    pool: &PgPool,
    entity: EntityRef,
    gift_id: i64,
) -> Result<bool, String> {
    let query = match entity {
        EntityRef::Participant(_) => {
            "SELECT EXISTS(SELECT 1 FROM gift_status WHERE participant_id = $1 AND gift_id = $2)"
        }
        EntityRef::Team(_) => {
            "SELECT EXISTS(SELECT 1 FROM gift_status WHERE team_id = $1 AND gift_id = $2)"
        }
    };
    let id = match entity {
        EntityRef::Participant(id) | EntityRef::Team(id) => id,
    };

    sqlx::query_scalar::<_, bool>(query)
        .bind(id)
        .bind(gift_id)
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to check gift status: {}", e))
}
