mod controllers;
mod models;
mod services;
mod types;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use log::info;
use redis_client::RedisManager;
use sqlx::postgres::PgPoolOptions;
use std::env;

use crate::controllers::entry_controller::{entry_status, record_entry};
use crate::controllers::gift_controller::{gifts_status, mark_gift_received};
use crate::controllers::info_controller::{check_allowance, entity_info};
use crate::controllers::payment_controller::{validate_coupon, verify_payment};
use crate::controllers::registration_controller::{register, registration_info};

async fn health() -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(r#"{"status": "Ok"}"#)
}

async fn run() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to create Postgres pool");

    info!("Connected to Postgres Database");

    let redis_url =
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let redis_manager =
        RedisManager::init_global(&redis_url).expect("Failed to initialize Redis manager");

    redis_manager
        .connect()
        .await
        .expect("Failed to connect to Redis");

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .service(registration_info)
            .service(register)
            .service(verify_payment)
            .service(validate_coupon)
            .service(entry_status)
            .service(record_entry)
            .service(gifts_status)
            .service(mark_gift_received)
            .service(entity_info)
            .service(check_allowance)
            .route("/health", web::get().to(health))
    })
    .bind(bind_addr)?
    .run()
    .await
}

fn main() -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");
    runtime.block_on(run())
}
