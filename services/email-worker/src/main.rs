use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use log::info;
use redis_client::RedisManager;

use email_worker::consumer::{self, AttemptLimits};
use email_worker::dispatcher::Dispatcher;
use email_worker::idempotency::RedisIdempotencyStore;
use email_worker::mailer::SmtpMailer;
use email_worker::qr::QrGenerator;
use email_worker::render::HtmlRenderer;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let redis_url =
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let redis_manager =
        RedisManager::init_global(&redis_url).expect("Failed to initialize Redis manager");

    redis_manager
        .connect()
        .await
        .expect("Failed to connect to Redis");

    let event_name = env::var("EVENT_NAME").unwrap_or_else(|_| "TechFest".to_string());

    let smtp_host = env::var("SMTP_HOST").expect("SMTP_HOST must be set in .env");
    let smtp_port: u16 = env::var("SMTP_PORT")
        .unwrap_or_else(|_| "587".to_string())
        .parse()
        .expect("SMTP_PORT must be a port number");
    let smtp_username = env::var("SMTP_USERNAME").expect("SMTP_USERNAME must be set in .env");
    let smtp_password = env::var("SMTP_PASSWORD").expect("SMTP_PASSWORD must be set in .env");
    let from_email = env::var("FROM_EMAIL").unwrap_or_else(|_| smtp_username.clone());

    let media_root = PathBuf::from(env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".to_string()));
    let logo_path = media_root.join("logo.png");
    let ticket_template = media_root.join("ticket_template.png");

    let soft_limit: u64 = env::var("ATTEMPT_SOFT_LIMIT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    let hard_limit: u64 = env::var("ATTEMPT_HARD_LIMIT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);

    let mailer = SmtpMailer::new(
        smtp_host,
        smtp_port,
        smtp_username,
        smtp_password,
        from_email,
        event_name.clone(),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        RedisIdempotencyStore::new(redis_manager.clone()),
        HtmlRenderer::new(event_name.clone()),
        mailer,
        QrGenerator::new(Some(ticket_template)),
        Some(logo_path),
        event_name,
    ));

    info!("Email worker ready");

    consumer::start_notification_consumer(
        dispatcher,
        AttemptLimits {
            soft: Duration::from_secs(soft_limit),
            hard: Duration::from_secs(hard_limit),
        },
    )
    .await;
}
