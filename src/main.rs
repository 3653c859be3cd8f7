mod auth;
mod db;
mod errors;
mod messaging;
mod models;
mod narrative;
mod notifications;
mod reports;
mod routes;
mod scheduling;
mod state;

use actix_web::{middleware, web, App, HttpServer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::str::FromStr;

use crate::state::{AppState, JwtConfig, NarrativeConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/barbearia.db".to_string());
    db::ensure_sqlite_dir(&db_url)?;

    let connect_options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    db::run_migrations(&pool).await?;
    db::seed_admin(&pool).await?;

    let commission_rate = env::var("COMMISSION_RATE")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.4);

    let state = AppState {
        db: pool.clone(),
        jwt: JwtConfig::from_env(),
        messaging: messaging::from_env(),
        webhook_token: env::var("WHATSAPP_WEBHOOK_TOKEN").ok().filter(|t| !t.is_empty()),
        commission_rate,
        narrative: NarrativeConfig::from_env(),
    };

    notifications::spawn_dispatcher(state.clone());

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);

    let address = format!("0.0.0.0:{port}");
    log::info!("Starting barbearia-backend on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::public::configure)
            .configure(routes::schedulings::configure)
            .configure(routes::clients::configure)
            .configure(routes::services::configure)
            .configure(routes::products::configure)
            .configure(routes::finance::configure)
            .configure(routes::users::configure)
            .configure(routes::reports::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
