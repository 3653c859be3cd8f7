use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::{SchedulingRow, ROLE_ADMIN},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing =
        sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
            .bind(ROLE_ADMIN)
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name = env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Administrador".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(username)
    .bind(display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(now_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_scheduling(
    pool: &SqlitePool,
    scheduling_id: &str,
) -> Result<Option<SchedulingRow>, sqlx::Error> {
    sqlx::query_as::<_, SchedulingRow>(
        r#"SELECT s.id, s.client_id, s.client_name, s.service_id, s.barber_id,
                  s.date_time, s.phone, s.status, s.created_by, s.created_at,
                  sv.name AS service_name,
                  u.display_name AS barber_name
           FROM schedulings s
           LEFT JOIN services sv ON s.service_id = sv.id
           LEFT JOIN users u ON s.barber_id = u.id
           WHERE s.id = ?
           LIMIT 1"#,
    )
    .bind(scheduling_id)
    .fetch_optional(pool)
    .await
}
