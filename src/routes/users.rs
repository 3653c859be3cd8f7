use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{admin_validator, hash_password, new_id, AuthUser},
    db::now_rfc3339,
    errors::ApiError,
    models::{UserRow, ROLE_ADMIN, ROLE_BARBER, ROLE_SECRETARY},
    state::AppState,
};

#[derive(Deserialize)]
struct UserCreatePayload {
    username: String,
    display_name: String,
    password: String,
    role: String,
}

#[derive(Deserialize)]
struct UserUpdatePayload {
    display_name: Option<String>,
    password: Option<String>,
    role: Option<String>,
    active: Option<bool>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/users")
            .wrap(HttpAuthentication::bearer(admin_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::patch().to(update))
                    .route(web::delete().to(deactivate)),
            ),
    );
}

fn valid_role(role: &str) -> bool {
    [ROLE_ADMIN, ROLE_SECRETARY, ROLE_BARBER].contains(&role)
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, display_name, role, password_hash, active, created_at FROM users ORDER BY display_name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    payload: web::Json<UserCreatePayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    if payload.username.trim().is_empty() {
        return Err(ApiError::Validation("username is required".into()));
    }
    if payload.display_name.trim().is_empty() {
        return Err(ApiError::Validation("display_name is required".into()));
    }
    if payload.password.trim().len() < 6 {
        return Err(ApiError::Validation("password must be at least 6 characters".into()));
    }
    if !valid_role(&payload.role) {
        return Err(ApiError::Validation(format!("invalid role: {}", payload.role)));
    }

    let password_hash = hash_password(&payload.password)
        .map_err(|_| ApiError::Internal("password hash failed".into()))?;

    let user_id = new_id();
    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&user_id)
    .bind(payload.username.trim())
    .bind(payload.display_name.trim())
    .bind(&payload.role)
    .bind(password_hash)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await
    .map_err(|err| duplicate_username(err, &payload.username))?;

    Ok(HttpResponse::Created().json(json!({ "id": user_id })))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UserUpdatePayload>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let payload = payload.into_inner();

    let existing = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, display_name, role, password_hash, active, created_at FROM users WHERE id = ?",
    )
    .bind(&user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("user"))?;

    let role = match payload.role {
        Some(role) => {
            if !valid_role(&role) {
                return Err(ApiError::Validation(format!("invalid role: {role}")));
            }
            role
        }
        None => existing.role,
    };

    let password_hash = match payload.password.as_deref() {
        Some(password) => {
            if password.trim().len() < 6 {
                return Err(ApiError::Validation("password must be at least 6 characters".into()));
            }
            hash_password(password).map_err(|_| ApiError::Internal("password hash failed".into()))?
        }
        None => existing.password_hash,
    };

    sqlx::query(
        "UPDATE users SET display_name = ?, role = ?, password_hash = ?, active = ? WHERE id = ?",
    )
    .bind(payload.display_name.unwrap_or(existing.display_name))
    .bind(&role)
    .bind(&password_hash)
    .bind(payload.active.map(|a| a as i64).unwrap_or(existing.active))
    .bind(&user_id)
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "id": user_id })))
}

/// Users are deactivated, never deleted: schedulings and commissions keep
/// referencing them.
async fn deactivate(
    state: web::Data<AppState>,
    path: web::Path<String>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    if user_id == auth.id {
        return Err(ApiError::Validation("cannot deactivate your own account".into()));
    }

    let result = sqlx::query("UPDATE users SET active = 0 WHERE id = ?")
        .bind(&user_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("user"));
    }
    Ok(HttpResponse::Ok().json(json!({ "deactivated": user_id })))
}

fn duplicate_username(err: sqlx::Error, username: &str) -> ApiError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return ApiError::Validation(format!("username already exists: {}", username.trim()));
        }
    }
    ApiError::Database(err)
}
