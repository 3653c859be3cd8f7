use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{new_id, staff_validator},
    errors::ApiError,
    models::ServiceRow,
    state::AppState,
};

#[derive(Deserialize)]
struct ServicePayload {
    name: String,
    price: f64,
    duration_min: i64,
    active: Option<bool>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/services")
            .wrap(HttpAuthentication::bearer(staff_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::put().to(update))
                    .route(web::delete().to(delete)),
            ),
    );
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, price, duration_min, active FROM services ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    payload: web::Json<ServicePayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    validate(&payload)?;

    let service_id = new_id();
    sqlx::query(
        "INSERT INTO services (id, name, price, duration_min, active) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&service_id)
    .bind(payload.name.trim())
    .bind(payload.price)
    .bind(payload.duration_min)
    .bind(payload.active.unwrap_or(true) as i64)
    .execute(&state.db)
    .await
    .map_err(|err| duplicate_name(err, &payload.name))?;

    Ok(HttpResponse::Created().json(json!({ "id": service_id })))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ServicePayload>,
) -> Result<HttpResponse, ApiError> {
    let service_id = path.into_inner();
    let payload = payload.into_inner();
    validate(&payload)?;

    let result = sqlx::query(
        "UPDATE services SET name = ?, price = ?, duration_min = ?, active = ? WHERE id = ?",
    )
    .bind(payload.name.trim())
    .bind(payload.price)
    .bind(payload.duration_min)
    .bind(payload.active.unwrap_or(true) as i64)
    .bind(&service_id)
    .execute(&state.db)
    .await
    .map_err(|err| duplicate_name(err, &payload.name))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("service"));
    }
    Ok(HttpResponse::Ok().json(json!({ "id": service_id })))
}

/// Services referenced by schedulings are deactivated instead of removed.
async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service_id = path.into_inner();
    let referenced =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM schedulings WHERE service_id = ?")
            .bind(&service_id)
            .fetch_one(&state.db)
            .await?;

    if referenced > 0 {
        let result = sqlx::query("UPDATE services SET active = 0 WHERE id = ?")
            .bind(&service_id)
            .execute(&state.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("service"));
        }
        return Ok(HttpResponse::Ok().json(json!({ "deactivated": service_id })));
    }

    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(&service_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("service"));
    }
    Ok(HttpResponse::Ok().json(json!({ "deleted": service_id })))
}

fn validate(payload: &ServicePayload) -> Result<(), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if payload.price < 0.0 {
        return Err(ApiError::Validation("price must not be negative".into()));
    }
    if payload.duration_min <= 0 {
        return Err(ApiError::Validation("duration_min must be positive".into()));
    }
    Ok(())
}

fn duplicate_name(err: sqlx::Error, name: &str) -> ApiError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return ApiError::Validation(format!("service name already exists: {}", name.trim()));
        }
    }
    ApiError::Database(err)
}
