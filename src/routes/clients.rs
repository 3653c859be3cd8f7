use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{new_id, staff_validator},
    db::now_rfc3339,
    errors::ApiError,
    models::ClientRow,
    scheduling::normalize_phone,
    state::AppState,
};

#[derive(Deserialize)]
struct ClientPayload {
    name: String,
    phone: String,
    email: Option<String>,
    birth_date: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct ClientFilter {
    q: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/clients")
            .wrap(HttpAuthentication::bearer(staff_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_one))
                    .route(web::put().to(update))
                    .route(web::delete().to(delete)),
            ),
    );
}

async fn list(
    state: web::Data<AppState>,
    query: web::Query<ClientFilter>,
) -> Result<HttpResponse, ApiError> {
    let rows = match query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(term) => {
            let pattern = format!("%{}%", term.trim());
            sqlx::query_as::<_, ClientRow>(
                r#"SELECT id, name, phone, email, birth_date, notes, created_at
                   FROM clients
                   WHERE name LIKE ? OR phone LIKE ?
                   ORDER BY name"#,
            )
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, ClientRow>(
                "SELECT id, name, phone, email, birth_date, notes, created_at FROM clients ORDER BY name",
            )
            .fetch_all(&state.db)
            .await?
        }
    };
    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    payload: web::Json<ClientPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    let phone = normalize_phone(&payload.phone);
    if phone.is_empty() {
        return Err(ApiError::Validation("phone is required".into()));
    }

    let client_id = new_id();
    sqlx::query(
        r#"INSERT INTO clients (id, name, phone, email, birth_date, notes, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&client_id)
    .bind(payload.name.trim())
    .bind(&phone)
    .bind(payload.email)
    .bind(payload.birth_date)
    .bind(payload.notes)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await?;

    let row = fetch_client(&state.db, &client_id).await?;
    Ok(HttpResponse::Created().json(row))
}

async fn get_one(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let row = fetch_client(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ClientPayload>,
) -> Result<HttpResponse, ApiError> {
    let client_id = path.into_inner();
    let payload = payload.into_inner();
    let phone = normalize_phone(&payload.phone);

    let result = sqlx::query(
        r#"UPDATE clients SET name = ?, phone = ?, email = ?, birth_date = ?, notes = ?
           WHERE id = ?"#,
    )
    .bind(payload.name.trim())
    .bind(&phone)
    .bind(payload.email)
    .bind(payload.birth_date)
    .bind(payload.notes)
    .bind(&client_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::ClientNotFound);
    }
    let row = fetch_client(&state.db, &client_id).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let client_id = path.into_inner();
    let result = sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(&client_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::ClientNotFound);
    }
    Ok(HttpResponse::Ok().json(json!({ "deleted": client_id })))
}

async fn fetch_client(pool: &sqlx::SqlitePool, client_id: &str) -> Result<ClientRow, ApiError> {
    sqlx::query_as::<_, ClientRow>(
        "SELECT id, name, phone, email, birth_date, notes, created_at FROM clients WHERE id = ?",
    )
    .bind(client_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::ClientNotFound)
}
