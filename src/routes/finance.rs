use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{new_id, staff_validator, AuthUser},
    db::now_rfc3339,
    errors::ApiError,
    models::{CommissionRow, FinanceRow},
    reports::validate_date,
    state::AppState,
};

#[derive(Deserialize)]
struct FinancePayload {
    kind: String,
    description: String,
    amount: f64,
    entry_date: String,
}

#[derive(Deserialize)]
struct RangeFilter {
    from: Option<String>,
    to: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/finance")
            .wrap(HttpAuthentication::bearer(staff_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(web::resource("/{id}").route(web::delete().to(delete))),
    )
    .service(
        web::scope("/admin/commissions")
            .wrap(HttpAuthentication::bearer(staff_validator))
            .service(web::resource("").route(web::get().to(list_commissions))),
    );
}

async fn list(
    state: web::Data<AppState>,
    query: web::Query<RangeFilter>,
) -> Result<HttpResponse, ApiError> {
    let from = match query.from.as_deref() {
        Some(raw) => validate_date(raw)?,
        None => "0000-01-01".to_string(),
    };
    let to = match query.to.as_deref() {
        Some(raw) => validate_date(raw)?,
        None => "9999-12-31".to_string(),
    };

    let rows = sqlx::query_as::<_, FinanceRow>(
        r#"SELECT id, kind, description, amount, entry_date, created_by, created_at
           FROM finance_entries
           WHERE entry_date BETWEEN ? AND ?
           ORDER BY entry_date DESC"#,
    )
    .bind(&from)
    .bind(&to)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<FinancePayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    if !["income", "expense"].contains(&payload.kind.as_str()) {
        return Err(ApiError::Validation(format!("invalid kind: {}", payload.kind)));
    }
    if payload.description.trim().is_empty() {
        return Err(ApiError::Validation("description is required".into()));
    }
    if payload.amount <= 0.0 {
        return Err(ApiError::Validation("amount must be positive".into()));
    }
    let entry_date = validate_date(&payload.entry_date)?;

    let entry_id = new_id();
    sqlx::query(
        r#"INSERT INTO finance_entries (id, kind, description, amount, entry_date, created_by, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&entry_id)
    .bind(&payload.kind)
    .bind(payload.description.trim())
    .bind(payload.amount)
    .bind(&entry_date)
    .bind(&auth.id)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(json!({ "id": entry_id })))
}

async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let entry_id = path.into_inner();
    let result = sqlx::query("DELETE FROM finance_entries WHERE id = ?")
        .bind(&entry_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("finance entry"));
    }
    Ok(HttpResponse::Ok().json(json!({ "deleted": entry_id })))
}

async fn list_commissions(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, CommissionRow>(
        "SELECT id, barber_id, scheduling_id, amount, created_at FROM commissions ORDER BY created_at DESC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}
