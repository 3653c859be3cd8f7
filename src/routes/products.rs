use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{new_id, staff_validator},
    db::now_rfc3339,
    errors::ApiError,
    models::ProductRow,
    state::AppState,
};

#[derive(Deserialize)]
struct ProductPayload {
    name: String,
    price: f64,
    stock_qty: Option<i64>,
    active: Option<bool>,
}

#[derive(Deserialize)]
struct StockAdjustment {
    delta: i64,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/products")
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
            )
            .service(web::resource("/{id}/stock").route(web::post().to(adjust_stock))),
    );
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, name, price, stock_qty, active, created_at FROM products ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    payload: web::Json<ProductPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if payload.price < 0.0 {
        return Err(ApiError::Validation("price must not be negative".into()));
    }

    let product_id = new_id();
    sqlx::query(
        "INSERT INTO products (id, name, price, stock_qty, active, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&product_id)
    .bind(payload.name.trim())
    .bind(payload.price)
    .bind(payload.stock_qty.unwrap_or(0))
    .bind(payload.active.unwrap_or(true) as i64)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(json!({ "id": product_id })))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ProductPayload>,
) -> Result<HttpResponse, ApiError> {
    let product_id = path.into_inner();
    let payload = payload.into_inner();
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }

    let result = sqlx::query(
        "UPDATE products SET name = ?, price = ?, stock_qty = ?, active = ? WHERE id = ?",
    )
    .bind(payload.name.trim())
    .bind(payload.price)
    .bind(payload.stock_qty.unwrap_or(0))
    .bind(payload.active.unwrap_or(true) as i64)
    .bind(&product_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("product"));
    }
    Ok(HttpResponse::Ok().json(json!({ "id": product_id })))
}

/// Stock never goes negative; a sale larger than the remaining stock is a
/// validation error, not a silent clamp.
async fn adjust_stock(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<StockAdjustment>,
) -> Result<HttpResponse, ApiError> {
    let product_id = path.into_inner();
    let delta = payload.delta;

    let current = sqlx::query_scalar::<_, i64>("SELECT stock_qty FROM products WHERE id = ?")
        .bind(&product_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("product"))?;

    let next = current + delta;
    if next < 0 {
        return Err(ApiError::Validation(format!(
            "insufficient stock: {current} available"
        )));
    }

    sqlx::query("UPDATE products SET stock_qty = ? WHERE id = ?")
        .bind(next)
        .bind(&product_id)
        .execute(&state.db)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "id": product_id, "stock_qty": next })))
}

async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let product_id = path.into_inner();
    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&product_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("product"));
    }
    Ok(HttpResponse::Ok().json(json!({ "deleted": product_id })))
}
