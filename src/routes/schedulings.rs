use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{staff_validator, AuthUser},
    db::fetch_scheduling,
    errors::ApiError,
    models::{SchedulingRow, SchedulingStatus},
    notifications,
    scheduling::{self, NewScheduling, SchedulingPatch},
    state::AppState,
};

#[derive(Deserialize)]
struct SchedulingFilter {
    status: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/schedulings")
            .wrap(HttpAuthentication::bearer(staff_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_one))
                    .route(web::patch().to(update))
                    .route(web::delete().to(delete)),
            )
            .service(web::resource("/{id}/confirm").route(web::post().to(confirm)))
            .service(web::resource("/{id}/cancel").route(web::post().to(cancel))),
    );
}

async fn list(
    state: web::Data<AppState>,
    query: web::Query<SchedulingFilter>,
) -> Result<HttpResponse, ApiError> {
    let base = r#"SELECT s.id, s.client_id, s.client_name, s.service_id, s.barber_id,
                         s.date_time, s.phone, s.status, s.created_by, s.created_at,
                         sv.name AS service_name,
                         u.display_name AS barber_name
                  FROM schedulings s
                  LEFT JOIN services sv ON s.service_id = sv.id
                  LEFT JOIN users u ON s.barber_id = u.id"#;

    let rows = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(status) => {
            if SchedulingStatus::parse(status).is_none() {
                return Err(ApiError::Validation(format!("invalid status: {status}")));
            }
            sqlx::query_as::<_, SchedulingRow>(&format!(
                "{base} WHERE s.status = ? ORDER BY s.date_time ASC"
            ))
            .bind(status)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, SchedulingRow>(&format!("{base} ORDER BY s.date_time ASC"))
                .fetch_all(&state.db)
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(rows))
}

/// Staff creation: the appointment starts confirmed and the barber's
/// commission is recorded right away.
async fn create(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<NewScheduling>,
) -> Result<HttpResponse, ApiError> {
    let row =
        scheduling::create_scheduling(&state.db, payload.into_inner(), Some(&auth.id)).await?;
    scheduling::record_commission(&state.db, &row, state.commission_rate).await?;
    Ok(HttpResponse::Created().json(row))
}

async fn get_one(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let row = fetch_scheduling(&state.db, &path.into_inner())
        .await?
        .ok_or(ApiError::NotFound("scheduling"))?;
    Ok(HttpResponse::Ok().json(row))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SchedulingPatch>,
) -> Result<HttpResponse, ApiError> {
    let scheduling_id = path.into_inner();
    let before = fetch_scheduling(&state.db, &scheduling_id)
        .await?
        .ok_or(ApiError::NotFound("scheduling"))?;

    let row =
        scheduling::update_scheduling(&state.db, &scheduling_id, payload.into_inner()).await?;

    // A patch that confirms the booking carries the same side effects as
    // the confirm endpoint.
    if before.status == "pending" && row.status == "confirmed" {
        scheduling::record_commission(&state.db, &row, state.commission_rate).await?;
        notifications::enqueue_status_update(&state.db, &row).await;
    }
    Ok(HttpResponse::Ok().json(row))
}

async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let scheduling_id = path.into_inner();
    let result = sqlx::query("DELETE FROM schedulings WHERE id = ?")
        .bind(&scheduling_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("scheduling"));
    }
    Ok(HttpResponse::Ok().json(json!({ "deleted": scheduling_id })))
}

async fn confirm(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (row, changed) = scheduling::transition_scheduling(
        &state.db,
        &path.into_inner(),
        SchedulingStatus::Confirmed,
    )
    .await?;

    if changed {
        scheduling::record_commission(&state.db, &row, state.commission_rate).await?;
        notifications::enqueue_status_update(&state.db, &row).await;
    }
    Ok(HttpResponse::Ok().json(json!({ "scheduling": row, "changed": changed })))
}

async fn cancel(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (row, changed) = scheduling::transition_scheduling(
        &state.db,
        &path.into_inner(),
        SchedulingStatus::Canceled,
    )
    .await?;

    if changed {
        notifications::enqueue_status_update(&state.db, &row).await;
    }
    Ok(HttpResponse::Ok().json(json!({ "scheduling": row, "changed": changed })))
}
