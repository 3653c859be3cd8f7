use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::staff_validator,
    errors::ApiError,
    narrative::NarrativeClient,
    reports,
    state::AppState,
};

#[derive(Deserialize)]
struct RangeQuery {
    from: String,
    to: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/reports")
            .wrap(HttpAuthentication::bearer(staff_validator))
            .service(web::resource("/summary").route(web::get().to(summary)))
            .service(web::resource("/finance.csv").route(web::get().to(finance_csv)))
            .service(web::resource("/narrative").route(web::get().to(narrative))),
    );
}

async fn summary(
    state: web::Data<AppState>,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse, ApiError> {
    let summary = reports::build_summary(&state.db, &query.from, &query.to).await?;
    Ok(HttpResponse::Ok().json(summary))
}

async fn finance_csv(
    state: web::Data<AppState>,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse, ApiError> {
    let csv = reports::finance_csv(&state.db, &query.from, &query.to).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .body(csv))
}

async fn narrative(
    state: web::Data<AppState>,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse, ApiError> {
    let summary = reports::build_summary(&state.db, &query.from, &query.to).await?;
    let context = serde_json::to_string(&summary)
        .map_err(|err| ApiError::Internal(format!("summary serialization failed: {err}")))?;

    let client = NarrativeClient::new(state.narrative.clone());
    let prose = client.narrate(&context).await?;

    Ok(HttpResponse::Ok().json(json!({ "summary": summary, "narrative": prose })))
}
