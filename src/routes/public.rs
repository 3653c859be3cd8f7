use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{authenticate_credentials, issue_token},
    errors::ApiError,
    models::{ROLE_BARBER, ServiceRow},
    scheduling::{self, InboundOutcome, NewScheduling},
    state::AppState,
};

#[derive(Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct WebhookPayload {
    from: String,
    body: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/public/services").route(web::get().to(list_services)))
        .service(web::resource("/public/barbers").route(web::get().to(list_barbers)))
        .service(web::resource("/public/bookings").route(web::post().to(create_booking)))
        .service(web::resource("/webhook/whatsapp").route(web::post().to(whatsapp_webhook)));
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "messaging": state.messaging.connection_state(),
        "narrative": state.narrative.enabled(),
    }))
}

async fn login(
    state: web::Data<AppState>,
    payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let user = authenticate_credentials(&state, &payload.username, &payload.password)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let token = issue_token(&state.jwt, &user)
        .map_err(|err| ApiError::Internal(format!("token issue failed: {err}")))?;

    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "user": {
            "id": user.id,
            "display_name": user.display_name,
            "role": user.role,
        }
    })))
}

async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let services = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, price, duration_min, active FROM services WHERE active = 1 ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn list_barbers(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let barbers = sqlx::query_as::<_, (String, String)>(
        "SELECT id, display_name FROM users WHERE role = ? AND active = 1 ORDER BY display_name",
    )
    .bind(ROLE_BARBER)
    .fetch_all(&state.db)
    .await?;

    let barbers: Vec<_> = barbers
        .into_iter()
        .map(|(id, display_name)| json!({ "id": id, "display_name": display_name }))
        .collect();
    Ok(HttpResponse::Ok().json(barbers))
}

/// Public self-service booking. Created pending; the client confirms by
/// replying to the WhatsApp message queued by the engine.
async fn create_booking(
    state: web::Data<AppState>,
    payload: web::Json<NewScheduling>,
) -> Result<HttpResponse, ApiError> {
    let row = scheduling::create_scheduling(&state.db, payload.into_inner(), None).await?;
    Ok(HttpResponse::Created().json(row))
}

/// Ingress for the messaging gateway. Guarded by a shared secret header;
/// disabled entirely when WHATSAPP_WEBHOOK_TOKEN is unset.
async fn whatsapp_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<WebhookPayload>,
) -> Result<HttpResponse, ApiError> {
    let Some(expected) = state.webhook_token.as_deref() else {
        return Err(ApiError::NotFound("webhook"));
    };
    let provided = req
        .headers()
        .get("x-webhook-token")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return Err(ApiError::Unauthorized);
    }

    let payload = payload.into_inner();
    let result = scheduling::process_inbound_message(
        &state.db,
        state.messaging.as_ref(),
        &payload.from,
        &payload.body,
        state.commission_rate,
    )
    .await;

    // The gateway should not retry business outcomes, only real failures.
    match result {
        Ok(InboundOutcome::Confirmed(row)) => {
            Ok(HttpResponse::Ok().json(json!({ "handled": true, "action": "confirmed", "scheduling_id": row.id })))
        }
        Ok(InboundOutcome::Canceled(row)) => {
            Ok(HttpResponse::Ok().json(json!({ "handled": true, "action": "canceled", "scheduling_id": row.id })))
        }
        Ok(InboundOutcome::Ignored) => {
            Ok(HttpResponse::Ok().json(json!({ "handled": false, "action": "ignored" })))
        }
        Err(ApiError::NoPendingScheduling) => {
            Ok(HttpResponse::Ok().json(json!({ "handled": false, "action": "no_pending_scheduling" })))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::test_support::RecordingMessenger;
    use crate::state::{JwtConfig, NarrativeConfig};
    use actix_web::{test, App};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn test_state(webhook_token: Option<&str>) -> AppState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        AppState {
            db: pool,
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                ttl_hours: 1,
            },
            messaging: Arc::new(RecordingMessenger::default()),
            webhook_token: webhook_token.map(str::to_string),
            commission_rate: 0.4,
            narrative: NarrativeConfig::default(),
        }
    }

    async fn seed_booking_targets(state: &AppState) -> String {
        let barber_id = crate::auth::new_id();
        sqlx::query(
            r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
               VALUES (?, 'carlos', 'Carlos', 'barber', 'x', 1, ?)"#,
        )
        .bind(&barber_id)
        .bind(crate::db::now_rfc3339())
        .execute(&state.db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO services (id, name, price, duration_min, active) VALUES (?, 'Corte', 50, 30, 1)",
        )
        .bind(crate::auth::new_id())
        .execute(&state.db)
        .await
        .unwrap();
        barber_id
    }

    #[actix_web::test]
    async fn health_reports_messaging_state() {
        let state = test_state(None).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["messaging"], "ready");
    }

    #[actix_web::test]
    async fn public_booking_is_created_pending() {
        let state = test_state(None).await;
        let barber_id = seed_booking_targets(&state).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/public/bookings")
            .set_json(serde_json::json!({
                "client_name": "João",
                "phone": "62991234567",
                "date_time": "2024-06-10T14:00",
                "service": "Corte",
                "barber_id": barber_id,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "pending");
    }

    #[actix_web::test]
    async fn booking_conflict_surfaces_as_400() {
        let state = test_state(None).await;
        let barber_id = seed_booking_targets(&state).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        for expected in [
            actix_web::http::StatusCode::CREATED,
            actix_web::http::StatusCode::BAD_REQUEST,
        ] {
            let req = test::TestRequest::post()
                .uri("/public/bookings")
                .set_json(serde_json::json!({
                    "client_name": "João",
                    "phone": "62991234567",
                    "date_time": "2024-06-10T14:00",
                    "service": "Corte",
                    "barber_id": barber_id,
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
        }
    }

    #[actix_web::test]
    async fn webhook_requires_configured_secret() {
        let state = test_state(Some("hook-secret")).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook/whatsapp")
            .insert_header(("x-webhook-token", "wrong"))
            .set_json(serde_json::json!({ "from": "629", "body": "confirmar" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn webhook_is_disabled_without_configured_token() {
        let state = test_state(None).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook/whatsapp")
            .insert_header(("x-webhook-token", "anything"))
            .set_json(serde_json::json!({ "from": "629", "body": "confirmar" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn webhook_reports_no_pending_as_handled_false() {
        let state = test_state(Some("hook-secret")).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook/whatsapp")
            .insert_header(("x-webhook-token", "hook-secret"))
            .set_json(serde_json::json!({ "from": "62991234567", "body": "confirmar" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["handled"], false);
        assert_eq!(body["action"], "no_pending_scheduling");
    }
}
