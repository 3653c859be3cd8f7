//! Scheduling conflict/status engine.
//!
//! Gatekeeps creation and mutation of scheduling rows: slot uniqueness is
//! enforced by the partial unique index on (barber_id, date_time), status
//! changes go through the transition table in `models`, and inbound chat
//! replies (CONFIRMAR/CANCELAR) are resolved to the earliest matching
//! appointment for the sender's phone.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db::{fetch_scheduling, now_rfc3339},
    errors::{slot_conflict, ApiError},
    messaging::MessagingPort,
    models::{SchedulingRow, SchedulingStatus, ROLE_BARBER},
    notifications,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewScheduling {
    pub client_name: String,
    pub phone: Option<String>,
    pub date_time: String,
    pub service: String,
    pub barber_id: String,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulingPatch {
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub barber_id: Option<String>,
    pub date_time: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug)]
pub enum InboundOutcome {
    Confirmed(SchedulingRow),
    Canceled(SchedulingRow),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundCommand {
    Confirm,
    Cancel,
    Other,
}

pub fn classify_message(body: &str) -> InboundCommand {
    match body.trim().to_lowercase().as_str() {
        "confirmar" => InboundCommand::Confirm,
        "cancelar" => InboundCommand::Cancel,
        _ => InboundCommand::Other,
    }
}

pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Returns the normalized phone plus, for numbers carrying the "55" country
/// prefix, the local form without it. Stored phones may omit the prefix.
pub fn phone_variants(raw: &str) -> (String, Option<String>) {
    let digits = normalize_phone(raw);
    let local = if digits.starts_with("55") && digits.len() >= 12 {
        Some(digits[2..].to_string())
    } else {
        None
    };
    (digits, local)
}

/// Accepts RFC 3339 or the datetime-local forms used by the booking UI and
/// normalizes to RFC 3339 UTC, so exact-timestamp slot comparison works.
pub fn normalize_date_time(raw: &str) -> Result<String, ApiError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc
                .from_utc_datetime(&naive)
                .to_rfc3339_opts(SecondsFormat::Secs, true));
        }
    }
    Err(ApiError::Validation(format!("invalid date_time: {raw}")))
}

/// Creates a scheduling. Staff-created rows (created_by set) start
/// confirmed; public bookings start pending. Client resolution and the
/// insert run in one transaction, and the slot index turns a duplicate
/// (barber, instant) into `SlotTaken`.
pub async fn create_scheduling(
    pool: &SqlitePool,
    input: NewScheduling,
    created_by: Option<&str>,
) -> Result<SchedulingRow, ApiError> {
    if input.client_name.trim().is_empty() {
        return Err(ApiError::Validation("client_name is required".into()));
    }
    if input.service.trim().is_empty() {
        return Err(ApiError::Validation("service is required".into()));
    }
    if input.barber_id.trim().is_empty() {
        return Err(ApiError::Validation("barber_id is required".into()));
    }
    let date_time = normalize_date_time(&input.date_time)?;
    let phone = input
        .phone
        .as_deref()
        .map(normalize_phone)
        .filter(|digits| !digits.is_empty());

    let mut tx = pool.begin().await?;

    resolve_barber(&mut tx, &input.barber_id).await?;
    let service_id = resolve_service(&mut tx, input.service.trim()).await?;

    let client_id = match input.client_id.as_deref() {
        Some(explicit) => {
            let exists =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients WHERE id = ?")
                    .bind(explicit)
                    .fetch_one(&mut *tx)
                    .await?;
            if exists == 0 {
                return Err(ApiError::ClientNotFound);
            }
            explicit.to_string()
        }
        None => find_or_create_client(&mut tx, input.client_name.trim(), phone.as_deref()).await?,
    };

    let status = if created_by.is_some() {
        SchedulingStatus::Confirmed
    } else {
        SchedulingStatus::Pending
    };

    let scheduling_id = new_id();
    sqlx::query(
        r#"INSERT INTO schedulings
           (id, client_id, client_name, service_id, barber_id, date_time, phone, status, created_by, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&scheduling_id)
    .bind(&client_id)
    .bind(input.client_name.trim())
    .bind(&service_id)
    .bind(&input.barber_id)
    .bind(&date_time)
    .bind(&phone)
    .bind(status.as_str())
    .bind(created_by)
    .bind(now_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(slot_conflict)?;

    tx.commit().await?;

    let row = fetch_scheduling(pool, &scheduling_id)
        .await?
        .ok_or(ApiError::NotFound("scheduling"))?;

    // Notification failure after a committed scheduling is independent.
    notifications::enqueue_booking_request(pool, &row).await;

    Ok(row)
}

/// Partial update. Absent fields keep their previous values; the slot
/// index still guards moves onto an occupied (barber, instant).
pub async fn update_scheduling(
    pool: &SqlitePool,
    scheduling_id: &str,
    patch: SchedulingPatch,
) -> Result<SchedulingRow, ApiError> {
    let existing = fetch_scheduling(pool, scheduling_id)
        .await?
        .ok_or(ApiError::NotFound("scheduling"))?;

    let mut tx = pool.begin().await?;

    let service_id = match patch.service.as_deref() {
        Some(name) => resolve_service(&mut tx, name.trim()).await?,
        None => existing.service_id.clone(),
    };

    let barber_id = match patch.barber_id.as_deref() {
        Some(id) => {
            resolve_barber(&mut tx, id).await?;
            id.to_string()
        }
        None => existing.barber_id.clone(),
    };

    let phone = match patch.phone.as_deref() {
        Some(raw) => {
            let digits = normalize_phone(raw);
            if digits.is_empty() {
                None
            } else {
                Some(digits)
            }
        }
        None => existing.phone.clone(),
    };

    let client_name = patch
        .client_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| existing.client_name.clone());

    let client_id = match (patch.client_id.as_deref(), patch.client_name.as_deref()) {
        (Some(explicit), _) => {
            let exists =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients WHERE id = ?")
                    .bind(explicit)
                    .fetch_one(&mut *tx)
                    .await?;
            if exists == 0 {
                return Err(ApiError::ClientNotFound);
            }
            explicit.to_string()
        }
        (None, Some(name)) => {
            find_or_create_client(&mut tx, name.trim(), phone.as_deref()).await?
        }
        (None, None) => existing.client_id.clone(),
    };

    let date_time = match patch.date_time.as_deref() {
        Some(raw) => normalize_date_time(raw)?,
        None => existing.date_time.clone(),
    };

    let status = match patch.status.as_deref() {
        Some(raw) => {
            let next = SchedulingStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("invalid status: {raw}")))?;
            let current = SchedulingStatus::parse(&existing.status)
                .ok_or_else(|| ApiError::Internal(format!("corrupt status on {scheduling_id}")))?;
            if next != current && !current.can_transition_to(next) {
                return Err(ApiError::Validation(format!(
                    "cannot change status from {} to {raw}",
                    existing.status
                )));
            }
            next.as_str().to_string()
        }
        None => existing.status.clone(),
    };

    sqlx::query(
        r#"UPDATE schedulings
           SET client_id = ?, client_name = ?, service_id = ?, barber_id = ?,
               date_time = ?, phone = ?, status = ?
           WHERE id = ?"#,
    )
    .bind(&client_id)
    .bind(&client_name)
    .bind(&service_id)
    .bind(&barber_id)
    .bind(&date_time)
    .bind(&phone)
    .bind(&status)
    .bind(scheduling_id)
    .execute(&mut *tx)
    .await
    .map_err(slot_conflict)?;

    tx.commit().await?;

    fetch_scheduling(pool, scheduling_id)
        .await?
        .ok_or(ApiError::NotFound("scheduling"))
}

/// Applies a transition through the table in `models`. Returns the row and
/// whether anything changed; disallowed edges are no-ops, not failures.
pub async fn transition_scheduling(
    pool: &SqlitePool,
    scheduling_id: &str,
    next: SchedulingStatus,
) -> Result<(SchedulingRow, bool), ApiError> {
    let row = fetch_scheduling(pool, scheduling_id)
        .await?
        .ok_or(ApiError::NotFound("scheduling"))?;

    let current = SchedulingStatus::parse(&row.status)
        .ok_or_else(|| ApiError::Internal(format!("corrupt status on {scheduling_id}")))?;

    if !current.can_transition_to(next) {
        return Ok((row, false));
    }

    // Guarded write: the WHERE clause loses gracefully if the inbound chat
    // path and the HTTP path race on the same row.
    let result = sqlx::query("UPDATE schedulings SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_str())
        .bind(scheduling_id)
        .bind(current.as_str())
        .execute(pool)
        .await?;

    let changed = result.rows_affected() > 0;
    let row = fetch_scheduling(pool, scheduling_id)
        .await?
        .ok_or(ApiError::NotFound("scheduling"))?;
    Ok((row, changed))
}

/// Records the barber's cut for a confirmed scheduling and queues an
/// in-app commission notification.
pub async fn record_commission(
    pool: &SqlitePool,
    row: &SchedulingRow,
    rate: f64,
) -> Result<(), ApiError> {
    let price = sqlx::query_scalar::<_, f64>("SELECT price FROM services WHERE id = ?")
        .bind(&row.service_id)
        .fetch_one(pool)
        .await?;

    let amount = price * rate;
    sqlx::query(
        r#"INSERT INTO commissions (id, barber_id, scheduling_id, amount, created_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&row.barber_id)
    .bind(&row.id)
    .bind(amount)
    .bind(now_rfc3339())
    .execute(pool)
    .await?;

    notifications::enqueue_commission_update(pool, &row.barber_id, &row.id, amount).await;
    Ok(())
}

/// Handles one inbound chat message. The chat protocol carries no
/// appointment id, so the earliest matching appointment for the sender's
/// phone is assumed to be the one the reply refers to.
pub async fn process_inbound_message(
    pool: &SqlitePool,
    messaging: &dyn MessagingPort,
    from_phone: &str,
    body: &str,
    commission_rate: f64,
) -> Result<InboundOutcome, ApiError> {
    let command = classify_message(body);
    let (digits, local) = phone_variants(from_phone);

    match command {
        InboundCommand::Other => {
            let ack = "Não entendi sua mensagem. Responda CONFIRMAR para confirmar \
                       ou CANCELAR para cancelar seu horário.";
            if !messaging.send_message(&digits, ack).await {
                log::warn!("Failed to acknowledge message from {digits}");
            }
            Ok(InboundOutcome::Ignored)
        }
        InboundCommand::Confirm => {
            let target = find_next_for_phone(pool, &digits, local.as_deref(), &["pending"]).await?;
            let target = target.ok_or(ApiError::NoPendingScheduling)?;
            let (row, changed) =
                transition_scheduling(pool, &target.id, SchedulingStatus::Confirmed).await?;
            // Commission rule is channel-independent; see the staff confirm endpoint.
            if changed {
                record_commission(pool, &row, commission_rate).await?;
            }
            let reply = format!(
                "Agendamento confirmado: {} em {}. Até breve!",
                row.service_name.as_deref().unwrap_or("serviço"),
                row.date_time
            );
            if !messaging.send_message(&digits, &reply).await {
                log::warn!("Failed to send confirmation reply to {digits}");
            }
            Ok(InboundOutcome::Confirmed(row))
        }
        InboundCommand::Cancel => {
            // A confirmed booking can still be canceled from chat.
            let target =
                find_next_for_phone(pool, &digits, local.as_deref(), &["pending", "confirmed"])
                    .await?;
            let target = target.ok_or(ApiError::NoPendingScheduling)?;
            let (row, _) =
                transition_scheduling(pool, &target.id, SchedulingStatus::Canceled).await?;
            let reply = format!(
                "Agendamento de {} cancelado. Esperamos você em outra oportunidade.",
                row.date_time
            );
            if !messaging.send_message(&digits, &reply).await {
                log::warn!("Failed to send cancellation reply to {digits}");
            }
            Ok(InboundOutcome::Canceled(row))
        }
    }
}

async fn find_next_for_phone(
    pool: &SqlitePool,
    digits: &str,
    local: Option<&str>,
    statuses: &[&str],
) -> Result<Option<SchedulingRow>, ApiError> {
    let local = local.unwrap_or(digits);
    let status_filter = match statuses.len() {
        1 => "s.status = ?3",
        _ => "s.status IN (?3, ?4)",
    };
    let query = format!(
        r#"SELECT s.id, s.client_id, s.client_name, s.service_id, s.barber_id,
                  s.date_time, s.phone, s.status, s.created_by, s.created_at,
                  sv.name AS service_name,
                  u.display_name AS barber_name
           FROM schedulings s
           LEFT JOIN services sv ON s.service_id = sv.id
           LEFT JOIN users u ON s.barber_id = u.id
           WHERE s.phone IN (?1, ?2) AND {status_filter}
           ORDER BY s.date_time ASC
           LIMIT 1"#
    );

    let mut q = sqlx::query_as::<_, SchedulingRow>(&query)
        .bind(digits)
        .bind(local);
    for status in statuses {
        q = q.bind(*status);
    }
    Ok(q.fetch_optional(pool).await?)
}

async fn resolve_barber(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    barber_id: &str,
) -> Result<(), ApiError> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id = ? AND role = ? AND active = 1",
    )
    .bind(barber_id)
    .bind(ROLE_BARBER)
    .fetch_one(&mut **tx)
    .await?;

    if found == 0 {
        return Err(ApiError::InvalidBarber);
    }
    Ok(())
}

async fn resolve_service(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    name: &str,
) -> Result<String, ApiError> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM services WHERE name = ? AND active = 1 LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(ApiError::InvalidService)
}

async fn find_or_create_client(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    name: &str,
    phone: Option<&str>,
) -> Result<String, ApiError> {
    if let Some(phone) = phone {
        let existing =
            sqlx::query_scalar::<_, String>("SELECT id FROM clients WHERE phone = ? LIMIT 1")
                .bind(phone)
                .fetch_optional(&mut **tx)
                .await?;
        if let Some(id) = existing {
            return Ok(id);
        }
    }

    let client_id = new_id();
    sqlx::query(
        r#"INSERT INTO clients (id, name, phone, created_at) VALUES (?, ?, ?, ?)"#,
    )
    .bind(&client_id)
    .bind(name)
    .bind(phone.unwrap_or_default())
    .bind(now_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(client_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::test_support::RecordingMessenger;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn insert_user(pool: &SqlitePool, role: &str, name: &str) -> String {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
               VALUES (?, ?, ?, ?, 'x', 1, ?)"#,
        )
        .bind(&id)
        .bind(format!("{name}-{id}"))
        .bind(name)
        .bind(role)
        .bind(now_rfc3339())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn insert_service(pool: &SqlitePool, name: &str, price: f64, active: i64) -> String {
        let id = new_id();
        sqlx::query(
            "INSERT INTO services (id, name, price, duration_min, active) VALUES (?, ?, ?, 30, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(price)
        .bind(active)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    fn booking(barber_id: &str, when: &str) -> NewScheduling {
        NewScheduling {
            client_name: "João da Silva".to_string(),
            phone: Some("62991234567".to_string()),
            date_time: when.to_string(),
            service: "Corte".to_string(),
            barber_id: barber_id.to_string(),
            client_id: None,
        }
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
    }

    #[test]
    fn classifies_commands_case_insensitively() {
        assert_eq!(classify_message("CONFIRMAR"), InboundCommand::Confirm);
        assert_eq!(classify_message("  confirmar  "), InboundCommand::Confirm);
        assert_eq!(classify_message("Cancelar"), InboundCommand::Cancel);
        assert_eq!(classify_message("oi, tudo bem?"), InboundCommand::Other);
    }

    #[test]
    fn phone_variants_strip_country_prefix() {
        let (digits, local) = phone_variants("+55 (62) 99123-4567");
        assert_eq!(digits, "5562991234567");
        assert_eq!(local.as_deref(), Some("62991234567"));

        let (digits, local) = phone_variants("62991234567");
        assert_eq!(digits, "62991234567");
        assert!(local.is_none());

        // "55" alone is too short to be a country prefix.
        let (_, local) = phone_variants("5591234");
        assert!(local.is_none());
    }

    #[test]
    fn date_time_normalizes_to_utc_rfc3339() {
        assert_eq!(
            normalize_date_time("2024-06-10T14:00").unwrap(),
            "2024-06-10T14:00:00Z"
        );
        assert_eq!(
            normalize_date_time("2024-06-10T11:00:00-03:00").unwrap(),
            "2024-06-10T14:00:00Z"
        );
        assert!(normalize_date_time("10/06/2024").is_err());
    }

    #[actix_web::test]
    async fn staff_creation_is_confirmed_public_is_pending() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        let secretary = insert_user(&pool, crate::models::ROLE_SECRETARY, "Secretária").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let staff = create_scheduling(
            &pool,
            booking(&barber, "2024-06-10T14:00"),
            Some(secretary.as_str()),
        )
        .await
        .unwrap();
        assert_eq!(staff.status, "confirmed");
        assert_eq!(staff.created_by.as_deref(), Some(secretary.as_str()));

        let public = create_scheduling(&pool, booking(&barber, "2024-06-10T15:00"), None)
            .await
            .unwrap();
        assert_eq!(public.status, "pending");
        assert!(public.created_by.is_none());
    }

    #[actix_web::test]
    async fn duplicate_slot_yields_slot_taken() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        let err = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SlotTaken));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM schedulings").await, 1);
    }

    #[actix_web::test]
    async fn canceled_slot_can_be_rebooked() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let first = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        transition_scheduling(&pool, &first.id, SchedulingStatus::Canceled)
            .await
            .unwrap();

        let again = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None).await;
        assert!(again.is_ok());
    }

    #[actix_web::test]
    async fn invalid_barber_writes_nothing() {
        let pool = test_pool().await;
        let secretary = insert_user(&pool, crate::models::ROLE_SECRETARY, "Secretária").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let err = create_scheduling(&pool, booking(&secretary, "2024-06-10T14:00"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidBarber));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM clients").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM schedulings").await, 0);
    }

    #[actix_web::test]
    async fn inactive_or_unknown_service_rejected() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 0).await;

        let err = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidService));

        let mut input = booking(&barber, "2024-06-10T14:00");
        input.service = "Hidratação".to_string();
        let err = create_scheduling(&pool, input, None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidService));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM schedulings").await, 0);
    }

    #[actix_web::test]
    async fn explicit_client_id_must_exist() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let mut input = booking(&barber, "2024-06-10T14:00");
        input.client_id = Some("missing".to_string());
        let err = create_scheduling(&pool, input, None).await.unwrap_err();
        assert!(matches!(err, ApiError::ClientNotFound));
    }

    #[actix_web::test]
    async fn client_is_reused_by_phone() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        create_scheduling(&pool, booking(&barber, "2024-06-11T14:00"), None)
            .await
            .unwrap();
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM clients").await, 1);
    }

    #[actix_web::test]
    async fn status_only_update_preserves_other_fields() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let row = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();

        let patch = SchedulingPatch {
            status: Some("confirmed".to_string()),
            ..Default::default()
        };
        let updated = update_scheduling(&pool, &row.id, patch).await.unwrap();
        assert_eq!(updated.status, "confirmed");
        assert_eq!(updated.date_time, row.date_time);
        assert_eq!(updated.barber_id, row.barber_id);
        assert_eq!(updated.service_id, row.service_id);
        assert_eq!(updated.client_id, row.client_id);
    }

    #[actix_web::test]
    async fn update_onto_taken_slot_conflicts() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        let second = create_scheduling(&pool, booking(&barber, "2024-06-10T15:00"), None)
            .await
            .unwrap();

        let patch = SchedulingPatch {
            date_time: Some("2024-06-10T14:00".to_string()),
            ..Default::default()
        };
        let err = update_scheduling(&pool, &second.id, patch).await.unwrap_err();
        assert!(matches!(err, ApiError::SlotTaken));
    }

    #[actix_web::test]
    async fn confirmar_with_country_code_confirms_earliest_only() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let later = create_scheduling(&pool, booking(&barber, "2024-06-12T14:00"), None)
            .await
            .unwrap();
        let earliest = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();

        let messenger = RecordingMessenger::default();
        let outcome =
            process_inbound_message(&pool, &messenger, "5562991234567", "confirmar", 0.4)
                .await
                .unwrap();

        match outcome {
            InboundOutcome::Confirmed(row) => assert_eq!(row.id, earliest.id),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let later_status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM schedulings WHERE id = ?",
        )
        .bind(&later.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(later_status, "pending");
        assert_eq!(messenger.messages().len(), 1);
        assert!(messenger.messages()[0].1.contains("confirmado"));
    }

    #[actix_web::test]
    async fn no_pending_scheduling_performs_no_writes() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let row = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        transition_scheduling(&pool, &row.id, SchedulingStatus::Confirmed)
            .await
            .unwrap();

        let messenger = RecordingMessenger::default();
        let err = process_inbound_message(&pool, &messenger, "62991234567", "confirmar", 0.4)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NoPendingScheduling));

        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM schedulings WHERE id = ?",
        )
        .bind(&row.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, "confirmed");
    }

    #[actix_web::test]
    async fn inbound_confirm_records_commission() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let row = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();

        let messenger = RecordingMessenger::default();
        process_inbound_message(&pool, &messenger, "62991234567", "confirmar", 0.4)
            .await
            .unwrap();

        let amount = sqlx::query_scalar::<_, f64>(
            "SELECT amount FROM commissions WHERE scheduling_id = ?",
        )
        .bind(&row.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!((amount - 20.0).abs() < f64::EPSILON);
    }

    #[actix_web::test]
    async fn patch_cannot_resurrect_canceled_booking() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let row = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        transition_scheduling(&pool, &row.id, SchedulingStatus::Canceled)
            .await
            .unwrap();

        let patch = SchedulingPatch {
            status: Some("pending".to_string()),
            ..Default::default()
        };
        let err = update_scheduling(&pool, &row.id, patch).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // Re-stating the current status stays a no-op, not an error.
        let patch = SchedulingPatch {
            status: Some("canceled".to_string()),
            ..Default::default()
        };
        let unchanged = update_scheduling(&pool, &row.id, patch).await.unwrap();
        assert_eq!(unchanged.status, "canceled");
    }

    #[actix_web::test]
    async fn cancelar_reaches_confirmed_bookings() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let row = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        transition_scheduling(&pool, &row.id, SchedulingStatus::Confirmed)
            .await
            .unwrap();

        let messenger = RecordingMessenger::default();
        let outcome = process_inbound_message(&pool, &messenger, "62991234567", "CANCELAR", 0.4)
            .await
            .unwrap();
        match outcome {
            InboundOutcome::Canceled(canceled) => assert_eq!(canceled.id, row.id),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[actix_web::test]
    async fn unrelated_message_is_acknowledged_only() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;
        create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();

        let messenger = RecordingMessenger::default();
        let outcome = process_inbound_message(&pool, &messenger, "62991234567", "bom dia", 0.4)
            .await
            .unwrap();
        assert!(matches!(outcome, InboundOutcome::Ignored));

        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM schedulings ORDER BY date_time LIMIT 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, "pending");
        assert_eq!(messenger.messages().len(), 1);
    }

    #[actix_web::test]
    async fn terminal_transitions_are_noops() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let row = create_scheduling(&pool, booking(&barber, "2024-06-10T14:00"), None)
            .await
            .unwrap();
        transition_scheduling(&pool, &row.id, SchedulingStatus::Canceled)
            .await
            .unwrap();

        let (after, changed) =
            transition_scheduling(&pool, &row.id, SchedulingStatus::Confirmed)
                .await
                .unwrap();
        assert!(!changed);
        assert_eq!(after.status, "canceled");
    }

    #[actix_web::test]
    async fn commission_records_barber_cut() {
        let pool = test_pool().await;
        let barber = insert_user(&pool, ROLE_BARBER, "Barbeiro").await;
        let secretary = insert_user(&pool, crate::models::ROLE_SECRETARY, "Secretária").await;
        insert_service(&pool, "Corte", 50.0, 1).await;

        let row = create_scheduling(
            &pool,
            booking(&barber, "2024-06-10T14:00"),
            Some(secretary.as_str()),
        )
        .await
        .unwrap();
        record_commission(&pool, &row, 0.4).await.unwrap();

        let amount = sqlx::query_scalar::<_, f64>(
            "SELECT amount FROM commissions WHERE scheduling_id = ?",
        )
        .bind(&row.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!((amount - 20.0).abs() < f64::EPSILON);
    }
}
