//! Notification rows and the background dispatcher that drains them.
//!
//! Mutations only ever write a pending row; delivery happens later on the
//! dispatcher's own timer, so a slow or offline gateway never blocks a
//! request or rolls back a scheduling write.

use std::time::Duration;

use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db::now_rfc3339,
    messaging::MessagingPort,
    models::{
        NotificationRow, SchedulingRow, NOTIFY_COMMISSION_UPDATE, NOTIFY_SCHEDULING,
        NOTIFY_STATUS_FAILED, NOTIFY_STATUS_PENDING, NOTIFY_STATUS_SENT,
    },
    state::AppState,
};

const DISPATCH_INTERVAL_SECS: u64 = 30;
const DISPATCH_BATCH: i64 = 20;

pub fn booking_request_body(row: &SchedulingRow) -> String {
    format!(
        "Olá {}! Seu horário de {} com {} está marcado para {}. \
         Responda CONFIRMAR para confirmar ou CANCELAR para cancelar.",
        row.client_name,
        row.service_name.as_deref().unwrap_or("serviço"),
        row.barber_name.as_deref().unwrap_or("nosso barbeiro"),
        row.date_time
    )
}

/// Queues the CONFIRMAR/CANCELAR request for a freshly created scheduling.
/// Failures are logged and swallowed; the scheduling is already committed.
pub async fn enqueue_booking_request(pool: &SqlitePool, row: &SchedulingRow) {
    let Some(phone) = row.phone.as_deref().filter(|p| !p.is_empty()) else {
        log::debug!("Scheduling {} has no phone, skipping notification", row.id);
        return;
    };

    let result = sqlx::query(
        r#"INSERT INTO notifications
           (id, user_id, scheduling_id, type, status, phone, body, scheduled_for)
           VALUES (?, NULL, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&row.id)
    .bind(NOTIFY_SCHEDULING)
    .bind(NOTIFY_STATUS_PENDING)
    .bind(phone)
    .bind(booking_request_body(row))
    .bind(now_rfc3339())
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("Failed to enqueue notification for scheduling {}: {err}", row.id);
    }
}

/// Queues a status-change message (staff confirm/cancel) for the client.
pub async fn enqueue_status_update(pool: &SqlitePool, row: &SchedulingRow) {
    let Some(phone) = row.phone.as_deref().filter(|p| !p.is_empty()) else {
        return;
    };

    let body = match row.status.as_str() {
        "confirmed" => format!(
            "Seu horário de {} foi confirmado para {}.",
            row.service_name.as_deref().unwrap_or("serviço"),
            row.date_time
        ),
        "canceled" => format!("Seu horário de {} foi cancelado.", row.date_time),
        other => {
            log::debug!("No status message for scheduling {} in state {other}", row.id);
            return;
        }
    };

    let result = sqlx::query(
        r#"INSERT INTO notifications
           (id, user_id, scheduling_id, type, status, phone, body, scheduled_for)
           VALUES (?, NULL, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&row.id)
    .bind(NOTIFY_SCHEDULING)
    .bind(NOTIFY_STATUS_PENDING)
    .bind(phone)
    .bind(body)
    .bind(now_rfc3339())
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("Failed to enqueue status notification for {}: {err}", row.id);
    }
}

/// In-app notification for the barber; carries no phone so the dispatcher
/// marks it sent without touching the gateway.
pub async fn enqueue_commission_update(
    pool: &SqlitePool,
    barber_id: &str,
    scheduling_id: &str,
    amount: f64,
) {
    let body = format!("Nova comissão registrada: R$ {amount:.2}.");
    let result = sqlx::query(
        r#"INSERT INTO notifications
           (id, user_id, scheduling_id, type, status, phone, body, scheduled_for)
           VALUES (?, ?, ?, ?, ?, NULL, ?, ?)"#,
    )
    .bind(new_id())
    .bind(barber_id)
    .bind(scheduling_id)
    .bind(NOTIFY_COMMISSION_UPDATE)
    .bind(NOTIFY_STATUS_PENDING)
    .bind(body)
    .bind(now_rfc3339())
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("Failed to enqueue commission notification for {barber_id}: {err}");
    }
}

pub fn spawn_dispatcher(state: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(DISPATCH_INTERVAL_SECS));
        loop {
            tick.tick().await;
            if let Err(err) = dispatch_due(&state.db, state.messaging.as_ref()).await {
                log::warn!("Notification dispatch pass failed: {err}");
            }
        }
    });
}

/// One dispatcher pass: sends every due pending notification and records
/// the outcome on the row.
pub async fn dispatch_due(
    pool: &SqlitePool,
    messaging: &dyn MessagingPort,
) -> Result<usize, sqlx::Error> {
    let due = sqlx::query_as::<_, NotificationRow>(
        r#"SELECT id, user_id, scheduling_id, type, status, phone, body,
                  scheduled_for, sent_at, error
           FROM notifications
           WHERE status = ? AND scheduled_for <= ?
           ORDER BY scheduled_for ASC
           LIMIT ?"#,
    )
    .bind(NOTIFY_STATUS_PENDING)
    .bind(now_rfc3339())
    .bind(DISPATCH_BATCH)
    .fetch_all(pool)
    .await?;

    let mut sent = 0;
    for notification in due {
        let delivered = match notification.phone.as_deref().filter(|p| !p.is_empty()) {
            Some(phone) => messaging.send_message(phone, &notification.body).await,
            // In-app only, nothing to push through the gateway.
            None => true,
        };

        if delivered {
            sqlx::query("UPDATE notifications SET status = ?, sent_at = ?, error = NULL WHERE id = ?")
                .bind(NOTIFY_STATUS_SENT)
                .bind(now_rfc3339())
                .bind(&notification.id)
                .execute(pool)
                .await?;
            sent += 1;
        } else {
            sqlx::query("UPDATE notifications SET status = ?, error = ? WHERE id = ?")
                .bind(NOTIFY_STATUS_FAILED)
                .bind("gateway send failed")
                .bind(&notification.id)
                .execute(pool)
                .await?;
            log::warn!("Notification {} failed to send", notification.id);
        }
    }

    Ok(sent)
}
