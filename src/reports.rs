//! Report aggregation over a date range: finance totals, scheduling
//! counts, per-barber performance and top services. Document templating
//! (spreadsheets, PDF) lives outside this service; the API exposes the
//! aggregates as JSON and a plain CSV export.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub from: String,
    pub to: String,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
    pub schedulings: SchedulingCounts,
    pub barbers: Vec<BarberPerformance>,
    pub top_services: Vec<ServiceCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulingCounts {
    pub total: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub canceled: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BarberPerformance {
    pub barber_id: String,
    pub barber_name: String,
    pub confirmed: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceCount {
    pub name: String,
    pub bookings: i64,
}

pub fn validate_date(raw: &str) -> Result<String, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|_| raw.to_string())
        .map_err(|_| ApiError::Validation(format!("invalid date: {raw} (expected YYYY-MM-DD)")))
}

pub async fn build_summary(
    pool: &SqlitePool,
    from: &str,
    to: &str,
) -> Result<ReportSummary, ApiError> {
    let from = validate_date(from)?;
    let to = validate_date(to)?;
    // Scheduling timestamps are RFC 3339 UTC, so day bounds are string bounds.
    let day_start = format!("{from}T00:00:00Z");
    let day_end = format!("{to}T23:59:59Z");

    let income = finance_total(pool, "income", &from, &to).await?;
    let expenses = finance_total(pool, "expense", &from, &to).await?;

    let counts = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        r#"SELECT COUNT(*),
                  COALESCE(SUM(status = 'pending'), 0),
                  COALESCE(SUM(status = 'confirmed'), 0),
                  COALESCE(SUM(status = 'canceled'), 0)
           FROM schedulings
           WHERE date_time BETWEEN ? AND ?"#,
    )
    .bind(&day_start)
    .bind(&day_end)
    .fetch_one(pool)
    .await?;

    let barbers = sqlx::query_as::<_, BarberPerformance>(
        r#"SELECT s.barber_id, u.display_name AS barber_name, COUNT(*) AS confirmed
           FROM schedulings s
           JOIN users u ON s.barber_id = u.id
           WHERE s.status = 'confirmed' AND s.date_time BETWEEN ? AND ?
           GROUP BY s.barber_id, u.display_name
           ORDER BY confirmed DESC"#,
    )
    .bind(&day_start)
    .bind(&day_end)
    .fetch_all(pool)
    .await?;

    let top_services = sqlx::query_as::<_, ServiceCount>(
        r#"SELECT sv.name, COUNT(*) AS bookings
           FROM schedulings s
           JOIN services sv ON s.service_id = sv.id
           WHERE s.status != 'canceled' AND s.date_time BETWEEN ? AND ?
           GROUP BY sv.name
           ORDER BY bookings DESC
           LIMIT 5"#,
    )
    .bind(&day_start)
    .bind(&day_end)
    .fetch_all(pool)
    .await?;

    Ok(ReportSummary {
        from,
        to,
        income,
        expenses,
        net: income - expenses,
        schedulings: SchedulingCounts {
            total: counts.0,
            pending: counts.1,
            confirmed: counts.2,
            canceled: counts.3,
        },
        barbers,
        top_services,
    })
}

pub async fn finance_csv(pool: &SqlitePool, from: &str, to: &str) -> Result<String, ApiError> {
    let from = validate_date(from)?;
    let to = validate_date(to)?;

    let rows = sqlx::query_as::<_, (String, String, String, f64, String)>(
        r#"SELECT id, kind, description, amount, entry_date
           FROM finance_entries
           WHERE entry_date BETWEEN ? AND ?
           ORDER BY entry_date ASC"#,
    )
    .bind(&from)
    .bind(&to)
    .fetch_all(pool)
    .await?;

    let mut out = String::from("id,kind,description,amount,entry_date\n");
    for (id, kind, description, amount, entry_date) in rows {
        let description = description.replace('"', "\"\"");
        out.push_str(&format!(
            "{id},{kind},\"{description}\",{amount:.2},{entry_date}\n"
        ));
    }
    Ok(out)
}

async fn finance_total(
    pool: &SqlitePool,
    kind: &str,
    from: &str,
    to: &str,
) -> Result<f64, ApiError> {
    let total = sqlx::query_scalar::<_, f64>(
        "SELECT COALESCE(SUM(amount), 0.0) FROM finance_entries WHERE kind = ? AND entry_date BETWEEN ? AND ?",
    )
    .bind(kind)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;
    Ok(total)
}
