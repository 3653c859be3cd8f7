use serde::Serialize;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SECRETARY: &str = "secretary";
pub const ROLE_BARBER: &str = "barber";

pub const NOTIFY_SCHEDULING: &str = "scheduling";
pub const NOTIFY_COMMISSION_UPDATE: &str = "commission_update";

pub const NOTIFY_STATUS_PENDING: &str = "pending";
pub const NOTIFY_STATUS_SENT: &str = "sent";
pub const NOTIFY_STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl SchedulingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingStatus::Pending => "pending",
            SchedulingStatus::Confirmed => "confirmed",
            SchedulingStatus::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SchedulingStatus::Pending),
            "confirmed" => Some(SchedulingStatus::Confirmed),
            "canceled" => Some(SchedulingStatus::Canceled),
            _ => None,
        }
    }

    /// Allowed edges: pending -> confirmed, pending -> canceled,
    /// confirmed -> canceled. Everything else is a no-op.
    pub fn can_transition_to(&self, next: SchedulingStatus) -> bool {
        matches!(
            (self, next),
            (SchedulingStatus::Pending, SchedulingStatus::Confirmed)
                | (SchedulingStatus::Pending, SchedulingStatus::Canceled)
                | (SchedulingStatus::Confirmed, SchedulingStatus::Canceled)
        )
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientRow {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub birth_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub duration_min: i64,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub stock_qty: i64,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SchedulingRow {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub service_id: String,
    pub barber_id: String,
    pub date_time: String,
    pub phone: Option<String>,
    pub status: String,
    pub created_by: Option<String>,
    pub created_at: String,
    pub service_name: Option<String>,
    pub barber_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommissionRow {
    pub id: String,
    pub barber_id: String,
    pub scheduling_id: String,
    pub amount: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FinanceRow {
    pub id: String,
    pub kind: String,
    pub description: String,
    pub amount: f64,
    pub entry_date: String,
    pub created_by: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: Option<String>,
    pub scheduling_id: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub phone: Option<String>,
    pub body: String,
    pub scheduled_for: String,
    pub sent_at: Option<String>,
    pub error: Option<String>,
}
