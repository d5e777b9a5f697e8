//! Read-only monitoring endpoints
//!
//! Operator-facing views over users, the audit trail, and aggregate
//! counters. Nothing here mutates state; session transitions only happen
//! through the verification endpoints.

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::VerifyResult;
use crate::AppState;

fn default_limit() -> i64 {
    100
}

/// Common pagination parameters; limit is clamped to 1..=1000
#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl PageParams {
    fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 1000), self.offset.max(0))
    }
}

/// One user with their latest verification state
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserOverview {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub created_at: NaiveDateTime,
    pub account_number: Option<String>,
    /// Status of the most recently issued session, or "not_started"
    pub verification_status: String,
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> VerifyResult<Json<Vec<UserOverview>>> {
    let (limit, offset) = page.clamped();
    let users = sqlx::query_as::<_, UserOverview>(
        r#"
        SELECT u.id, u.full_name, u.email, u.phone, u.created_at,
               a.account_number,
               COALESCE(
                   (SELECT s.status FROM verification_sessions s
                    WHERE s.user_id = u.id
                    ORDER BY s.created_at DESC, s.session_id DESC
                    LIMIT 1),
                   'not_started') AS verification_status
        FROM users u
        LEFT JOIN accounts a ON a.user_id = u.id
        ORDER BY u.id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(state.engine.store().pool())
    .await?;
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogParams {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub user_id: Option<i64>,
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub event_type: String,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub severity: String,
    pub payload: Option<String>,
    pub created_at: String,
}

/// GET /api/admin/audit-log
///
/// Most recent events first; optional user and event-type filters.
pub async fn list_audit_log(
    State(state): State<AppState>,
    Query(params): Query<AuditLogParams>,
) -> VerifyResult<Json<Vec<AuditLogEntry>>> {
    let limit = params.limit.clamp(1, 1000);
    let offset = params.offset.max(0);
    let entries = sqlx::query_as::<_, AuditLogEntry>(
        r#"
        SELECT id, event_type, user_id, session_id, severity, payload, created_at
        FROM audit_log
        WHERE (? IS NULL OR user_id = ?)
          AND (? IS NULL OR event_type = ?)
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(params.user_id)
    .bind(params.user_id)
    .bind(&params.event_type)
    .bind(&params.event_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(state.engine.store().pool())
    .await?;
    Ok(Json(entries))
}

/// Aggregate counters for the operator dashboard
#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub total_users: i64,
    pub total_accounts: i64,
    /// Sessions still in flight (pending or in_progress)
    pub pending_verifications: i64,
    pub completed_verifications: i64,
    pub failed_verifications: i64,
    pub today_registrations: i64,
    pub today_completions: i64,
}

/// GET /api/admin/stats
pub async fn system_stats(State(state): State<AppState>) -> VerifyResult<Json<SystemStats>> {
    let pool = state.engine.store().pool();
    // "Today" is the current UTC day, matching the timestamps the
    // database writes
    let today_start = chrono::Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let total_accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(pool)
        .await?;
    let pending_verifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_sessions WHERE status IN ('pending', 'in_progress')",
    )
    .fetch_one(pool)
    .await?;
    let completed_verifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_sessions WHERE status = 'completed'",
    )
    .fetch_one(pool)
    .await?;
    let failed_verifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_sessions WHERE status = 'failed'",
    )
    .fetch_one(pool)
    .await?;
    let today_registrations: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at >= ?")
            .bind(today_start)
            .fetch_one(pool)
            .await?;
    let today_completions: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_sessions \
         WHERE status = 'completed' AND completed_at >= ?",
    )
    .bind(today_start)
    .fetch_one(pool)
    .await?;

    Ok(Json(SystemStats {
        total_users,
        total_accounts,
        pending_verifications,
        completed_verifications,
        failed_verifications,
        today_registrations,
        today_completions,
    }))
}
