//! Database initialization
//!
//! Creates the database file and schema on first run. All table creation
//! is idempotent so startup can run against an existing database.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Create an in-memory database with the full schema (test support)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        // A single connection so every handle sees the same in-memory db
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn configure_pragmas(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer; verification step
    // handlers read session state while the audit trail appends
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_verification_sessions_table(pool).await?;
    create_identity_documents_table(pool).await?;
    create_biometric_records_table(pool).await?;
    create_accounts_table(pool).await?;
    create_audit_log_table(pool).await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the verification_sessions table
///
/// One row per verification attempt. Step flags are monotonic: they only
/// ever transition 0 -> 1 and are never reset within a session.
async fn create_verification_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_sessions (
            session_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            token TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_progress', 'completed', 'failed', 'expired')),
            cnic_uploaded INTEGER NOT NULL DEFAULT 0,
            ocr_completed INTEGER NOT NULL DEFAULT 0,
            selfie_uploaded INTEGER NOT NULL DEFAULT 0,
            face_match_completed INTEGER NOT NULL DEFAULT 0,
            liveness_completed INTEGER NOT NULL DEFAULT 0,
            fingerprint_captured INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            expires_at TIMESTAMP NOT NULL,
            completed_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON verification_sessions(user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the identity_documents table
///
/// At most one reconciled document record per user, upserted on every
/// document step. Sensitive field columns hold cipher output.
async fn create_identity_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identity_documents (
            user_id INTEGER PRIMARY KEY REFERENCES users(id),
            document_number TEXT,
            full_name TEXT,
            guardian_name TEXT,
            date_of_birth TEXT,
            gender TEXT,
            address TEXT,
            issue_date TEXT,
            expiry_date TEXT,
            is_valid INTEGER NOT NULL DEFAULT 0,
            validation_errors TEXT,
            front_image_path TEXT,
            back_image_path TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the biometric_records table
///
/// Score and result columns for one check are always written together
/// from the same recognition call.
async fn create_biometric_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS biometric_records (
            user_id INTEGER PRIMARY KEY REFERENCES users(id),
            selfie_path TEXT,
            face_match_score REAL,
            face_match_result INTEGER NOT NULL DEFAULT 0,
            liveness_score REAL,
            liveness_result INTEGER NOT NULL DEFAULT 0,
            liveness_video_path TEXT,
            fingerprint_path TEXT,
            fingerprint_verified INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (face_match_score IS NULL OR (face_match_score >= 0.0 AND face_match_score <= 1.0)),
            CHECK (liveness_score IS NULL OR (liveness_score >= 0.0 AND liveness_score <= 1.0))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_accounts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            user_id INTEGER PRIMARY KEY REFERENCES users(id),
            account_number TEXT NOT NULL UNIQUE,
            account_type TEXT NOT NULL DEFAULT 'savings',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the audit_log table
///
/// Append-only: no UPDATE or DELETE statement against this table exists
/// anywhere in the codebase.
async fn create_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            user_id INTEGER,
            session_id TEXT,
            severity TEXT NOT NULL DEFAULT 'info'
                CHECK (severity IN ('info', 'warning', 'error')),
            payload TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_event_type ON audit_log(event_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_log(session_id)")
        .execute(pool)
        .await?;

    Ok(())
}
