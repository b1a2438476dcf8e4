//! Task Repository - task instances and verification submissions

use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use super::pool::wallet_column;
use crate::campaign::{TaskVerification, UserTask};

pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing task tables...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.user_tasks (
                wallet VARCHAR(42) NOT NULL REFERENCES airdrop.users(wallet),
                task_id VARCHAR(64) NOT NULL,
                status VARCHAR(32) NOT NULL,
                completions INTEGER NOT NULL DEFAULT 0,
                last_completed TIMESTAMP WITH TIME ZONE,
                next_available TIMESTAMP WITH TIME ZONE,
                verification_payload BYTEA,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                PRIMARY KEY (wallet, task_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create user_tasks table: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.task_verifications (
                id BIGINT PRIMARY KEY,
                wallet VARCHAR(42) NOT NULL REFERENCES airdrop.users(wallet),
                task_id VARCHAR(64) NOT NULL,
                verification_kind VARCHAR(64) NOT NULL,
                proof BYTEA NOT NULL,
                status VARCHAR(16) NOT NULL,
                reviewed_by VARCHAR(255),
                reviewed_at TIMESTAMP WITH TIME ZONE,
                notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create task_verifications table: {}", e))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_task_verifications_pending
            ON airdrop.task_verifications(created_at) WHERE status = 'pending'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create verification index: {}", e))?;

        Ok(())
    }

    pub async fn upsert_user_task(conn: &mut PgConnection, task: &UserTask) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.user_tasks
            (wallet, task_id, status, completions, last_completed, next_available,
             verification_payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (wallet, task_id) DO UPDATE SET
                status = EXCLUDED.status,
                completions = EXCLUDED.completions,
                last_completed = EXCLUDED.last_completed,
                next_available = EXCLUDED.next_available,
                verification_payload = EXCLUDED.verification_payload
            "#,
        )
        .bind(task.wallet.as_str())
        .bind(&task.task_id)
        .bind(task.status.as_str())
        .bind(task.completions as i32)
        .bind(task.last_completed)
        .bind(task.next_available)
        .bind(&task.verification_payload)
        .bind(task.created_at)
        .execute(&mut *conn)
        .await?;

        debug!(wallet = %task.wallet, task_id = %task.task_id, status = %task.status, "Task row written");
        Ok(())
    }

    pub async fn upsert_verification(
        conn: &mut PgConnection,
        verification: &TaskVerification,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.task_verifications
            (id, wallet, task_id, verification_kind, proof, status,
             reviewed_by, reviewed_at, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                reviewed_by = EXCLUDED.reviewed_by,
                reviewed_at = EXCLUDED.reviewed_at,
                notes = EXCLUDED.notes
            "#,
        )
        .bind(verification.id as i64)
        .bind(verification.wallet.as_str())
        .bind(&verification.task_id)
        .bind(&verification.verification_kind)
        .bind(&verification.proof)
        .bind(verification.status.as_str())
        .bind(&verification.reviewed_by)
        .bind(verification.reviewed_at)
        .bind(&verification.notes)
        .bind(verification.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn load_user_tasks(&self) -> Result<Vec<UserTask>, String> {
        let rows = sqlx::query(
            r#"
            SELECT wallet, task_id, status, completions, last_completed, next_available,
                   verification_payload, created_at
            FROM airdrop.user_tasks
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load user tasks: {}", e))?;

        rows.iter().map(user_task_from_row).collect()
    }

    pub async fn load_verifications(&self) -> Result<Vec<TaskVerification>, String> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet, task_id, verification_kind, proof, status,
                   reviewed_by, reviewed_at, notes, created_at
            FROM airdrop.task_verifications
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load verifications: {}", e))?;

        rows.iter().map(verification_from_row).collect()
    }
}

fn user_task_from_row(row: &PgRow) -> Result<UserTask, String> {
    let status: String = row.get("status");
    Ok(UserTask {
        wallet: wallet_column(row, "wallet")?,
        task_id: row.get("task_id"),
        status: status.parse()?,
        completions: row.get::<i32, _>("completions") as u32,
        last_completed: row.get("last_completed"),
        next_available: row.get("next_available"),
        verification_payload: row.get("verification_payload"),
        created_at: row.get("created_at"),
    })
}

fn verification_from_row(row: &PgRow) -> Result<TaskVerification, String> {
    let status: String = row.get("status");
    Ok(TaskVerification {
        id: row.get::<i64, _>("id") as u64,
        wallet: wallet_column(row, "wallet")?,
        task_id: row.get("task_id"),
        verification_kind: row.get("verification_kind"),
        proof: row.get("proof"),
        status: status.parse()?,
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    })
}
