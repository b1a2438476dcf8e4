//! Activity Repository - check-in streaks and notification feeds

use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Row;
use tracing::info;

use super::pool::wallet_column;
use crate::campaign::{DailyStreak, Notification, Wallet};

pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing activity tables...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.daily_streaks (
                wallet VARCHAR(42) PRIMARY KEY REFERENCES airdrop.users(wallet),
                current_streak INTEGER NOT NULL DEFAULT 0,
                longest_streak INTEGER NOT NULL DEFAULT 0,
                total_checkins INTEGER NOT NULL DEFAULT 0,
                last_checkin TIMESTAMP WITH TIME ZONE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create daily_streaks table: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.notifications (
                id VARCHAR(64) PRIMARY KEY,
                wallet VARCHAR(42) NOT NULL,
                kind VARCHAR(32) NOT NULL,
                message TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                read BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create notifications table: {}", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notifications_wallet ON airdrop.notifications(wallet, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create notifications index: {}", e))?;

        Ok(())
    }

    pub async fn upsert_streak(conn: &mut PgConnection, streak: &DailyStreak) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.daily_streaks
            (wallet, current_streak, longest_streak, total_checkins, last_checkin)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (wallet) DO UPDATE SET
                current_streak = EXCLUDED.current_streak,
                longest_streak = EXCLUDED.longest_streak,
                total_checkins = EXCLUDED.total_checkins,
                last_checkin = EXCLUDED.last_checkin
            "#,
        )
        .bind(streak.wallet.as_str())
        .bind(streak.current_streak as i32)
        .bind(streak.longest_streak as i32)
        .bind(streak.total_checkins as i32)
        .bind(streak.last_checkin)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_notification(
        conn: &mut PgConnection,
        notification: &Notification,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.notifications (id, wallet, kind, message, created_at, read)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&notification.id)
        .bind(notification.wallet.as_str())
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(notification.timestamp)
        .bind(notification.read)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn mark_read(
        conn: &mut PgConnection,
        wallet: &Wallet,
        notification_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE airdrop.notifications SET read = TRUE WHERE id = $1 AND wallet = $2")
            .bind(notification_id)
            .bind(wallet.as_str())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    pub async fn load_streaks(&self) -> Result<Vec<DailyStreak>, String> {
        let rows = sqlx::query(
            r#"
            SELECT wallet, current_streak, longest_streak, total_checkins, last_checkin
            FROM airdrop.daily_streaks
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load streaks: {}", e))?;

        rows.iter()
            .map(|row| -> Result<DailyStreak, String> {
                Ok(DailyStreak {
                    wallet: wallet_column(row, "wallet")?,
                    current_streak: row.get::<i32, _>("current_streak") as u32,
                    longest_streak: row.get::<i32, _>("longest_streak") as u32,
                    total_checkins: row.get::<i32, _>("total_checkins") as u32,
                    last_checkin: row.get("last_checkin"),
                })
            })
            .collect()
    }

    pub async fn load_notifications(&self) -> Result<Vec<Notification>, String> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet, kind, message, created_at, read
            FROM airdrop.notifications
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load notifications: {}", e))?;

        rows.iter()
            .map(|row| -> Result<Notification, String> {
                let kind: String = row.get("kind");
                Ok(Notification {
                    id: row.get("id"),
                    wallet: wallet_column(row, "wallet")?,
                    kind: kind.parse()?,
                    message: row.get("message"),
                    timestamp: row.get("created_at"),
                    read: row.get("read"),
                })
            })
            .collect()
    }
}
