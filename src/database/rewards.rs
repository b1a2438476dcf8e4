//! Reward Repository - ledger entries, achievement unlocks, withdrawal attempts

use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use super::pool::{wallet_column, wallet_column_opt};
use crate::campaign::{AchievementUnlock, AmountBreakdown, LedgerEntry, WithdrawalAttempt};

pub struct RewardRepository {
    pool: PgPool,
}

impl RewardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing reward tables...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.ledger_entries (
                id BIGINT PRIMARY KEY,
                wallet VARCHAR(42) NOT NULL REFERENCES airdrop.users(wallet),
                amount BIGINT NOT NULL,
                provenance VARCHAR(16) NOT NULL,
                base_amount BIGINT,
                referral_bonus BIGINT,
                achievement_rewards BIGINT,
                referral_count INTEGER NOT NULL DEFAULT 0,
                referrer VARCHAR(42),
                source VARCHAR(255),
                tx_id VARCHAR(128) NOT NULL UNIQUE,
                status VARCHAR(32) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create ledger_entries table: {}", e))?;

        // At most one genesis entry per wallet
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_single_genesis
            ON airdrop.ledger_entries(wallet) WHERE provenance = 'genesis'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create genesis index: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.achievements (
                wallet VARCHAR(42) NOT NULL REFERENCES airdrop.users(wallet),
                achievement_id VARCHAR(64) NOT NULL,
                unlocked_at TIMESTAMP WITH TIME ZONE NOT NULL,
                PRIMARY KEY (wallet, achievement_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create achievements table: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.withdrawal_attempts (
                id BIGSERIAL PRIMARY KEY,
                wallet VARCHAR(42) NOT NULL REFERENCES airdrop.users(wallet),
                active_referral_count INTEGER NOT NULL,
                eligible BOOLEAN NOT NULL,
                attempted_at TIMESTAMP WITH TIME ZONE NOT NULL,
                status VARCHAR(32) NOT NULL,
                notes TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create withdrawal_attempts table: {}", e))?;

        Ok(())
    }

    pub async fn insert_entry(conn: &mut PgConnection, entry: &LedgerEntry) -> Result<(), sqlx::Error> {
        let breakdown = entry.breakdown;
        sqlx::query(
            r#"
            INSERT INTO airdrop.ledger_entries
            (id, wallet, amount, provenance, base_amount, referral_bonus, achievement_rewards,
             referral_count, referrer, source, tx_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id as i64)
        .bind(entry.wallet.as_str())
        .bind(entry.amount as i64)
        .bind(entry.provenance.as_str())
        .bind(breakdown.map(|b| b.base_amount as i64))
        .bind(breakdown.map(|b| b.referral_bonus as i64))
        .bind(breakdown.map(|b| b.achievement_rewards as i64))
        .bind(entry.referral_count as i32)
        .bind(entry.referrer.as_ref().map(|w| w.as_str()))
        .bind(&entry.source)
        .bind(&entry.tx_id)
        .bind(&entry.status)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        debug!(wallet = %entry.wallet, tx_id = %entry.tx_id, "Ledger entry written");
        Ok(())
    }

    pub async fn insert_unlock(
        conn: &mut PgConnection,
        unlock: &AchievementUnlock,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.achievements (wallet, achievement_id, unlocked_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(unlock.wallet.as_str())
        .bind(&unlock.achievement_id)
        .bind(unlock.unlocked_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_attempt(
        conn: &mut PgConnection,
        attempt: &WithdrawalAttempt,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.withdrawal_attempts
            (wallet, active_referral_count, eligible, attempted_at, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt.wallet.as_str())
        .bind(attempt.active_referral_count as i32)
        .bind(attempt.eligible)
        .bind(attempt.attempted_at)
        .bind(&attempt.status)
        .bind(&attempt.notes)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn load_entries(&self) -> Result<Vec<LedgerEntry>, String> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet, amount, provenance, base_amount, referral_bonus,
                   achievement_rewards, referral_count, referrer, source, tx_id,
                   status, created_at
            FROM airdrop.ledger_entries
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load ledger entries: {}", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn load_unlocks(&self) -> Result<Vec<AchievementUnlock>, String> {
        let rows = sqlx::query(
            r#"
            SELECT wallet, achievement_id, unlocked_at
            FROM airdrop.achievements
            ORDER BY unlocked_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load achievements: {}", e))?;

        rows.iter()
            .map(|row| -> Result<AchievementUnlock, String> {
                Ok(AchievementUnlock {
                    wallet: wallet_column(row, "wallet")?,
                    achievement_id: row.get("achievement_id"),
                    unlocked_at: row.get("unlocked_at"),
                })
            })
            .collect()
    }

    pub async fn load_attempts(&self) -> Result<Vec<WithdrawalAttempt>, String> {
        let rows = sqlx::query(
            r#"
            SELECT wallet, active_referral_count, eligible, attempted_at, status, notes
            FROM airdrop.withdrawal_attempts
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load withdrawal attempts: {}", e))?;

        rows.iter()
            .map(|row| -> Result<WithdrawalAttempt, String> {
                Ok(WithdrawalAttempt {
                    wallet: wallet_column(row, "wallet")?,
                    active_referral_count: row.get::<i32, _>("active_referral_count") as u32,
                    eligible: row.get("eligible"),
                    attempted_at: row.get("attempted_at"),
                    status: row.get("status"),
                    notes: row.get("notes"),
                })
            })
            .collect()
    }
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, String> {
    let base: Option<i64> = row.get("base_amount");
    let referral_bonus: Option<i64> = row.get("referral_bonus");
    let achievement_rewards: Option<i64> = row.get("achievement_rewards");
    let breakdown = base.map(|base| AmountBreakdown {
        base_amount: base as u64,
        referral_bonus: referral_bonus.unwrap_or(0) as u64,
        achievement_rewards: achievement_rewards.unwrap_or(0) as u64,
    });

    let provenance: String = row.get("provenance");

    Ok(LedgerEntry {
        id: row.get::<i64, _>("id") as u64,
        wallet: wallet_column(row, "wallet")?,
        amount: row.get::<i64, _>("amount") as u64,
        provenance: provenance.parse()?,
        breakdown,
        referral_count: row.get::<i32, _>("referral_count") as u32,
        referrer: wallet_column_opt(row, "referrer")?,
        source: row.get("source"),
        tx_id: row.get("tx_id"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    })
}
