//! User Repository - users, referral edges and origin restrictions

use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use super::pool::{wallet_column, wallet_column_opt};
use crate::campaign::{OriginRestriction, Referral, User};

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing user tables...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.users (
                wallet VARCHAR(42) PRIMARY KEY,
                referral_code VARCHAR(64) NOT NULL UNIQUE,
                referral_count INTEGER NOT NULL DEFAULT 0,
                link_clicks INTEGER NOT NULL DEFAULT 0,
                link_conversions INTEGER NOT NULL DEFAULT 0,
                referrer VARCHAR(42),
                active BOOLEAN NOT NULL DEFAULT FALSE,
                origin VARCHAR(255),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                last_active TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create users table: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.referrals (
                referee VARCHAR(42) PRIMARY KEY REFERENCES airdrop.users(wallet),
                referrer VARCHAR(42) NOT NULL REFERENCES airdrop.users(wallet),
                code_used VARCHAR(64) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create referrals table: {}", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON airdrop.referrals(referrer)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create referrals index: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airdrop.origin_restrictions (
                origin VARCHAR(255) PRIMARY KEY,
                wallet_count INTEGER NOT NULL DEFAULT 0,
                last_wallet_created TIMESTAMP WITH TIME ZONE,
                banned_until TIMESTAMP WITH TIME ZONE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create origin_restrictions table: {}", e))?;

        Ok(())
    }

    pub async fn upsert_user(conn: &mut PgConnection, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.users
            (wallet, referral_code, referral_count, link_clicks, link_conversions,
             referrer, active, origin, created_at, last_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (wallet) DO UPDATE SET
                referral_count = EXCLUDED.referral_count,
                link_clicks = EXCLUDED.link_clicks,
                link_conversions = EXCLUDED.link_conversions,
                referrer = COALESCE(airdrop.users.referrer, EXCLUDED.referrer),
                active = airdrop.users.active OR EXCLUDED.active,
                last_active = EXCLUDED.last_active
            "#,
        )
        .bind(user.wallet.as_str())
        .bind(&user.referral_code)
        .bind(user.referral_count as i32)
        .bind(user.link_clicks as i32)
        .bind(user.link_conversions as i32)
        .bind(user.referrer.as_ref().map(|w| w.as_str()))
        .bind(user.active)
        .bind(&user.origin)
        .bind(user.created_at)
        .bind(user.last_active)
        .execute(&mut *conn)
        .await?;

        debug!(wallet = %user.wallet, "User row written");
        Ok(())
    }

    pub async fn insert_referral(
        conn: &mut PgConnection,
        referral: &Referral,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.referrals (referee, referrer, code_used, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(referral.referee.as_str())
        .bind(referral.referrer.as_str())
        .bind(&referral.code_used)
        .bind(referral.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn upsert_origin(
        conn: &mut PgConnection,
        restriction: &OriginRestriction,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO airdrop.origin_restrictions
            (origin, wallet_count, last_wallet_created, banned_until)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (origin) DO UPDATE SET
                wallet_count = EXCLUDED.wallet_count,
                last_wallet_created = EXCLUDED.last_wallet_created,
                banned_until = EXCLUDED.banned_until
            "#,
        )
        .bind(&restriction.origin)
        .bind(restriction.wallet_count as i32)
        .bind(restriction.last_wallet_created)
        .bind(restriction.banned_until)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn load_users(&self) -> Result<Vec<User>, String> {
        let rows = sqlx::query(
            r#"
            SELECT wallet, referral_code, referral_count, link_clicks, link_conversions,
                   referrer, active, origin, created_at, last_active
            FROM airdrop.users
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load users: {}", e))?;

        rows.iter().map(user_from_row).collect()
    }

    pub async fn load_referrals(&self) -> Result<Vec<Referral>, String> {
        let rows = sqlx::query(
            r#"
            SELECT referee, referrer, code_used, created_at
            FROM airdrop.referrals
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load referrals: {}", e))?;

        rows.iter()
            .map(|row| -> Result<Referral, String> {
                Ok(Referral {
                    referee: wallet_column(row, "referee")?,
                    referrer: wallet_column(row, "referrer")?,
                    code_used: row.get("code_used"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    pub async fn load_origins(&self) -> Result<Vec<OriginRestriction>, String> {
        let rows = sqlx::query(
            r#"
            SELECT origin, wallet_count, last_wallet_created, banned_until
            FROM airdrop.origin_restrictions
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load origin restrictions: {}", e))?;

        Ok(rows
            .into_iter()
            .map(|row| OriginRestriction {
                origin: row.get("origin"),
                wallet_count: row.get::<i32, _>("wallet_count") as u32,
                last_wallet_created: row.get("last_wallet_created"),
                banned_until: row.get("banned_until"),
            })
            .collect())
    }
}

fn user_from_row(row: &PgRow) -> Result<User, String> {
    Ok(User {
        wallet: wallet_column(row, "wallet")?,
        referral_code: row.get("referral_code"),
        referral_count: row.get::<i32, _>("referral_count") as u32,
        link_clicks: row.get::<i32, _>("link_clicks") as u32,
        link_conversions: row.get::<i32, _>("link_conversions") as u32,
        referrer: wallet_column_opt(row, "referrer")?,
        active: row.get("active"),
        origin: row.get("origin"),
        created_at: row.get("created_at"),
        last_active: row.get("last_active"),
    })
}
