//! Database Connection Pool using sqlx
//!
//! Reads happen once at startup (`load_state`). After that the engine only
//! writes: each operation's `Changeset` lands in one SQL transaction, in
//! foreign-key order (users before the rows that reference them).

use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{error, info};

use crate::campaign::{CampaignState, Changeset, Wallet};
use crate::database::activity::ActivityRepository;
use crate::database::rewards::RewardRepository;
use crate::database::tasks::TaskRepository;
use crate::database::users::UserRepository;
use crate::error::CampaignError;

pub struct DatabasePool {
    pool: PgPool,
    users: UserRepository,
    rewards: RewardRepository,
    tasks: TaskRepository,
    activity: ActivityRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str) -> Result<Self, String> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| format!("Failed to connect to PostgreSQL: {}", e))?;

        info!("Connected to PostgreSQL");

        Ok(Self {
            users: UserRepository::new(pool.clone()),
            rewards: RewardRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            activity: ActivityRepository::new(pool.clone()),
            pool,
        })
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing database schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS airdrop")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create airdrop schema: {}", e))?;

        self.users.init_schema().await?;
        self.rewards.init_schema().await?;
        self.tasks.init_schema().await?;
        self.activity.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    /// Rebuild the in-memory campaign tables from the database
    pub async fn load_state(&self) -> Result<CampaignState, CampaignError> {
        let mut changes = Changeset::default();

        for user in self.users.load_users().await.map_err(CampaignError::Storage)? {
            changes.users.insert(user.wallet.clone(), user);
        }
        changes.referrals = self.users.load_referrals().await.map_err(CampaignError::Storage)?;
        for origin in self.users.load_origins().await.map_err(CampaignError::Storage)? {
            changes.origins.insert(origin.origin.clone(), origin);
        }

        changes.ledger = self.rewards.load_entries().await.map_err(CampaignError::Storage)?;
        changes.achievements = self.rewards.load_unlocks().await.map_err(CampaignError::Storage)?;
        changes.withdrawal_attempts = self.rewards.load_attempts().await.map_err(CampaignError::Storage)?;

        for task in self.tasks.load_user_tasks().await.map_err(CampaignError::Storage)? {
            changes
                .user_tasks
                .insert((task.wallet.clone(), task.task_id.clone()), task);
        }
        for verification in self.tasks.load_verifications().await.map_err(CampaignError::Storage)? {
            changes.verifications.insert(verification.id, verification);
        }

        for streak in self.activity.load_streaks().await.map_err(CampaignError::Storage)? {
            changes.streaks.insert(streak.wallet.clone(), streak);
        }
        changes.notifications = self.activity.load_notifications().await.map_err(CampaignError::Storage)?;

        let mut state = CampaignState::default();
        state.apply(changes);
        Ok(state)
    }

    /// Persist one staged operation atomically
    pub async fn commit(&self, changes: &Changeset) -> Result<(), CampaignError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CampaignError::Storage(format!("Failed to begin transaction: {}", e)))?;

        if let Err(e) = Self::write_changes(&mut tx, changes).await {
            error!(error = %e, "Failed to persist campaign changes");
            return Err(map_write_error(e));
        }

        tx.commit()
            .await
            .map_err(|e| CampaignError::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    async fn write_changes(conn: &mut PgConnection, changes: &Changeset) -> Result<(), sqlx::Error> {
        for user in changes.users.values() {
            UserRepository::upsert_user(conn, user).await?;
        }
        for referral in &changes.referrals {
            UserRepository::insert_referral(conn, referral).await?;
        }
        for origin in changes.origins.values() {
            UserRepository::upsert_origin(conn, origin).await?;
        }
        for entry in &changes.ledger {
            RewardRepository::insert_entry(conn, entry).await?;
        }
        for unlock in &changes.achievements {
            RewardRepository::insert_unlock(conn, unlock).await?;
        }
        for attempt in &changes.withdrawal_attempts {
            RewardRepository::insert_attempt(conn, attempt).await?;
        }
        for task in changes.user_tasks.values() {
            TaskRepository::upsert_user_task(conn, task).await?;
        }
        for verification in changes.verifications.values() {
            TaskRepository::upsert_verification(conn, verification).await?;
        }
        for streak in changes.streaks.values() {
            ActivityRepository::upsert_streak(conn, streak).await?;
        }
        for notification in &changes.notifications {
            ActivityRepository::insert_notification(conn, notification).await?;
        }
        for (wallet, id) in &changes.notification_reads {
            ActivityRepository::mark_read(conn, wallet, id).await?;
        }
        Ok(())
    }

    /// Round-trip a trivial query for health checks
    pub async fn ping(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Database ping failed: {}", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_write_error(e: sqlx::Error) -> CampaignError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CampaignError::Integrity(db.constraint().unwrap_or("unique constraint").to_string())
        }
        _ => CampaignError::Storage(format!("Failed to write changes: {}", e)),
    }
}

pub(crate) fn wallet_column(row: &PgRow, column: &str) -> Result<Wallet, String> {
    let raw: String = row.get(column);
    Wallet::parse(&raw).map_err(|e| format!("Invalid wallet in column {}: {}", column, e))
}

pub(crate) fn wallet_column_opt(row: &PgRow, column: &str) -> Result<Option<Wallet>, String> {
    let raw: Option<String> = row.get(column);
    raw.map(|raw| {
        Wallet::parse(&raw).map_err(|e| format!("Invalid wallet in column {}: {}", column, e))
    })
    .transpose()
}
