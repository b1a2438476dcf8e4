//! PostgreSQL Database Module
//!
//! Persists campaign tables (users, referrals, ledger, achievements, tasks,
//! verifications, streaks, origins, notifications, withdrawal attempts) in the
//! `airdrop` schema.

pub mod activity;
pub mod pool;
pub mod rewards;
pub mod tasks;
pub mod users;

pub use activity::ActivityRepository;
pub use pool::DatabasePool;
pub use rewards::RewardRepository;
pub use tasks::TaskRepository;
pub use users::UserRepository;
