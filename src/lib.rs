//! Airdrop Reward Ledger & Eligibility Engine
//!
//! Issues a one-time genesis airdrop per wallet, tracks referral graphs,
//! achievements, task completions and daily check-in streaks, and decides
//! withdrawal eligibility from the number of active referrals.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── clock.rs       - Injectable time source
//! ├── error.rs       - Campaign error taxonomy
//! ├── catalog/       - Immutable task and achievement tables
//! │   ├── tasks.rs        - Task definitions and recurrence
//! │   └── achievements.rs - Achievement definitions and unlock rules
//! ├── campaign/      - Core rules
//! │   ├── wallet.rs       - Address validation
//! │   ├── sybil.rs        - Per-origin wallet limits
//! │   ├── referral.rs     - Referral codes and edges
//! │   ├── achievements.rs - Unlock evaluation
//! │   ├── tasks.rs        - Task lifecycle and proof review
//! │   ├── streak.rs       - Daily check-ins
//! │   ├── ledger.rs       - Append-only reward ledger
//! │   ├── eligibility.rs  - Withdrawal gate
//! │   ├── notifications.rs- Per-wallet feed and sink
//! │   ├── leaderboard.rs  - Referral ranking
//! │   ├── state.rs        - Tables and staged transactions
//! │   └── engine.rs       - Locking and public operations
//! ├── api/           - HTTP API endpoints
//! │   ├── airdrop.rs    - Claims, balances, referrals, notifications
//! │   ├── tasks.rs      - Task lifecycle and admin review
//! │   └── middleware.rs - Rate limiting, body limits, admin keys
//! └── database/      - PostgreSQL persistence
//! ```

pub mod api;
pub mod campaign;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;

// Re-export main types for convenience
pub use campaign::{
    AmountBreakdown, CampaignEngine, CampaignStats, GenesisOutcome, LedgerEntry,
    NotificationSink, ReviewDecision, SybilLimits, Wallet, WalletCheck,
};
pub use catalog::Catalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CampaignConfig;
pub use database::DatabasePool;
pub use error::{CampaignError, Conflict, PolicyViolation};

// Re-export API types
pub use api::{create_router, AppState, SecurityMiddlewareConfig, SecurityState};
