//! Reward Ledger & Eligibility Engine
//!
//! Components, leaf first:
//!
//! | Module          | Responsibility                                        |
//! |-----------------|-------------------------------------------------------|
//! | `wallet`        | address validation and normalization                  |
//! | `sybil`         | per-origin new-wallet cap and temporary bans          |
//! | `referral`      | referral codes, referee edges, active referrals       |
//! | `achievements`  | monotone unlocks and their rewards                    |
//! | `tasks`         | task instance state machine and proof review          |
//! | `streak`        | UTC calendar-day check-ins and milestone bonuses      |
//! | `ledger`        | append-only reward entries and balances               |
//! | `eligibility`   | withdrawal gate and network analysis (read-only)      |
//! | `notifications` | per-wallet feed and delivery sink                     |
//! | `leaderboard`   | referral ranking                                      |
//! | `state`         | committed tables and staged transactions              |
//! | `engine`        | locking, commit and the public operations             |

pub mod achievements;
pub mod eligibility;
pub mod engine;
pub mod leaderboard;
pub mod ledger;
pub mod notifications;
pub mod referral;
pub mod state;
pub mod streak;
pub mod sybil;
pub mod tasks;
pub mod wallet;

pub use achievements::{AchievementEngine, AchievementProgress, AchievementUnlock};
pub use eligibility::{EligibilityReport, NetworkAnalysis, WithdrawalAttempt, WITHDRAWAL_REFERRAL_THRESHOLD};
pub use engine::{CampaignEngine, CampaignStats, ClaimSnapshot, WalletCheck};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use ledger::{AmountBreakdown, Balance, GenesisOutcome, GenesisReceipt, LedgerEntry, Provenance};
pub use notifications::{LogSink, MemorySink, Notification, NotificationFeed, NotificationKind, NotificationSink};
pub use referral::{Referral, ReferralOutcome, ReferralStats, User};
pub use state::{CampaignState, Changeset};
pub use streak::{CheckinReceipt, DailyStreak};
pub use sybil::{OriginRestriction, SybilDecision, SybilLimits};
pub use tasks::{ReviewDecision, TaskStatus, TaskVerification, UserTask, VerificationStatus};
pub use wallet::{Wallet, WalletError};
