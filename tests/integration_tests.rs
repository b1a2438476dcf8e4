//! Integration tests for the airdrop reward ledger
//!
//! These tests drive the in-memory `CampaignEngine` end to end: genesis claims,
//! referral graphs, streaks, task review, withdrawal eligibility, origin limits,
//! concurrency, and the HTTP router.

use airdrop_ledger::campaign::{
    GenesisOutcome, MemorySink, NotificationKind, ReferralOutcome, ReviewDecision, SybilLimits,
    TaskStatus, VerificationStatus, Wallet,
};
use airdrop_ledger::{CampaignEngine, CampaignError, Catalog, Conflict, ManualClock, PolicyViolation};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

/// Deterministic wallet address built from a single repeated byte
fn wallet(n: u8) -> String {
    format!("0x{}", hex::encode([n; 20]))
}

fn start_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
    ))
}

/// Engine with the built-in catalog, a manual clock and a recording sink
fn create_test_engine() -> (CampaignEngine, Arc<ManualClock>, Arc<MemorySink>) {
    create_engine_with_limits(SybilLimits::default())
}

fn create_engine_with_limits(
    limits: SybilLimits,
) -> (CampaignEngine, Arc<ManualClock>, Arc<MemorySink>) {
    let clock = start_clock();
    let sink = Arc::new(MemorySink::new());
    let engine = CampaignEngine::new(Arc::new(Catalog::builtin()), limits)
        .with_clock(clock.clone())
        .with_sink(sink.clone());
    (engine, clock, sink)
}

async fn referral_code(engine: &CampaignEngine, address: &str) -> String {
    engine
        .check_wallet(address, None)
        .await
        .unwrap()
        .referral_code
        .expect("registered wallet has a code")
}

fn claimed(outcome: GenesisOutcome) -> airdrop_ledger::campaign::GenesisReceipt {
    match outcome {
        GenesisOutcome::Claimed(receipt) => receipt,
        other => panic!("expected a fresh claim, got {:?}", other),
    }
}

// ============================================================================
// Genesis Claim Tests
// ============================================================================

mod genesis_claims {
    use super::*;

    #[tokio::test]
    async fn test_claim_without_referral() {
        let (engine, _, _) = create_test_engine();
        let alice = wallet(0xaa);

        let receipt = claimed(engine.claim_airdrop(&alice, None, None).await.unwrap());

        assert_eq!(receipt.amount, 1005);
        assert_eq!(receipt.referral_count, 0);
        assert_eq!(receipt.breakdown.base_amount, 1005);
        assert_eq!(receipt.breakdown.referral_bonus, 0);
        assert!(receipt.tx_id.starts_with("0x"));
        assert_eq!(receipt.tx_id.len(), 66);
        assert!(receipt.referral.is_none());
        assert_eq!(receipt.new_achievements, vec!["first_claim".to_string()]);

        let balance = engine.total_balance(&alice).await.unwrap();
        assert_eq!(balance.airdrop, 1005);
        assert_eq!(balance.total, 1005);
    }

    #[tokio::test]
    async fn test_claim_replay_returns_existing_entry() {
        let (engine, clock, _) = create_test_engine();
        let alice = wallet(0xaa);

        let first = claimed(engine.claim_airdrop(&alice, None, None).await.unwrap());
        clock.advance(Duration::hours(3));

        match engine.claim_airdrop(&alice, None, None).await.unwrap() {
            GenesisOutcome::AlreadyClaimed { existing, .. } => {
                assert_eq!(existing.tx_id, first.tx_id);
                assert_eq!(existing.amount, first.amount);
            }
            other => panic!("replay must not issue a new claim: {:?}", other),
        }

        let stats = engine.stats().await;
        assert_eq!(stats.total_claims, 1);
        assert_eq!(stats.ledger_entries, 1);

        let check = engine.check_wallet(&alice, None).await.unwrap();
        assert!(check.already_claimed);
        assert!(!check.eligible);
        assert_eq!(check.claim_data.map(|c| c.tx_id), Some(first.tx_id));
    }

    #[tokio::test]
    async fn test_invalid_wallet_rejected_without_state() {
        let (engine, _, sink) = create_test_engine();

        for bad in ["", "abc", "0x123", "0xZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ"] {
            let err = engine.claim_airdrop(bad, None, None).await.unwrap_err();
            assert_eq!(err.kind(), "validation", "address {:?}", bad);
        }

        assert_eq!(engine.stats().await.total_users, 0);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_case_address_is_one_wallet() {
        let (engine, _, _) = create_test_engine();
        let lower = "0xabcdef0123456789abcdef0123456789abcdef01";
        let upper = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";

        claimed(engine.claim_airdrop(upper, None, None).await.unwrap());
        assert!(matches!(
            engine.claim_airdrop(lower, None, None).await.unwrap(),
            GenesisOutcome::AlreadyClaimed { .. }
        ));
        assert_eq!(engine.stats().await.total_users, 1);
    }
}

// ============================================================================
// Referral Tests
// ============================================================================

mod referrals {
    use super::*;

    #[tokio::test]
    async fn test_referee_claim_credits_referrer() {
        let (engine, _, sink) = create_test_engine();
        let referrer = wallet(0x11);
        let referee = wallet(0x22);

        claimed(engine.claim_airdrop(&referrer, None, None).await.unwrap());
        let code = referral_code(&engine, &referrer).await;

        let receipt = claimed(
            engine
                .claim_airdrop(&referee, Some(&code.to_lowercase()), None)
                .await
                .unwrap(),
        );

        // The referee's amount uses the referee's own referral count
        assert_eq!(receipt.referral_count, 0);
        assert_eq!(receipt.amount, 1005);
        assert_eq!(
            receipt.referral,
            Some(ReferralOutcome::Applied {
                referrer: Wallet::parse(&referrer).unwrap(),
                referral_count: 1,
            })
        );

        let stats = engine.referral_stats(&referrer).await.unwrap();
        assert_eq!(stats.referral_count, 1);
        assert_eq!(stats.active_referrals, 1);
        assert_eq!(stats.link_conversions, 1);
        assert_eq!(stats.total_referral_bonus, 121);

        let network = engine.network_analysis(&referrer).await.unwrap();
        assert_eq!(network.direct_referrals, 1);
        assert_eq!(network.active_referrals, 1);
        assert_eq!(network.inactive_referrals, 0);

        let referrer_wallet = Wallet::parse(&referrer).unwrap();
        assert_eq!(sink.count_for(&referrer_wallet, NotificationKind::Referral), 1);
        assert_eq!(sink.count_for(&referrer_wallet, NotificationKind::Achievement), 2);
    }

    #[tokio::test]
    async fn test_self_and_unknown_codes_are_ignored() {
        let (engine, _, _) = create_test_engine();
        let alice = wallet(0x33);
        let code = referral_code(&engine, &alice).await;

        let receipt = claimed(engine.claim_airdrop(&alice, Some(&code), None).await.unwrap());
        assert_eq!(receipt.referral, Some(ReferralOutcome::SelfReferral));

        let bob = wallet(0x44);
        let receipt = claimed(
            engine
                .claim_airdrop(&bob, Some("REF-NOPE0000"), None)
                .await
                .unwrap(),
        );
        assert_eq!(receipt.referral, Some(ReferralOutcome::CodeInvalid));

        assert_eq!(engine.referral_stats(&alice).await.unwrap().referral_count, 0);
    }

    #[tokio::test]
    async fn test_referee_is_linked_once() {
        let (engine, _, _) = create_test_engine();
        let first = wallet(0x51);
        let second = wallet(0x52);
        let referee = wallet(0x53);

        let first_code = referral_code(&engine, &first).await;
        let second_code = referral_code(&engine, &second).await;

        claimed(
            engine
                .claim_airdrop(&referee, Some(&first_code), None)
                .await
                .unwrap(),
        );
        // A second code on a replayed claim changes nothing
        assert!(matches!(
            engine
                .claim_airdrop(&referee, Some(&second_code), None)
                .await
                .unwrap(),
            GenesisOutcome::AlreadyClaimed { .. }
        ));

        assert_eq!(engine.referral_stats(&first).await.unwrap().referral_count, 1);
        assert_eq!(engine.referral_stats(&second).await.unwrap().referral_count, 0);
    }

    #[tokio::test]
    async fn test_link_clicks_and_conversion_rate() {
        let (engine, _, _) = create_test_engine();
        let owner = wallet(0x61);
        let code = referral_code(&engine, &owner).await;

        for _ in 0..4 {
            engine.track_link_click(&code).await.unwrap();
        }
        claimed(
            engine
                .claim_airdrop(&wallet(0x62), Some(&code), None)
                .await
                .unwrap(),
        );

        let stats = engine.referral_stats(&owner).await.unwrap();
        assert_eq!(stats.link_clicks, 4);
        assert_eq!(stats.link_conversions, 1);
        assert!((stats.conversion_rate - 25.0).abs() < f64::EPSILON);

        let err = engine.track_link_click("REF-UNKNOWN").await.unwrap_err();
        assert!(matches!(err, CampaignError::NotFound { .. }));
    }
}

// ============================================================================
// Achievement Tests
// ============================================================================

mod achievements {
    use super::*;

    #[tokio::test]
    async fn test_unlocks_follow_referral_count() {
        let (engine, _, _) = create_test_engine();
        let referrer = wallet(0x70);
        claimed(engine.claim_airdrop(&referrer, None, None).await.unwrap());
        let code = referral_code(&engine, &referrer).await;

        let mut unlocked_before = 0;
        for n in 1..=5u8 {
            claimed(
                engine
                    .claim_airdrop(&wallet(0x70 + n), Some(&code), None)
                    .await
                    .unwrap(),
            );

            let progress = engine.achievements(&referrer).await.unwrap();
            assert!(progress.total_unlocked >= unlocked_before, "unlocks never go away");
            unlocked_before = progress.total_unlocked;
        }

        let progress = engine.achievements(&referrer).await.unwrap();
        let unlocked: Vec<&str> = progress
            .achievements
            .iter()
            .filter(|a| a.unlocked)
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(
            unlocked,
            vec!["first_claim", "first_ref", "active_network", "five_ref"]
        );
        assert_eq!(progress.total_rewards, 1 + 11 + 111 + 1111);
        assert!((progress.progress_percentage - 80.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_projection_includes_achievement_rewards() {
        let (engine, _, _) = create_test_engine();
        let referrer = wallet(0x80);
        let code = referral_code(&engine, &referrer).await;

        claimed(
            engine
                .claim_airdrop(&wallet(0x81), Some(&code), None)
                .await
                .unwrap(),
        );

        // Referrer has not claimed yet: 1 referral and the first_ref unlock count
        let receipt = claimed(engine.claim_airdrop(&referrer, None, None).await.unwrap());
        assert_eq!(receipt.referral_count, 1);
        assert_eq!(receipt.amount, 1005 + 121 + 11);
    }
}

// ============================================================================
// Streak Tests
// ============================================================================

mod streaks {
    use super::*;

    #[tokio::test]
    async fn test_seven_day_bonus_paid_once() {
        let (engine, clock, sink) = create_test_engine();
        let alice = wallet(0x90);
        engine.check_wallet(&alice, None).await.unwrap();

        let mut bonuses = Vec::new();
        for day in 1..=7 {
            let receipt = engine.daily_checkin(&alice).await.unwrap();
            assert_eq!(receipt.current_streak, day);
            bonuses.push(receipt.bonus_earned);
            clock.advance(Duration::days(1));
        }

        assert_eq!(bonuses, vec![0, 0, 0, 0, 0, 0, 50]);

        let balance = engine.total_balance(&alice).await.unwrap();
        assert_eq!(balance.streak_bonuses, 50);

        let wallet = Wallet::parse(&alice).unwrap();
        assert_eq!(sink.count_for(&wallet, NotificationKind::StreakBonus), 1);
    }

    #[tokio::test]
    async fn test_second_checkin_same_day_conflicts() {
        let (engine, clock, _) = create_test_engine();
        let alice = wallet(0x91);
        engine.check_wallet(&alice, None).await.unwrap();

        engine.daily_checkin(&alice).await.unwrap();
        clock.advance(Duration::hours(2));

        let err = engine.daily_checkin(&alice).await.unwrap_err();
        match err {
            CampaignError::Conflict(Conflict::AlreadyCheckedInToday { streak }) => {
                assert_eq!(streak.current_streak, 1);
                assert_eq!(streak.total_checkins, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missed_day_resets_streak() {
        let (engine, clock, _) = create_test_engine();
        let alice = wallet(0x92);
        engine.check_wallet(&alice, None).await.unwrap();

        engine.daily_checkin(&alice).await.unwrap();
        clock.advance(Duration::days(1));
        engine.daily_checkin(&alice).await.unwrap();
        clock.advance(Duration::days(2));

        let receipt = engine.daily_checkin(&alice).await.unwrap();
        assert_eq!(receipt.current_streak, 1);
        assert_eq!(receipt.longest_streak, 2);
        assert_eq!(receipt.total_checkins, 3);
    }

    #[tokio::test]
    async fn test_checkin_leaves_task_reward_to_claim() {
        let (engine, _, _) = create_test_engine();
        let alice = wallet(0x93);
        engine.check_wallet(&alice, None).await.unwrap();

        let receipt = engine.daily_checkin(&alice).await.unwrap();
        assert_eq!(receipt.task_reward_pending, Some(10));

        let board = engine.task_board(&alice).await.unwrap();
        assert_eq!(board.pending_rewards, 10);
        assert!(board.streak.checked_in_today);

        let reward = engine.claim_task_reward(&alice, "daily_checkin").await.unwrap();
        assert_eq!(reward.reward, 10);
        assert_eq!(engine.total_balance(&alice).await.unwrap().task_rewards, 10);
    }

    #[tokio::test]
    async fn test_checkin_sends_one_completion_notification() {
        let (engine, _, sink) = create_test_engine();
        let alice = wallet(0x94);
        engine.check_wallet(&alice, None).await.unwrap();

        let receipt = engine.daily_checkin(&alice).await.unwrap();
        assert_eq!(receipt.task_reward_pending, Some(10));

        let wallet = Wallet::parse(&alice).unwrap();
        assert_eq!(sink.count_for(&wallet, NotificationKind::TaskComplete), 1);
    }

    #[tokio::test]
    async fn test_checkin_keeps_unclaimed_task_reward() {
        let (engine, clock, sink) = create_test_engine();
        let alice = wallet(0x95);
        engine.check_wallet(&alice, None).await.unwrap();

        engine.daily_checkin(&alice).await.unwrap();
        clock.advance(Duration::days(1));

        let receipt = engine.daily_checkin(&alice).await.unwrap();
        assert_eq!(receipt.current_streak, 2);
        assert_eq!(receipt.task_reward_pending, Some(10));

        // the first completion is still waiting; no second one is recorded
        let wallet = Wallet::parse(&alice).unwrap();
        assert_eq!(sink.count_for(&wallet, NotificationKind::TaskComplete), 1);

        engine.claim_task_reward(&alice, "daily_checkin").await.unwrap();
        assert_eq!(engine.total_balance(&alice).await.unwrap().task_rewards, 10);
    }
}

// ============================================================================
// Task Lifecycle Tests
// ============================================================================

mod task_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_claim_task_reward_replay_is_rejected() {
        let (engine, _, _) = create_test_engine();
        let alice = wallet(0xa0);
        engine.check_wallet(&alice, None).await.unwrap();

        engine.start_task(&alice, "daily_checkin").await.unwrap();
        engine.complete_task(&alice, "daily_checkin").await.unwrap();
        let first = engine.claim_task_reward(&alice, "daily_checkin").await.unwrap();
        assert!(first.tx_id.starts_with("TASK_daily_checkin_"));

        let err = engine
            .claim_task_reward(&alice, "daily_checkin")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Conflict(Conflict::NotClaimable {
                status: TaskStatus::Claimed,
                ..
            })
        ));

        let balance = engine.total_balance(&alice).await.unwrap();
        assert_eq!(balance.task_rewards, 10);
        assert_eq!(engine.stats().await.ledger_entries, 1);
    }

    #[tokio::test]
    async fn test_recurring_task_respects_cooldown() {
        let (engine, clock, _) = create_test_engine();
        let alice = wallet(0xa1);
        engine.check_wallet(&alice, None).await.unwrap();

        engine.complete_task(&alice, "daily_checkin").await.unwrap();
        engine.claim_task_reward(&alice, "daily_checkin").await.unwrap();

        let err = engine.complete_task(&alice, "daily_checkin").await.unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Policy(PolicyViolation::NotYetAvailable { .. })
        ));

        clock.advance(Duration::hours(24));
        let receipt = engine.complete_task(&alice, "daily_checkin").await.unwrap();
        assert_eq!(receipt.completions, 2);
    }

    #[tokio::test]
    async fn test_recurring_task_needs_claim_before_next_completion() {
        let (engine, clock, _) = create_test_engine();
        let alice = wallet(0xa4);
        engine.check_wallet(&alice, None).await.unwrap();

        engine.complete_task(&alice, "daily_checkin").await.unwrap();
        clock.advance(Duration::hours(25));

        let err = engine.complete_task(&alice, "daily_checkin").await.unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Conflict(Conflict::RewardUnclaimed { .. })
        ));

        engine.claim_task_reward(&alice, "daily_checkin").await.unwrap();
        let receipt = engine.complete_task(&alice, "daily_checkin").await.unwrap();
        assert_eq!(receipt.completions, 2);
    }

    #[tokio::test]
    async fn test_referral_gated_task() {
        let (engine, _, _) = create_test_engine();
        let referrer = wallet(0xa2);
        let code = referral_code(&engine, &referrer).await;

        let err = engine
            .complete_task(&referrer, "invite_friends_bonus")
            .await
            .unwrap_err();
        match err {
            CampaignError::Policy(PolicyViolation::InsufficientReferrals {
                required,
                current,
                needed,
            }) => {
                assert_eq!((required, current, needed), (3, 0, 3));
            }
            other => panic!("unexpected error {:?}", other),
        }

        for n in 0..3u8 {
            claimed(
                engine
                    .claim_airdrop(&wallet(0xb0 + n), Some(&code), None)
                    .await
                    .unwrap(),
            );
        }

        let receipt = engine
            .complete_task(&referrer, "invite_friends_bonus")
            .await
            .unwrap();
        assert_eq!(receipt.reward, 150);

        let err = engine
            .complete_task(&referrer, "invite_friends_bonus")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Conflict(Conflict::AlreadyCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn test_verification_approve_flow() {
        let (engine, _, sink) = create_test_engine();
        let alice = wallet(0xa3);
        engine.check_wallet(&alice, None).await.unwrap();

        let err = engine.complete_task(&alice, "follow_twitter").await.unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Policy(PolicyViolation::VerificationRequired { .. })
        ));

        engine.start_task(&alice, "follow_twitter").await.unwrap();
        let submitted = engine
            .submit_verification(&alice, "follow_twitter", None, br#"{"handle":"@alice"}"#.to_vec())
            .await
            .unwrap();
        assert_eq!(submitted.status, VerificationStatus::Pending);
        assert_eq!(submitted.verification_kind, "twitter_follow");

        let err = engine
            .submit_verification(&alice, "follow_twitter", None, b"again".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Conflict(Conflict::VerificationPending { .. })
        ));

        let queue = engine.pending_verifications().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].verification_id, submitted.id);

        let reviewed = engine
            .review_verification(submitted.id, ReviewDecision::Approved, "moderator", None)
            .await
            .unwrap();
        assert_eq!(reviewed.status, VerificationStatus::Approved);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("moderator"));
        assert!(engine.pending_verifications().await.is_empty());

        let err = engine
            .review_verification(submitted.id, ReviewDecision::Rejected, "moderator", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Conflict(Conflict::AlreadyReviewed { .. })
        ));

        let reward = engine.claim_task_reward(&alice, "follow_twitter").await.unwrap();
        assert_eq!(reward.reward, 50);

        let wallet = Wallet::parse(&alice).unwrap();
        assert_eq!(sink.count_for(&wallet, NotificationKind::TaskApproved), 1);
    }

    #[tokio::test]
    async fn test_rejected_verification_can_be_resubmitted() {
        let (engine, _, _) = create_test_engine();
        let alice = wallet(0xa4);
        engine.check_wallet(&alice, None).await.unwrap();
        engine.start_task(&alice, "join_discord").await.unwrap();

        let first = engine
            .submit_verification(&alice, "join_discord", Some("discord_join"), b"blurry".to_vec())
            .await
            .unwrap();
        engine
            .review_verification(
                first.id,
                ReviewDecision::Rejected,
                "moderator",
                Some("screenshot unreadable".to_string()),
            )
            .await
            .unwrap();

        let err = engine.claim_task_reward(&alice, "join_discord").await.unwrap_err();
        assert!(matches!(err, CampaignError::Conflict(Conflict::NotClaimable { .. })));

        let second = engine
            .submit_verification(&alice, "join_discord", None, b"clear".to_vec())
            .await
            .unwrap();
        assert!(second.id > first.id);
        assert_eq!(engine.pending_verifications().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_task_and_verification() {
        let (engine, _, _) = create_test_engine();
        let alice = wallet(0xa5);
        engine.check_wallet(&alice, None).await.unwrap();

        let err = engine.start_task(&alice, "does_not_exist").await.unwrap_err();
        assert!(matches!(err, CampaignError::NotFound { kind: "task", .. }));

        let err = engine
            .review_verification(999, ReviewDecision::Approved, "moderator", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::NotFound { .. }));
    }
}

// ============================================================================
// Withdrawal Eligibility Tests
// ============================================================================

mod withdrawal {
    use super::*;

    #[tokio::test]
    async fn test_seventh_active_referral_unlocks_withdrawal() {
        let (engine, _, _) = create_test_engine();
        let referrer = wallet(0xc0);
        claimed(engine.claim_airdrop(&referrer, None, None).await.unwrap());
        let code = referral_code(&engine, &referrer).await;

        for n in 1..=6u8 {
            claimed(
                engine
                    .claim_airdrop(&wallet(0xc0 + n), Some(&code), None)
                    .await
                    .unwrap(),
            );
        }

        let report = engine.check_withdrawal_eligibility(&referrer).await.unwrap();
        assert!(!report.eligible);
        assert_eq!(report.active_referral_count, 6);
        assert_eq!(report.remaining_needed, 1);

        claimed(
            engine
                .claim_airdrop(&wallet(0xc7), Some(&code), None)
                .await
                .unwrap(),
        );

        let report = engine.check_withdrawal_eligibility(&referrer).await.unwrap();
        assert!(report.eligible);
        assert_eq!(report.remaining_needed, 0);

        let network = engine.network_analysis(&referrer).await.unwrap();
        assert!(network.can_withdraw);
        assert_eq!(
            network.withdrawable_amount,
            engine.total_balance(&referrer).await.unwrap().total
        );
    }

    #[tokio::test]
    async fn test_registered_but_unclaimed_referee_is_inactive() {
        let (engine, _, _) = create_test_engine();
        let referrer = wallet(0xd0);
        let code = referral_code(&engine, &referrer).await;

        claimed(
            engine
                .claim_airdrop(&wallet(0xd1), Some(&code), None)
                .await
                .unwrap(),
        );
        // Registration alone does not create an edge or an active referral
        engine.check_wallet(&wallet(0xd2), None).await.unwrap();

        let report = engine.simulate_withdrawal(&referrer).await.unwrap();
        assert_eq!(report.active_referral_count, 1);
        assert_eq!(report.remaining_needed, 6);
    }
}

// ============================================================================
// Anti-Sybil Tests
// ============================================================================

mod sybil {
    use super::*;

    #[tokio::test]
    async fn test_origin_limit_then_ban() {
        let (engine, clock, _) = create_engine_with_limits(SybilLimits {
            max_wallets_per_origin: 2,
            ban_duration: Duration::hours(24),
        });
        let origin = Some("203.0.113.9");

        engine.check_wallet(&wallet(0xe1), origin).await.unwrap();
        claimed(engine.claim_airdrop(&wallet(0xe2), None, origin).await.unwrap());

        let check = engine.check_wallet(&wallet(0xe3), origin).await.unwrap();
        assert!(!check.eligible);
        assert!(!check.user_exists);
        assert_eq!(check.reasons.len(), 1);

        // The ban applies even to wallets already known from this origin
        let err = engine
            .claim_airdrop(&wallet(0xe1), None, origin)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Policy(PolicyViolation::OriginBanned { .. })
        ));

        // Other origins are unaffected
        engine
            .check_wallet(&wallet(0xe4), Some("198.51.100.1"))
            .await
            .unwrap();

        clock.advance(Duration::hours(25));
        claimed(engine.claim_airdrop(&wallet(0xe1), None, origin).await.unwrap());
        assert_eq!(engine.stats().await.total_users, 3);
    }

    #[tokio::test]
    async fn test_no_origin_is_never_limited() {
        let (engine, _, _) = create_engine_with_limits(SybilLimits {
            max_wallets_per_origin: 1,
            ban_duration: Duration::hours(1),
        });

        for n in 0..5u8 {
            claimed(engine.claim_airdrop(&wallet(0xf0 + n), None, None).await.unwrap());
        }
        assert_eq!(engine.stats().await.total_claims, 5);
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_claims_issue_one_entry() {
        let (engine, _, _) = create_test_engine();
        let engine = Arc::new(engine);
        let alice = wallet(0x12);

        let mut handles = vec![];
        for _ in 0..16 {
            let engine = engine.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                engine.claim_airdrop(&alice, None, None).await.unwrap()
            }));
        }

        let mut fresh = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), GenesisOutcome::Claimed(_)) {
                fresh += 1;
            }
        }

        assert_eq!(fresh, 1);
        assert_eq!(engine.stats().await.ledger_entries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_referees_all_counted() {
        let (engine, _, _) = create_test_engine();
        let engine = Arc::new(engine);
        let referrer = wallet(0x13);
        let code = referral_code(&engine, &referrer).await;

        let mut handles = vec![];
        for n in 0..10u8 {
            let engine = engine.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .claim_airdrop(&wallet(0x20 + n), Some(&code), None)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = engine.referral_stats(&referrer).await.unwrap();
        assert_eq!(stats.referral_count, 10);
        assert_eq!(stats.active_referrals, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_task_reward_claims() {
        let (engine, _, _) = create_test_engine();
        let engine = Arc::new(engine);
        let alice = wallet(0x14);
        engine.check_wallet(&alice, None).await.unwrap();
        engine.complete_task(&alice, "daily_checkin").await.unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let engine = engine.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                engine.claim_task_reward(&alice, "daily_checkin").await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(engine.total_balance(&alice).await.unwrap().task_rewards, 10);
    }
}

// ============================================================================
// Leaderboard and Notification Tests
// ============================================================================

mod reporting {
    use super::*;

    #[tokio::test]
    async fn test_leaderboard_orders_by_referrals_then_signup() {
        let (engine, clock, _) = create_test_engine();
        let early = wallet(0x31);
        let late = wallet(0x32);

        let early_code = referral_code(&engine, &early).await;
        clock.advance(Duration::minutes(5));
        let late_code = referral_code(&engine, &late).await;

        claimed(engine.claim_airdrop(&wallet(0x41), Some(&late_code), None).await.unwrap());
        claimed(engine.claim_airdrop(&wallet(0x42), Some(&early_code), None).await.unwrap());
        claimed(engine.claim_airdrop(&wallet(0x43), Some(&late_code), None).await.unwrap());

        let board = engine.leaderboard(3, Some(&early)).await.unwrap();
        assert_eq!(board.entries.len(), 3);
        assert_eq!(board.entries[0].wallet.as_str(), late);
        assert_eq!(board.entries[0].referral_count, 2);
        assert_eq!(board.entries[1].wallet.as_str(), early);
        assert_eq!(board.wallet_rank, Some(2));
        assert_eq!(board.total_users, 5);
        assert_eq!(board.total_claims, 3);
    }

    #[tokio::test]
    async fn test_notification_feed_newest_first() {
        let (engine, clock, _) = create_test_engine();
        let alice = wallet(0x35);

        engine.check_wallet(&alice, None).await.unwrap();
        clock.advance(Duration::minutes(1));
        claimed(engine.claim_airdrop(&alice, None, None).await.unwrap());

        // Welcome, then the achievement and claim notices
        let feed = engine.notifications(&alice, 1).await.unwrap();
        assert_eq!(feed.notifications.len(), 1);
        assert_eq!(feed.total_count, 3);
        assert_eq!(feed.unread_count, 3);
        assert_ne!(feed.notifications[0].kind, NotificationKind::Welcome);

        let all = engine.notifications(&alice, 50).await.unwrap();
        let welcome = all.notifications.last().unwrap();
        assert_eq!(welcome.kind, NotificationKind::Welcome);

        let unread = engine
            .mark_notification_read(&alice, &welcome.id)
            .await
            .unwrap();
        assert_eq!(unread, 2);
        let unread = engine
            .mark_notification_read(&alice, &welcome.id)
            .await
            .unwrap();
        assert_eq!(unread, 2);

        let err = engine
            .mark_notification_read(&wallet(0x36), &welcome.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::NotFound { .. }));
    }
}

// ============================================================================
// HTTP API Tests
// ============================================================================

mod http_api {
    use super::*;
    use airdrop_ledger::api::{create_router, AppState, SecurityMiddlewareConfig, SecurityState};
    use airdrop_ledger::config::AdminConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tower::ServiceExt;

    const ADMIN_KEY: &str = "test-admin-key-0123456789";

    fn create_test_app() -> Router {
        let (engine, _, _) = create_test_engine();
        let mut keys = HashMap::new();
        keys.insert(ADMIN_KEY.to_string(), "moderator".to_string());
        let admin = AdminConfig {
            keys,
            exempt_wallets: vec![Wallet::parse(&wallet(0x99)).unwrap()],
        };
        let security = SecurityState::new(SecurityMiddlewareConfig::default());
        create_router(AppState::new(Arc::new(engine), admin, security))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.50")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.50")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_test_app();
        let (status, body) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["database"], "disabled");
    }

    #[tokio::test]
    async fn test_check_and_claim_over_http() {
        let app = create_test_app();
        let alice = wallet(0x01);

        let (status, body) = send(
            &app,
            post("/api/check-wallet", json!({ "wallet_address": alice })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["eligible"], true);

        let (status, body) = send(
            &app,
            post("/api/claim-airdrop", json!({ "wallet_address": alice })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "claimed");
        assert_eq!(body["data"]["amount"], 1005);

        let (_, body) = send(
            &app,
            post("/api/claim-airdrop", json!({ "wallet_address": alice })),
        )
        .await;
        assert_eq!(body["data"]["status"], "already_claimed");

        let (status, body) = send(&app, get(&format!("/api/get-total-balance?wallet={}", alice))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1005);
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let app = create_test_app();

        let (status, body) = send(
            &app,
            post("/api/claim-airdrop", json!({ "wallet_address": "0x123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation");

        let (status, body) = send(
            &app,
            get(&format!("/api/check-withdrawal-eligibility?wallet={}", wallet(0x02))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let alice = wallet(0x03);
        send(&app, post("/api/check-wallet", json!({ "wallet_address": alice }))).await;
        let (status, body) = send(
            &app,
            post(
                "/api/tasks/complete",
                json!({ "wallet": alice, "task_id": "invite_friends_bonus" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["details"]["policy"], "insufficient_referrals");
        assert_eq!(body["details"]["needed"], 3);

        send(&app, post("/api/tasks/daily-checkin", json!({ "wallet": alice }))).await;
        let (status, body) = send(
            &app,
            post("/api/tasks/daily-checkin", json!({ "wallet": alice })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["details"]["conflict"], "already_checked_in_today");
    }

    #[tokio::test]
    async fn test_admin_routes_require_key() {
        let app = create_test_app();
        let alice = wallet(0x04);
        send(&app, post("/api/check-wallet", json!({ "wallet_address": alice }))).await;
        send(
            &app,
            post("/api/tasks/start", json!({ "wallet": alice, "task_id": "join_telegram" })),
        )
        .await;
        let (status, body) = send(
            &app,
            post(
                "/api/tasks/submit-verification",
                json!({ "wallet": alice, "task_id": "join_telegram", "proof": { "username": "alice" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let verification_id = body["data"]["id"].as_u64().unwrap();

        let (status, _) = send(&app, get("/api/admin/tasks/pending")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = get("/api/admin/tasks/pending");
        request
            .headers_mut()
            .insert("x-api-key", ADMIN_KEY.parse().unwrap());
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["count"], 1);

        let mut request = post(
            "/api/admin/tasks/verify",
            json!({ "verification_id": verification_id, "status": "approved" }),
        );
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {}", ADMIN_KEY).parse().unwrap());
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "approved");
        assert_eq!(body["data"]["reviewed_by"], "moderator");

        let (status, body) = send(
            &app,
            post("/api/tasks/claim-reward", json!({ "wallet": alice, "task_id": "join_telegram" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reward"], 50);
    }

    #[tokio::test]
    async fn test_exempt_wallet_skips_origin_limit() {
        let (engine, _, _) = create_engine_with_limits(SybilLimits {
            max_wallets_per_origin: 1,
            ban_duration: Duration::hours(24),
        });
        let admin = AdminConfig {
            keys: HashMap::new(),
            exempt_wallets: vec![Wallet::parse(&wallet(0x99)).unwrap()],
        };
        let app = create_router(AppState::new(
            Arc::new(engine),
            admin,
            SecurityState::new(SecurityMiddlewareConfig::default()),
        ));

        let (status, _) = send(
            &app,
            post("/api/claim-airdrop", json!({ "wallet_address": wallet(0x05) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            post("/api/claim-airdrop", json!({ "wallet_address": wallet(0x06) })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["details"]["policy"], "origin_limit_reached");

        let (status, _) = send(
            &app,
            post("/api/claim-airdrop", json!({ "wallet_address": wallet(0x99) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_per_origin() {
        let (engine, _, _) = create_test_engine();
        let security = SecurityState::new(SecurityMiddlewareConfig {
            rate_limit_per_minute: 2,
            ..SecurityMiddlewareConfig::default()
        });
        let app = create_router(AppState::new(Arc::new(engine), AdminConfig::default(), security));

        assert_eq!(send(&app, get("/api/health")).await.0, StatusCode::OK);
        assert_eq!(send(&app, get("/api/health")).await.0, StatusCode::OK);
        assert_eq!(
            send(&app, get("/api/health")).await.0,
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
