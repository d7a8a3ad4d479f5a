use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use credit_core::{
    Access, ManualClock, MemoryStore, Plan, SledStore, SubscriptionRecord,
    TransactionKind,
};
use credit_ledger::*;
use economics::{EconomyPolicy, PolicyHandle};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    economy: Economy,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        call_timeout: Duration::from_secs(5),
    }
}

fn harness_with(policy: EconomyPolicy, provider: Arc<dyn PaymentProvider>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap(),
    ));
    let economy = Economy::builder()
        .store(store.clone())
        .messages(store.clone())
        .policy(PolicyHandle::new(policy).unwrap())
        .clock(clock.clone())
        .provider(provider)
        .retry(fast_retry())
        .build();
    Harness {
        economy,
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(EconomyPolicy::default(), Arc::new(ManualBilling))
}

fn gold() -> Plan {
    Plan {
        name: "Gold".to_string(),
        price: 9.99,
        currency: "USD".to_string(),
        monthly_credits: 500,
    }
}

async fn funded(economy: &Economy, user: &str, amount: u64) {
    economy.ledger.open_account(user).await.unwrap();
    economy.ledger.admin_grant(user, amount, "test funds").await.unwrap();
}

async fn listing(economy: &Economy, creator: &str, price: u64) -> String {
    economy
        .content
        .publish(NewContent {
            creator_id: creator.to_string(),
            title: "Sunset set".to_string(),
            price,
            images: 4,
            videos: 1,
        })
        .await
        .unwrap()
        .id
}

/// Provider that rejects every cancellation
struct DownProvider {
    calls: AtomicU32,
}

#[async_trait]
impl PaymentProvider for DownProvider {
    async fn cancel_subscription(
        &self,
        _user: &str,
        _record: &SubscriptionRecord,
    ) -> std::result::Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError("gateway unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_overdraft_leaves_balance() {
    let h = harness();
    funded(&h.economy, "alice", 100).await;

    let err = h
        .economy
        .ledger
        .debit("alice", 150, "large", TransactionKind::ChatDebit)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientFunds {
            available: 100,
            required: 150
        }
    );
    assert_eq!(h.economy.ledger.account("alice").await.unwrap().spendable_balance, 100);
}

#[tokio::test]
async fn test_purchase_splits_commission() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 200).await;
    let item = listing(&h.economy, "creator", 150).await;

    let receipt = h.economy.content.purchase("fan", &item).await.unwrap();
    assert_eq!(receipt.buyer_balance, 50);
    assert_eq!(receipt.creator_earnings, 75);
    assert_eq!(receipt.platform_fee, 75);

    let creator = h.economy.ledger.account("creator").await.unwrap();
    assert_eq!(creator.earned_balance, 75);
    assert_eq!(creator.spendable_balance, 0);

    let sales = h.economy.ledger.sales("creator").await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].amount_received, 75);
    assert_eq!(sales[0].buyer_id, "fan");

    let history = h.economy.ledger.history("fan").await.unwrap();
    let debit = history.last().unwrap();
    assert_eq!(debit.kind, TransactionKind::ContentPurchaseDebit);
    assert_eq!(debit.amount, -150);
    assert_eq!(debit.id, receipt.transaction_id);

    assert_eq!(
        h.economy.content.access("fan", &item).await.unwrap(),
        Access::Unlocked
    );
    assert_eq!(
        h.economy.content.state("fan", &item).await.unwrap(),
        UnlockState::Unlocked
    );
}

#[tokio::test]
async fn test_subscribe_and_cancel() {
    let h = harness();
    h.economy.ledger.open_account("sub").await.unwrap();

    let receipt = h
        .economy
        .subscriptions
        .subscribe("sub", gold(), "card")
        .await
        .unwrap();
    assert_eq!(receipt.balance, 500);
    // Jan 31 renews on the last day of February
    assert_eq!(
        receipt.record.renews_on,
        Utc.with_ymd_and_hms(2026, 2, 28, 9, 0, 0).unwrap()
    );
    assert!(h.economy.subscriptions.current("sub").await.unwrap().is_some());

    let removed = h.economy.subscriptions.cancel("sub").await.unwrap();
    assert_eq!(removed.map(|r| r.plan), Some(gold()));
    assert!(h.economy.subscriptions.current("sub").await.unwrap().is_none());

    let history = h.economy.ledger.history("sub").await.unwrap();
    let audit = history.last().unwrap();
    assert_eq!(audit.kind, TransactionKind::SubscriptionCancel);
    assert_eq!(audit.amount, 0);
    assert_eq!(h.economy.ledger.account("sub").await.unwrap().spendable_balance, 500);

    // Nothing left to cancel
    assert_eq!(h.economy.subscriptions.cancel("sub").await.unwrap(), None);
}

#[tokio::test]
async fn test_invalid_plan_rejected() {
    let h = harness();
    h.economy.ledger.open_account("sub").await.unwrap();
    let plan = Plan {
        monthly_credits: 0,
        ..gold()
    };
    assert!(matches!(
        h.economy.subscriptions.subscribe("sub", plan, "card").await,
        Err(LedgerError::InvalidPlan(_))
    ));
    assert!(h.economy.subscriptions.current("sub").await.unwrap().is_none());
}

#[tokio::test]
async fn test_chat_cost_charged_to_member() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 200).await;
    let text = "a".repeat(2_500);
    assert_eq!(h.economy.chat.quote(&text), 125);

    let sent = h
        .economy
        .chat
        .send_message(Payer::Member("fan"), "creator", &text)
        .await
        .unwrap();
    assert_eq!(sent.cost, 125);
    assert_eq!(sent.remaining, 75);

    let inbox = h.economy.chat.inbox("creator").await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].sender_id, "fan");
}

#[tokio::test]
async fn test_guest_over_budget_rejected() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    let mut pool = GuestCreditPool::seeded();

    let err = h
        .economy
        .chat
        .send_message(Payer::Guest(&mut pool), "creator", &"a".repeat(2_500))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::GuestCreditsExhausted {
            available: 100,
            required: 125
        }
    );
    assert_eq!(pool.remaining(), 100);
    assert!(h.economy.chat.inbox("creator").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_member_refunded_when_message_store_down() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 100).await;
    h.store.set_messages_down(true);

    let result = h
        .economy
        .chat
        .send_message(Payer::Member("fan"), "creator", &"a".repeat(400))
        .await;
    assert!(matches!(result, Err(LedgerError::StoreWriteFailed(_))));
    assert_eq!(h.economy.ledger.account("fan").await.unwrap().spendable_balance, 100);

    let kinds: Vec<_> = h
        .economy
        .ledger
        .history("fan")
        .await
        .unwrap()
        .iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TransactionKind::AdminGrant,
            TransactionKind::ChatDebit,
            TransactionKind::ChatRefund
        ]
    );
}

#[tokio::test]
async fn test_self_purchase_forbidden() {
    let h = harness();
    funded(&h.economy, "creator", 1_000).await;
    let item = listing(&h.economy, "creator", 150).await;

    assert_eq!(
        h.economy.content.purchase("creator", &item).await,
        Err(LedgerError::SelfPurchaseForbidden)
    );
    let account = h.economy.ledger.account("creator").await.unwrap();
    assert_eq!(account.spendable_balance, 1_000);
    assert_eq!(account.earned_balance, 0);
    assert_eq!(
        h.economy.content.access("creator", &item).await.unwrap(),
        Access::Owner
    );
}

#[tokio::test]
async fn test_second_purchase_is_rejected() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 500).await;
    let item = listing(&h.economy, "creator", 100).await;

    h.economy.content.purchase("fan", &item).await.unwrap();
    assert_eq!(
        h.economy.content.purchase("fan", &item).await,
        Err(LedgerError::AlreadyUnlocked(item.clone()))
    );
    assert_eq!(h.economy.ledger.account("fan").await.unwrap().spendable_balance, 400);
    assert_eq!(h.economy.ledger.sales("creator").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_purchase_of_unknown_content() {
    let h = harness();
    funded(&h.economy, "fan", 500).await;
    assert_eq!(
        h.economy.content.purchase("fan", "missing").await,
        Err(LedgerError::ContentNotFound("missing".to_string()))
    );
}

#[tokio::test]
async fn test_publish_enforces_media_limits() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    let policy = h.economy.policy();

    let too_many = NewContent {
        creator_id: "creator".to_string(),
        title: "Album".to_string(),
        price: 10,
        images: policy.max_images + 1,
        videos: 0,
    };
    assert!(matches!(
        h.economy.content.publish(too_many).await,
        Err(LedgerError::InvalidContent(_))
    ));

    let unknown_creator = NewContent {
        creator_id: "nobody".to_string(),
        title: "Album".to_string(),
        price: 10,
        images: 0,
        videos: 0,
    };
    assert!(matches!(
        h.economy.content.publish(unknown_creator).await,
        Err(LedgerError::AccountNotFound(_))
    ));
}

#[tokio::test]
async fn test_commission_split_conserves_price() {
    let policy = EconomyPolicy {
        commission: 0.15,
        ..EconomyPolicy::default()
    };
    let h = harness_with(policy, Arc::new(ManualBilling));
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 10_000).await;

    let mut earned = 0;
    for price in [1, 3, 7, 99, 150, 1_001] {
        let item = listing(&h.economy, "creator", price).await;
        let receipt = h.economy.content.purchase("fan", &item).await.unwrap();
        assert_eq!(receipt.creator_earnings + receipt.platform_fee, price);
        earned += receipt.creator_earnings;
    }
    assert_eq!(h.economy.ledger.account("creator").await.unwrap().earned_balance, earned);
}

#[tokio::test]
async fn test_policy_change_applies_to_next_sale() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 1_000).await;
    let first = listing(&h.economy, "creator", 100).await;
    let second = listing(&h.economy, "creator", 100).await;

    h.economy.content.purchase("fan", &first).await.unwrap();
    h.economy
        .replace_policy(EconomyPolicy {
            commission: 0.20,
            ..h.economy.policy()
        })
        .unwrap();
    let receipt = h.economy.content.purchase("fan", &second).await.unwrap();

    assert_eq!(receipt.creator_earnings, 80);
    assert_eq!(h.economy.ledger.account("creator").await.unwrap().earned_balance, 130);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 200).await;
    let item = listing(&h.economy, "creator", 150).await;

    h.store.fail_next_writes(2);
    let receipt = h.economy.content.purchase("fan", &item).await.unwrap();
    assert_eq!(receipt.buyer_balance, 50);
    assert_eq!(h.economy.ledger.sales("creator").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_purchase_changes_nothing() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 200).await;
    let item = listing(&h.economy, "creator", 150).await;

    h.store.fail_next_writes(3);
    assert!(matches!(
        h.economy.content.purchase("fan", &item).await,
        Err(LedgerError::StoreWriteFailed(_))
    ));

    assert_eq!(h.economy.ledger.account("fan").await.unwrap().spendable_balance, 200);
    assert_eq!(h.economy.ledger.account("creator").await.unwrap().earned_balance, 0);
    assert!(h.economy.ledger.sales("creator").await.unwrap().is_empty());
    assert_eq!(h.economy.ledger.history("fan").await.unwrap().len(), 1);
    assert_eq!(
        h.economy.content.state("fan", &item).await.unwrap(),
        UnlockState::Locked
    );

    // The pair is still purchasable once the store recovers
    assert!(h.economy.content.purchase("fan", &item).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_purchases_cannot_overdraw() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 100).await;

    let mut items = Vec::new();
    for _ in 0..8 {
        items.push(listing(&h.economy, "creator", 60).await);
    }

    let mut handles = Vec::new();
    for item in items {
        let economy = h.economy.clone();
        handles.push(tokio::spawn(async move {
            economy.content.purchase("fan", &item).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(e.shortfall().is_some(), "unexpected error: {e}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(h.economy.ledger.account("fan").await.unwrap().spendable_balance, 40);
}

#[tokio::test]
async fn test_concurrent_unlocks_of_one_item() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 1_000).await;
    let item = listing(&h.economy, "creator", 50).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let economy = h.economy.clone();
        let item = item.clone();
        handles.push(tokio::spawn(async move {
            economy.content.purchase("fan", &item).await
        }));
    }
    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(h.economy.ledger.account("fan").await.unwrap().spendable_balance, 950);
    assert_eq!(h.economy.ledger.sales("creator").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_provider_failure_keeps_subscription() {
    let provider = Arc::new(DownProvider {
        calls: AtomicU32::new(0),
    });
    let h = harness_with(EconomyPolicy::default(), provider.clone());
    h.economy.ledger.open_account("sub").await.unwrap();
    h.economy
        .subscriptions
        .subscribe("sub", gold(), "card")
        .await
        .unwrap();

    assert!(matches!(
        h.economy.subscriptions.cancel("sub").await,
        Err(LedgerError::ProviderCallFailed(_))
    ));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert!(h.economy.subscriptions.current("sub").await.unwrap().is_some());
    assert!(h
        .economy
        .ledger
        .history("sub")
        .await
        .unwrap()
        .iter()
        .all(|t| t.kind != TransactionKind::SubscriptionCancel));
}

#[tokio::test]
async fn test_renewal_grants_once_per_month() {
    let h = harness();
    h.economy.ledger.open_account("sub").await.unwrap();
    h.economy
        .subscriptions
        .subscribe("sub", gold(), "card")
        .await
        .unwrap();

    // Not due yet
    assert_eq!(h.economy.subscriptions.renew_due().await.unwrap().renewed, 0);

    h.clock.advance(ChronoDuration::days(29));
    let report = h.economy.subscriptions.renew_due().await.unwrap();
    assert_eq!(report.renewed, 1);
    assert_eq!(report.failed, 0);

    // Running again in the same period grants nothing
    assert_eq!(h.economy.subscriptions.renew_due().await.unwrap().renewed, 0);
    assert_eq!(h.economy.ledger.account("sub").await.unwrap().spendable_balance, 1_000);

    let record = h.economy.subscriptions.current("sub").await.unwrap().unwrap();
    assert_eq!(
        record.renews_on,
        Utc.with_ymd_and_hms(2026, 3, 28, 9, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_cancelled_subscription_is_not_renewed() {
    let h = harness();
    h.economy.ledger.open_account("sub").await.unwrap();
    h.economy
        .subscriptions
        .subscribe("sub", gold(), "card")
        .await
        .unwrap();
    h.economy.subscriptions.cancel("sub").await.unwrap();

    h.clock.advance(ChronoDuration::days(60));
    assert_eq!(
        h.economy.subscriptions.renew_due().await.unwrap(),
        RenewalReport::default()
    );
    assert_eq!(h.economy.ledger.account("sub").await.unwrap().spendable_balance, 500);
}

#[tokio::test]
async fn test_withdrawal_denial_is_idempotent() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 200).await;
    let item = listing(&h.economy, "creator", 150).await;
    h.economy.content.purchase("fan", &item).await.unwrap();

    let ticket = h.economy.withdrawals.request_withdrawal("creator").await.unwrap();
    assert_eq!(ticket.earned_balance, 75);
    assert_eq!(ticket.payout.currency_amount, 7.5);
    let first_stamp = h
        .economy
        .ledger
        .account("creator")
        .await
        .unwrap()
        .last_withdrawal_at;

    h.clock.advance(ChronoDuration::hours(23));
    for _ in 0..3 {
        match h.economy.withdrawals.request_withdrawal("creator").await {
            Err(LedgerError::CooldownActive { remaining, .. }) => {
                assert_eq!(remaining, Duration::from_secs(3_600))
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
    }
    assert_eq!(
        h.economy.ledger.account("creator").await.unwrap().last_withdrawal_at,
        first_stamp
    );

    h.clock.advance(ChronoDuration::hours(1));
    assert!(h.economy.withdrawals.request_withdrawal("creator").await.is_ok());

    let markers = h
        .economy
        .ledger
        .history("creator")
        .await
        .unwrap()
        .iter()
        .filter(|t| t.kind == TransactionKind::WithdrawalMarker)
        .count();
    assert_eq!(markers, 2);
}

#[tokio::test]
async fn test_reward_credits_account() {
    let h = harness();
    h.economy.ledger.open_account("viewer").await.unwrap();
    let account = h.economy.rewards.grant_reward("viewer").await.unwrap();
    assert_eq!(account.spendable_balance, 10);
    assert_eq!(
        h.economy.ledger.history("viewer").await.unwrap()[0].kind,
        TransactionKind::RewardCredit
    );
}

#[tokio::test]
async fn test_balances_never_negative_under_mixed_load() {
    let h = harness();
    h.economy.ledger.open_account("creator").await.unwrap();
    funded(&h.economy, "fan", 300).await;
    let item = listing(&h.economy, "creator", 120).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let economy = h.economy.clone();
        let item = item.clone();
        handles.push(tokio::spawn(async move {
            match i % 3 {
                0 => economy.content.purchase("fan", &item).await.map(|_| ()),
                1 => economy
                    .chat
                    .send_message(Payer::Member("fan"), "creator", &"b".repeat(900))
                    .await
                    .map(|_| ()),
                _ => economy.rewards.grant_reward("fan").await.map(|_| ()),
            }
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let account = h.economy.ledger.account("fan").await.unwrap();
    let logged: i64 = h
        .economy
        .ledger
        .history("fan")
        .await
        .unwrap()
        .iter()
        .map(|t| t.amount)
        .sum();
    assert_eq!(account.spendable_balance as i64, logged);
}

#[tokio::test]
async fn test_sled_backed_economy_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let item;
    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let economy = Economy::builder()
            .store(store.clone())
            .messages(store)
            .clock(clock.clone())
            .build();
        economy.ledger.open_account("creator").await.unwrap();
        funded(&economy, "fan", 200).await;
        item = listing(&economy, "creator", 150).await;
        economy.content.purchase("fan", &item).await.unwrap();
    }

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let economy = Economy::builder()
        .store(store.clone())
        .messages(store)
        .clock(clock)
        .build();
    assert_eq!(economy.ledger.account("fan").await.unwrap().spendable_balance, 50);
    assert_eq!(economy.ledger.account("creator").await.unwrap().earned_balance, 75);
    assert!(economy.content.is_unlocked("fan", &item).await.unwrap());
    assert_eq!(
        economy.content.purchase("fan", &item).await,
        Err(LedgerError::AlreadyUnlocked(item.clone()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_renewal_worker_runs_on_interval() {
    let h = harness();
    h.economy.ledger.open_account("sub").await.unwrap();
    h.economy
        .subscriptions
        .subscribe("sub", gold(), "card")
        .await
        .unwrap();
    h.clock.advance(ChronoDuration::days(31));

    let worker = h
        .economy
        .subscriptions
        .spawn_renewal_worker(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(1)).await;
    worker.abort();

    assert_eq!(h.economy.ledger.account("sub").await.unwrap().spendable_balance, 1_000);
}
