//! Integration tests for the quota store over a real SQLite file
//!
//! Covers persistence across restarts, the monthly reset with the
//! short-month clamp, and plan changes pushed by the subscription mirror.

mod common;

use chatquota::error::{is_quota_exceeded, ChatQuotaError};
use chatquota::quota::{compute_next_reset, QuotaStore};
use chatquota::subscription::{HttpSubscriptionSource, SubscriptionMirror};
use common::{create_temp_store, manual_clock, reopen_store, utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_free_tier_exhaustion_blocks_eleventh_message() {
    let (store, _tmp) = create_temp_store();
    let clock = manual_clock(utc(2024, 5, 2, 9, 0));
    let quota = QuotaStore::new(store, clock, 10);
    quota.load("alice").unwrap();

    for _ in 0..10 {
        quota.record_sent().expect("within allowance");
    }

    let state = quota.snapshot();
    assert_eq!(state.count, 10);
    assert_eq!(state.percent_used(), 100);
    assert!(!state.can_send_message());

    let err = quota.record_sent().unwrap_err();
    assert!(is_quota_exceeded(&err));
    assert_eq!(quota.snapshot().count, 10);
}

#[test]
fn test_count_survives_restart() {
    let (store, tmp) = create_temp_store();
    let clock = manual_clock(utc(2024, 5, 2, 9, 0));

    let quota = QuotaStore::new(store, clock.clone(), 10);
    quota.load("alice").unwrap();
    quota.record_sent().unwrap();
    quota.record_sent().unwrap();
    let before = quota.snapshot();
    drop(quota);

    let restarted = QuotaStore::new(reopen_store(&tmp), clock, 10);
    let after = restarted.load("alice").unwrap();
    assert_eq!(after, before);
}

#[test]
fn test_users_are_tracked_separately() {
    let (store, _tmp) = create_temp_store();
    let clock = manual_clock(utc(2024, 5, 2, 9, 0));

    let alice = QuotaStore::new(store.clone(), clock.clone(), 10);
    alice.load("alice").unwrap();
    alice.record_sent().unwrap();

    let bob = QuotaStore::new(store, clock, 10);
    assert_eq!(bob.load("bob").unwrap().count, 0);
}

#[test]
fn test_end_of_january_rolls_over_in_march_after_restart() {
    let (store, tmp) = create_temp_store();
    let clock = manual_clock(utc(2024, 1, 31, 0, 0));

    let quota = QuotaStore::new(store, clock.clone(), 10);
    let state = quota.load("alice").unwrap();
    assert_eq!(state.next_reset, utc(2024, 2, 29, 0, 0));
    for _ in 0..4 {
        quota.record_sent().unwrap();
    }
    drop(quota);

    clock.set(utc(2024, 3, 1, 0, 0));
    let restarted = QuotaStore::new(reopen_store(&tmp), clock, 10);
    let state = restarted.load("alice").unwrap();

    assert_eq!(state.count, 0);
    assert_eq!(state.last_reset, utc(2024, 3, 1, 0, 0));
    assert_eq!(state.next_reset, utc(2024, 4, 1, 0, 0));
    assert_eq!(state.next_reset, compute_next_reset(state.last_reset));
}

#[test]
fn test_maybe_reset_is_idempotent_for_same_instant() {
    let (store, _tmp) = create_temp_store();
    let clock = manual_clock(utc(2024, 6, 15, 12, 0));
    let quota = QuotaStore::new(store, clock, 10);
    quota.load("alice").unwrap();
    quota.record_sent().unwrap();

    let now = utc(2024, 7, 15, 12, 0);
    assert!(quota.maybe_reset(now));
    quota.record_sent().unwrap();
    assert!(!quota.maybe_reset(now));
    assert_eq!(quota.snapshot().count, 1);
}

#[tokio::test]
async fn test_upgrade_mid_period_unblocks_without_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/alice/subscription"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tier": "standard",
            "plan": {
                "id": "standard",
                "messageLimit": 50,
                "priceAmount": 999,
                "priceCurrency": "USD",
                "features": ["history-sync"]
            },
            "periodEnd": "2024-06-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let (store, _tmp) = create_temp_store();
    let quota = QuotaStore::new(store, manual_clock(utc(2024, 5, 2, 9, 0)), 10);
    quota.load("alice").unwrap();
    for _ in 0..10 {
        quota.record_sent().unwrap();
    }
    assert!(!quota.can_send());

    let source =
        HttpSubscriptionSource::new(&server.uri(), Duration::from_secs(5), None).unwrap();
    let mirror = SubscriptionMirror::new(Arc::new(source), quota.clone(), "alice", 10);
    let mut updates = quota.subscribe();
    mirror.refresh().await.unwrap();

    let state = updates.borrow_and_update().clone();
    assert_eq!(state.limit, 50);
    assert_eq!(state.count, 10);
    assert_eq!(state.percent_used(), 20);
    assert!(quota.can_send());
    assert_eq!(quota.snapshot().last_reset, utc(2024, 5, 2, 9, 0));

    let err = {
        for _ in 10..50 {
            quota.record_sent().unwrap();
        }
        quota.record_sent().unwrap_err()
    };
    assert!(matches!(
        err.downcast_ref::<ChatQuotaError>(),
        Some(ChatQuotaError::QuotaExceeded { count: 50, limit: 50 })
    ));
}
