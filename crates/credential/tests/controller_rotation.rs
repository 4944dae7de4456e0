//! Integration tests for periodic renewal and secret id rotation.
//!
//! These tests verify:
//! - The rotation threshold as seen through ticks
//! - Ordering of the rotation steps against the upstream
//! - Soft failures for renewal, token revoke and secret destroy
//! - Failed secret destroys are retried on later ticks
//! - Hard failure and recovery when the new secret id cannot log in
//! - Readers observe a whole client while rotations run

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{Call, Harness, INITIAL_SECRET, request};
use pretty_assertions::assert_eq;
use warden_credential::prelude::*;
use warden_credential::{Clock, RenewalStatus};

async fn configured() -> Harness {
    common::init_tracing();
    let h = Harness::new();
    h.controller.configure(&request()).await.unwrap();
    h
}

#[tokio::test]
async fn tick_before_threshold_only_renews() {
    let h = configured().await;
    let secret = h.stored_secret().await;
    h.clock.advance(700);

    let report = h.controller.on_periodical().await.unwrap();

    assert_eq!(
        report.renewal,
        RenewalStatus::Renewed {
            lease_duration: std::time::Duration::from_secs(3600)
        }
    );
    assert_eq!(report.rotation, RotationStatus::NotDue { remaining_secs: 100 });
    assert!(report.is_clean());
    assert_eq!(h.stored_secret().await, secret);
}

#[tokio::test]
async fn tick_past_threshold_rotates() {
    let h = configured().await;
    let old_secret = h.stored_secret().await;
    let old_token = h.current_token();
    h.clock.advance(850);

    let report = h.controller.on_periodical().await.unwrap();

    assert!(matches!(report.rotation, RotationStatus::Rotated { .. }));
    assert!(report.is_clean());

    let new_secret = h.stored_secret().await;
    let new_token = h.current_token();
    assert_ne!(new_secret, old_secret);
    assert_ne!(new_token, old_token);
    assert!(!h.upstream.is_token_live(&old_token));
    assert!(!h.upstream.is_secret_valid(&old_secret));
    assert!(h.upstream.is_secret_valid(&new_secret));

    let stored = h.stored().await.unwrap();
    assert_eq!(stored.last_renew_time, Some(h.clock.now()));
}

#[tokio::test]
async fn old_secret_is_destroyed_only_after_new_login() {
    let h = configured().await;
    let old_secret = h.stored_secret().await;
    h.clock.advance(900);

    h.controller.on_periodical().await.unwrap();
    let new_secret = h.stored_secret().await;
    let calls = h.upstream.calls();

    let position = |call: &Call| calls.iter().position(|c| c == call).unwrap();
    let new_login = position(&Call::Login {
        secret_id: new_secret,
    });
    let destroy = position(&Call::Destroy {
        secret_id: old_secret.clone(),
    });
    let generate = calls
        .iter()
        .rposition(|c| matches!(c, Call::Generate { .. }))
        .unwrap();
    let revoke = calls
        .iter()
        .rposition(|c| matches!(c, Call::Revoke { .. }))
        .unwrap();

    assert!(generate < revoke);
    assert!(revoke < new_login);
    assert!(new_login < destroy);
    assert_eq!(destroy, calls.len() - 1);
}

#[tokio::test]
async fn renewal_failure_is_soft_and_bounded() {
    let h = configured().await;
    h.upstream.fail_renewals(true);
    let renews_before = count_renews(&h);

    let report = h.controller.on_periodical().await.unwrap();

    assert_eq!(report.renewal, RenewalStatus::Failed);
    assert!(matches!(report.rotation, RotationStatus::NotDue { .. }));
    assert_eq!(count_renews(&h) - renews_before, 5);

    match report.soft_failures.as_slice() {
        [SoftFailure::Renewal(CredentialError::RetriesExhausted { attempts, .. })] => {
            assert_eq!(*attempts, 5)
        }
        other => panic!("expected one renewal failure, got {other:?}"),
    }
    assert!(h.controller.api_client().is_ok());
}

#[tokio::test]
async fn renewal_failure_does_not_block_rotation() {
    let h = configured().await;
    h.upstream.fail_renewals(true);
    h.clock.advance(900);

    let report = h.controller.on_periodical().await.unwrap();

    assert_eq!(report.renewal, RenewalStatus::Failed);
    assert!(matches!(report.rotation, RotationStatus::Rotated { .. }));
    assert_eq!(report.soft_failures.len(), 1);
}

#[tokio::test]
async fn revoke_failure_is_soft() {
    let h = configured().await;
    let old_token = h.current_token();
    h.upstream.fail_revokes(true);
    h.clock.advance(900);

    let report = h.controller.on_periodical().await.unwrap();

    assert!(matches!(report.rotation, RotationStatus::Rotated { .. }));
    assert!(matches!(
        report.soft_failures.as_slice(),
        [SoftFailure::TokenRevoke(_)]
    ));
    assert!(h.upstream.is_token_live(&old_token));
    assert_ne!(h.current_token(), old_token);
}

#[tokio::test]
async fn destroy_failure_is_soft() {
    let h = configured().await;
    let old_secret = h.stored_secret().await;
    h.upstream.fail_destroys(true);
    h.clock.advance(900);

    let report = h.controller.on_periodical().await.unwrap();

    assert!(matches!(report.rotation, RotationStatus::Rotated { .. }));
    match report.soft_failures.as_slice() {
        [failure @ SoftFailure::SecretDestroy(_)] => {
            assert!(failure.to_string().starts_with("old secret id not destroyed"));
        }
        other => panic!("expected one destroy failure, got {other:?}"),
    }
    assert!(h.upstream.is_secret_valid(&old_secret));
    assert_ne!(h.stored_secret().await, old_secret);
}

#[tokio::test]
async fn undestroyed_secret_is_retried_on_later_ticks() {
    let h = configured().await;
    let old_secret = h.stored_secret().await;
    h.upstream.fail_destroys(true);
    h.clock.advance(900);
    h.controller.on_periodical().await.unwrap();
    assert!(h.upstream.is_secret_valid(&old_secret));

    // still failing: reported again and kept queued
    h.clock.advance(10);
    let report = h.controller.on_periodical().await.unwrap();
    assert!(matches!(report.rotation, RotationStatus::NotDue { .. }));
    assert!(matches!(
        report.soft_failures.as_slice(),
        [SoftFailure::SecretDestroy(_)]
    ));
    assert!(h.upstream.is_secret_valid(&old_secret));

    h.upstream.fail_destroys(false);
    h.clock.advance(10);
    let report = h.controller.on_periodical().await.unwrap();

    assert!(report.is_clean());
    assert!(!h.upstream.is_secret_valid(&old_secret));
    assert!(h.upstream.is_secret_valid(&h.stored_secret().await));
    assert_eq!(
        h.upstream.calls().last(),
        Some(&Call::Destroy {
            secret_id: old_secret.clone()
        })
    );

    let destroys_before = count_destroys(&h);
    h.clock.advance(10);
    assert!(h.controller.on_periodical().await.unwrap().is_clean());
    assert_eq!(count_destroys(&h), destroys_before);
}

#[tokio::test]
async fn failed_login_with_new_secret_clears_client_and_recovers() {
    let h = configured().await;
    h.clock.advance(900);
    h.upstream.fail_logins(true);

    let err = h.controller.on_periodical().await.unwrap_err();
    assert!(matches!(err, CredentialError::UpstreamAuth { .. }));
    assert!(matches!(
        h.controller.api_client(),
        Err(CredentialError::NotInitialized)
    ));
    let persisted = h.stored_secret().await;

    h.upstream.fail_logins(false);
    let report = h.controller.on_periodical().await.unwrap();

    assert!(matches!(report.renewal, RenewalStatus::Renewed { .. }));
    assert!(matches!(report.rotation, RotationStatus::NotDue { .. }));
    assert_eq!(h.stored_secret().await, persisted);
    assert!(h.controller.api_client().is_ok());
}

#[tokio::test]
async fn unreachable_upstream_at_startup_defers_renewal() {
    let h = Harness::new();
    h.seed(Some(0)).await;
    h.upstream.fail_logins(true);

    let report = h.controller.on_periodical().await.unwrap();

    assert_eq!(report.renewal, RenewalStatus::Failed);
    assert!(matches!(report.rotation, RotationStatus::NotDue { .. }));
    assert!(matches!(
        report.soft_failures.as_slice(),
        [SoftFailure::Renewal(CredentialError::UpstreamAuth { .. })]
    ));
}

#[tokio::test]
async fn never_rotated_record_rotates_on_first_tick() {
    let h = Harness::new();
    h.seed(None).await;

    let report = h.controller.on_periodical().await.unwrap();

    assert!(matches!(report.rotation, RotationStatus::Rotated { .. }));
    assert!(!h.upstream.is_secret_valid(INITIAL_SECRET));
    assert!(h.stored().await.unwrap().last_renew_time.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_whole_clients_during_rotation() {
    let h = configured().await;
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let controller = h.controller.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut seen = HashSet::new();
                loop {
                    let client = controller.api_client().expect("client stays published");
                    let token = client.token().expect("published client has a token");
                    seen.insert(secrecy::ExposeSecret::expose_secret(token).to_string());
                    if stop.load(Ordering::Relaxed) {
                        break seen;
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for _ in 0..5 {
        h.clock.advance(900);
        let report = h.controller.on_periodical().await.unwrap();
        assert!(matches!(report.rotation, RotationStatus::Rotated { .. }));
    }
    stop.store(true, Ordering::Relaxed);

    let issued: HashSet<String> = (1..=100).map(|n| format!("token-{n}")).collect();
    for reader in readers {
        let seen = reader.await.unwrap();
        assert!(!seen.is_empty());
        assert!(seen.is_subset(&issued));
    }
}

fn count_renews(h: &Harness) -> usize {
    h.upstream
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Renew { .. }))
        .count()
}

fn count_destroys(h: &Harness) -> usize {
    h.upstream
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Destroy { .. }))
        .count()
}
