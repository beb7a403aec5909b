mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{ADMIN_EMAIL, FakeMailer, Harness, t0};
use laptop_checkout::{
    error::AppError,
    jobs::{EmailJob, EmailProcessor, processor::JobOutcome},
    lifecycle::Datastore,
    models::{CheckoutStatus, LaptopStatus, NotificationStatus, NotificationType, Role},
    utils::error_codes,
};

#[tokio::test]
async fn scan_scenario_hands_laptop_from_a_to_b() {
    let h = Harness::new();
    let laptop = h.add_laptop("LAP-0001", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    let b = h.add_user("b@example.com", Role::Interviewer).await;

    h.manager.checkout("LAP-0001", a.id).await.unwrap();

    let err = h.manager.checkout("LAP-0001", b.id).await.unwrap_err();
    assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    assert!(err.to_string().contains("LAP-0001"), "{err}");

    h.clock.advance(Duration::minutes(30));
    h.manager.checkin("LAP-0001", a.id).await.unwrap();
    let status = h.manager.checkout_status("LAP-0001", b.id).await.unwrap();
    assert_eq!(status.laptop.status, LaptopStatus::Available);
    assert!(status.available_actions.can_checkout);

    let second = h.manager.checkout("LAP-0001", b.id).await.unwrap();
    assert_eq!(second.user.id, b.id);
    assert_eq!(second.laptop.id, laptop.id);
    assert_eq!(second.laptop.status, LaptopStatus::CheckedOut);
}

#[tokio::test]
async fn concurrent_checkouts_of_one_laptop_leave_one_winner() {
    let h = Harness::new();
    h.add_laptop("LAP-0002", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    let b = h.add_user("b@example.com", Role::Interviewer).await;

    let (ra, rb) = tokio::join!(
        {
            let m = h.manager.clone();
            tokio::spawn(async move { m.checkout("LAP-0002", a.id).await })
        },
        {
            let m = h.manager.clone();
            tokio::spawn(async move { m.checkout("LAP-0002", b.id).await })
        },
    );
    let results = [ra.unwrap(), rb.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        failure,
        AppError::InvalidState { code, .. } | AppError::Conflict { code, .. }
            if *code == error_codes::VAL_LAPTOP_NOT_AVAILABLE
    ));

    let state = h.store.snapshot().await;
    assert_eq!(state.checkouts.iter().filter(|c| c.is_active()).count(), 1);
}

#[tokio::test]
async fn second_laptop_for_same_user_names_the_held_one() {
    let h = Harness::new();
    h.add_laptop("LAP-00000000000000A1", LaptopStatus::Available).await;
    h.add_laptop("LAP-00000000000000B2", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;

    h.manager.checkout("LAP-00000000000000A1", a.id).await.unwrap();
    let err = h.manager.checkout("LAP-00000000000000B2", a.id).await.unwrap_err();

    assert_eq!(err.code(), error_codes::BIZ_USER_HAS_ACTIVE_CHECKOUT);
    assert!(err.to_string().contains("LAP-00000000000000A1"));

    // the rejected laptop is untouched
    let other = h.store.laptop_by_unique_id("LAP-00000000000000B2").await.unwrap().unwrap();
    assert_eq!(other.status, LaptopStatus::Available);
}

#[tokio::test]
async fn checkout_requires_available_laptop_and_known_user() {
    let h = Harness::new();
    h.add_laptop("LAP-0003", LaptopStatus::Maintenance).await;
    h.add_laptop("LAP-0004", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;

    let err = h.manager.checkout("LAP-0003", a.id).await.unwrap_err();
    assert_eq!(err.code(), error_codes::VAL_LAPTOP_NOT_AVAILABLE);
    assert!(err.to_string().contains("maintenance"));

    let err = h.manager.checkout("LAP-MISSING", a.id).await.unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_FOUND_LAPTOP);

    let err = h.manager.checkout("LAP-0004", uuid::Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_FOUND_USER);
    assert!(h.store.snapshot().await.checkouts.is_empty());
}

#[tokio::test]
async fn checkout_then_checkin_completes_the_record() {
    let h = Harness::new();
    h.add_laptop("LAP-0005", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;

    let out = h.manager.checkout("LAP-0005", a.id).await.unwrap();
    h.clock.advance(Duration::minutes(95));
    let back = h.manager.checkin("LAP-0005", a.id).await.unwrap();

    assert_eq!(back.checkout.id, out.checkout.id);
    assert_eq!(back.checkout.status, CheckoutStatus::Completed);
    assert_eq!(back.laptop.status, LaptopStatus::Available);
    let checked_in_at = back.checkout.checked_in_at.unwrap();
    assert!(checked_in_at >= back.checkout.checked_out_at);

    let state = h.store.snapshot().await;
    let actions: Vec<_> = state.audit_logs.iter().map(|l| l.action.as_str()).collect();
    assert_eq!(actions, ["checkout", "checkin"]);
    assert_eq!(state.audit_logs[1].details.0["checkoutDurationMinutes"], 95);

    // no notification is ever written for a plain checkout/checkin
    assert!(state.notifications.is_empty());
    assert!(h.queue.jobs().is_empty());
}

#[tokio::test]
async fn checkin_by_someone_else_is_forbidden_and_changes_nothing() {
    let h = Harness::new();
    h.add_laptop("LAP-0006", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    let b = h.add_user("b@example.com", Role::Interviewer).await;
    h.manager.checkout("LAP-0006", a.id).await.unwrap();
    let before = h.store.snapshot().await;

    let err = h.manager.checkin("LAP-0006", b.id).await.unwrap_err();
    assert_eq!(err.code(), error_codes::PERM_UNAUTHORIZED_CHECKIN);
    assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);

    let after = h.store.snapshot().await;
    assert_eq!(after.checkouts, before.checkouts);
    assert_eq!(after.laptops, before.laptops);
    assert_eq!(after.audit_logs.len(), before.audit_logs.len());
}

#[tokio::test]
async fn checkin_of_idle_laptop_is_invalid_state() {
    let h = Harness::new();
    h.add_laptop("LAP-0007", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;

    let err = h.manager.checkin("LAP-0007", a.id).await.unwrap_err();
    assert_eq!(err.code(), error_codes::VAL_LAPTOP_NOT_CHECKED_OUT);
}

#[tokio::test]
async fn lost_then_found_records_duration_and_notifies_everyone() {
    let h = Harness::new();
    let laptop = h.add_laptop("LAP-0008", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    let finder = h.add_user("finder@example.com", Role::Interviewer).await;

    let out = h.manager.checkout("LAP-0008", a.id).await.unwrap();

    let lost = h.manager.report_lost("LAP-0008", a.id).await.unwrap();
    assert_eq!(lost.laptop.status, LaptopStatus::Maintenance);
    let state = h.store.snapshot().await;
    assert!(state.checkouts[0].is_active());
    let admin_log = &state.notifications[0];
    assert_eq!(admin_log.notification_type, NotificationType::LostFound);
    assert_eq!(admin_log.recipient_email, ADMIN_EMAIL);
    assert_eq!(admin_log.status, NotificationStatus::Pending);
    assert_eq!(
        h.queue.take(),
        vec![EmailJob::SendNotification { notification_log_id: admin_log.id }]
    );

    h.clock.set(out.checkout.checked_out_at + Duration::milliseconds(125_000));
    let event = h.manager.report_found("LAP-0008", finder.id).await.unwrap();

    assert_eq!(event.event.duration_minutes, 2);
    assert_eq!(event.event.checkout_id, out.checkout.id);
    assert_eq!(event.original_user.id, a.id);
    assert_eq!(event.finder_user.id, finder.id);
    assert_eq!(event.laptop.id, laptop.id);
    assert_eq!(event.laptop.status, LaptopStatus::Available);

    let state = h.store.snapshot().await;
    assert_eq!(state.checkouts[0].status, CheckoutStatus::Completed);
    let recipients: Vec<_> = state.notifications[1..].iter().map(|n| n.recipient_email.as_str()).collect();
    assert_eq!(recipients, ["a@example.com", "finder@example.com"]);
    assert_eq!(h.queue.take().len(), 2);
    assert_eq!(state.audit_logs.last().unwrap().details.0["durationMinutes"], 2);
}

#[tokio::test]
async fn holder_may_find_their_own_laptop() {
    let h = Harness::new();
    h.add_laptop("LAP-0009", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    h.manager.checkout("LAP-0009", a.id).await.unwrap();
    h.manager.report_lost("LAP-0009", a.id).await.unwrap();

    let event = h.manager.report_found("LAP-0009", a.id).await.unwrap();
    assert_eq!(event.original_user, event.finder_user);
}

#[tokio::test]
async fn only_the_holder_may_report_lost() {
    let h = Harness::new();
    h.add_laptop("LAP-0010", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    let b = h.add_user("b@example.com", Role::Interviewer).await;

    let err = h.manager.report_lost("LAP-0010", a.id).await.unwrap_err();
    assert_eq!(err.code(), error_codes::VAL_LAPTOP_NOT_CHECKED_OUT);

    h.manager.checkout("LAP-0010", a.id).await.unwrap();
    let err = h.manager.report_lost("LAP-0010", b.id).await.unwrap_err();
    assert_eq!(err.code(), error_codes::PERM_UNAUTHORIZED_ACTION);
    assert!(h.store.snapshot().await.notifications.is_empty());
}

#[tokio::test]
async fn report_found_needs_an_open_checkout() {
    let h = Harness::new();
    h.add_laptop("LAP-0011", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;

    let err = h.manager.report_found("LAP-0011", a.id).await.unwrap_err();
    assert_eq!(err.code(), error_codes::NOT_FOUND_CHECKOUT);
}

#[tokio::test]
async fn status_view_reflects_requester() {
    let h = Harness::new();
    h.add_laptop("LAP-0012", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    let b = h.add_user("b@example.com", Role::Interviewer).await;
    h.manager.checkout("LAP-0012", a.id).await.unwrap();

    let mine = h.manager.checkout_status("LAP-0012", a.id).await.unwrap();
    assert!(mine.available_actions.can_checkin && mine.available_actions.can_report_lost);
    assert!(!mine.available_actions.can_report_found);
    assert_eq!(mine.checkout.unwrap().user.id, a.id);

    let theirs = h.manager.checkout_status("LAP-0012", b.id).await.unwrap();
    assert!(theirs.available_actions.can_report_found);
    assert!(!theirs.available_actions.can_checkout && !theirs.available_actions.can_checkin);

    assert_eq!(h.manager.current_checkout(a.id).await.unwrap().unwrap().laptop.unique_id, "LAP-0012");
    assert!(h.manager.current_checkout(b.id).await.unwrap().is_none());
}

#[tokio::test]
async fn overdue_sweep_orders_oldest_first_and_deduplicates() {
    let h = Harness::new();
    let users = [
        h.add_user("u1@example.com", Role::Interviewer).await,
        h.add_user("u2@example.com", Role::Interviewer).await,
        h.add_user("u3@example.com", Role::Interviewer).await,
    ];
    for (i, user) in users.iter().enumerate() {
        let uid = format!("LAP-10{i}");
        h.add_laptop(&uid, LaptopStatus::Available).await;
        h.manager.checkout(&uid, user.id).await.unwrap();
        h.clock.advance(Duration::hours(1));
    }
    // checkouts at t0, t0+1h, t0+2h; now t0+3h. Move to t0+25h30m.
    h.clock.set(t0() + Duration::minutes(25 * 60 + 30));

    let sweep = h.sweep(1440);
    let report = sweep.run_once().await.unwrap();
    let state = h.store.snapshot().await;
    let expected: Vec<_> = state.checkouts[..2].iter().map(|c| c.id).collect();
    assert_eq!(report.overdue_count, 2);
    assert_eq!(report.queued_checkouts, expected);
    assert_eq!(
        h.queue.take(),
        expected
            .iter()
            .map(|&checkout_id| EmailJob::OverdueNotification { checkout_id })
            .collect::<Vec<_>>()
    );

    // deliver the first reminder, then sweep again: only the second is re-queued
    let mailer = Arc::new(FakeMailer::default());
    let processor = EmailProcessor::new(h.store.clone(), mailer.clone(), h.clock.clone());
    let outcome = processor
        .process(&EmailJob::OverdueNotification { checkout_id: expected[0] })
        .await
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Sent { .. }));
    assert_eq!(mailer.sent()[0].to, "u1@example.com");

    let again = sweep.run_once().await.unwrap();
    assert_eq!(again.overdue_count, 2);
    assert_eq!(again.queued_checkouts, vec![expected[1]]);

    // a day later the first one is due a fresh reminder
    h.queue.take();
    h.clock.advance(Duration::hours(24) + Duration::minutes(1));
    let next_day = sweep.run_once().await.unwrap();
    assert_eq!(next_day.overdue_count, 3);
    assert!(next_day.queued_checkouts.contains(&expected[0]));
}

#[tokio::test]
async fn processor_records_failures_and_skips_sent_logs() {
    let h = Harness::new();
    h.add_laptop("LAP-0013", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    h.manager.checkout("LAP-0013", a.id).await.unwrap();
    h.manager.report_lost("LAP-0013", a.id).await.unwrap();
    let job = h.queue.take().remove(0);

    let mailer = Arc::new(FakeMailer::default());
    let processor = EmailProcessor::new(h.store.clone(), mailer.clone(), h.clock.clone());

    mailer.fail(true);
    assert!(processor.process(&job).await.is_err());
    let log = h.store.snapshot().await.notifications[0].clone();
    assert_eq!(log.status, NotificationStatus::Failed);
    assert_eq!(log.retry_count, 1);
    assert!(log.error_message.is_some());

    mailer.fail(false);
    assert!(matches!(processor.process(&job).await.unwrap(), JobOutcome::Sent { .. }));
    let log = h.store.snapshot().await.notifications[0].clone();
    assert_eq!(log.status, NotificationStatus::Sent);
    assert!(log.sent_at.is_some());
    assert_eq!(mailer.sent()[0].to, ADMIN_EMAIL);

    // at-least-once redelivery does not send twice
    assert!(matches!(processor.process(&job).await.unwrap(), JobOutcome::Skipped { .. }));
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn overdue_job_for_returned_laptop_is_dropped() {
    let h = Harness::new();
    h.add_laptop("LAP-0014", LaptopStatus::Available).await;
    let a = h.add_user("a@example.com", Role::Interviewer).await;
    let out = h.manager.checkout("LAP-0014", a.id).await.unwrap();
    h.manager.checkin("LAP-0014", a.id).await.unwrap();

    let mailer = Arc::new(FakeMailer::default());
    let processor = EmailProcessor::new(h.store.clone(), mailer.clone(), h.clock.clone());
    let outcome = processor
        .process(&EmailJob::OverdueNotification { checkout_id: out.checkout.id })
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
    assert!(mailer.sent().is_empty());
    assert!(h.store.snapshot().await.notifications.is_empty());
}
