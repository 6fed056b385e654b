use remedi_core::domain::{
    error::DomainError,
    models::{DayOfWeek, MedicationUpdate},
};

use super::support::{
    DAY_MS, build_state, daily_medication, now_ms, one_time_medication, seed_user,
    weekly_medication,
};

#[tokio::test]
async fn weekly_medication_without_day_of_week_is_rejected() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let mut input = weekly_medication(
        &user.id,
        DayOfWeek::Monday,
        now_ms() - DAY_MS,
        now_ms() + 30 * DAY_MS,
        "08:00",
    );
    input.schedule.day_of_week = None;

    let result = handle.state.create_medication(input).await;
    assert!(matches!(result, Err(DomainError::InvalidRequest(_))));
}

#[tokio::test]
async fn one_time_medication_without_a_time_is_rejected() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let mut input = one_time_medication(&user.id, now_ms() + DAY_MS, "08:00");
    input.schedule.reminder_time = None;

    let result = handle.state.create_medication(input).await;
    assert!(matches!(result, Err(DomainError::InvalidRequest(_))));
}

#[tokio::test]
async fn recurring_range_must_not_end_before_it_starts() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let input = daily_medication(&user.id, now_ms() + 30 * DAY_MS, now_ms() + DAY_MS, "08:00");
    let result = handle.state.create_medication(input).await;
    assert!(matches!(result, Err(DomainError::InvalidRequest(_))));
}

#[tokio::test]
async fn malformed_reminder_times_are_rejected() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let input = daily_medication(&user.id, now_ms() - DAY_MS, now_ms() + 30 * DAY_MS, "8 am");
    let result = handle.state.create_medication(input).await;
    assert!(matches!(result, Err(DomainError::InvalidRequest(_))));
}

#[tokio::test]
async fn marking_taken_enforces_existence_and_ownership() {
    let handle = build_state().await;
    let alice = seed_user(&handle.state, "alice").await;
    let mallory = seed_user(&handle.state, "mallory").await;

    let missing = handle
        .state
        .mark_medication_taken("med-nope", &alice.id, None)
        .await;
    assert!(matches!(missing, Err(DomainError::NotFound(_))));

    let medication = handle
        .state
        .create_medication(one_time_medication(&alice.id, now_ms() + DAY_MS, "08:00"))
        .await
        .expect("medication should be created");

    let foreign = handle
        .state
        .mark_medication_taken(&medication.id, &mallory.id, None)
        .await;
    assert!(matches!(foreign, Err(DomainError::Unauthorized(_))));
}

#[tokio::test]
async fn marking_a_one_time_medication_taken_completes_it() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(one_time_medication(&user.id, now_ms() + DAY_MS, "08:00"))
        .await
        .expect("medication should be created");

    handle
        .state
        .mark_medication_taken(&medication.id, &user.id, Some("with water".to_owned()))
        .await
        .expect("medication should be marked taken");

    let medications = handle
        .state
        .list_medications(&user.id)
        .await
        .expect("medications should list");
    assert!(medications[0].medication.is_completed);
    assert!(!medications[0].needs_taking_today);

    let logs = handle
        .state
        .list_medication_logs(&user.id, None, None)
        .await
        .expect("logs should list");
    assert_eq!(logs.len(), 1);
    assert!(logs[0].log.was_on_time);
    assert_eq!(logs[0].log.notes.as_deref(), Some("with water"));
    let joined = logs[0].medication.as_ref().expect("medication should join");
    assert_eq!(joined.id, medication.id);
}

#[tokio::test]
async fn marking_a_recurring_medication_taken_only_covers_today() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(daily_medication(
            &user.id,
            now_ms() - DAY_MS,
            now_ms() + 30 * DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");

    handle
        .state
        .mark_medication_taken(&medication.id, &user.id, None)
        .await
        .expect("medication should be marked taken");

    let medications = handle
        .state
        .list_medications(&user.id)
        .await
        .expect("medications should list");
    assert!(!medications[0].medication.is_completed);
    assert!(!medications[0].needs_taking_today);
    assert!(medications[0].medication.last_taken_at_ms.is_some());
}

#[tokio::test]
async fn log_listing_respects_the_requested_window() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(daily_medication(
            &user.id,
            now_ms() - DAY_MS,
            now_ms() + 30 * DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");
    handle
        .state
        .mark_medication_taken(&medication.id, &user.id, None)
        .await
        .expect("medication should be marked taken");

    let before_now = handle
        .state
        .list_medication_logs(&user.id, None, Some(now_ms() - 60_000))
        .await
        .expect("logs should list");
    assert!(before_now.is_empty());

    let around_now = handle
        .state
        .list_medication_logs(&user.id, Some(now_ms() - 60_000), Some(now_ms() + 60_000))
        .await
        .expect("logs should list");
    assert_eq!(around_now.len(), 1);
}

#[tokio::test]
async fn update_revalidates_and_leaves_the_record_untouched_on_failure() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(daily_medication(
            &user.id,
            now_ms() - DAY_MS,
            now_ms() + 30 * DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");

    let result = handle
        .state
        .update_medication(
            &medication.id,
            &user.id,
            MedicationUpdate {
                end_date_ms: Some(now_ms() - 10 * DAY_MS),
                ..MedicationUpdate::default()
            },
        )
        .await;
    assert!(matches!(result, Err(DomainError::InvalidRequest(_))));

    let medications = handle
        .state
        .list_medications(&user.id)
        .await
        .expect("medications should list");
    assert_eq!(
        medications[0].medication.schedule.end_date_ms,
        medication.schedule.end_date_ms
    );
}

#[tokio::test]
async fn deletion_requires_ownership_and_removes_the_medication() {
    let handle = build_state().await;
    let alice = seed_user(&handle.state, "alice").await;
    let mallory = seed_user(&handle.state, "mallory").await;

    let medication = handle
        .state
        .create_medication(one_time_medication(&alice.id, now_ms() + DAY_MS, "08:00"))
        .await
        .expect("medication should be created");

    let foreign = handle
        .state
        .delete_medication(&medication.id, &mallory.id)
        .await;
    assert!(matches!(foreign, Err(DomainError::Unauthorized(_))));

    handle
        .state
        .delete_medication(&medication.id, &alice.id)
        .await
        .expect("owner should delete");

    let medications = handle
        .state
        .list_medications(&alice.id)
        .await
        .expect("medications should list");
    assert!(medications.is_empty());
}

#[tokio::test]
async fn sessions_resolve_users_through_the_lookup_table() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    handle
        .state
        .put_session("sess-1", &user.id)
        .await
        .expect("session should persist");

    let resolved = handle
        .state
        .find_user_by_session("sess-1")
        .await
        .expect("lookup should succeed")
        .expect("session should resolve to a user");
    assert_eq!(resolved.id, user.id);
    assert_eq!(resolved.email, user.email);

    let unknown = handle
        .state
        .find_user_by_session("sess-unknown")
        .await
        .expect("lookup should succeed");
    assert!(unknown.is_none());
}
