use chrono::{Datelike, Timelike};
use remedi_core::domain::models::DayOfWeek;

use super::support::{
    DAY_MS, build_state, daily_medication, now_ms, one_time_medication, seed_user,
    weekly_medication,
};

#[tokio::test]
async fn one_time_medication_in_the_future_is_armed() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(one_time_medication(&user.id, now_ms() + 2 * DAY_MS, "08:00"))
        .await
        .expect("medication should be created");

    let next = handle
        .state
        .next_reminder_at(&medication.id, &user.id)
        .await
        .expect("next reminder should resolve")
        .expect("a job should be armed");
    assert!(next > now_ms());
}

#[tokio::test]
async fn one_time_medication_in_the_past_is_never_armed() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(one_time_medication(&user.id, now_ms() - 2 * DAY_MS, "08:00"))
        .await
        .expect("medication should be created");

    let next = handle
        .state
        .next_reminder_at(&medication.id, &user.id)
        .await
        .expect("next reminder should resolve");
    assert_eq!(next, None);
}

#[tokio::test]
async fn firing_queues_one_delivery_and_is_idempotent_within_the_day() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(one_time_medication(&user.id, now_ms() + 2 * DAY_MS, "08:00"))
        .await
        .expect("medication should be created");

    handle
        .state
        .fire_medication_reminder(&medication.id, medication.schedule_generation)
        .await
        .expect("firing should succeed");
    handle
        .state
        .fire_medication_reminder(&medication.id, medication.schedule_generation)
        .await
        .expect("duplicate firing should be a no-op");

    let deliveries = handle
        .state
        .list_deliveries(&user.id)
        .await
        .expect("deliveries should list");
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].subject.contains("Amoxicillin"));

    // The dispatcher never marks a medication taken.
    let medications = handle
        .state
        .list_medications(&user.id)
        .await
        .expect("medications should list");
    assert!(medications[0].needs_taking_today);
}

#[tokio::test]
async fn firing_after_delete_produces_no_delivery() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(one_time_medication(&user.id, now_ms() + 2 * DAY_MS, "08:00"))
        .await
        .expect("medication should be created");
    handle
        .state
        .delete_medication(&medication.id, &user.id)
        .await
        .expect("medication should delete");

    handle
        .state
        .fire_medication_reminder(&medication.id, medication.schedule_generation)
        .await
        .expect("stale firing should be a no-op");

    let deliveries = handle
        .state
        .list_deliveries(&user.id)
        .await
        .expect("deliveries should list");
    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn firing_a_completed_one_time_medication_is_a_no_op() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(one_time_medication(&user.id, now_ms() + 2 * DAY_MS, "08:00"))
        .await
        .expect("medication should be created");
    handle
        .state
        .mark_medication_taken(&medication.id, &user.id, None)
        .await
        .expect("medication should be marked taken");

    handle
        .state
        .fire_medication_reminder(&medication.id, medication.schedule_generation)
        .await
        .expect("firing should be a no-op");

    let deliveries = handle
        .state
        .list_deliveries(&user.id)
        .await
        .expect("deliveries should list");
    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn recurring_past_its_end_date_neither_notifies_nor_rearms() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(daily_medication(
            &user.id,
            now_ms() - 30 * DAY_MS,
            now_ms() - DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");

    handle
        .state
        .fire_medication_reminder(&medication.id, medication.schedule_generation)
        .await
        .expect("firing should be a no-op");

    let deliveries = handle
        .state
        .list_deliveries(&user.id)
        .await
        .expect("deliveries should list");
    assert!(deliveries.is_empty());

    let next = handle
        .state
        .next_reminder_at(&medication.id, &user.id)
        .await
        .expect("next reminder should resolve");
    assert_eq!(next, None);
}

#[tokio::test]
async fn recurring_firing_rearms_and_discards_stale_generations() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(daily_medication(
            &user.id,
            now_ms() - 7 * DAY_MS,
            now_ms() + 30 * DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");
    let first_generation = medication.schedule_generation;

    handle
        .state
        .fire_medication_reminder(&medication.id, first_generation)
        .await
        .expect("firing should succeed");

    let next = handle
        .state
        .next_reminder_at(&medication.id, &user.id)
        .await
        .expect("next reminder should resolve")
        .expect("the chain should re-arm itself");
    assert!(next > now_ms());

    // The pre-fire generation is stale now; a duplicate firing of the old
    // job must not advance the schedule or queue another message.
    handle
        .state
        .fire_medication_reminder(&medication.id, first_generation)
        .await
        .expect("stale firing should be a no-op");

    let deliveries = handle
        .state
        .list_deliveries(&user.id)
        .await
        .expect("deliveries should list");
    assert_eq!(deliveries.len(), 1);
}

#[tokio::test]
async fn weekly_reminders_land_on_the_configured_weekday() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(weekly_medication(
            &user.id,
            DayOfWeek::Monday,
            now_ms() - 14 * DAY_MS,
            now_ms() + 60 * DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");

    let next = handle
        .state
        .next_reminder_at(&medication.id, &user.id)
        .await
        .expect("next reminder should resolve")
        .expect("a job should be armed");

    let instant =
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(i64::try_from(next).unwrap())
            .expect("armed instant should be a valid timestamp");
    assert_eq!(instant.weekday(), chrono::Weekday::Mon);
    assert_eq!((instant.hour(), instant.minute()), (8, 0));
}

#[tokio::test]
async fn editing_a_medication_supersedes_its_armed_job() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(daily_medication(
            &user.id,
            now_ms() - 7 * DAY_MS,
            now_ms() + 30 * DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");
    let old_generation = medication.schedule_generation;

    let updated = handle
        .state
        .update_medication(
            &medication.id,
            &user.id,
            remedi_core::domain::models::MedicationUpdate {
                name: Some("Metformin XR".to_owned()),
                ..remedi_core::domain::models::MedicationUpdate::default()
            },
        )
        .await
        .expect("medication should update");
    assert!(updated.schedule_generation > old_generation);

    handle
        .state
        .fire_medication_reminder(&medication.id, old_generation)
        .await
        .expect("stale firing should be a no-op");
    assert!(
        handle
            .state
            .list_deliveries(&user.id)
            .await
            .expect("deliveries should list")
            .is_empty()
    );

    handle
        .state
        .fire_medication_reminder(&medication.id, updated.schedule_generation)
        .await
        .expect("current firing should deliver");
    let deliveries = handle
        .state
        .list_deliveries(&user.id)
        .await
        .expect("deliveries should list");
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].subject.contains("Metformin XR"));
}

#[tokio::test]
async fn reconciliation_rearms_medications_left_without_jobs() {
    let handle = build_state().await;
    let user = seed_user(&handle.state, "alice").await;

    let medication = handle
        .state
        .create_medication(daily_medication(
            &user.id,
            now_ms() - 7 * DAY_MS,
            now_ms() + 30 * DAY_MS,
            "08:00",
        ))
        .await
        .expect("medication should be created");

    // A medication with a pending job is left alone.
    let rearmed = handle
        .state
        .reconcile_schedules()
        .await
        .expect("reconciliation should run");
    assert_eq!(rearmed, 0);

    // Simulate the crash gap between persisting a medication and arming it
    // by dropping the job row out from under the engine.
    let store = remedi_core::storage::SqliteStore::connect(&handle.db_path)
        .await
        .expect("second store handle should connect");
    store
        .remove_jobs_for_subject(&medication.id)
        .await
        .expect("job rows should be removable");
    assert_eq!(
        handle
            .state
            .next_reminder_at(&medication.id, &user.id)
            .await
            .expect("next reminder should resolve"),
        None
    );

    let rearmed = handle
        .state
        .reconcile_schedules()
        .await
        .expect("reconciliation should run");
    assert_eq!(rearmed, 1);

    let next = handle
        .state
        .next_reminder_at(&medication.id, &user.id)
        .await
        .expect("next reminder should resolve");
    assert!(next.is_some());
}
