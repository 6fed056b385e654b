use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    application::{reminder_schedule, state::SharedState},
    domain::{
        error::DomainError,
        models::{
            DeliveryMessageRecord, DeliveryStatus, JobPayload, MedicationRecord, ReminderKind,
            ScheduledJobRecord, UserRecord,
        },
    },
    storage::now_unix_ms,
};

impl SharedState {
    /// Computes the next fire instant for a medication and registers exactly
    /// one job for it. Previously armed jobs are not retracted; the fresh
    /// generation stamped here makes their firings no-ops.
    pub(crate) async fn arm_medication(
        &self,
        medication: &MedicationRecord,
    ) -> Result<Option<u64>, DomainError> {
        let now = now_unix_ms();
        let next = reminder_schedule::next_fire_ms(
            &medication.schedule,
            medication.last_notified_at_ms,
            now,
        )
        .map_err(DomainError::InvalidRequest)?;

        // The bump happens even when nothing is armed, so a schedule edited
        // into the past also invalidates whatever job is still in flight.
        let generation = self
            .store()
            .bump_schedule_generation(&medication.id)
            .await?;

        let Some(run_at_ms) = next else {
            debug!("no upcoming occurrence for medication {}", medication.id);
            return Ok(None);
        };
        let job = ScheduledJobRecord {
            id: format!("job-{}", Uuid::new_v4()),
            run_at_ms,
            payload: JobPayload::ReminderFire {
                medication_id: medication.id.clone(),
                generation,
            },
            created_at_ms: now,
        };
        self.store().insert_scheduled_job(&job).await?;
        debug!(
            "armed reminder for medication {} at {run_at_ms}",
            medication.id
        );
        Ok(Some(run_at_ms))
    }

    /// Executes every due job. Handler failures are logged at the job
    /// boundary and the row is removed either way: a failure is terminal
    /// until a new user action re-triggers the flow.
    pub async fn tick_due_jobs(&self) -> Result<usize, DomainError> {
        let now = now_unix_ms();
        self.record_scheduler_tick(now).await;

        let due = self.store().list_due_jobs(now).await?;
        let mut executed = 0_usize;
        for job in due {
            if let Err(job_error) = self.execute_job(&job).await {
                error!("scheduled job {} failed: {job_error}", job.id);
            }
            self.store().remove_scheduled_job(&job.id).await?;
            executed = executed.saturating_add(1);
        }
        Ok(executed)
    }

    async fn execute_job(&self, job: &ScheduledJobRecord) -> Result<(), DomainError> {
        match &job.payload {
            JobPayload::ReminderFire {
                medication_id,
                generation,
            } => {
                self.fire_medication_reminder(medication_id, *generation)
                    .await
            }
            JobPayload::ReportGenerate { report_id } => self.generate_report(report_id).await,
        }
    }

    /// Delivery from the scheduler is at-least-once, so every check runs
    /// against freshly read state and duplicate firings short-circuit.
    pub async fn fire_medication_reminder(
        &self,
        medication_id: &str,
        generation: u64,
    ) -> Result<(), DomainError> {
        let Some(medication) = self.store().get_medication(medication_id).await? else {
            debug!("reminder fired for deleted medication {medication_id}");
            return Ok(());
        };

        if generation < medication.schedule_generation {
            debug!(
                "discarding stale reminder (generation {generation} < {}) for {medication_id}",
                medication.schedule_generation
            );
            return Ok(());
        }

        let now = now_unix_ms();
        match medication.schedule.kind {
            ReminderKind::OneTime => {
                if medication.is_completed {
                    debug!("medication {medication_id} already completed");
                    return Ok(());
                }
            }
            ReminderKind::Recurring => {
                if medication.schedule.end_date_ms.is_some_and(|end| end < now) {
                    debug!("schedule for medication {medication_id} has ended");
                    return Ok(());
                }
            }
        }

        if medication
            .last_notified_at_ms
            .is_some_and(|last| reminder_schedule::is_same_calendar_day(last, now))
        {
            debug!("medication {medication_id} was already notified today");
            return Ok(());
        }

        let Some(user) = self.store().get_user(&medication.user_id).await? else {
            warn!(
                "owner {} missing for medication {medication_id}",
                medication.user_id
            );
            return Ok(());
        };

        let message = reminder_message(&medication, &user, now);
        self.store().enqueue_delivery(&message).await?;
        self.store()
            .set_medication_notified(&medication.id, now)
            .await?;
        info!("queued reminder for medication {medication_id}");

        if medication.schedule.kind == ReminderKind::Recurring {
            let mut updated = medication;
            updated.last_notified_at_ms = Some(now);
            self.arm_medication(&updated).await?;
        }
        Ok(())
    }

    /// Re-arms any medication left without a pending reminder job, e.g.
    /// after a crash between persisting a medication and arming it.
    pub async fn reconcile_schedules(&self) -> Result<usize, DomainError> {
        let medications = self.store().list_all_medications().await?;
        let mut rearmed = 0_usize;

        for medication in medications {
            if medication.schedule.kind == ReminderKind::OneTime && medication.is_completed {
                continue;
            }
            if self.store().count_jobs_for_subject(&medication.id).await? > 0 {
                continue;
            }
            match self.arm_medication(&medication).await {
                Ok(Some(_)) => rearmed = rearmed.saturating_add(1),
                Ok(None) => {}
                Err(arm_error) => {
                    warn!("failed to re-arm medication {}: {arm_error}", medication.id);
                }
            }
        }

        if rearmed > 0 {
            info!("reconciliation re-armed {rearmed} medication schedules");
        }
        Ok(rearmed)
    }
}

fn reminder_message(
    medication: &MedicationRecord,
    user: &UserRecord,
    now_ms: u64,
) -> DeliveryMessageRecord {
    let description = medication
        .description
        .as_deref()
        .map(|value| format!("<p>Description: {value}</p>"))
        .unwrap_or_default();
    let body = format!(
        "<h1>Medication Reminder</h1>\
         <p>It's time to take your medicine: {}</p>{description}\
         <p>Please log in to mark this medication as taken.</p>",
        medication.name
    );

    DeliveryMessageRecord {
        id: format!("msg-{}", Uuid::new_v4()),
        user_id: user.id.clone(),
        destination: user.email.clone(),
        subject: format!("Medication Reminder: {}", medication.name),
        body,
        attachments: Vec::new(),
        status: DeliveryStatus::Pending,
        created_at_ms: now_ms,
        sent_at_ms: None,
    }
}
