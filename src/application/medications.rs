use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    application::{reminder_schedule, state::SharedState},
    domain::{
        error::DomainError,
        models::{
            Frequency, MedicationLogRecord, MedicationLogView, MedicationRecord, MedicationUpdate,
            MedicationView, NewMedication, ReminderKind, ReminderSchedule,
        },
    },
    storage::now_unix_ms,
};

impl SharedState {
    pub async fn create_medication(
        &self,
        input: NewMedication,
    ) -> Result<MedicationRecord, DomainError> {
        let now = now_unix_ms();
        let record = MedicationRecord {
            id: format!("med-{}", Uuid::new_v4()),
            user_id: input.user_id,
            name: input.name,
            description: input.description,
            schedule: input.schedule,
            is_completed: false,
            last_taken_at_ms: None,
            last_notified_at_ms: None,
            schedule_generation: 0,
            created_at_ms: now,
            updated_at_ms: now,
        };
        validate_medication(&record)?;

        self.store().insert_medication(&record).await?;
        self.arm_medication(&record).await?;

        // Arming stamps a fresh schedule generation; hand back the stored row.
        match self.store().get_medication(&record.id).await? {
            Some(fresh) => Ok(fresh),
            None => Ok(record),
        }
    }

    pub async fn list_medications(
        &self,
        user_id: &str,
    ) -> Result<Vec<MedicationView>, DomainError> {
        let now = now_unix_ms();
        let medications = self.store().list_medications_for_user(user_id).await?;
        Ok(medications
            .into_iter()
            .map(|medication| {
                let needs_taking_today = needs_taking_today(&medication, now);
                MedicationView {
                    medication,
                    needs_taking_today,
                }
            })
            .collect())
    }

    pub async fn update_medication(
        &self,
        medication_id: &str,
        user_id: &str,
        update: MedicationUpdate,
    ) -> Result<MedicationRecord, DomainError> {
        let mut medication = self.owned_medication(medication_id, user_id).await?;

        apply_update(&mut medication, update);
        validate_medication(&medication)?;
        medication.updated_at_ms = now_unix_ms();

        self.store().save_medication(&medication).await?;
        // Any job armed before this edit is now stale; the new generation
        // stamped here makes its firing a no-op.
        self.arm_medication(&medication).await?;

        match self.store().get_medication(medication_id).await? {
            Some(fresh) => Ok(fresh),
            None => Ok(medication),
        }
    }

    pub async fn delete_medication(
        &self,
        medication_id: &str,
        user_id: &str,
    ) -> Result<(), DomainError> {
        let medication = self.owned_medication(medication_id, user_id).await?;
        self.store().remove_medication(&medication.id).await?;

        // Best-effort: an already in-flight firing still hits the
        // missing-medication guard.
        match self.store().remove_jobs_for_subject(&medication.id).await {
            Ok(removed) => debug!("removed {removed} pending jobs for {medication_id}"),
            Err(error) => warn!("failed to clear jobs for {medication_id}: {error}"),
        }
        Ok(())
    }

    pub async fn mark_medication_taken(
        &self,
        medication_id: &str,
        user_id: &str,
        notes: Option<String>,
    ) -> Result<(), DomainError> {
        let medication = self.owned_medication(medication_id, user_id).await?;

        let log = MedicationLogRecord {
            id: format!("log-{}", Uuid::new_v4()),
            medication_id: medication.id.clone(),
            user_id: medication.user_id.clone(),
            taken_at_ms: now_unix_ms(),
            was_on_time: true,
            notes,
        };
        let complete = medication.schedule.kind == ReminderKind::OneTime;
        self.store().mark_medication_taken(&log, complete).await
    }

    pub async fn list_medication_logs(
        &self,
        user_id: &str,
        start_ms: Option<u64>,
        end_ms: Option<u64>,
    ) -> Result<Vec<MedicationLogView>, DomainError> {
        let logs = self
            .store()
            .list_logs_in_window(user_id, start_ms, end_ms)
            .await?;

        let mut medications: HashMap<String, Option<MedicationRecord>> = HashMap::new();
        for log in &logs {
            if !medications.contains_key(&log.medication_id) {
                let medication = self.store().get_medication(&log.medication_id).await?;
                medications.insert(log.medication_id.clone(), medication);
            }
        }

        Ok(logs
            .into_iter()
            .map(|log| {
                let medication = medications.get(&log.medication_id).cloned().flatten();
                MedicationLogView { log, medication }
            })
            .collect())
    }

    /// Earliest pending fire instant, surfaced for "next reminder at".
    pub async fn next_reminder_at(
        &self,
        medication_id: &str,
        user_id: &str,
    ) -> Result<Option<u64>, DomainError> {
        let medication = self.owned_medication(medication_id, user_id).await?;
        self.store().next_run_for_subject(&medication.id).await
    }

    pub(crate) async fn owned_medication(
        &self,
        medication_id: &str,
        user_id: &str,
    ) -> Result<MedicationRecord, DomainError> {
        let Some(medication) = self.store().get_medication(medication_id).await? else {
            return Err(DomainError::NotFound(format!(
                "medication not found: {medication_id}"
            )));
        };
        if medication.user_id != user_id {
            return Err(DomainError::Unauthorized(format!(
                "medication {medication_id} does not belong to this user"
            )));
        }
        Ok(medication)
    }
}

#[must_use]
pub fn needs_taking_today(medication: &MedicationRecord, now_ms: u64) -> bool {
    match medication.schedule.kind {
        ReminderKind::OneTime => !medication.is_completed,
        ReminderKind::Recurring => medication
            .last_taken_at_ms
            .is_none_or(|taken| !reminder_schedule::is_same_calendar_day(taken, now_ms)),
    }
}

fn validate_medication(medication: &MedicationRecord) -> Result<(), DomainError> {
    if medication.name.trim().is_empty() {
        return Err(DomainError::InvalidRequest(
            "medication name must not be empty".to_owned(),
        ));
    }
    if medication.user_id.trim().is_empty() {
        return Err(DomainError::InvalidRequest(
            "medication requires a userId".to_owned(),
        ));
    }
    validate_schedule(&medication.schedule).map_err(DomainError::InvalidRequest)
}

fn validate_schedule(schedule: &ReminderSchedule) -> Result<(), String> {
    if let Some(time) = schedule.reminder_time.as_deref() {
        reminder_schedule::parse_reminder_time(time)?;
    }
    for time in &schedule.reminder_times {
        reminder_schedule::parse_reminder_time(time)?;
    }

    match schedule.kind {
        ReminderKind::OneTime => {
            if schedule.reminder_date_ms.is_none() || schedule.reminder_time.is_none() {
                return Err("one-time medication requires a reminder date and time".to_owned());
            }
            if schedule.frequency.is_some()
                || schedule.start_date_ms.is_some()
                || schedule.end_date_ms.is_some()
                || schedule.day_of_week.is_some()
            {
                return Err("one-time medication must not carry recurrence fields".to_owned());
            }
        }
        ReminderKind::Recurring => {
            let Some(frequency) = schedule.frequency else {
                return Err("recurring medication requires a frequency".to_owned());
            };
            let (Some(start_ms), Some(end_ms)) = (schedule.start_date_ms, schedule.end_date_ms)
            else {
                return Err("recurring medication requires a start and end date".to_owned());
            };
            if end_ms < start_ms {
                return Err("end date must not precede start date".to_owned());
            }
            match frequency {
                Frequency::Weekly if schedule.day_of_week.is_none() => {
                    return Err("weekly medication requires a day of week".to_owned());
                }
                Frequency::Daily if schedule.day_of_week.is_some() => {
                    return Err("daily medication must not carry a day of week".to_owned());
                }
                _ => {}
            }
            if schedule.reminder_date_ms.is_some() || schedule.reminder_time.is_some() {
                return Err("recurring medication must not carry one-time fields".to_owned());
            }
        }
    }
    Ok(())
}

fn apply_update(medication: &mut MedicationRecord, update: MedicationUpdate) {
    let sets_day_of_week = update.day_of_week.is_some();

    if let Some(name) = update.name {
        medication.name = name;
    }
    if let Some(description) = update.description {
        medication.description = description;
    }
    if let Some(value) = update.reminder_date_ms {
        medication.schedule.reminder_date_ms = Some(value);
    }
    if let Some(value) = update.reminder_time {
        medication.schedule.reminder_time = Some(value);
    }
    if let Some(value) = update.day_of_week {
        medication.schedule.day_of_week = Some(value);
    }
    if let Some(value) = update.frequency {
        medication.schedule.frequency = Some(value);
    }
    if let Some(value) = update.start_date_ms {
        medication.schedule.start_date_ms = Some(value);
    }
    if let Some(value) = update.end_date_ms {
        medication.schedule.end_date_ms = Some(value);
    }
    if let Some(times) = update.reminder_times {
        medication.schedule.reminder_times = times;
    }

    // Switching weekly -> daily drops the now-meaningless weekday, unless the
    // caller explicitly set one (which validation will then reject).
    if medication.schedule.frequency == Some(Frequency::Daily) && !sets_day_of_week {
        medication.schedule.day_of_week = None;
    }
}
