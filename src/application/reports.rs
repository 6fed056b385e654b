use std::collections::HashMap;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        report_export::{self, ReportRow},
        state::SharedState,
    },
    domain::{
        error::DomainError,
        models::{
            DeliveryMessageRecord, DeliveryStatus, JobPayload, MedicationRecord, ReportRecord,
            ReportStatus, ReportType, ScheduledJobRecord, UserRecord,
        },
    },
    storage::now_unix_ms,
};

const WEEK_MS: u64 = 7 * 24 * 60 * 60 * 1_000;
const THIRTY_DAYS_MS: u64 = 30 * 24 * 60 * 60 * 1_000;

impl SharedState {
    /// Inserts a pending report row and arms an immediate generation job.
    pub async fn request_report(
        &self,
        user_id: &str,
        report_type: ReportType,
        start_date_ms: Option<u64>,
        end_date_ms: Option<u64>,
    ) -> Result<ReportRecord, DomainError> {
        if self.store().get_user(user_id).await?.is_none() {
            return Err(DomainError::NotFound(format!("user not found: {user_id}")));
        }
        if let (Some(start_ms), Some(end_ms)) = (start_date_ms, end_date_ms)
            && end_ms < start_ms
        {
            return Err(DomainError::InvalidRequest(
                "report end date must not precede its start date".to_owned(),
            ));
        }

        let now = now_unix_ms();
        let custom = report_type == ReportType::Custom;
        let report = ReportRecord {
            id: format!("report-{}", Uuid::new_v4()),
            user_id: user_id.to_owned(),
            report_type,
            start_date_ms: if custom { start_date_ms } else { None },
            end_date_ms: if custom { end_date_ms } else { None },
            status: ReportStatus::Pending,
            report_url: None,
            generated_at_ms: now,
        };
        self.store().insert_report(&report).await?;

        let job = ScheduledJobRecord {
            id: format!("job-{}", Uuid::new_v4()),
            run_at_ms: now,
            payload: JobPayload::ReportGenerate {
                report_id: report.id.clone(),
            },
            created_at_ms: now,
        };
        self.store().insert_scheduled_job(&job).await?;

        Ok(report)
    }

    pub async fn list_reports(&self, user_id: &str) -> Result<Vec<ReportRecord>, DomainError> {
        self.store().list_reports_for_user(user_id).await
    }

    /// Generation job body. The conditional pending -> processing claim makes
    /// duplicate firings a no-op; any failure past the claim is terminal and
    /// flips the report to failed.
    pub async fn generate_report(&self, report_id: &str) -> Result<(), DomainError> {
        let Some(report) = self.store().get_report(report_id).await? else {
            warn!("generation fired for missing report {report_id}");
            return Ok(());
        };

        if !self.store().claim_report_for_processing(report_id).await? {
            debug!("report {report_id} already claimed, skipping duplicate generation");
            return Ok(());
        }

        if let Err(generation_error) = self.build_report(&report).await {
            error!("report {report_id} generation failed: {generation_error}");
            self.store().set_report_failed(report_id).await?;
        }
        Ok(())
    }

    async fn build_report(&self, report: &ReportRecord) -> Result<(), DomainError> {
        let Some(user) = self.store().get_user(&report.user_id).await? else {
            return Err(DomainError::NotFound(format!(
                "user not found: {}",
                report.user_id
            )));
        };

        let now = now_unix_ms();
        let (start_ms, end_ms) = effective_window(report, now);
        let logs = self
            .store()
            .list_logs_in_window(&report.user_id, Some(start_ms), Some(end_ms))
            .await?;

        let mut medications: HashMap<String, Option<MedicationRecord>> = HashMap::new();
        let mut rows = Vec::with_capacity(logs.len());
        for log in logs {
            if !medications.contains_key(&log.medication_id) {
                let medication = self.store().get_medication(&log.medication_id).await?;
                medications.insert(log.medication_id.clone(), medication);
            }
            match medications.get(&log.medication_id).cloned().flatten() {
                Some(medication) => rows.push(ReportRow {
                    medicine_name: medication.name,
                    description: medication.description.unwrap_or_default(),
                    taken_at_ms: log.taken_at_ms,
                    on_time: log.was_on_time,
                    notes: log.notes.unwrap_or_default(),
                }),
                None => warn!(
                    "skipping log {} whose medication {} no longer exists",
                    log.id, log.medication_id
                ),
            }
        }

        let csv = report_export::render_csv(&rows);
        let export_id = self.exports().store_csv(&csv).await?;
        let url = self.exports().url_for(&export_id);
        self.store().set_report_completed(&report.id, &url).await?;

        let message = report_message(report, &user, &url, start_ms, end_ms, now);
        self.store().enqueue_delivery(&message).await?;

        info!("report {} completed with {} rows", report.id, rows.len());
        Ok(())
    }
}

fn effective_window(report: &ReportRecord, now_ms: u64) -> (u64, u64) {
    match report.report_type {
        ReportType::Weekly => (now_ms.saturating_sub(WEEK_MS), now_ms),
        ReportType::Custom => {
            let end_ms = report.end_date_ms.unwrap_or(now_ms);
            let start_ms = report
                .start_date_ms
                .unwrap_or_else(|| now_ms.saturating_sub(THIRTY_DAYS_MS));
            (start_ms, end_ms)
        }
    }
}

fn report_message(
    report: &ReportRecord,
    user: &UserRecord,
    url: &str,
    start_ms: u64,
    end_ms: u64,
    now_ms: u64,
) -> DeliveryMessageRecord {
    let label = match report.report_type {
        ReportType::Weekly => "Weekly",
        ReportType::Custom => "Custom",
    };
    let body = format!(
        "<h1>{label} Medication Report</h1>\
         <p>Hello {},</p>\
         <p>Your {} medication report is ready. You can download it from the app or click the link below:</p>\
         <p><a href=\"{url}\">Download Report</a></p>\
         <p>This report covers the period from {} to {}.</p>",
        user.name,
        label.to_lowercase(),
        report_export::format_date(start_ms),
        report_export::format_date(end_ms),
    );

    DeliveryMessageRecord {
        id: format!("msg-{}", Uuid::new_v4()),
        user_id: user.id.clone(),
        destination: user.email.clone(),
        subject: format!("Your {label} Medication Report"),
        body,
        attachments: vec![url.to_owned()],
        status: DeliveryStatus::Pending,
        created_at_ms: now_ms,
        sent_at_ms: None,
    }
}
