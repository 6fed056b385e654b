use chrono::{DateTime, Utc};

/// One exported line: a medication log joined with its medication.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub medicine_name: String,
    pub description: String,
    pub taken_at_ms: u64,
    pub on_time: bool,
    pub notes: String,
}

const CSV_HEADER: &str = "Medicine Name,Description,Taken At,On Time,Notes";

pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&escape_field(&row.medicine_name));
        out.push(',');
        out.push_str(&escape_field(&row.description));
        out.push(',');
        out.push_str(&escape_field(&format_taken_at(row.taken_at_ms)));
        out.push(',');
        out.push_str(if row.on_time { "Yes" } else { "No" });
        out.push(',');
        out.push_str(&escape_field(&row.notes));
        out.push('\n');
    }
    out
}

pub fn format_taken_at(ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).unwrap_or(i64::MAX))
        .map(|value| value.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

pub fn format_date(ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).unwrap_or(i64::MAX))
        .map(|value| value.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
