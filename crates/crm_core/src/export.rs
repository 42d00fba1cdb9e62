//! crates/crm_core/src/export.rs
//!
//! Renders student records as downloadable JSON or CSV.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::domain::Student;
use crate::error::{CrmError, CrmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(CrmError::Validation(format!(
                "export format must be csv or json, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        })
    }
}

/// A rendered export, ready to be sent as a file download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportPayload {
    pub file_data: String,
    pub content_type: &'static str,
    pub filename: String,
}

pub fn render(students: &[Student], format: ExportFormat) -> CrmResult<ExportPayload> {
    match format {
        ExportFormat::Json => Ok(ExportPayload {
            file_data: serde_json::to_string_pretty(students)
                .map_err(|e| CrmError::Encoding(e.to_string()))?,
            content_type: "application/json",
            filename: "students_export.json".to_string(),
        }),
        ExportFormat::Csv => Ok(ExportPayload {
            file_data: render_csv(students)?,
            content_type: "text/csv",
            filename: "students_export.csv".to_string(),
        }),
    }
}

/// The header is whatever keys a serialized record has, in declaration order,
/// so it follows the record shape without a separate column list.
fn render_csv(students: &[Student]) -> CrmResult<String> {
    let encode = |e: csv::Error| CrmError::Encoding(e.to_string());
    let rows = students
        .iter()
        .map(|s| match serde_json::to_value(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(CrmError::Encoding("student did not serialize to an object".into())),
            Err(e) => Err(CrmError::Encoding(e.to_string())),
        })
        .collect::<CrmResult<Vec<_>>>()?;

    let Some(first) = rows.first() else {
        return Ok(String::new());
    };
    let header: Vec<String> = first.keys().cloned().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header).map_err(encode)?;
    for row in &rows {
        writer
            .write_record(header.iter().map(|key| cell(row.get(key))))
            .map_err(encode)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CrmError::Encoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CrmError::Encoding(e.to_string()))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StudentStatus;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn maria() -> Student {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        Student {
            id: "s1".into(),
            name: "Maria Garcia".into(),
            email: "maria@example.com".into(),
            country: "Spain".into(),
            phone: None,
            grade: Some("12".into()),
            source: None,
            additional_data: json!({"sat": 1400}).as_object().cloned(),
            created_at: at,
            status: StudentStatus::Applying,
            last_active: at,
            last_contacted_at: None,
            high_intent: true,
            needs_essay_help: false,
        }
    }

    #[test]
    fn csv_header_follows_record_fields() {
        let payload = render(&[maria()], ExportFormat::Csv).unwrap();
        assert_eq!(payload.filename, "students_export.csv");
        assert_eq!(payload.content_type, "text/csv");

        let mut lines = payload.file_data.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,name,email,country,phone,grade,source,additional_data,created_at,status,\
             last_active,last_contacted_at,high_intent,needs_essay_help"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("s1,Maria Garcia,maria@example.com,Spain,,12,,"));
        assert!(row.contains("\"{\"\"sat\"\":1400}\""));
        assert!(row.ends_with(",Applying,2026-01-05T08:00:00Z,,true,false"));
    }

    #[test]
    fn json_export_is_an_array() {
        let payload = render(&[maria(), maria()], ExportFormat::Json).unwrap();
        let parsed: Value = serde_json::from_str(&payload.file_data).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(payload.filename, "students_export.json");
    }

    #[test]
    fn empty_csv_and_format_parsing() {
        assert_eq!(render(&[], ExportFormat::Csv).unwrap().file_data, "");
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!("xml".parse::<ExportFormat>(), Err(CrmError::Validation(_))));
    }
}
