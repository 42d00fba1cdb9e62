//! crates/crm_core/src/normalize.rs
//!
//! Converts stored documents into canonical records.
//!
//! Two generations of stored data are live at once: the legacy camelCase
//! generation (`createdAt`, `highIntent`, embedded timeline arrays on the
//! student document) and the current snake_case generation with one
//! `timeline` subcollection per student. Every canonical field is looked up
//! through a precedence table (current key first, then legacy keys) and falls
//! back to a type-appropriate default. Only a missing document id is fatal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{
    Communication, EventDetails, EventKind, Interaction, Note, Ownership, Reminder, Student,
    StudentStatus, Task, TimelineEvent, DEFAULT_CREATED_BY,
};
use crate::error::{CrmError, CrmResult};
use crate::ports::Document;

//=========================================================================================
// Field Precedence Tables
//=========================================================================================

pub const CREATED_AT: &[&str] = &["created_at", "createdAt"];
pub const CREATED_BY: &[&str] = &["created_by", "createdBy"];
pub const OWNER: &[&str] = &["student_id", "studentId"];

pub const NAME: &[&str] = &["name"];
pub const EMAIL: &[&str] = &["email"];
pub const COUNTRY: &[&str] = &["country"];
pub const PHONE: &[&str] = &["phone"];
pub const GRADE: &[&str] = &["grade"];
pub const SOURCE: &[&str] = &["source"];
pub const ADDITIONAL_DATA: &[&str] = &["additional_data", "additionalData"];
pub const STATUS: &[&str] = &["status"];
pub const LAST_ACTIVE: &[&str] = &["last_active", "lastActive"];
pub const LAST_CONTACTED_AT: &[&str] = &["last_contacted_at", "lastContactedAt"];
pub const HIGH_INTENT: &[&str] = &["high_intent", "highIntent"];
pub const NEEDS_ESSAY_HELP: &[&str] = &["needs_essay_help", "needsEssayHelp"];

pub const INTERACTION_TYPE: &[&str] = &["interaction_type", "interactionType"];
pub const DESCRIPTION: &[&str] = &["description", "detail", "details"];
pub const OUTCOME: &[&str] = &["outcome"];
pub const FOLLOW_UP_REQUIRED: &[&str] = &["follow_up_required", "followUpRequired"];
pub const FOLLOW_UP_DATE: &[&str] = &["follow_up_date", "followUpDate"];

pub const COMMUNICATION_TYPE: &[&str] = &["communication_type", "communicationType", "channel"];
pub const SUBJECT: &[&str] = &["subject"];
pub const CONTENT: &[&str] = &["content", "body", "text"];
pub const DIRECTION: &[&str] = &["direction"];

pub const TITLE: &[&str] = &["title"];
pub const IS_PRIVATE: &[&str] = &["is_private", "isPrivate"];

pub const DUE_DATE: &[&str] = &["due_date", "dueDate", "due"];
pub const PRIORITY: &[&str] = &["priority"];
pub const STUDENT_NAME: &[&str] = &["student_name", "studentName"];

pub const REMINDER_DATE: &[&str] = &["reminder_date", "reminderDate", "due"];

/// In the embedded legacy arrays `type` held the category, not the event kind.
const LEGACY_CATEGORY: &[&str] = &["type"];

pub const UNKNOWN_STUDENT_NAME: &str = "Unknown Student";
pub const UNKNOWN_STUDENT_EMAIL: &str = "unknown@example.com";
pub const UNKNOWN_COUNTRY: &str = "Unknown";

//=========================================================================================
// Value Encoding (write side)
//=========================================================================================

/// Timestamps are written as fixed-width RFC 3339 UTC so they also sort as text.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

//=========================================================================================
// Value Decoding
//=========================================================================================

/// Reads any of the timestamp shapes found in stored data.
///
/// Accepts RFC 3339, naive ISO (taken as UTC), date-only (midnight UTC),
/// epoch seconds or milliseconds, and `{seconds, nanos}` style objects.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                // Anything past year ~5138 in seconds is really milliseconds.
                if i.unsigned_abs() >= 100_000_000_000 {
                    Utc.timestamp_millis_opt(i).single()
                } else {
                    Utc.timestamp_opt(i, 0).single()
                }
            } else {
                let f = n.as_f64()?;
                let secs = f.trunc() as i64;
                let nanos = ((f - f.trunc()) * 1e9).round() as u32;
                Utc.timestamp_opt(secs, nanos.min(999_999_999)).single()
            }
        }
        Value::Object(map) => {
            let secs = ["seconds", "_seconds"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_i64))?;
            let nanos = ["nanos", "nanoseconds", "_nanoseconds"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_u64))
                .unwrap_or(0);
            Utc.timestamp_opt(secs, nanos.min(999_999_999) as u32).single()
        }
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Reads a date-only value, truncating full timestamps to their UTC date.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    if let Value::String(s) = value {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return Some(date);
        }
    }
    parse_timestamp(value).map(|at| at.date_naive())
}

//=========================================================================================
// Field Lookup
//=========================================================================================

/// Precedence-ordered access to the fields of one raw document.
struct Fields<'a> {
    doc: &'a Document,
}

impl<'a> Fields<'a> {
    fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// First non-null value among `keys`.
    fn raw(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|k| self.doc.get(*k))
            .find(|v| !v.is_null())
    }

    /// First non-blank textual value among `keys`. Scalars are stringified.
    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().filter_map(|k| self.doc.get(*k)).find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    fn text_or(&self, keys: &[&str], default: &str) -> String {
        self.text(keys).unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, keys: &[&str], default: bool) -> bool {
        keys.iter()
            .filter_map(|k| self.doc.get(*k))
            .find_map(|v| match v {
                Value::Bool(b) => Some(*b),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => Some(true),
                    "false" | "no" | "0" => Some(false),
                    _ => None,
                },
                Value::Number(n) => n.as_i64().map(|i| i != 0),
                _ => None,
            })
            .unwrap_or(default)
    }

    fn timestamp(&self, keys: &[&str]) -> Option<DateTime<Utc>> {
        keys.iter()
            .filter_map(|k| self.doc.get(*k))
            .find_map(parse_timestamp)
    }

    fn date(&self, keys: &[&str]) -> Option<NaiveDate> {
        keys.iter().filter_map(|k| self.doc.get(*k)).find_map(parse_date)
    }

    fn object(&self, keys: &[&str]) -> Option<Map<String, Value>> {
        match self.raw(keys) {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        }
    }

    /// Parses an enum field, falling back to its default when absent or unknown.
    fn parsed<T: std::str::FromStr + Default>(&self, keys: &[&str]) -> T {
        match self.text(keys) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                debug!(value = %raw, field = keys[0], "unrecognised value, using default");
                T::default()
            }),
            None => T::default(),
        }
    }
}

fn require_id(entity: &'static str, id: &str) -> CrmResult<()> {
    if id.trim().is_empty() {
        Err(CrmError::MissingRequiredField {
            entity,
            field: "id",
        })
    } else {
        Ok(())
    }
}

//=========================================================================================
// Students
//=========================================================================================

/// Builds a [`Student`] from a stored document of either generation.
///
/// Corrupted legacy records missing name, email or country get placeholder
/// values instead of being rejected.
pub fn normalize_student(id: &str, doc: &Document, now: DateTime<Utc>) -> CrmResult<Student> {
    require_id("student", id)?;
    let f = Fields::new(doc);

    let status = match f.text(STATUS) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            debug!(student_id = id, value = %raw, "unknown student status, using Exploring");
            StudentStatus::Exploring
        }),
        None => StudentStatus::Exploring,
    };

    Ok(Student {
        id: id.to_string(),
        name: f.text_or(NAME, UNKNOWN_STUDENT_NAME),
        email: f.text_or(EMAIL, UNKNOWN_STUDENT_EMAIL),
        country: f.text_or(COUNTRY, UNKNOWN_COUNTRY),
        phone: f.text(PHONE),
        grade: f.text(GRADE),
        source: f.text(SOURCE),
        additional_data: f.object(ADDITIONAL_DATA),
        created_at: f.timestamp(CREATED_AT).unwrap_or(now),
        status,
        last_active: f.timestamp(LAST_ACTIVE).unwrap_or(now),
        last_contacted_at: f.timestamp(LAST_CONTACTED_AT),
        high_intent: f.flag(HIGH_INTENT, false),
        needs_essay_help: f.flag(NEEDS_ESSAY_HELP, false),
    })
}

//=========================================================================================
// Timeline Events
//=========================================================================================

/// Where a raw event document was read from. Decides ownership and which
/// legacy keys apply.
#[derive(Debug, Clone, Copy)]
pub enum EventSource<'a> {
    /// A document in `students/{id}/timeline`.
    Timeline { student_id: &'a str },
    /// An entry of an embedded array on a legacy flat student document.
    EmbeddedLegacy { student_id: &'a str },
    /// A document in the top-level `tasks` or `reminders` collections.
    Board,
}

/// The event kind a subcollection document declares, if any.
pub fn declared_kind(doc: &Document) -> Option<EventKind> {
    Fields::new(doc).text(&["type", "event_type"])?.parse().ok()
}

/// Builds a [`TimelineEvent`] of `kind` from a stored document.
pub fn normalize_event(
    kind: EventKind,
    id: &str,
    doc: &Document,
    source: EventSource<'_>,
    now: DateTime<Utc>,
) -> CrmResult<TimelineEvent> {
    require_id(kind.as_str(), id)?;
    let f = Fields::new(doc);
    let embedded = matches!(source, EventSource::EmbeddedLegacy { .. });

    let owner = match source {
        EventSource::Timeline { student_id } | EventSource::EmbeddedLegacy { student_id } => {
            Ownership::Owned(student_id.to_string())
        }
        EventSource::Board => Ownership::from_student_id(f.text(OWNER).as_deref()),
    };

    let category = |current: &[&str], fallback: &str| -> String {
        f.text(current)
            .or_else(|| if embedded { f.text(LEGACY_CATEGORY) } else { None })
            .unwrap_or_else(|| fallback.to_string())
    };

    let details = match kind {
        EventKind::Interaction => EventDetails::Interaction(Interaction {
            interaction_type: category(INTERACTION_TYPE, "other"),
            description: f.text_or(DESCRIPTION, ""),
            outcome: f.text(OUTCOME),
            follow_up_required: f.flag(FOLLOW_UP_REQUIRED, false),
            follow_up_date: f.timestamp(FOLLOW_UP_DATE),
        }),
        EventKind::Communication => EventDetails::Communication(Communication {
            communication_type: category(COMMUNICATION_TYPE, "email"),
            subject: f.text(SUBJECT),
            content: f.text_or(CONTENT, ""),
            direction: f.parsed(DIRECTION),
            status: f.parsed(STATUS),
        }),
        EventKind::Note => EventDetails::Note(Note {
            title: f.text_or(TITLE, "Note"),
            content: f.text_or(CONTENT, ""),
            is_private: f.flag(IS_PRIVATE, true),
        }),
        EventKind::Task => EventDetails::Task(Task {
            title: f.text_or(TITLE, "Task"),
            description: f.text_or(DESCRIPTION, ""),
            due_date: f.date(DUE_DATE),
            status: f.parsed(STATUS),
            priority: f.parsed(PRIORITY),
            student_name: f.text(STUDENT_NAME),
        }),
        EventKind::Reminder => EventDetails::Reminder(Reminder {
            title: f.text_or(TITLE, "Reminder"),
            description: f.text_or(DESCRIPTION, ""),
            reminder_date: f.date(REMINDER_DATE).unwrap_or_else(|| now.date_naive()),
            status: f.parsed(STATUS),
        }),
    };

    Ok(TimelineEvent {
        id: id.to_string(),
        owner,
        created_at: f.timestamp(CREATED_AT).unwrap_or(now),
        created_by: f.text_or(CREATED_BY, DEFAULT_CREATED_BY),
        details,
    })
}

/// Events embedded directly on a legacy flat student document, in array order.
///
/// Entries without their own `id` get `{student_id}-{kind}-{index}` so they stay
/// addressable across reads.
pub fn embedded_legacy_events(
    student_id: &str,
    student_doc: &Document,
    kind_filter: Option<EventKind>,
    now: DateTime<Utc>,
) -> Vec<TimelineEvent> {
    let mut events = Vec::new();
    for kind in EventKind::ALL.iter().copied() {
        if kind_filter.is_some_and(|wanted| wanted != kind) {
            continue;
        }
        let Some(Value::Array(entries)) = student_doc.get(kind.legacy_array_key()) else {
            continue;
        };
        for (index, entry) in entries.iter().enumerate() {
            let Value::Object(raw) = entry else {
                debug!(student_id, kind = %kind, index, "skipping non-object legacy entry");
                continue;
            };
            let id = Fields::new(raw)
                .text(&["id"])
                .unwrap_or_else(|| format!("{}-{}-{}", student_id, kind, index));
            let source = EventSource::EmbeddedLegacy { student_id };
            if let Ok(event) = normalize_event(kind, &id, raw, source, now) {
                events.push(event);
            }
        }
    }
    events
}
