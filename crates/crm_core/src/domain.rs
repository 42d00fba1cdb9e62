//! crates/crm_core/src/domain.rs
//!
//! Defines the canonical in-memory records for every entity kind.
//! Stored documents of either schema generation are normalised into these
//! shapes (see `normalize`) before the rest of the application sees them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{CrmError, CrmResult};
use crate::normalize::{date_value, parse_date, timestamp_value};
use crate::ports::Document;

/// Attribution stamped on events when the caller does not supply one.
pub const DEFAULT_CREATED_BY: &str = "CRM Team";

/// Wire value of `student_id` for tasks and reminders not owned by a student.
pub const STANDALONE: &str = "standalone";

//=========================================================================================
// Wire Enums
//=========================================================================================

/// Declares a closed enum with a fixed wire spelling per variant.
///
/// Parsing is lenient (case-insensitive, `-` and spaces treated as `_`) because
/// both schema generations wrote these values by hand; serialisation always
/// emits the canonical spelling.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = canonical_token(s);
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| canonical_token(v.as_str()) == wanted)
                    .ok_or_else(|| format!("'{}' is not a valid {}", s, stringify!($name)))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fn canonical_token(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

wire_enum!(
    /// Application pipeline stage. Declaration order is the progression order.
    StudentStatus {
        Exploring => "Exploring",
        Shortlisting => "Shortlisting",
        Applying => "Applying",
        Submitted => "Submitted",
    } default Exploring
);

impl StudentStatus {
    /// The stage after this one, or `None` once submitted.
    pub fn next(&self) -> Option<StudentStatus> {
        let idx = StudentStatus::ALL.iter().position(|s| s == self)?;
        StudentStatus::ALL.get(idx + 1).copied()
    }

    /// Share of the pipeline completed, counting the current stage.
    pub fn progress_percent(&self) -> u32 {
        let idx = StudentStatus::ALL.iter().position(|s| s == self).unwrap_or(0) as u32;
        (idx + 1) * 100 / StudentStatus::ALL.len() as u32
    }
}

wire_enum!(
    /// The five kinds of entry a student timeline can hold.
    EventKind {
        Interaction => "interaction",
        Communication => "communication",
        Note => "note",
        Task => "task",
        Reminder => "reminder",
    } default Note
);

impl EventKind {
    /// Key of the embedded array used by the legacy flat student layout.
    pub fn legacy_array_key(&self) -> &'static str {
        match self {
            EventKind::Interaction => "interactions",
            EventKind::Communication => "communications",
            EventKind::Note => "notes",
            EventKind::Task => "tasks",
            EventKind::Reminder => "reminders",
        }
    }
}

wire_enum!(
    CommunicationDirection {
        Inbound => "inbound",
        Outbound => "outbound",
    } default Outbound
);

wire_enum!(
    CommunicationStatus {
        Sent => "sent",
        Delivered => "delivered",
        Read => "read",
        Failed => "failed",
    } default Sent
);

wire_enum!(
    TaskStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    } default Pending
);

impl TaskStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

wire_enum!(
    TaskPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    } default Medium
);

wire_enum!(
    ReminderStatus {
        Pending => "pending",
        Sent => "sent",
        Completed => "completed",
        Cancelled => "cancelled",
    } default Pending
);

//=========================================================================================
// Students
//=========================================================================================

/// A student profile as the rest of the application sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub country: String,
    pub phone: Option<String>,
    pub grade: Option<String>,
    pub source: Option<String>,
    pub additional_data: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub status: StudentStatus,
    pub last_active: DateTime<Utc>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub high_intent: bool,
    pub needs_essay_help: bool,
}

impl Student {
    /// True when the student was never contacted or the last contact is more
    /// than `days` whole days before `now`.
    pub fn not_contacted_within(&self, days: i64, now: DateTime<Utc>) -> bool {
        match self.last_contacted_at {
            None => true,
            Some(at) => (now - at).num_days() > days,
        }
    }
}

/// Payload for creating a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub additional_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub status: StudentStatus,
    #[serde(default)]
    pub high_intent: bool,
    #[serde(default)]
    pub needs_essay_help: bool,
}

impl NewStudent {
    /// Field-level problems with this payload, in a stable order. Empty when valid.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_required(&mut errors, "name", &self.name, 100);
        if !is_plausible_email(&self.email) {
            errors.push("Valid email is required".to_string());
        }
        check_required(&mut errors, "country", &self.country, 100);
        check_optional(&mut errors, "phone", self.phone.as_deref(), 20);
        check_optional(&mut errors, "grade", self.grade.as_deref(), 10);
        check_optional(&mut errors, "source", self.source.as_deref(), 100);
        errors
    }

    pub fn validate(&self) -> CrmResult<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CrmError::Validation(errors.join("; ")))
        }
    }

    /// Builds the current-generation document written on creation.
    pub fn to_document(&self, now: DateTime<Utc>) -> Document {
        let mut doc = Map::new();
        doc.insert("name".into(), Value::String(self.name.trim().to_string()));
        doc.insert("email".into(), Value::String(self.email.trim().to_string()));
        doc.insert("country".into(), Value::String(self.country.trim().to_string()));
        doc.insert("phone".into(), opt_string(&self.phone));
        doc.insert("grade".into(), opt_string(&self.grade));
        doc.insert("source".into(), opt_string(&self.source));
        doc.insert(
            "additional_data".into(),
            self.additional_data
                .clone()
                .map(Value::Object)
                .unwrap_or(Value::Null),
        );
        doc.insert("created_at".into(), timestamp_value(now));
        doc.insert("status".into(), Value::String(self.status.as_str().into()));
        doc.insert("last_active".into(), timestamp_value(now));
        doc.insert("last_contacted_at".into(), Value::Null);
        doc.insert("high_intent".into(), Value::Bool(self.high_intent));
        doc.insert("needs_essay_help".into(), Value::Bool(self.needs_essay_help));
        doc
    }
}

fn check_required(errors: &mut Vec<String>, field: &str, value: &str, max: usize) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.push(format!("{} is required", capitalize(field)));
    } else if len > max {
        errors.push(format!("{} must be at most {} characters", capitalize(field), max));
    }
}

fn check_optional(errors: &mut Vec<String>, field: &str, value: Option<&str>, max: usize) {
    if let Some(v) = value {
        if v.chars().count() > max {
            errors.push(format!("{} must be at most {} characters", capitalize(field), max));
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_plausible_email(email: &str) -> bool {
    use std::sync::OnceLock;
    static EMAIL: OnceLock<regex::Regex> = OnceLock::new();
    let re = EMAIL.get_or_init(|| {
        regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern compiles")
    });
    re.is_match(email.trim())
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Keys that identify a student and may not change after creation.
pub const IMMUTABLE_STUDENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "email",
    "country",
    "phone",
    "grade",
    "source",
    "created_at",
    "createdAt",
];

/// A partial update of the mutable profile fields. Absent fields stay untouched.
/// `last_active` is server-stamped, so it is not accepted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudentPatch {
    #[serde(default)]
    pub status: Option<StudentStatus>,
    #[serde(default, alias = "lastContactedAt")]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "highIntent")]
    pub high_intent: Option<bool>,
    #[serde(default, alias = "needsEssayHelp")]
    pub needs_essay_help: Option<bool>,
    #[serde(default, alias = "additionalData")]
    pub additional_data: Option<Map<String, Value>>,
}

impl TryFrom<Map<String, Value>> for StudentPatch {
    type Error = CrmError;

    /// Parses a raw patch body, rejecting any attempt to touch identity fields.
    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut immutable: Vec<&str> = raw
            .keys()
            .map(String::as_str)
            .filter(|k| IMMUTABLE_STUDENT_FIELDS.contains(k))
            .collect();
        if !immutable.is_empty() {
            immutable.sort_unstable();
            return Err(CrmError::Validation(format!(
                "Immutable student fields cannot be updated: {}",
                immutable.join(", ")
            )));
        }
        serde_json::from_value(Value::Object(raw))
            .map_err(|e| CrmError::Validation(format!("Invalid student update: {}", e)))
    }
}

impl StudentPatch {
    /// The update document. `last_active` is always stamped with `now`.
    pub fn to_document(&self, now: DateTime<Utc>) -> Document {
        let mut doc = Map::new();
        if let Some(status) = self.status {
            doc.insert("status".into(), Value::String(status.as_str().into()));
        }
        doc.insert(
            "last_active".into(),
            timestamp_value(now),
        );
        if let Some(at) = self.last_contacted_at {
            doc.insert("last_contacted_at".into(), timestamp_value(at));
        }
        if let Some(v) = self.high_intent {
            doc.insert("high_intent".into(), Value::Bool(v));
        }
        if let Some(v) = self.needs_essay_help {
            doc.insert("needs_essay_help".into(), Value::Bool(v));
        }
        if let Some(data) = &self.additional_data {
            doc.insert("additional_data".into(), Value::Object(data.clone()));
        }
        doc
    }
}

//=========================================================================================
// Timeline Events
//=========================================================================================

/// Who an event belongs to. Only tasks and reminders can be standalone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ownership {
    Owned(String),
    Standalone,
}

impl Ownership {
    /// Interprets a stored `student_id`, treating blanks and the sentinel as standalone.
    pub fn from_student_id(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some(STANDALONE) => Ownership::Standalone,
            Some(id) => Ownership::Owned(id.to_string()),
        }
    }

    pub fn student_id(&self) -> Option<&str> {
        match self {
            Ownership::Owned(id) => Some(id),
            Ownership::Standalone => None,
        }
    }

    pub fn as_wire(&self) -> &str {
        self.student_id().unwrap_or(STANDALONE)
    }
}

impl Serialize for Ownership {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Ownership {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Ownership::from_student_id(raw.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub interaction_type: String,
    pub description: String,
    pub outcome: Option<String>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub communication_type: String,
    pub subject: Option<String>,
    pub content: String,
    pub direction: CommunicationDirection,
    pub status: CommunicationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Display name kept on the task itself, for board entries with no live student.
    pub student_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub title: String,
    pub description: String,
    pub reminder_date: NaiveDate,
    pub status: ReminderStatus,
}

/// The variant-specific part of a timeline event, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventDetails {
    Interaction(Interaction),
    Communication(Communication),
    Note(Note),
    Task(Task),
    Reminder(Reminder),
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetails::Interaction(_) => EventKind::Interaction,
            EventDetails::Communication(_) => EventKind::Communication,
            EventDetails::Note(_) => EventKind::Note,
            EventDetails::Task(_) => EventKind::Task,
            EventDetails::Reminder(_) => EventKind::Reminder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    #[serde(rename = "student_id")]
    pub owner: Ownership,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(flatten)]
    pub details: EventDetails,
}

impl TimelineEvent {
    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }
}

//=========================================================================================
// Event Creation Payloads
//=========================================================================================

fn default_true() -> bool {
    true
}

/// Lenient `YYYY-MM-DD` / timestamp deserialisation for date-only fields.
mod flexible_date {
    use super::*;

    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
    }

    pub fn optional<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        match raw {
            Value::Null => Ok(None),
            Value::String(ref s) if s.trim().is_empty() => Ok(None),
            other => parse_date(&other)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", other))),
        }
    }
}

/// Common head of every event document written to the store.
fn event_head(kind: EventKind, owner: &Ownership, created_by: Option<&str>, now: DateTime<Utc>) -> Document {
    let mut doc = Map::new();
    doc.insert("type".into(), Value::String(kind.as_str().into()));
    doc.insert("student_id".into(), Value::String(owner.as_wire().into()));
    doc.insert("created_at".into(), timestamp_value(now));
    doc.insert(
        "created_by".into(),
        Value::String(created_by.unwrap_or(DEFAULT_CREATED_BY).to_string()),
    );
    doc
}

/// A creation payload for one event kind.
pub trait NewEvent {
    fn kind(&self) -> EventKind;

    /// Optional attribution; `None` falls back to [`DEFAULT_CREATED_BY`].
    fn created_by(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> CrmResult<()> {
        Ok(())
    }

    /// Variant fields in current-generation keys.
    fn fields(&self) -> Document;

    fn to_document(&self, owner: &Ownership, now: DateTime<Utc>) -> Document {
        let mut doc = event_head(self.kind(), owner, self.created_by(), now);
        doc.extend(self.fields());
        doc
    }
}

fn require_text(field: &str, value: &str) -> CrmResult<()> {
    if value.trim().is_empty() {
        Err(CrmError::Validation(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInteraction {
    pub interaction_type: String,
    pub description: String,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub follow_up_required: bool,
    #[serde(default)]
    pub follow_up_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewEvent for NewInteraction {
    fn kind(&self) -> EventKind {
        EventKind::Interaction
    }

    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn validate(&self) -> CrmResult<()> {
        require_text("interaction_type", &self.interaction_type)
    }

    fn fields(&self) -> Document {
        let mut doc = Map::new();
        doc.insert("interaction_type".into(), Value::String(self.interaction_type.clone()));
        doc.insert("description".into(), Value::String(self.description.clone()));
        doc.insert("outcome".into(), opt_string(&self.outcome));
        doc.insert("follow_up_required".into(), Value::Bool(self.follow_up_required));
        doc.insert(
            "follow_up_date".into(),
            self.follow_up_date.map(timestamp_value).unwrap_or(Value::Null),
        );
        doc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommunication {
    pub communication_type: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
    #[serde(default)]
    pub direction: CommunicationDirection,
    #[serde(default)]
    pub status: CommunicationStatus,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewEvent for NewCommunication {
    fn kind(&self) -> EventKind {
        EventKind::Communication
    }

    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn validate(&self) -> CrmResult<()> {
        require_text("communication_type", &self.communication_type)
    }

    fn fields(&self) -> Document {
        let mut doc = Map::new();
        doc.insert("communication_type".into(), Value::String(self.communication_type.clone()));
        doc.insert("subject".into(), opt_string(&self.subject));
        doc.insert("content".into(), Value::String(self.content.clone()));
        doc.insert("direction".into(), Value::String(self.direction.as_str().into()));
        doc.insert("status".into(), Value::String(self.status.as_str().into()));
        doc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    #[serde(default = "default_true")]
    pub is_private: bool,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewEvent for NewNote {
    fn kind(&self) -> EventKind {
        EventKind::Note
    }

    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn validate(&self) -> CrmResult<()> {
        require_text("title", &self.title)
    }

    fn fields(&self) -> Document {
        let mut doc = Map::new();
        doc.insert("title".into(), Value::String(self.title.clone()));
        doc.insert("content".into(), Value::String(self.content.clone()));
        doc.insert("is_private".into(), Value::Bool(self.is_private));
        doc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "flexible_date::optional")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Only meaningful for board tasks; timeline tasks take their owner from the path.
    #[serde(default, alias = "studentId")]
    pub student_id: Option<String>,
    #[serde(default, alias = "studentName")]
    pub student_name: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewEvent for NewTask {
    fn kind(&self) -> EventKind {
        EventKind::Task
    }

    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn validate(&self) -> CrmResult<()> {
        require_text("title", &self.title)
    }

    fn fields(&self) -> Document {
        let mut doc = Map::new();
        doc.insert("title".into(), Value::String(self.title.clone()));
        doc.insert("description".into(), Value::String(self.description.clone()));
        doc.insert("due_date".into(), self.due_date.map(date_value).unwrap_or(Value::Null));
        doc.insert("status".into(), Value::String(self.status.as_str().into()));
        doc.insert("priority".into(), Value::String(self.priority.as_str().into()));
        if let Some(name) = &self.student_name {
            doc.insert("student_name".into(), Value::String(name.clone()));
        }
        doc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "flexible_date::required")]
    pub reminder_date: NaiveDate,
    #[serde(default)]
    pub status: ReminderStatus,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewEvent for NewReminder {
    fn kind(&self) -> EventKind {
        EventKind::Reminder
    }

    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    fn validate(&self) -> CrmResult<()> {
        require_text("title", &self.title)
    }

    fn fields(&self) -> Document {
        let mut doc = Map::new();
        doc.insert("title".into(), Value::String(self.title.clone()));
        doc.insert("description".into(), Value::String(self.description.clone()));
        doc.insert("reminder_date".into(), date_value(self.reminder_date));
        doc.insert("status".into(), Value::String(self.status.as_str().into()));
        doc
    }
}

//=========================================================================================
// Event Patches
//=========================================================================================

/// A partial update for one event kind, written in current-generation keys.
pub trait EventPatch {
    fn kind(&self) -> EventKind;
    fn to_document(&self) -> Document;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "isPrivate")]
    pub is_private: Option<bool>,
}

impl EventPatch for NotePatch {
    fn kind(&self) -> EventKind {
        EventKind::Note
    }

    fn to_document(&self) -> Document {
        let mut doc = Map::new();
        if let Some(v) = &self.title {
            doc.insert("title".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.content {
            doc.insert("content".into(), Value::String(v.clone()));
        }
        if let Some(v) = self.is_private {
            doc.insert("is_private".into(), Value::Bool(v));
        }
        doc
    }
}

/// A partial board task update. The owning student is fixed at creation, so
/// `student_id` is rejected as an unknown field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        default,
        alias = "due",
        alias = "dueDate",
        deserialize_with = "flexible_date::optional"
    )]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default, alias = "studentName")]
    pub student_name: Option<String>,
}

impl EventPatch for TaskPatch {
    fn kind(&self) -> EventKind {
        EventKind::Task
    }

    fn to_document(&self) -> Document {
        let mut doc = Map::new();
        if let Some(v) = &self.title {
            doc.insert("title".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.description {
            doc.insert("description".into(), Value::String(v.clone()));
        }
        if let Some(v) = self.due_date {
            doc.insert("due_date".into(), date_value(v));
        }
        if let Some(v) = self.status {
            doc.insert("status".into(), Value::String(v.as_str().into()));
        }
        if let Some(v) = self.priority {
            doc.insert("priority".into(), Value::String(v.as_str().into()));
        }
        if let Some(v) = &self.student_name {
            doc.insert("student_name".into(), Value::String(v.clone()));
        }
        doc
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        default,
        alias = "reminderDate",
        alias = "due",
        deserialize_with = "flexible_date::optional"
    )]
    pub reminder_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<ReminderStatus>,
}

impl EventPatch for ReminderPatch {
    fn kind(&self) -> EventKind {
        EventKind::Reminder
    }

    fn to_document(&self) -> Document {
        let mut doc = Map::new();
        if let Some(v) = &self.title {
            doc.insert("title".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.description {
            doc.insert("description".into(), Value::String(v.clone()));
        }
        if let Some(v) = self.reminder_date {
            doc.insert("reminder_date".into(), date_value(v));
        }
        if let Some(v) = self.status {
            doc.insert("status".into(), Value::String(v.as_str().into()));
        }
        doc
    }
}

//=========================================================================================
// Summaries
//=========================================================================================

/// Everything a summary generator gets to look at for one student.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryBundle {
    pub student: Student,
    pub communications: Vec<TimelineEvent>,
    pub interactions: Vec<TimelineEvent>,
    pub notes: Vec<TimelineEvent>,
}
