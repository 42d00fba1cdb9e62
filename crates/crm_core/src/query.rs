//! crates/crm_core/src/query.rs
//!
//! In-memory filtering, search, pagination and statistics over normalized
//! records. Everything here is a pure function of its inputs and `now`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{EventDetails, Student, StudentStatus, TimelineEvent};
use crate::error::{CrmError, CrmResult};

/// Threshold used by the `not_contacted_7_days` shortcut and the engagement metric.
pub const NOT_CONTACTED_DAYS: i64 = 7;

pub const MAX_LIST_LIMIT: usize = 1000;
pub const MAX_SEARCH_LIMIT: usize = 100;

//=========================================================================================
// Listing
//=========================================================================================

fn default_list_limit() -> usize {
    100
}

/// Paging and exact-match filters for the plain student list.
#[derive(Debug, Clone, Deserialize)]
pub struct ListStudentsQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub status: Option<StudentStatus>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub high_intent: Option<bool>,
    #[serde(default)]
    pub needs_essay_help: Option<bool>,
}

impl Default for ListStudentsQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_list_limit(),
            status: None,
            country: None,
            high_intent: None,
            needs_essay_help: None,
        }
    }
}

impl ListStudentsQuery {
    pub fn validate(&self) -> CrmResult<()> {
        if self.limit == 0 || self.limit > MAX_LIST_LIMIT {
            return Err(CrmError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        Ok(())
    }

    fn matches(&self, s: &Student) -> bool {
        self.status.map_or(true, |st| s.status == st)
            && self
                .country
                .as_deref()
                .map_or(true, |c| s.country.eq_ignore_ascii_case(c.trim()))
            && self.high_intent.map_or(true, |v| s.high_intent == v)
            && self.needs_essay_help.map_or(true, |v| s.needs_essay_help == v)
    }
}

/// Filters then pages. Filtering runs on normalized records so both schema
/// generations match the same way.
pub fn list_students(students: Vec<Student>, query: &ListStudentsQuery) -> Vec<Student> {
    students
        .into_iter()
        .filter(|s| query.matches(s))
        .skip(query.skip)
        .take(query.limit)
        .collect()
}

//=========================================================================================
// Search
//=========================================================================================

fn default_search_limit() -> usize {
    20
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    /// Case-insensitive substring matched against name, email and country.
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub status_filter: Option<StudentStatus>,
    #[serde(default)]
    pub country_filter: Option<String>,
    #[serde(default)]
    pub high_intent_only: bool,
    #[serde(default)]
    pub needs_essay_help_only: bool,
    #[serde(default)]
    pub not_contacted_7_days: bool,
    /// Generalised form of `not_contacted_7_days`; wins when both are set.
    #[serde(default)]
    pub not_contacted_days: Option<i64>,
}

impl SearchRequest {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_search_limit(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> CrmResult<()> {
        if self.limit == 0 || self.limit > MAX_SEARCH_LIMIT {
            return Err(CrmError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_SEARCH_LIMIT
            )));
        }
        if self.query.chars().count() > 100 {
            return Err(CrmError::Validation(
                "query must be at most 100 characters".to_string(),
            ));
        }
        if self.not_contacted_days.is_some_and(|d| d < 0) {
            return Err(CrmError::Validation(
                "not_contacted_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn contact_threshold(&self) -> Option<i64> {
        self.not_contacted_days
            .or(self.not_contacted_7_days.then_some(NOT_CONTACTED_DAYS))
    }

    fn matches(&self, s: &Student, needle: &str, now: DateTime<Utc>) -> bool {
        let text_hit = needle.is_empty()
            || s.name.to_lowercase().contains(needle)
            || s.email.to_lowercase().contains(needle)
            || s.country.to_lowercase().contains(needle);

        text_hit
            && self.status_filter.map_or(true, |st| s.status == st)
            && self
                .country_filter
                .as_deref()
                .map_or(true, |c| s.country.to_lowercase().contains(&c.trim().to_lowercase()))
            && (!self.high_intent_only || s.high_intent)
            && (!self.needs_essay_help_only || s.needs_essay_help)
            && self
                .contact_threshold()
                .map_or(true, |days| s.not_contacted_within(days, now))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub students: Vec<Student>,
    /// Matches before pagination.
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Filters as a conjunction, then applies `offset`/`limit`.
pub fn search(students: Vec<Student>, request: &SearchRequest, now: DateTime<Utc>) -> SearchPage {
    let needle = request.query.trim().to_lowercase();
    let matched: Vec<Student> = students
        .into_iter()
        .filter(|s| request.matches(s, &needle, now))
        .collect();

    let total = matched.len();
    let limit = request.limit.max(1);
    SearchPage {
        students: matched
            .into_iter()
            .skip(request.offset)
            .take(limit)
            .collect(),
        total,
        page: (request.offset / limit).saturating_add(1),
        limit,
        has_more: request.offset.saturating_add(limit) < total,
    }
}

//=========================================================================================
// Tallies
//=========================================================================================

pub fn status_breakdown(students: &[Student]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for s in students {
        *counts.entry(s.status.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn country_breakdown(students: &[Student]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for s in students {
        *counts.entry(s.country.clone()).or_insert(0) += 1;
    }
    counts
}

/// A metric for the current window compared with the window before it.
/// `previous` is `None` when no history exists to compare against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChange {
    pub current: usize,
    pub previous: Option<usize>,
    pub change_pct: Option<f64>,
}

impl PeriodChange {
    pub fn between(current: usize, previous: usize) -> Self {
        let change_pct = (previous > 0).then(|| {
            let pct = (current as f64 - previous as f64) / previous as f64 * 100.0;
            (pct * 10.0).round() / 10.0
        });
        Self {
            current,
            previous: Some(previous),
            change_pct,
        }
    }

    pub fn without_history(current: usize) -> Self {
        Self {
            current,
            previous: None,
            change_pct: None,
        }
    }
}

/// Counts timestamps in the last `days` and in the `days` before that.
fn windowed<I>(stamps: I, days: i64, now: DateTime<Utc>) -> PeriodChange
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let current_start = now - Duration::days(days);
    let previous_start = current_start - Duration::days(days);
    let (mut current, mut previous) = (0, 0);
    for at in stamps {
        if at > current_start && at <= now {
            current += 1;
        } else if at > previous_start && at <= current_start {
            previous += 1;
        }
    }
    PeriodChange::between(current, previous)
}

//=========================================================================================
// Dashboard
//=========================================================================================

/// Length of the comparison window for dashboard changes.
pub const DASHBOARD_WINDOW_DAYS: i64 = 30;

/// The records the dashboard is computed from.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardInputs<'a> {
    pub students: &'a [Student],
    pub reminders: &'a [TimelineEvent],
    pub tasks: &'a [TimelineEvent],
    pub interactions: &'a [TimelineEvent],
    pub communications: &'a [TimelineEvent],
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardChanges {
    pub total_students: PeriodChange,
    pub new_students: PeriodChange,
    pub interactions: PeriodChange,
    pub communications: PeriodChange,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_students: usize,
    pub status_breakdown: BTreeMap<String, usize>,
    pub country_breakdown: BTreeMap<String, usize>,
    pub high_intent_count: usize,
    pub needs_essay_help_count: usize,
    /// Students in `Applying` or `Submitted`.
    pub applications_in_progress: usize,
    pub upcoming_reminders: usize,
    pub overdue_reminders: usize,
    pub total_reminders: usize,
    pub open_tasks: usize,
    pub overdue_tasks: usize,
    pub total_tasks: usize,
    pub changes: DashboardChanges,
}

pub fn dashboard_stats(inputs: DashboardInputs<'_>, now: DateTime<Utc>) -> DashboardStats {
    let students = inputs.students;
    let today = now.date_naive();

    let (mut upcoming_reminders, mut overdue_reminders) = (0, 0);
    for event in inputs.reminders {
        if let EventDetails::Reminder(r) = &event.details {
            if r.reminder_date >= today {
                upcoming_reminders += 1;
            } else {
                overdue_reminders += 1;
            }
        }
    }

    let (mut open_tasks, mut overdue_tasks) = (0, 0);
    for event in inputs.tasks {
        if let EventDetails::Task(t) = &event.details {
            if t.status.is_open() {
                open_tasks += 1;
                if t.due_date.is_some_and(|due| due < today) {
                    overdue_tasks += 1;
                }
            }
        }
    }

    let created = |events: &[TimelineEvent]| -> Vec<DateTime<Utc>> {
        events.iter().map(|e| e.created_at).collect()
    };

    DashboardStats {
        total_students: students.len(),
        status_breakdown: status_breakdown(students),
        country_breakdown: country_breakdown(students),
        high_intent_count: students.iter().filter(|s| s.high_intent).count(),
        needs_essay_help_count: students.iter().filter(|s| s.needs_essay_help).count(),
        applications_in_progress: students
            .iter()
            .filter(|s| matches!(s.status, StudentStatus::Applying | StudentStatus::Submitted))
            .count(),
        upcoming_reminders,
        overdue_reminders,
        total_reminders: inputs.reminders.len(),
        open_tasks,
        overdue_tasks,
        total_tasks: inputs.tasks.len(),
        changes: DashboardChanges {
            total_students: PeriodChange::without_history(students.len()),
            new_students: windowed(
                students.iter().map(|s| s.created_at),
                DASHBOARD_WINDOW_DAYS,
                now,
            ),
            interactions: windowed(created(inputs.interactions), DASHBOARD_WINDOW_DAYS, now),
            communications: windowed(created(inputs.communications), DASHBOARD_WINDOW_DAYS, now),
        },
    }
}

//=========================================================================================
// Analytics
//=========================================================================================

fn default_range_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsRequest {
    #[serde(default = "default_range_days")]
    pub date_range_days: u32,
    #[serde(default = "default_true")]
    pub include_demographics: bool,
    #[serde(default = "default_true")]
    pub include_engagement: bool,
}

impl Default for AnalyticsRequest {
    fn default() -> Self {
        Self {
            date_range_days: default_range_days(),
            include_demographics: true,
            include_engagement: true,
        }
    }
}

impl AnalyticsRequest {
    pub fn validate(&self) -> CrmResult<()> {
        if !(1..=365).contains(&self.date_range_days) {
            return Err(CrmError::Validation(
                "date_range_days must be between 1 and 365".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsOverview {
    pub total_students: usize,
    pub new_students: usize,
    pub high_intent_students: usize,
    pub needs_essay_help_students: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementMetrics {
    /// Mean over students that have been contacted; `None` when nobody has.
    pub avg_days_since_last_contact: Option<f64>,
    pub students_not_contacted_7_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trends {
    pub new_students_this_week: usize,
    pub new_students_this_month: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub overview: AnalyticsOverview,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_breakdown: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_breakdown: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_metrics: Option<EngagementMetrics>,
    pub trends: Trends,
}

pub fn analytics(students: &[Student], request: &AnalyticsRequest, now: DateTime<Utc>) -> Analytics {
    let cutoff = now - Duration::days(i64::from(request.date_range_days));
    let recent: Vec<&Student> = students.iter().filter(|s| s.created_at >= cutoff).collect();
    let recent_since = |days: i64| {
        let since = now - Duration::days(days);
        recent.iter().filter(|s| s.created_at >= since).count()
    };

    let engagement = request.include_engagement.then(|| {
        let contact_days: Vec<f64> = students
            .iter()
            .filter_map(|s| s.last_contacted_at)
            .map(|at| (now - at).num_days() as f64)
            .collect();
        let avg = (!contact_days.is_empty()).then(|| {
            let mean = contact_days.iter().sum::<f64>() / contact_days.len() as f64;
            (mean * 10.0).round() / 10.0
        });
        EngagementMetrics {
            avg_days_since_last_contact: avg,
            students_not_contacted_7_days: students
                .iter()
                .filter(|s| s.not_contacted_within(NOT_CONTACTED_DAYS, now))
                .count(),
        }
    });

    Analytics {
        overview: AnalyticsOverview {
            total_students: students.len(),
            new_students: recent.len(),
            high_intent_students: students.iter().filter(|s| s.high_intent).count(),
            needs_essay_help_students: students.iter().filter(|s| s.needs_essay_help).count(),
        },
        status_breakdown: request.include_demographics.then(|| status_breakdown(students)),
        country_breakdown: request.include_demographics.then(|| country_breakdown(students)),
        engagement_metrics: engagement,
        trends: Trends {
            new_students_this_week: recent_since(7),
            new_students_this_month: recent_since(30),
        },
    }
}
