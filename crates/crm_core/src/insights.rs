//! crates/crm_core/src/insights.rs
//!
//! Dashboard, analytics and student summaries. Gathers what it needs from
//! the directory and timeline store, then hands off to `query`/`summary`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::directory::StudentDirectory;
use crate::domain::{EventKind, SummaryBundle, TimelineEvent};
use crate::error::CrmResult;
use crate::ports::SummaryService;
use crate::query::{self, Analytics, AnalyticsRequest, DashboardInputs, DashboardStats};
use crate::summary::{self, StudentSummary};
use crate::timeline::{FeedEntry, TimelineStore};

pub struct Insights {
    directory: Arc<StudentDirectory>,
    timeline: Arc<TimelineStore>,
    summary_timeout: Duration,
}

fn events(feed: Vec<FeedEntry>) -> Vec<TimelineEvent> {
    feed.into_iter().map(|entry| entry.event).collect()
}

impl Insights {
    pub fn new(
        directory: Arc<StudentDirectory>,
        timeline: Arc<TimelineStore>,
        summary_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            timeline,
            summary_timeout,
        }
    }

    pub async fn dashboard(&self) -> CrmResult<DashboardStats> {
        let (students, reminders, tasks, interactions, communications) = tokio::try_join!(
            self.directory.snapshot(),
            self.timeline.list_board(EventKind::Reminder),
            self.timeline.list_board(EventKind::Task),
            self.timeline.all_interactions(),
            self.timeline.all_communications(),
        )?;
        let interactions = events(interactions);
        let communications = events(communications);

        Ok(query::dashboard_stats(
            DashboardInputs {
                students: &students,
                reminders: &reminders,
                tasks: &tasks,
                interactions: &interactions,
                communications: &communications,
            },
            Utc::now(),
        ))
    }

    pub async fn analytics(&self, request: &AnalyticsRequest) -> CrmResult<Analytics> {
        request.validate()?;
        let students = self.directory.snapshot().await?;
        Ok(query::analytics(&students, request, Utc::now()))
    }

    pub async fn summary_bundle(&self, student_id: &str) -> CrmResult<SummaryBundle> {
        let student = self.directory.require(student_id).await?;
        let (communications, interactions, notes) = tokio::try_join!(
            self.timeline.list(student_id, Some(EventKind::Communication)),
            self.timeline.list(student_id, Some(EventKind::Interaction)),
            self.timeline.list(student_id, Some(EventKind::Note)),
        )?;
        Ok(SummaryBundle {
            student,
            communications,
            interactions,
            notes,
        })
    }

    pub async fn student_summary(
        &self,
        student_id: &str,
        generator: Option<&dyn SummaryService>,
    ) -> CrmResult<StudentSummary> {
        let bundle = self.summary_bundle(student_id).await?;
        Ok(summary::summarize(generator, &bundle, self.summary_timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewInteraction, NewReminder, NewStudent, StudentStatus};
    use crate::error::{CrmError, ReadFailurePolicy};
    use crate::memory::InMemoryDocumentStore;
    use crate::summary::SummarySource;
    use serde_json::json;

    async fn fixture() -> (Insights, Arc<StudentDirectory>, Arc<TimelineStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let timeline = Arc::new(TimelineStore::new(store.clone(), ReadFailurePolicy::Fail, 1000));
        let directory = Arc::new(StudentDirectory::new(
            store,
            timeline.clone(),
            ReadFailurePolicy::Fail,
            1000,
        ));
        let insights = Insights::new(directory.clone(), timeline.clone(), Duration::from_secs(1));
        (insights, directory, timeline)
    }

    fn new_student(email: &str, status: &str) -> NewStudent {
        serde_json::from_value(json!({
            "name": "Student", "email": email, "country": "Spain", "status": status
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn dashboard_aggregates_live_data() {
        let (insights, directory, timeline) = fixture().await;
        let a = directory.create(&new_student("a@example.com", "Exploring")).await.unwrap();
        directory.create(&new_student("b@example.com", "Applying")).await.unwrap();
        directory.create(&new_student("c@example.com", "Submitted")).await.unwrap();

        let interaction = NewInteraction {
            interaction_type: "call".into(),
            description: String::new(),
            outcome: None,
            follow_up_required: false,
            follow_up_date: None,
            created_by: None,
        };
        timeline.append(&a.id, &interaction).await.unwrap();
        let reminder: NewReminder = serde_json::from_value(json!({
            "title": "Old", "reminder_date": "2000-01-01"
        }))
        .unwrap();
        timeline.create_board_reminder(&reminder).await.unwrap();

        let stats = insights.dashboard().await.unwrap();
        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.applications_in_progress, 2);
        assert_eq!(stats.status_breakdown[StudentStatus::Applying.as_str()], 1);
        assert_eq!(stats.overdue_reminders, 1);
        assert_eq!(stats.changes.new_students.current, 3);
        assert_eq!(stats.changes.interactions.current, 1);
    }

    #[tokio::test]
    async fn analytics_validates_range() {
        let (insights, directory, _) = fixture().await;
        directory.create(&new_student("a@example.com", "Exploring")).await.unwrap();
        let report = insights.analytics(&AnalyticsRequest::default()).await.unwrap();
        assert_eq!(report.overview.new_students, 1);

        let bad = AnalyticsRequest {
            date_range_days: 400,
            ..Default::default()
        };
        assert!(matches!(insights.analytics(&bad).await, Err(CrmError::Validation(_))));
    }

    #[tokio::test]
    async fn summary_uses_template_without_generator() {
        let (insights, directory, _) = fixture().await;
        let s = directory.create(&new_student("a@example.com", "Applying")).await.unwrap();
        let out = insights.student_summary(&s.id, None).await.unwrap();
        assert_eq!(out.source, SummarySource::Template);
        assert!(out.summary.contains("• Initiate first contact"));

        assert!(matches!(
            insights.student_summary("missing", None).await,
            Err(CrmError::NotFound { .. })
        ));
    }
}
