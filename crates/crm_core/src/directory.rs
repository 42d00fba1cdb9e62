//! crates/crm_core/src/directory.rs
//!
//! The student directory: profile lifecycle, bulk import, search and export.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{NewStudent, Student, StudentPatch};
use crate::error::{CrmError, CrmResult, ReadFailurePolicy};
use crate::export::{self, ExportFormat, ExportPayload};
use crate::normalize::normalize_student;
use crate::ports::{collections, DocumentQuery, DocumentStore, PortError};
use crate::query::{self, ListStudentsQuery, SearchPage, SearchRequest};
use crate::timeline::TimelineStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub success: bool,
    pub student_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkImportRequest {
    pub students: Vec<NewStudent>,
    #[serde(default)]
    pub validate_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRowError {
    /// 1-based position in the submitted batch.
    pub row: usize,
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub validation_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkImportResult {
    pub success: bool,
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<ImportRowError>,
    pub summary: ImportSummary,
}

pub struct StudentDirectory {
    store: Arc<dyn DocumentStore>,
    timeline: Arc<TimelineStore>,
    policy: ReadFailurePolicy,
    fetch_limit: usize,
}

impl StudentDirectory {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        timeline: Arc<TimelineStore>,
        policy: ReadFailurePolicy,
        fetch_limit: usize,
    ) -> Self {
        Self {
            store,
            timeline,
            policy,
            fetch_limit,
        }
    }

    async fn email_taken(&self, email: &str) -> CrmResult<bool> {
        let query = DocumentQuery::new().where_eq("email", email.trim()).limit(1);
        Ok(!self.store.query(collections::STUDENTS, &query).await?.is_empty())
    }

    //=====================================================================================
    // Lifecycle
    //=====================================================================================

    pub async fn create(&self, new: &NewStudent) -> CrmResult<Student> {
        new.validate()?;
        if self.email_taken(&new.email).await? {
            return Err(CrmError::DuplicateEmail(new.email.trim().to_string()));
        }
        let now = Utc::now();
        let doc = new.to_document(now);
        let id = self.store.add(collections::STUDENTS, doc.clone()).await?;
        info!(student_id = %id, "student created");
        normalize_student(&id, &doc, now)
    }

    pub async fn register(&self, new: &NewStudent) -> CrmResult<Registration> {
        let student = self.create(new).await?;
        Ok(Registration {
            success: true,
            message: format!("Student {} registered successfully", student.name),
            student_id: student.id,
        })
    }

    /// `None` for an unknown id; the boundary decides what that means.
    pub async fn get(&self, id: &str) -> CrmResult<Option<Student>> {
        match self.store.get(collections::STUDENTS, id).await? {
            Some(doc) => Ok(Some(normalize_student(id, &doc, Utc::now())?)),
            None => Ok(None),
        }
    }

    pub async fn require(&self, id: &str) -> CrmResult<Student> {
        self.get(id)
            .await?
            .ok_or_else(|| CrmError::not_found("student", id))
    }

    /// Applies the fields present in `patch` and stamps `last_active`.
    pub async fn update(&self, id: &str, patch: &StudentPatch) -> CrmResult<Student> {
        match self
            .store
            .update(collections::STUDENTS, id, patch.to_document(Utc::now()))
            .await
        {
            Ok(()) => {}
            Err(PortError::NotFound(_)) => return Err(CrmError::not_found("student", id)),
            Err(e) => return Err(e.into()),
        }
        self.require(id).await
    }

    /// Removes the timeline first so a failure never leaves orphaned events
    /// behind a deleted student. Returns false when the student did not exist.
    pub async fn delete(&self, id: &str) -> CrmResult<bool> {
        if self.store.get(collections::STUDENTS, id).await?.is_none() {
            return Ok(false);
        }
        let removed = self.timeline.delete_cascade(id).await?;
        self.store.delete(collections::STUDENTS, id).await?;
        info!(student_id = id, events_removed = removed, "student deleted");
        Ok(true)
    }

    //=====================================================================================
    // Reads over the whole directory
    //=====================================================================================

    /// Every student, normalized, in store order, up to the fetch limit.
    pub async fn all(&self) -> CrmResult<Vec<Student>> {
        let docs = self
            .store
            .query(collections::STUDENTS, &DocumentQuery::new().limit(self.fetch_limit))
            .await?;
        let now = Utc::now();
        docs.iter()
            .map(|d| normalize_student(&d.id, &d.data, now))
            .collect()
    }

    /// [`Self::all`] under the read-failure policy.
    pub async fn snapshot(&self) -> CrmResult<Vec<Student>> {
        let result = self.all().await;
        self.policy.apply("student scan", result)
    }

    pub async fn list(&self, query: &ListStudentsQuery) -> CrmResult<Vec<Student>> {
        query.validate()?;
        Ok(query::list_students(self.snapshot().await?, query))
    }

    pub async fn search(&self, request: &SearchRequest) -> CrmResult<SearchPage> {
        request.validate()?;
        Ok(query::search(self.snapshot().await?, request, Utc::now()))
    }

    //=====================================================================================
    // Validation and bulk import
    //=====================================================================================

    pub async fn validate(&self, new: &NewStudent) -> ValidationReport {
        let mut errors = new.validation_errors();
        let mut warnings = Vec::new();
        match self.email_taken(&new.email).await {
            Ok(true) => errors.push("Student with this email already exists".to_string()),
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "duplicate email check failed");
                warnings.push("Could not check for duplicate email".to_string());
            }
        }
        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Imports rows in order. A failing row is recorded and the batch goes on.
    pub async fn bulk_import(&self, request: &BulkImportRequest) -> BulkImportResult {
        let mut imported = 0;
        let mut errors = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (index, new) in request.students.iter().enumerate() {
            let outcome = if request.validate_only {
                self.dry_run(new, &seen).await
            } else {
                self.create(new).await.map(|_| ())
            };
            match outcome {
                Ok(()) => {
                    imported += 1;
                    seen.insert(new.email.trim().to_string());
                }
                Err(e) => errors.push(ImportRowError {
                    row: index + 1,
                    email: new.email.clone(),
                    error: e.to_string(),
                }),
            }
        }

        let failed = errors.len();
        info!(
            total = request.students.len(),
            imported,
            failed,
            validate_only = request.validate_only,
            "bulk import finished"
        );
        BulkImportResult {
            success: failed == 0,
            imported,
            failed,
            errors,
            summary: ImportSummary {
                total: request.students.len(),
                imported,
                skipped: 0,
                validation_errors: failed,
            },
        }
    }

    /// What `create` would reject, without writing. `seen` holds the emails of
    /// earlier rows in the same batch.
    async fn dry_run(&self, new: &NewStudent, seen: &HashSet<String>) -> CrmResult<()> {
        new.validate()?;
        let email = new.email.trim();
        if seen.contains(email) || self.email_taken(email).await? {
            return Err(CrmError::DuplicateEmail(email.to_string()));
        }
        Ok(())
    }

    //=====================================================================================
    // Export
    //=====================================================================================

    pub async fn export(
        &self,
        format: ExportFormat,
        filters: Option<&ListStudentsQuery>,
    ) -> CrmResult<ExportPayload> {
        let mut students = self.all().await?;
        if let Some(filters) = filters {
            let unbounded = ListStudentsQuery {
                skip: 0,
                limit: usize::MAX,
                ..filters.clone()
            };
            students = query::list_students(students, &unbounded);
        }
        export::render(&students, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewNote, StudentStatus};
    use crate::memory::InMemoryDocumentStore;
    use crate::ports::Document;
    use serde_json::{json, Value};

    fn new_student(name: &str, email: &str) -> NewStudent {
        serde_json::from_value(json!({"name": name, "email": email, "country": "Spain"})).unwrap()
    }

    fn directory(store: Arc<InMemoryDocumentStore>) -> (StudentDirectory, Arc<TimelineStore>) {
        let timeline = Arc::new(TimelineStore::new(
            store.clone(),
            ReadFailurePolicy::Fail,
            10_000,
        ));
        (
            StudentDirectory::new(store, timeline.clone(), ReadFailurePolicy::Fail, 10_000),
            timeline,
        )
    }

    fn status_patch(status: &str) -> StudentPatch {
        let raw: Document = json!({"status": status}).as_object().cloned().unwrap();
        StudentPatch::try_from(raw).unwrap()
    }

    #[tokio::test]
    async fn create_stamps_lifecycle_fields() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store);
        let s = dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();
        assert!(!s.id.is_empty());
        assert_eq!(s.created_at, s.last_active);
        assert_eq!(s.last_contacted_at, None);
        assert_eq!(s.status, StudentStatus::Exploring);
        assert_eq!(dir.get(&s.id).await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_without_writing() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store.clone());
        dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();

        let err = dir
            .create(&new_student("Other Maria", "maria@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::DuplicateEmail(_)));
        assert_eq!(store.count(collections::STUDENTS).await, 1);

        // Exact match only.
        dir.create(&new_student("Maria", "Maria@example.com")).await.unwrap();
        assert_eq!(store.count(collections::STUDENTS).await, 2);
    }

    #[tokio::test]
    async fn get_of_unknown_id_is_none() {
        let (dir, _) = directory(Arc::new(InMemoryDocumentStore::new()));
        assert_eq!(dir.get("nope").await.unwrap(), None);
        assert!(matches!(dir.require("nope").await, Err(CrmError::NotFound { .. })));
    }

    #[tokio::test]
    async fn repeated_partial_update_converges() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store);
        let created = dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();

        let first = dir.update(&created.id, &status_patch("Applying")).await.unwrap();
        let second = dir.update(&created.id, &status_patch("Applying")).await.unwrap();

        assert_eq!(second.status, StudentStatus::Applying);
        assert!(first.last_active >= created.last_active);
        assert!(second.last_active >= first.last_active);
        let untouched = |s: &Student| {
            (
                s.name.clone(),
                s.email.clone(),
                s.country.clone(),
                s.created_at,
                s.high_intent,
                s.needs_essay_help,
                s.last_contacted_at,
            )
        };
        assert_eq!(untouched(&second), untouched(&created));
        assert_eq!(untouched(&first), untouched(&created));
    }

    #[tokio::test]
    async fn update_always_stamps_last_active_now() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .seed(
                collections::STUDENTS,
                "s1",
                json!({
                    "name": "Maria",
                    "email": "maria@example.com",
                    "country": "Spain",
                    "last_active": "2030-01-01T00:00:00Z"
                })
                .as_object()
                .cloned()
                .unwrap(),
            )
            .await;
        let (dir, _) = directory(store);

        let raw: Document = json!({"status": "Applying", "last_active": "2000-01-01T00:00:00Z"})
            .as_object()
            .cloned()
            .unwrap();
        assert!(matches!(StudentPatch::try_from(raw), Err(CrmError::Validation(_))));

        let before = Utc::now() - chrono::Duration::seconds(1);
        let updated = dir.update("s1", &status_patch("Applying")).await.unwrap();
        assert!(updated.last_active >= before);
        assert!(updated.last_active <= Utc::now());
    }

    #[tokio::test]
    async fn update_of_unknown_student_is_not_found() {
        let (dir, _) = directory(Arc::new(InMemoryDocumentStore::new()));
        assert!(matches!(
            dir.update("ghost", &status_patch("Applying")).await,
            Err(CrmError::NotFound { entity: "student", .. })
        ));
    }

    #[tokio::test]
    async fn delete_cascades_and_is_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, timeline) = directory(store.clone());
        let s = dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();
        let note = NewNote {
            title: "Recap".into(),
            content: "x".into(),
            is_private: true,
            created_by: None,
        };
        timeline.append(&s.id, &note).await.unwrap();

        assert!(dir.delete(&s.id).await.unwrap());
        assert!(timeline.list(&s.id, None).await.unwrap().is_empty());
        assert_eq!(store.count(&collections::timeline(&s.id)).await, 0);
        assert!(!dir.delete(&s.id).await.unwrap());
    }

    #[tokio::test]
    async fn store_outage_during_delete_keeps_the_student() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store.clone());
        let s = dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();
        store.set_unavailable(true);
        assert!(dir.delete(&s.id).await.is_err());
        store.set_unavailable(false);
        assert!(dir.get(&s.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_and_search_read_both_generations() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .seed(
                collections::STUDENTS,
                "legacy",
                json!({"name": "Hiroshi", "email": "h@example.org", "country": "Japan", "highIntent": true})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await;
        let (dir, _) = directory(store);
        dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();

        let query = ListStudentsQuery {
            high_intent: Some(true),
            ..Default::default()
        };
        let listed = dir.list(&query).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "legacy");

        let page = dir.search(&SearchRequest::text("JAPAN")).await.unwrap();
        assert_eq!(page.total, 1);

        let mut bad = SearchRequest::text("x");
        bad.limit = 500;
        assert!(matches!(dir.search(&bad).await, Err(CrmError::Validation(_))));
    }

    #[tokio::test]
    async fn degraded_reads_answer_empty() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let timeline = Arc::new(TimelineStore::new(store.clone(), ReadFailurePolicy::Degrade, 10));
        let dir = StudentDirectory::new(store.clone(), timeline, ReadFailurePolicy::Degrade, 10);
        store.set_unavailable(true);
        assert!(dir.list(&ListStudentsQuery::default()).await.unwrap().is_empty());
        assert_eq!(dir.search(&SearchRequest::text("a")).await.unwrap().total, 0);
        // Export is a full read and always reports failure.
        assert!(dir.export(ExportFormat::Json, None).await.is_err());
    }

    #[tokio::test]
    async fn validate_reports_errors_and_duplicates() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store.clone());
        dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();

        let report = dir.validate(&new_student("", "maria@example.com")).await;
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                "Name is required".to_string(),
                "Student with this email already exists".to_string()
            ]
        );

        store.set_unavailable(true);
        let report = dir.validate(&new_student("Sarah", "sarah@example.com")).await;
        assert!(report.valid);
        assert_eq!(report.warnings, vec!["Could not check for duplicate email".to_string()]);
    }

    #[tokio::test]
    async fn bulk_import_continues_past_failures() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store.clone());
        let request = BulkImportRequest {
            students: vec![
                new_student("Maria", "maria@example.com"),
                new_student("Bad", "not-an-email"),
                new_student("Maria Again", "maria@example.com"),
                new_student("Sarah", "sarah@example.com"),
            ],
            validate_only: false,
        };
        let result = dir.bulk_import(&request).await;
        assert!(!result.success);
        assert_eq!((result.imported, result.failed), (2, 2));
        let rows: Vec<usize> = result.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3]);
        assert!(result.errors[1].error.contains("already exists"));
        assert_eq!(result.summary.total, 4);
        assert_eq!(store.count(collections::STUDENTS).await, 2);
    }

    #[tokio::test]
    async fn validate_only_import_writes_nothing_but_sees_batch_duplicates() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store.clone());
        let request = BulkImportRequest {
            students: vec![
                new_student("Maria", "maria@example.com"),
                new_student("Maria Again", "maria@example.com"),
            ],
            validate_only: true,
        };
        let result = dir.bulk_import(&request).await;
        assert_eq!((result.imported, result.failed), (1, 1));
        assert_eq!(result.errors[0].row, 2);
        assert_eq!(store.count(collections::STUDENTS).await, 0);
    }

    #[tokio::test]
    async fn export_applies_optional_filters() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (dir, _) = directory(store);
        dir.create(&new_student("Maria", "maria@example.com")).await.unwrap();
        let mut other = new_student("Sarah", "sarah@example.com");
        other.country = "Ireland".into();
        dir.create(&other).await.unwrap();

        let all = dir.export(ExportFormat::Json, None).await.unwrap();
        let parsed: Value = serde_json::from_str(&all.file_data).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);

        let filters = ListStudentsQuery {
            country: Some("ireland".into()),
            ..Default::default()
        };
        let csv = dir.export(ExportFormat::Csv, Some(&filters)).await.unwrap();
        assert_eq!(csv.file_data.lines().count(), 2);
        assert!(csv.file_data.contains("Sarah"));
    }
}
