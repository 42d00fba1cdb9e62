//! crates/crm_core/src/timeline.rs
//!
//! Per-student event timelines, the standalone task/reminder board, and the
//! cross-student communication/interaction feeds built on top of them.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{
    EventKind, EventPatch, NewEvent, NewReminder, NewTask, NotePatch, Ownership, TimelineEvent,
};
use crate::error::{CrmError, CrmResult, ReadFailurePolicy};
use crate::normalize::{
    declared_kind, embedded_legacy_events, normalize_event, normalize_student, EventSource,
};
use crate::ports::{
    collections, Document, DocumentQuery, DocumentStore, PortError, SortDirection, StoredDocument,
};

/// One entry of a cross-student feed: the event plus who it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub event: TimelineEvent,
    pub student_name: String,
    pub student_email: String,
}

pub struct TimelineStore {
    store: Arc<dyn DocumentStore>,
    policy: ReadFailurePolicy,
    fetch_limit: usize,
}

/// Most recent first. Stable, so equal timestamps keep their fetch order.
fn sort_newest_first(events: &mut [TimelineEvent]) {
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn board_collection(kind: EventKind) -> CrmResult<&'static str> {
    match kind {
        EventKind::Task => Ok(collections::TASKS),
        EventKind::Reminder => Ok(collections::REMINDERS),
        other => Err(CrmError::Validation(format!(
            "{} events cannot live on the standalone board",
            other
        ))),
    }
}

impl TimelineStore {
    pub fn new(store: Arc<dyn DocumentStore>, policy: ReadFailurePolicy, fetch_limit: usize) -> Self {
        Self {
            store,
            policy,
            fetch_limit,
        }
    }

    /// Runs an ordered query, re-running it unordered when the store cannot
    /// serve the ordering. Callers sort the result themselves either way.
    async fn query_with_fallback(
        &self,
        collection: &str,
        query: DocumentQuery,
    ) -> CrmResult<Vec<StoredDocument>> {
        match self.store.query(collection, &query).await {
            Ok(docs) => Ok(docs),
            Err(PortError::IndexUnavailable(detail)) => {
                debug!(collection, %detail, "ordered query unavailable, sorting in memory");
                Ok(self.store.query(collection, &query.unordered()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    //=====================================================================================
    // Per-student timelines
    //=====================================================================================

    /// Validates and persists one event in the student's timeline.
    pub async fn append<E: NewEvent + Sync>(
        &self,
        student_id: &str,
        event: &E,
    ) -> CrmResult<TimelineEvent> {
        event.validate()?;
        if self.store.get(collections::STUDENTS, student_id).await?.is_none() {
            return Err(CrmError::not_found("student", student_id));
        }

        let now = Utc::now();
        let owner = Ownership::Owned(student_id.to_string());
        let doc = event.to_document(&owner, now);
        let id = self.store.add(&collections::timeline(student_id), doc.clone()).await?;
        info!(student_id, event_id = %id, kind = %event.kind(), "timeline event created");

        normalize_event(
            event.kind(),
            &id,
            &doc,
            EventSource::Timeline { student_id },
            now,
        )
    }

    /// All events of a student, newest first, optionally restricted to one kind.
    ///
    /// Merges subcollection events with any arrays embedded on a legacy
    /// student document.
    pub async fn list(
        &self,
        student_id: &str,
        kind: Option<EventKind>,
    ) -> CrmResult<Vec<TimelineEvent>> {
        let result = self.list_strict(student_id, kind).await;
        self.policy.apply("timeline list", result)
    }

    async fn list_strict(
        &self,
        student_id: &str,
        kind: Option<EventKind>,
    ) -> CrmResult<Vec<TimelineEvent>> {
        let student_doc = self.store.get(collections::STUDENTS, student_id).await?;
        let mut events = self.subcollection_events(student_id, kind).await?;
        if let Some(doc) = &student_doc {
            events.extend(embedded_legacy_events(student_id, doc, kind, Utc::now()));
        }
        sort_newest_first(&mut events);
        Ok(events)
    }

    async fn subcollection_events(
        &self,
        student_id: &str,
        kind: Option<EventKind>,
    ) -> CrmResult<Vec<TimelineEvent>> {
        let mut query = DocumentQuery::new().order_by("created_at", SortDirection::Descending);
        if let Some(kind) = kind {
            query = query.where_eq("type", kind.as_str());
        }
        let docs = self
            .query_with_fallback(&collections::timeline(student_id), query)
            .await?;

        let now = Utc::now();
        let source = EventSource::Timeline { student_id };
        let mut events = Vec::with_capacity(docs.len());
        for doc in docs {
            let Some(doc_kind) = declared_kind(&doc.data) else {
                warn!(student_id, event_id = %doc.id, "timeline document without a known type, skipping");
                continue;
            };
            if kind.is_some_and(|wanted| wanted != doc_kind) {
                continue;
            }
            events.push(normalize_event(doc_kind, &doc.id, &doc.data, source, now)?);
        }
        Ok(events)
    }

    /// Deletes every subcollection event owned by the student. Any failure is
    /// returned so the caller can keep the student document in place.
    pub async fn delete_cascade(&self, student_id: &str) -> CrmResult<usize> {
        let collection = collections::timeline(student_id);
        let docs = self.store.query(&collection, &DocumentQuery::new()).await?;
        for doc in &docs {
            self.store.delete(&collection, &doc.id).await?;
        }
        info!(student_id, deleted = docs.len(), "timeline cascade complete");
        Ok(docs.len())
    }

    async fn timeline_doc(
        &self,
        student_id: &str,
        event_id: &str,
        kind: EventKind,
    ) -> CrmResult<Option<Document>> {
        let doc = self
            .store
            .get(&collections::timeline(student_id), event_id)
            .await?;
        Ok(doc.filter(|d| declared_kind(d) == Some(kind)))
    }

    pub async fn update_note(
        &self,
        student_id: &str,
        note_id: &str,
        patch: &NotePatch,
    ) -> CrmResult<TimelineEvent> {
        let collection = collections::timeline(student_id);
        if self.timeline_doc(student_id, note_id, patch.kind()).await?.is_none() {
            return Err(CrmError::not_found("note", note_id));
        }
        self.store.update(&collection, note_id, patch.to_document()).await?;

        let doc = self
            .timeline_doc(student_id, note_id, patch.kind())
            .await?
            .ok_or_else(|| CrmError::not_found("note", note_id))?;
        normalize_event(
            EventKind::Note,
            note_id,
            &doc,
            EventSource::Timeline { student_id },
            Utc::now(),
        )
    }

    /// Returns false when the note did not exist.
    pub async fn delete_note(&self, student_id: &str, note_id: &str) -> CrmResult<bool> {
        if self.timeline_doc(student_id, note_id, EventKind::Note).await?.is_none() {
            return Ok(false);
        }
        self.store
            .delete(&collections::timeline(student_id), note_id)
            .await?;
        Ok(true)
    }

    //=====================================================================================
    // Standalone board
    //=====================================================================================

    /// Every task or reminder on the board, newest first.
    pub async fn list_board(&self, kind: EventKind) -> CrmResult<Vec<TimelineEvent>> {
        let result = self.list_board_strict(kind).await;
        self.policy.apply("board list", result)
    }

    async fn list_board_strict(&self, kind: EventKind) -> CrmResult<Vec<TimelineEvent>> {
        let collection = board_collection(kind)?;
        let query = DocumentQuery::new()
            .order_by("created_at", SortDirection::Descending)
            .limit(self.fetch_limit);
        let docs = self.query_with_fallback(collection, query).await?;
        let now = Utc::now();
        let mut events = docs
            .iter()
            .map(|d| normalize_event(kind, &d.id, &d.data, EventSource::Board, now))
            .collect::<CrmResult<Vec<_>>>()?;
        sort_newest_first(&mut events);
        Ok(events)
    }

    /// Creates a board task. It may still name a student it relates to.
    pub async fn create_board_task(&self, task: &NewTask) -> CrmResult<TimelineEvent> {
        let owner = Ownership::from_student_id(task.student_id.as_deref());
        self.create_on_board(&owner, task).await
    }

    pub async fn create_board_reminder(&self, reminder: &NewReminder) -> CrmResult<TimelineEvent> {
        self.create_on_board(&Ownership::Standalone, reminder).await
    }

    async fn create_on_board<E: NewEvent + Sync>(
        &self,
        owner: &Ownership,
        event: &E,
    ) -> CrmResult<TimelineEvent> {
        event.validate()?;
        let collection = board_collection(event.kind())?;
        let now = Utc::now();
        let doc = event.to_document(owner, now);
        let id = self.store.add(collection, doc.clone()).await?;
        info!(event_id = %id, kind = %event.kind(), owner = owner.as_wire(), "board entry created");
        normalize_event(event.kind(), &id, &doc, EventSource::Board, now)
    }

    /// Applies a partial update to a board entry and returns the stored result.
    pub async fn update_board<P: EventPatch + Sync>(
        &self,
        id: &str,
        patch: &P,
    ) -> CrmResult<TimelineEvent> {
        let kind = patch.kind();
        let collection = board_collection(kind)?;
        match self.store.update(collection, id, patch.to_document()).await {
            Ok(()) => {}
            Err(PortError::NotFound(_)) => return Err(CrmError::not_found(kind.as_str(), id)),
            Err(e) => return Err(e.into()),
        }
        let doc = self
            .store
            .get(collection, id)
            .await?
            .ok_or_else(|| CrmError::not_found(kind.as_str(), id))?;
        normalize_event(kind, id, &doc, EventSource::Board, Utc::now())
    }

    /// Returns false when the entry did not exist.
    pub async fn delete_board(&self, kind: EventKind, id: &str) -> CrmResult<bool> {
        let collection = board_collection(kind)?;
        if self.store.get(collection, id).await?.is_none() {
            return Ok(false);
        }
        self.store.delete(collection, id).await?;
        Ok(true)
    }

    //=====================================================================================
    // Cross-student feeds
    //=====================================================================================

    pub async fn all_communications(&self) -> CrmResult<Vec<FeedEntry>> {
        let result = self.feed(EventKind::Communication).await;
        self.policy.apply("communications feed", result)
    }

    pub async fn all_interactions(&self) -> CrmResult<Vec<FeedEntry>> {
        let result = self.feed(EventKind::Interaction).await;
        self.policy.apply("interactions feed", result)
    }

    /// Joins one kind of event from every student's timeline with the owner's
    /// display fields. A student that disappears or fails to read mid-scan is
    /// skipped rather than failing the whole feed.
    async fn feed(&self, kind: EventKind) -> CrmResult<Vec<FeedEntry>> {
        let students = self
            .store
            .query(collections::STUDENTS, &DocumentQuery::new().limit(self.fetch_limit))
            .await?;

        let slices = join_all(
            students
                .iter()
                .map(|s| self.student_slice(s.id.as_str(), kind)),
        )
        .await;

        let mut entries: Vec<FeedEntry> = Vec::new();
        for (student, slice) in students.iter().zip(slices) {
            match slice {
                Ok(Some(mut part)) => entries.append(&mut part),
                Ok(None) => debug!(student_id = %student.id, "student vanished during feed scan"),
                Err(e) => warn!(student_id = %student.id, error = %e, "skipping student in feed"),
            }
        }
        entries.sort_by(|a, b| b.event.created_at.cmp(&a.event.created_at));
        Ok(entries)
    }

    /// `None` when the student no longer resolves.
    async fn student_slice(
        &self,
        student_id: &str,
        kind: EventKind,
    ) -> CrmResult<Option<Vec<FeedEntry>>> {
        let Some(doc) = self.store.get(collections::STUDENTS, student_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let student = normalize_student(student_id, &doc, now)?;

        let mut events = self.subcollection_events(student_id, Some(kind)).await?;
        events.extend(embedded_legacy_events(student_id, &doc, Some(kind), now));
        Ok(Some(
            events
                .into_iter()
                .map(|event| FeedEntry {
                    event,
                    student_name: student.name.clone(),
                    student_email: student.email.clone(),
                })
                .collect(),
        ))
    }
}
