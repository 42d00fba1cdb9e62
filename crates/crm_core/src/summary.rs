//! crates/crm_core/src/summary.rs
//!
//! Student summaries: the prompt handed to a `SummaryService`, the
//! deterministic template used when no generator is available, and the
//! fallback logic tying the two together.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;
use tracing::warn;

use crate::domain::{EventDetails, StudentStatus, SummaryBundle};
use crate::ports::SummaryService;

const PROMPT_COMMUNICATIONS: usize = 5;
const PROMPT_INTERACTIONS: usize = 5;
const PROMPT_NOTES: usize = 3;
const PROMPT_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Ai,
    Template,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub summary: String,
    pub source: SummarySource,
}

/// Asks the generator for a summary, falling back to the template when there
/// is no generator, it errors, it times out, or it returns nothing.
pub async fn summarize(
    generator: Option<&dyn SummaryService>,
    bundle: &SummaryBundle,
    timeout: Duration,
) -> StudentSummary {
    let template = || StudentSummary {
        summary: template_summary(bundle),
        source: SummarySource::Template,
    };
    let Some(generator) = generator else {
        return template();
    };

    match tokio::time::timeout(timeout, generator.generate_summary(bundle)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => StudentSummary {
            summary: strip_markdown(&text),
            source: SummarySource::Ai,
        },
        Ok(Ok(_)) => {
            warn!(student_id = %bundle.student.id, "summary generator returned nothing");
            template()
        }
        Ok(Err(e)) => {
            warn!(student_id = %bundle.student.id, error = %e, "summary generator failed");
            template()
        }
        Err(_) => {
            warn!(student_id = %bundle.student.id, "summary generator timed out");
            template()
        }
    }
}

/// Generators are asked for plain text but still emit emphasis markers.
pub fn strip_markdown(text: &str) -> String {
    text.replace('*', "").trim().to_string()
}

fn excerpt(text: &str) -> String {
    let cut: String = text.chars().take(PROMPT_EXCERPT_CHARS).collect();
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut
    }
}

pub fn build_prompt(bundle: &SummaryBundle) -> String {
    let s = &bundle.student;
    let mut p = String::new();
    let _ = writeln!(
        p,
        "You are an assistant helping a college counseling team manage student applications.\n\
         Generate a comprehensive, actionable summary for this student profile.\n"
    );
    let _ = writeln!(p, "STUDENT PROFILE:");
    let _ = writeln!(p, "- Name: {}", s.name);
    let _ = writeln!(p, "- Email: {}", s.email);
    let _ = writeln!(p, "- Country: {}", s.country);
    let _ = writeln!(p, "- Status: {}", s.status);
    let _ = writeln!(p, "- Grade: {}", s.grade.as_deref().unwrap_or("Not specified"));
    let _ = writeln!(p, "- High Intent: {}", s.high_intent);
    let _ = writeln!(p, "- Needs Essay Help: {}", s.needs_essay_help);
    let _ = writeln!(p, "- Last Active: {}", s.last_active.to_rfc3339());

    let _ = writeln!(p, "\nRECENT COMMUNICATIONS ({} total):", bundle.communications.len());
    for event in bundle.communications.iter().take(PROMPT_COMMUNICATIONS) {
        if let EventDetails::Communication(c) = &event.details {
            let _ = writeln!(
                p,
                "- {}: {} ({})",
                c.communication_type,
                c.subject.as_deref().unwrap_or("No subject"),
                event.created_at.to_rfc3339()
            );
            if !c.content.is_empty() {
                let _ = writeln!(p, "  Content: {}", excerpt(&c.content));
            }
        }
    }

    let _ = writeln!(p, "\nRECENT INTERACTIONS ({} total):", bundle.interactions.len());
    for event in bundle.interactions.iter().take(PROMPT_INTERACTIONS) {
        if let EventDetails::Interaction(i) = &event.details {
            let detail = if i.description.is_empty() { "No details" } else { &i.description };
            let _ = writeln!(
                p,
                "- {}: {} ({})",
                i.interaction_type,
                detail,
                event.created_at.to_rfc3339()
            );
        }
    }

    let _ = writeln!(p, "\nINTERNAL NOTES ({} total):", bundle.notes.len());
    for event in bundle.notes.iter().take(PROMPT_NOTES) {
        if let EventDetails::Note(n) = &event.details {
            let _ = writeln!(p, "- {} ({})", excerpt(&n.content), event.created_at.to_rfc3339());
        }
    }

    p.push_str(
        "\nPlease provide a summary that covers: student overview, engagement analysis, \
         communication insights, progress assessment, priority level, actionable \
         recommendations, risk factors and opportunities.\n\
         Write plain text only. Do not use markdown, asterisks or bold text.\n",
    );
    p
}

fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<&'a str, usize> {
    let mut counts = BTreeMap::new();
    for k in keys {
        *counts.entry(k).or_insert(0) += 1;
    }
    counts
}

/// Deterministic summary built only from the bundle.
pub fn template_summary(bundle: &SummaryBundle) -> String {
    let s = &bundle.student;
    let last_contacted = s
        .last_contacted_at
        .map(|at| at.format("%Y-%m-%d").to_string());

    let mut out = String::new();
    let _ = writeln!(out, "Student Profile Summary for {}\n", s.name);
    let _ = writeln!(out, "Current Status: {}", s.status);
    let _ = writeln!(out, "Country: {}", s.country);
    let _ = writeln!(out, "Last Contacted: {}", last_contacted.as_deref().unwrap_or("Never"));
    let _ = writeln!(out, "Grade: {}\n", s.grade.as_deref().unwrap_or("Not specified"));

    if s.high_intent || s.needs_essay_help {
        out.push_str("Key Classifications:\n");
        if s.high_intent {
            out.push_str("• High Intent Student - Priority candidate\n");
        }
        if s.needs_essay_help {
            out.push_str("• Needs Essay Help - Requires additional support\n");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Application Progress: {}% complete", s.status.progress_percent());
    let _ = writeln!(out, "• Currently in: {} stage", s.status);
    match s.status.next() {
        Some(next) => {
            let _ = writeln!(out, "• Next stage: {}\n", next);
        }
        None => out.push_str("• Application completed!\n\n"),
    }

    let channels = tally(bundle.communications.iter().filter_map(|e| match &e.details {
        EventDetails::Communication(c) => Some(c.communication_type.as_str()),
        _ => None,
    }));
    if bundle.communications.is_empty() {
        out.push_str("Communication Activity: No communications recorded yet\n\n");
    } else {
        let _ = writeln!(
            out,
            "Communication Activity: {} total communications",
            bundle.communications.len()
        );
        let breakdown: Vec<String> = channels
            .iter()
            .map(|(k, v)| format!("{}: {}", k.to_uppercase(), v))
            .collect();
        let _ = writeln!(out, "• Channel breakdown: {}\n", breakdown.join(", "));
    }

    let activity = tally(bundle.interactions.iter().filter_map(|e| match &e.details {
        EventDetails::Interaction(i) => Some(i.interaction_type.as_str()),
        _ => None,
    }));
    if bundle.interactions.is_empty() {
        out.push_str("Student Engagement: No interactions recorded yet\n\n");
    } else {
        let _ = writeln!(
            out,
            "Student Engagement: {} recorded interactions",
            bundle.interactions.len()
        );
        let types: Vec<String> = activity
            .iter()
            .map(|(k, v)| format!("{}: {}", k.replace('_', " "), v))
            .collect();
        let _ = writeln!(out, "• Activity types: {}\n", types.join(", "));
    }

    if bundle.notes.is_empty() {
        out.push_str("Internal Notes: No notes recorded yet\n\n");
    } else {
        let _ = writeln!(out, "Internal Notes: {} notes on file\n", bundle.notes.len());
    }

    out.push_str("AI Recommendations:\n");
    if s.high_intent {
        out.push_str("• Priority follow-up recommended - this is a high-intent student\n");
    }
    if s.needs_essay_help {
        out.push_str("• Consider offering essay writing support or resources\n");
    }
    if last_contacted.is_none() {
        out.push_str("• Immediate outreach needed - student has never been contacted\n");
    } else {
        out.push_str("• Consider follow-up based on last contact date\n");
    }
    out.push_str(match s.status {
        StudentStatus::Exploring => "• Focus on understanding student's goals and interests\n",
        StudentStatus::Shortlisting => "• Help with university selection and application strategy\n",
        StudentStatus::Applying => "• Provide application support and deadline management\n",
        StudentStatus::Submitted => "• Monitor application status and prepare for next steps\n",
    });
    if bundle.communications.is_empty() {
        out.push_str("• Initiate first contact to establish relationship\n");
    }
    out
}
