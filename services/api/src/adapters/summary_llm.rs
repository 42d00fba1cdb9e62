//! services/api/src/adapters/summary_llm.rs
//!
//! Student summaries from an OpenAI-compatible chat model. Implements the
//! `SummaryService` port; the caller owns the deadline and the template fallback.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use crm_core::{
    domain::SummaryBundle,
    ports::{PortError, PortResult, SummaryService},
    summary::build_prompt,
};
use tracing::debug;

const COUNSELOR_BRIEF: &str = "You brief college admissions counselors. Write plain text in \
short paragraphs, lead with what the counselor should do next for this student, and never \
invent activity that is not listed.";

/// Low so two summaries of the same record read alike.
const SUMMARY_TEMPERATURE: f32 = 0.3;

#[derive(Clone)]
pub struct OpenAiSummaryAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSummaryAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn unexpected(e: impl ToString) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// One student's record and timeline as a chat request.
fn summary_request(model: &str, bundle: &SummaryBundle) -> PortResult<CreateChatCompletionRequest> {
    let brief = ChatCompletionRequestSystemMessageArgs::default()
        .content(COUNSELOR_BRIEF)
        .build()
        .map_err(unexpected)?;
    let record = ChatCompletionRequestUserMessageArgs::default()
        .content(build_prompt(bundle))
        .build()
        .map_err(unexpected)?;

    CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(vec![brief.into(), record.into()])
        .temperature(SUMMARY_TEMPERATURE)
        .n(1)
        .build()
        .map_err(unexpected)
}

/// The first choice with visible text. A blank answer counts as a failure so
/// the caller falls back to the template.
fn first_text<I>(contents: I) -> PortResult<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    contents
        .into_iter()
        .flatten()
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
        .ok_or_else(|| unexpected("summary model answered without any text"))
}

#[async_trait]
impl SummaryService for OpenAiSummaryAdapter {
    async fn generate_summary(&self, bundle: &SummaryBundle) -> PortResult<String> {
        let request = summary_request(&self.model, bundle)?;
        let response = self.client.chat().create(request).await.map_err(unexpected)?;
        debug!(
            student_id = %bundle.student.id,
            choices = response.choices.len(),
            "summary model answered"
        );
        first_text(response.choices.into_iter().map(|c| c.message.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crm_core::domain::{Student, StudentStatus};

    fn bundle() -> SummaryBundle {
        let now = Utc::now();
        SummaryBundle {
            student: Student {
                id: "s-42".into(),
                name: "Maria Garcia".into(),
                email: "maria@example.com".into(),
                country: "Spain".into(),
                phone: None,
                grade: None,
                source: None,
                status: StudentStatus::Applying,
                high_intent: true,
                needs_essay_help: false,
                created_at: now,
                last_active: now,
                last_contacted_at: None,
                additional_data: None,
            },
            communications: vec![],
            interactions: vec![],
            notes: vec![],
        }
    }

    #[test]
    fn request_carries_brief_and_record() {
        let request = summary_request("gpt-4o-mini", &bundle()).unwrap();
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(SUMMARY_TEMPERATURE));
    }

    #[test]
    fn blank_answers_are_failures() {
        assert_eq!(
            first_text([None, Some("  ".into()), Some(" Call Maria. ".into())]).unwrap(),
            "Call Maria."
        );
        assert!(matches!(
            first_text([None, Some("\n".into())]),
            Err(PortError::Unexpected(_))
        ));
    }
}
