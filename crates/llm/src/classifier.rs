//! Classifier: turns one batch of threads into `mustDo`/`mustKnow` findings
//! via an [`LlmProvider`] (spec §4.5 step 1-2).
//!
//! The provider is asked to return JSON matching [`ClassifyResponse`]
//! exactly; anything else is a [`ClassifyError::MalformedResponse`], which
//! the engine's batcher treats as a whole-batch failure (spec §4.5: "Malformed
//! ⇒ error; partial-batch loss is acceptable but MUST be reported").

use inboxd_core::config::TopicConfig;
use inboxd_core::{EmailThread, Finding, FindingKind};
use serde::Deserialize;
use tracing::warn;

use crate::provider::{LlmError, LlmProvider, Message, Role};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("classifier returned malformed JSON: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Default)]
pub struct ClassifyResult {
    pub must_do: Vec<Finding>,
    pub must_know: Vec<Finding>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(rename = "emailId")]
    email_id: String,
    #[serde(rename = "rfc822Id")]
    rfc822_id: Option<String>,
    subject: String,
    sender: String,
    topic: String,
    #[serde(rename = "keyAction")]
    key_action: Option<String>,
    #[serde(rename = "keyKnowledge")]
    key_knowledge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(rename = "mustDo", default)]
    must_do: Vec<RawFinding>,
    #[serde(rename = "mustKnow", default)]
    must_know: Vec<RawFinding>,
}

pub struct Classifier {
    provider: Box<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(provider: Box<dyn LlmProvider>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    pub async fn classify(
        &self,
        threads: &[EmailThread],
        topics: &TopicConfig,
    ) -> Result<ClassifyResult, ClassifyError> {
        let system_prompt = build_system_prompt(topics);
        let user_prompt = build_user_prompt(threads);

        let messages = vec![
            Message {
                role: Role::System,
                content: system_prompt,
            },
            Message {
                role: Role::User,
                content: user_prompt,
            },
        ];

        let raw = self
            .provider
            .complete(messages, self.temperature, self.max_tokens)
            .await?;

        parse_response(&raw, threads)
    }
}

fn build_system_prompt(topics: &TopicConfig) -> String {
    let mut prompt = String::from(
        "You triage email threads into two buckets: mustDo (something the \
         recipient needs to act on) and mustKnow (something worth knowing \
         but with no required action). Respond ONLY with JSON of the shape \
         {\"mustDo\":[...],\"mustKnow\":[...]}, one object per finding with \
         fields emailId, rfc822Id, subject, sender, topic, and keyAction \
         (mustDo) or keyKnowledge (mustKnow). Omit threads that are neither.",
    );

    if !topics.must_do_topics.is_empty() {
        prompt.push_str("\n\nmustDo topics: ");
        prompt.push_str(&topics.must_do_topics.join(", "));
    }
    if !topics.must_know_topics.is_empty() {
        prompt.push_str("\nmustKnow topics: ");
        prompt.push_str(&topics.must_know_topics.join(", "));
    }
    if topics.must_do_other {
        prompt.push_str("\nUse topic \"other\" for mustDo items outside the listed topics.");
    }
    if topics.must_know_other {
        prompt.push_str("\nUse topic \"other\" for mustKnow items outside the listed topics.");
    }

    prompt
}

fn build_user_prompt(threads: &[EmailThread]) -> String {
    let mut prompt = String::from("Threads:\n");
    for thread in threads {
        let latest = thread.latest();
        prompt.push_str(&format!(
            "- thread {} subject=\"{}\"\n",
            thread.thread_id, thread.subject
        ));
        for email in &thread.emails {
            prompt.push_str(&format!(
                "  email id={} rfc822Id={:?} from={} date={}\n  {}\n",
                email.id,
                email.rfc822_id,
                email.sender,
                email.date.to_rfc3339(),
                truncate(&email.body, 2000),
            ));
        }
        let _ = latest;
    }
    prompt
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

fn parse_response(
    raw: &str,
    threads: &[EmailThread],
) -> Result<ClassifyResult, ClassifyError> {
    let json_str = extract_json_object(raw)
        .ok_or_else(|| ClassifyError::MalformedResponse("no JSON object found".into()))?;

    let parsed: ClassifyResponse = serde_json::from_str(json_str)
        .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;

    let mut result = ClassifyResult::default();

    for raw_finding in parsed.must_do {
        match to_finding(raw_finding, threads, true) {
            Some(f) => result.must_do.push(f),
            None => warn!("dropping mustDo finding missing keyAction"),
        }
    }
    for raw_finding in parsed.must_know {
        match to_finding(raw_finding, threads, false) {
            Some(f) => result.must_know.push(f),
            None => warn!("dropping mustKnow finding missing keyKnowledge"),
        }
    }

    Ok(result)
}

fn to_finding(raw: RawFinding, threads: &[EmailThread], is_must_do: bool) -> Option<Finding> {
    let date = threads
        .iter()
        .flat_map(|t| &t.emails)
        .find(|e| e.id == raw.email_id)
        .map(|e| e.date);

    let kind = if is_must_do {
        FindingKind::MustDo {
            key_action: raw.key_action?,
        }
    } else {
        FindingKind::MustKnow {
            key_knowledge: raw.key_knowledge?,
        }
    };

    Some(Finding {
        email_id: raw.email_id,
        rfc822_id: raw.rfc822_id,
        subject: raw.subject,
        sender: raw.sender,
        topic: raw.topic,
        kind,
        date,
    })
}

/// Providers sometimes wrap JSON in prose or a markdown fence despite being
/// asked not to; pull out the first top-level `{...}` object.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use inboxd_core::Email;

    struct StubProvider(String);

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn complete(
            &self,
            _messages: Vec<Message>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    fn thread() -> EmailThread {
        EmailThread {
            thread_id: "t1".into(),
            subject: "Invoice due".into(),
            emails: vec![Email {
                id: "e1".into(),
                rfc822_id: Some("<abc@mail>".into()),
                sender: "billing@example.com".into(),
                subject: "Invoice due".into(),
                body: "Please pay by Friday".into(),
                date: Utc::now(),
            }],
        }
    }

    #[tokio::test]
    async fn classify_parses_well_formed_response() {
        let response = r#"{"mustDo":[{"emailId":"e1","rfc822Id":"<abc@mail>","subject":"Invoice due","sender":"billing@example.com","topic":"invoices","keyAction":"Pay the invoice by Friday"}],"mustKnow":[]}"#;
        let classifier = Classifier::new(Box::new(StubProvider(response.to_string())), 0.2, 4096);
        let result = classifier
            .classify(&[thread()], &TopicConfig {
                must_do_topics: vec!["invoices".into()],
                must_know_topics: vec![],
                must_do_other: false,
                must_know_other: false,
            })
            .await
            .unwrap();

        assert_eq!(result.must_do.len(), 1);
        assert!(result.must_know.is_empty());
        assert!(result.must_do[0].is_must_do());
    }

    #[tokio::test]
    async fn classify_rejects_non_json_response() {
        let classifier = Classifier::new(
            Box::new(StubProvider("I cannot do that.".to_string())),
            0.2,
            4096,
        );
        let err = classifier
            .classify(&[thread()], &TopicConfig {
                must_do_topics: vec![],
                must_know_topics: vec![],
                must_do_other: true,
                must_know_other: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn classify_tolerates_a_markdown_fenced_reply() {
        let response = "```json\n{\"mustDo\":[],\"mustKnow\":[]}\n```";
        let classifier = Classifier::new(Box::new(StubProvider(response.to_string())), 0.2, 4096);
        let result = classifier
            .classify(&[thread()], &TopicConfig {
                must_do_topics: vec![],
                must_know_topics: vec![],
                must_do_other: false,
                must_know_other: false,
            })
            .await
            .unwrap();
        assert!(result.must_do.is_empty() && result.must_know.is_empty());
    }

    #[test]
    fn truncate_leaves_short_bodies_untouched() {
        assert_eq!(truncate("hello", 2000), "hello");
    }

    #[test]
    fn truncate_cuts_on_a_char_boundary_not_a_byte_offset() {
        // Each "é" is 2 bytes, so a byte-offset slice at an odd index would
        // land mid-character and panic; a char-count cut must not.
        let body = "é".repeat(1500);
        let truncated = truncate(&body, 1000);
        assert_eq!(truncated.chars().count(), 1001); // 1000 chars + the ellipsis
        assert!(truncated.ends_with('…'));
    }
}
