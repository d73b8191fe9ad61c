//! Batcher (spec §4.5): packs threads into LLM calls under a token budget,
//! merges results, and applies the labeling/mark-read/archival side effects.

use inboxd_core::config::{PolicyConfig, TopicConfig};
use inboxd_core::{constants, EmailThread, Finding};
use inboxd_llm::Classifier;
use inboxd_mail::{LabelTarget, MailStore, MailThread};
use tracing::warn;

use crate::error::EngineError;

/// Fixed per-batch prompt overhead (system prompt + formatting), in
/// characters, subtracted from the char budget before packing threads.
const PROMPT_OVERHEAD_CHARS: usize = 2_000;

fn char_budget() -> usize {
    let token_budget = constants::MAX_TOKENS as f64;
    let chars = token_budget / constants::TOKENS_PER_CHAR;
    (chars as usize).saturating_sub(PROMPT_OVERHEAD_CHARS)
}

/// Pack `threads` (assumed most-recent-first) into batches that each fit
/// the char budget. A thread exceeding the budget alone is submitted in its
/// own batch (spec §4.5: "Any single thread exceeding the budget is
/// submitted alone").
pub fn pack_into_batches(threads: &[MailThread]) -> Vec<Vec<MailThread>> {
    let budget = char_budget();
    let mut batches: Vec<Vec<MailThread>> = Vec::new();
    let mut current: Vec<MailThread> = Vec::new();
    let mut current_chars = 0usize;

    for thread in threads {
        let len = thread.to_domain().char_len();
        if len > budget {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            batches.push(vec![thread.clone()]);
            continue;
        }
        if current_chars + len > budget && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current_chars += len;
        current.push(thread.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[derive(Debug, Default, Clone)]
pub struct BatchOutcome {
    pub must_do: Vec<Finding>,
    pub must_know: Vec<Finding>,
    pub processed_threads: usize,
}

/// Run the Batcher over `threads`, merging results into `out` as each batch
/// succeeds. On a malformed-JSON batch the function returns early with the
/// error (spec §7: "Batch fails the whole run"), but `out` keeps whatever
/// earlier batches already contributed (spec §4.5: "partial-batch loss is
/// acceptable but MUST be reported").
pub async fn run_batches(
    mail: &dyn MailStore,
    classifier: &Classifier,
    threads: &[MailThread],
    topics: &TopicConfig,
    policy: &PolicyConfig,
    out: &mut BatchOutcome,
) -> Result<(), EngineError> {
    for batch in pack_into_batches(threads) {
        let domain_threads: Vec<EmailThread> = batch.iter().map(MailThread::to_domain).collect();
        let result = classifier.classify(&domain_threads, topics).await?;

        apply_side_effects(mail, &batch, &result.must_do, policy).await;
        apply_side_effects(mail, &batch, &result.must_know, policy).await;

        out.must_do.extend(result.must_do);
        out.must_know.extend(result.must_know);
        out.processed_threads += batch.len();
    }

    if policy.remove_uninteresting_from_inbox {
        archive_uninteresting(mail, threads, out).await;
    }

    Ok(())
}

async fn apply_side_effects(
    mail: &dyn MailStore,
    batch: &[MailThread],
    findings: &[Finding],
    policy: &PolicyConfig,
) {
    let label = match findings.first() {
        Some(f) if f.is_must_do() => policy.must_do_label.as_deref(),
        Some(_) => policy.must_know_label.as_deref(),
        None => None,
    };

    for finding in findings {
        if let Some(label) = label.filter(|l| !l.is_empty()) {
            label_with_fallback(mail, batch, finding, label).await;
        }
        if policy.mark_processed_as_read {
            if let Err(e) = mail.mark_read(&finding.email_id).await {
                warn!(error = %e, email_id = %finding.email_id, "mark-read side effect failed");
            }
        }
    }
}

/// Resolve message by id, fall back to RFC-822 id, and as a last resort
/// label the containing thread (spec §4.5 "Labeling"). Side-effect
/// failures are logged and swallowed — they never fail the run (spec §7).
async fn label_with_fallback(mail: &dyn MailStore, batch: &[MailThread], finding: &Finding, label: &str) {
    if mail
        .apply_label(LabelTarget::Message(&finding.email_id), label)
        .await
        .is_ok()
    {
        return;
    }

    if let Some(rfc822) = &finding.rfc822_id {
        if mail
            .apply_label(LabelTarget::Rfc822Message(rfc822), label)
            .await
            .is_ok()
        {
            return;
        }
    }

    let thread_id = batch
        .iter()
        .find(|t| t.messages.iter().any(|m| m.id == finding.email_id))
        .map(|t| t.id.as_str());

    if let Some(thread_id) = thread_id {
        if let Err(e) = mail.apply_label(LabelTarget::Thread(thread_id), label).await {
            warn!(error = %e, email_id = %finding.email_id, "label apply failed on all three fallbacks");
        }
    }
}

/// Archive ("remove uninteresting from inbox") threads with no findings,
/// skipping any thread that fails a safety guard (spec §4.5, §8 property 7).
async fn archive_uninteresting(mail: &dyn MailStore, threads: &[MailThread], out: &BatchOutcome) {
    let found_ids: std::collections::HashSet<&str> = out
        .must_do
        .iter()
        .chain(out.must_know.iter())
        .map(|f| f.email_id.as_str())
        .collect();

    for thread in threads {
        let has_finding = thread.messages.iter().any(|m| found_ids.contains(m.id.as_str()));
        if has_finding {
            continue;
        }
        if !thread.is_safe_to_archive() {
            continue;
        }
        if let Err(e) = mail.remove_from_inbox(&thread.id).await {
            warn!(error = %e, thread_id = %thread.id, "archive side effect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use inboxd_core::config::{PolicyConfig, TopicConfig};
    use inboxd_llm::provider::{LlmError, LlmProvider, Message};
    use inboxd_mail::{InMemoryMailStore, MailMessage};
    use async_trait::async_trait;

    fn policy() -> PolicyConfig {
        PolicyConfig {
            addon_name: "Inboxd".into(),
            time_zone: "UTC".into(),
            unread_only: false,
            inbox_only: true,
            must_do_label: Some("must-do".into()),
            must_know_label: Some("must-know".into()),
            mark_processed_as_read: true,
            remove_uninteresting_from_inbox: true,
        }
    }

    fn topics() -> TopicConfig {
        TopicConfig {
            must_do_topics: vec![],
            must_know_topics: vec![],
            must_do_other: true,
            must_know_other: true,
        }
    }

    fn thread(id: &str, msg_id: &str, body_len: usize) -> MailThread {
        MailThread {
            id: id.to_string(),
            first_subject: "subj".into(),
            messages: vec![MailMessage {
                id: msg_id.to_string(),
                rfc822_id: Some(format!("<{msg_id}@mail>")),
                from: "a@b.com".into(),
                subject: "subj".into(),
                date: Utc::now(),
                plain_body: "x".repeat(body_len),
                raw_headers: String::new(),
                is_starred: false,
                is_important: false,
            }],
            labels: vec![],
        }
    }

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

    #[test]
    fn pack_into_batches_splits_an_oversized_thread_alone() {
        let huge = thread("t1", "m1", char_budget() + 10);
        let small = thread("t2", "m2", 10);
        let batches = pack_into_batches(&[huge.clone(), small.clone()]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec![huge]);
        assert_eq!(batches[1], vec![small]);
    }

    #[test]
    fn pack_into_batches_groups_small_threads_together() {
        let threads: Vec<MailThread> = (0..5).map(|i| thread(&format!("t{i}"), &format!("m{i}"), 100)).collect();
        let batches = pack_into_batches(&threads);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    #[tokio::test]
    async fn run_batches_merges_labels_and_archives_uninteresting() {
        let response = r#"{"mustDo":[{"emailId":"m1","rfc822Id":"<m1@mail>","subject":"subj","sender":"a@b.com","topic":"other","keyAction":"reply"}],"mustKnow":[]}"#;
        let classifier = Classifier::new(Box::new(StubProvider(response.to_string())), 0.2, 4096);

        let t1 = thread("t1", "m1", 10);
        let t2 = thread("t2", "m2", 10);
        let mail = InMemoryMailStore::new(vec![t1.clone(), t2.clone()]);

        let mut out = BatchOutcome::default();
        run_batches(&mail, &classifier, &[t1, t2], &topics(), &policy(), &mut out)
            .await
            .unwrap();

        assert_eq!(out.must_do.len(), 1);
        assert!(mail.was_marked_read("m1"));
        assert!(!mail.applied_labels().is_empty());
        // t2 produced no finding and has no starred/labeled/important guard -> archived.
        assert!(mail.was_removed_from_inbox("t2"));
        assert!(!mail.was_removed_from_inbox("t1"));
    }

    #[tokio::test]
    async fn run_batches_propagates_malformed_response_but_keeps_prior_merges() {
        let ok_response = r#"{"mustDo":[],"mustKnow":[{"emailId":"m1","rfc822Id":"<m1@mail>","subject":"subj","sender":"a@b.com","topic":"other","keyKnowledge":"fyi"}]}"#;
        let classifier_ok = Classifier::new(Box::new(StubProvider(ok_response.to_string())), 0.2, 4096);

        let t1 = thread("t1", "m1", 10);
        let mail = InMemoryMailStore::new(vec![t1.clone()]);
        let mut out = BatchOutcome::default();
        run_batches(&mail, &classifier_ok, &[t1], &topics(), &policy(), &mut out)
            .await
            .unwrap();
        assert_eq!(out.must_know.len(), 1);

        let classifier_bad = Classifier::new(Box::new(StubProvider("not json".to_string())), 0.2, 4096);
        let t2 = thread("t2", "m2", 10);
        let err = run_batches(&mail, &classifier_bad, &[t2], &topics(), &policy(), &mut out).await;
        assert!(err.is_err());
        // Prior batch's merge into `out` survives the later failure.
        assert_eq!(out.must_know.len(), 1);
    }
}
