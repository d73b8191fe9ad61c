//! `MailStore` (spec §6): the capability interface the engine uses to
//! search threads and apply side effects. Side effects (labeling,
//! archiving, marking read) are modeled as separate methods rather than
//! mutators on the returned `MailThread`/`MailMessage` value objects, since
//! real providers (Gmail API, IMAP) always round-trip these as commands.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inboxd_core::{Email, EmailThread};

use crate::error::MailError;
use crate::query::MailQuery;

#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub id: String,
    pub rfc822_id: Option<String>,
    pub from: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub plain_body: String,
    pub raw_headers: String,
    pub is_starred: bool,
    pub is_important: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailThread {
    pub id: String,
    pub first_subject: String,
    pub messages: Vec<MailMessage>,
    pub labels: Vec<String>,
}

impl MailThread {
    pub fn is_starred(&self) -> bool {
        self.messages.iter().any(|m| m.is_starred)
    }

    pub fn is_important(&self) -> bool {
        self.messages.iter().any(|m| m.is_important)
    }

    pub fn has_user_label(&self) -> bool {
        !self.labels.is_empty()
    }

    /// Archival is safe only when none of the three safety guards trip
    /// (spec §4.5, property 7).
    pub fn is_safe_to_archive(&self) -> bool {
        !self.is_starred() && !self.is_important() && !self.has_user_label()
    }

    /// Project into the domain `EmailThread` the classifier/batcher consume.
    pub fn to_domain(&self) -> EmailThread {
        EmailThread {
            thread_id: self.id.clone(),
            subject: self.first_subject.clone(),
            emails: self
                .messages
                .iter()
                .map(|m| Email {
                    id: m.id.clone(),
                    rfc822_id: m.rfc822_id.clone(),
                    sender: m.from.clone(),
                    subject: m.subject.clone(),
                    body: m.plain_body.clone(),
                    date: m.date,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LabelTarget<'a> {
    Message(&'a str),
    Rfc822Message(&'a str),
    Thread(&'a str),
}

#[async_trait]
pub trait MailStore: Send + Sync {
    async fn search(&self, query: &MailQuery, limit: usize) -> Result<Vec<MailThread>, MailError>;

    async fn mark_read(&self, message_id: &str) -> Result<(), MailError>;

    async fn apply_label(&self, target: LabelTarget<'_>, label: &str) -> Result<(), MailError>;

    async fn remove_from_inbox(&self, thread_id: &str) -> Result<(), MailError>;
}

/// In-memory fake for tests and local development. Filters the fixed
/// thread set by the query's structured fields (ignores `to_query_string`,
/// which exists for real providers that only accept the token grammar).
#[derive(Default)]
pub struct InMemoryMailStore {
    threads: std::sync::Mutex<Vec<MailThread>>,
    read_messages: std::sync::Mutex<std::collections::HashSet<String>>,
    removed_from_inbox: std::sync::Mutex<std::collections::HashSet<String>>,
    applied_labels: std::sync::Mutex<Vec<(String, String)>>,
}

impl InMemoryMailStore {
    pub fn new(threads: Vec<MailThread>) -> Self {
        Self {
            threads: std::sync::Mutex::new(threads),
            ..Default::default()
        }
    }

    pub fn was_removed_from_inbox(&self, thread_id: &str) -> bool {
        self.removed_from_inbox.lock().unwrap().contains(thread_id)
    }

    pub fn was_marked_read(&self, message_id: &str) -> bool {
        self.read_messages.lock().unwrap().contains(message_id)
    }

    pub fn applied_labels(&self) -> Vec<(String, String)> {
        self.applied_labels.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailStore for InMemoryMailStore {
    async fn search(&self, query: &MailQuery, limit: usize) -> Result<Vec<MailThread>, MailError> {
        let threads = self.threads.lock().unwrap();
        let mut matched: Vec<MailThread> = threads
            .iter()
            .filter(|t| {
                t.messages.iter().any(|m| {
                    query.after.map_or(true, |a| m.date >= a)
                        && query.before.map_or(true, |b| m.date < b)
                        && query
                            .rfc822_msg_id
                            .as_ref()
                            .map_or(true, |id| m.rfc822_id.as_deref() == Some(id.as_str()))
                })
            })
            .cloned()
            .collect();
        matched.sort_by_key(|t| std::cmp::Reverse(t.messages.iter().map(|m| m.date).max()));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailError> {
        self.read_messages.lock().unwrap().insert(message_id.to_string());
        Ok(())
    }

    async fn apply_label(&self, target: LabelTarget<'_>, label: &str) -> Result<(), MailError> {
        let key = match target {
            LabelTarget::Message(id) => format!("message:{id}"),
            LabelTarget::Rfc822Message(id) => format!("rfc822:{id}"),
            LabelTarget::Thread(id) => format!("thread:{id}"),
        };
        self.applied_labels.lock().unwrap().push((key, label.to_string()));
        Ok(())
    }

    async fn remove_from_inbox(&self, thread_id: &str) -> Result<(), MailError> {
        self.removed_from_inbox.lock().unwrap().insert(thread_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: &str, starred: bool) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            rfc822_id: Some(format!("<{id}@mail>")),
            from: "a@b.com".into(),
            subject: "subj".into(),
            date: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            plain_body: "body".into(),
            raw_headers: String::new(),
            is_starred: starred,
            is_important: false,
        }
    }

    #[test]
    fn is_safe_to_archive_respects_all_three_guards() {
        let plain = MailThread {
            id: "t1".into(),
            first_subject: "s".into(),
            messages: vec![message("m1", false)],
            labels: vec![],
        };
        assert!(plain.is_safe_to_archive());

        let starred = MailThread {
            messages: vec![message("m1", true)],
            ..plain.clone()
        };
        assert!(!starred.is_safe_to_archive());

        let labeled = MailThread {
            labels: vec!["important-project".into()],
            ..plain
        };
        assert!(!labeled.is_safe_to_archive());
    }

    #[tokio::test]
    async fn in_memory_store_filters_by_rfc822_id() {
        let store = InMemoryMailStore::new(vec![
            MailThread {
                id: "t1".into(),
                first_subject: "s1".into(),
                messages: vec![message("m1", false)],
                labels: vec![],
            },
            MailThread {
                id: "t2".into(),
                first_subject: "s2".into(),
                messages: vec![message("m2", false)],
                labels: vec![],
            },
        ]);

        let query = MailQuery::new().rfc822_msg_id("<m1@mail>");
        let results = store.search(&query, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "t1");
    }

    #[tokio::test]
    async fn side_effects_are_recorded() {
        let store = InMemoryMailStore::new(vec![]);
        store.mark_read("m1").await.unwrap();
        store.remove_from_inbox("t1").await.unwrap();
        store.apply_label(LabelTarget::Thread("t1"), "must-do").await.unwrap();

        assert!(store.was_marked_read("m1"));
        assert!(store.was_removed_from_inbox("t1"));
        assert_eq!(store.applied_labels(), vec![("thread:t1".to_string(), "must-do".to_string())]);
    }
}
