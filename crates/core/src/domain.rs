//! Transient, per-run domain entities (spec §3 "Domain entities").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One email within a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Email {
    pub id: String,
    pub rfc822_id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
}

/// A thread as returned by the mail store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailThread {
    pub thread_id: String,
    pub subject: String,
    pub emails: Vec<Email>,
}

impl EmailThread {
    /// Char length of subject + every email body, used by the batcher's
    /// token estimator (spec §4.5).
    pub fn char_len(&self) -> usize {
        self.subject.len()
            + self
                .emails
                .iter()
                .map(|e| e.subject.len() + e.body.len() + e.sender.len())
                .sum::<usize>()
    }

    /// Most recent email in the thread, by date.
    pub fn latest(&self) -> Option<&Email> {
        self.emails.iter().max_by_key(|e| e.date)
    }

    /// Earliest email in the thread, by date.
    pub fn earliest(&self) -> Option<&Email> {
        self.emails.iter().min_by_key(|e| e.date)
    }
}

/// Which bucket a classified email landed in, and the LLM's rationale text
/// for that bucket (spec §3: `keyAction|keyKnowledge`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "bucket", rename_all = "snake_case")]
pub enum FindingKind {
    MustDo { key_action: String },
    MustKnow { key_knowledge: String },
}

/// One classified email, as emitted by the Batcher/Classifier (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub email_id: String,
    pub rfc822_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub topic: String,
    #[serde(flatten)]
    pub kind: FindingKind,
    pub date: Option<DateTime<Utc>>,
}

impl Finding {
    pub fn is_must_do(&self) -> bool {
        matches!(self.kind, FindingKind::MustDo { .. })
    }

    pub fn is_must_know(&self) -> bool {
        matches!(self.kind, FindingKind::MustKnow { .. })
    }
}
