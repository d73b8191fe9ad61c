//! Query grammar recognised by `MailStore::search` (spec §6): `after:<unix>`,
//! `before:<unix>`, `is:unread`, `in:inbox`, `rfc822msgid:<id>`.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct MailQuery {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub unread_only: bool,
    pub inbox_only: bool,
    pub rfc822_msg_id: Option<String>,
}

impl MailQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after(mut self, t: DateTime<Utc>) -> Self {
        self.after = Some(t);
        self
    }

    pub fn before(mut self, t: DateTime<Utc>) -> Self {
        self.before = Some(t);
        self
    }

    pub fn unread_only(mut self, value: bool) -> Self {
        self.unread_only = value;
        self
    }

    pub fn inbox_only(mut self, value: bool) -> Self {
        self.inbox_only = value;
        self
    }

    pub fn rfc822_msg_id(mut self, id: impl Into<String>) -> Self {
        self.rfc822_msg_id = Some(id.into());
        self
    }

    /// Render the provider's token grammar, e.g.
    /// `after:1705276800 before:1705363200 is:unread in:inbox`.
    pub fn to_query_string(&self) -> String {
        let mut tokens = Vec::new();
        if let Some(t) = self.after {
            tokens.push(format!("after:{}", t.timestamp()));
        }
        if let Some(t) = self.before {
            tokens.push(format!("before:{}", t.timestamp()));
        }
        if self.unread_only {
            tokens.push("is:unread".to_string());
        }
        if self.inbox_only {
            tokens.push("in:inbox".to_string());
        }
        if let Some(id) = &self.rfc822_msg_id {
            tokens.push(format!("rfc822msgid:{}", id));
        }
        tokens.join(" ")
    }
}
