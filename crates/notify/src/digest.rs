//! Renders the daily digest email body from an `AccumulatorFile`'s findings,
//! grouped by bucket then topic. Minijinja environment setup mirrors the
//! notification-template renderer this crate started from: one fresh
//! `Environment` per render call since the template is a plain string, not a
//! registered file.

use std::collections::BTreeMap;

use inboxd_core::{Finding, FindingKind};
use serde::Serialize;

use crate::error::NotifyError;

const DEFAULT_TEMPLATE: &str = r#"
<h2>Daily digest — {{ date }}</h2>
{% if must_do %}
<h3>Must do</h3>
<ul>
{% for group in must_do %}
  <li><strong>{{ group.topic }}</strong>
    <ul>
    {% for item in group.items %}
      <li>{{ item.subject }} — {{ item.action }} ({{ item.sender }})</li>
    {% endfor %}
    </ul>
  </li>
{% endfor %}
</ul>
{% endif %}
{% if must_know %}
<h3>Must know</h3>
<ul>
{% for group in must_know %}
  <li><strong>{{ group.topic }}</strong>
    <ul>
    {% for item in group.items %}
      <li>{{ item.subject }} — {{ item.knowledge }} ({{ item.sender }})</li>
    {% endfor %}
    </ul>
  </li>
{% endfor %}
</ul>
{% endif %}
<p>{{ total_processed }} messages processed since {{ first_date }}.</p>
"#;

#[derive(Serialize)]
struct MustDoItem {
    subject: String,
    sender: String,
    action: String,
}

#[derive(Serialize)]
struct MustKnowItem {
    subject: String,
    sender: String,
    knowledge: String,
}

#[derive(Serialize)]
struct MustDoGroup {
    topic: String,
    items: Vec<MustDoItem>,
}

#[derive(Serialize)]
struct MustKnowGroup {
    topic: String,
    items: Vec<MustKnowItem>,
}

#[derive(Serialize)]
struct DigestContext {
    date: String,
    must_do: Vec<MustDoGroup>,
    must_know: Vec<MustKnowGroup>,
    total_processed: u64,
    first_date: String,
}

pub struct DigestRenderer {
    template: String,
}

impl DigestRenderer {
    pub fn new() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Override the built-in template (e.g. a user-supplied one).
    pub fn with_template(template: String) -> Self {
        Self { template }
    }

    pub fn render(
        &self,
        must_do: &[Finding],
        must_know: &[Finding],
        total_processed: u64,
        date_label: &str,
        first_date_label: &str,
    ) -> Result<String, NotifyError> {
        let ctx = DigestContext {
            date: date_label.to_string(),
            must_do: group_must_do(must_do),
            must_know: group_must_know(must_know),
            total_processed,
            first_date: first_date_label.to_string(),
        };

        let env = minijinja::Environment::new();
        env.render_str(&self.template, &ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }
}

impl Default for DigestRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn group_must_do(findings: &[Finding]) -> Vec<MustDoGroup> {
    let mut by_topic: BTreeMap<String, Vec<MustDoItem>> = BTreeMap::new();
    for f in findings {
        if let FindingKind::MustDo { key_action } = &f.kind {
            by_topic.entry(f.topic.clone()).or_default().push(MustDoItem {
                subject: f.subject.clone(),
                sender: f.sender.clone(),
                action: key_action.clone(),
            });
        }
    }
    by_topic
        .into_iter()
        .map(|(topic, items)| MustDoGroup { topic, items })
        .collect()
}

fn group_must_know(findings: &[Finding]) -> Vec<MustKnowGroup> {
    let mut by_topic: BTreeMap<String, Vec<MustKnowItem>> = BTreeMap::new();
    for f in findings {
        if let FindingKind::MustKnow { key_knowledge } = &f.kind {
            by_topic
                .entry(f.topic.clone())
                .or_default()
                .push(MustKnowItem {
                    subject: f.subject.clone(),
                    sender: f.sender.clone(),
                    knowledge: key_knowledge.clone(),
                });
        }
    }
    by_topic
        .into_iter()
        .map(|(topic, items)| MustKnowGroup { topic, items })
        .collect()
}
