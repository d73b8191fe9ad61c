//! Ignore rules (spec §8 property 8): messages authored by the user, or
//! whose subject contains the configured addon name, are never surfaced to
//! the LLM. Applies uniformly to both engines; dropping every message from
//! a thread drops the thread.

use inboxd_mail::MailThread;

pub fn filter_ignored(threads: Vec<MailThread>, user_email: &str, addon_name: &str) -> Vec<MailThread> {
    let user_email = user_email.to_lowercase();
    let addon_name = addon_name.to_lowercase();

    threads
        .into_iter()
        .filter_map(|mut thread| {
            thread.messages.retain(|m| {
                let is_self = !user_email.is_empty() && m.from.to_lowercase() == user_email;
                let is_self_feedback =
                    !addon_name.is_empty() && m.subject.to_lowercase().contains(&addon_name);
                !is_self && !is_self_feedback
            });
            if thread.messages.is_empty() {
                None
            } else {
                Some(thread)
            }
        })
        .collect()
}
