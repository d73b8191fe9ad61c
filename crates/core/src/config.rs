//! Environment-driven configuration, profiled the way `STUPID_PROFILE` works
//! in the teacher codebase: when `INBOXD_PROFILE` is set (e.g. `PROD`), every
//! key is first looked up as `{PROFILE}_{KEY}`, falling back to the bare key.
//! This lets one binary serve two mailboxes (e.g. personal + work) without
//! code changes.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load `.env` if present (silently ignored if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Split a newline-separated list config value (`mustDoTopics`,
/// `mustKnowTopics`) into trimmed, non-empty entries.
fn split_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub log_level: String,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub smtp: SmtpConfig,
    pub topics: TopicConfig,
    pub policy: PolicyConfig,
}

impl Config {
    /// Build config from environment variables. Call [`load_dotenv`] first.
    /// Profile is read from `INBOXD_PROFILE`.
    pub fn from_env() -> Self {
        let profile = env_or("INBOXD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            log_level: profiled_env_or(p, "LOG_LEVEL", "info"),
            storage: StorageConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            smtp: SmtpConfig::from_env_profiled(p),
            topics: TopicConfig::from_env_profiled(p),
            policy: PolicyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a redacted summary at startup — never logs API keys or SMTP
    /// credentials (mirrors `stupid_core::config::Config::log_summary`).
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:   data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  llm:       provider={}, configured={}",
            self.llm.provider,
            self.llm.is_configured()
        );
        tracing::info!(
            "  smtp:      host={}, configured={}",
            self.smtp.host,
            self.smtp.is_configured()
        );
        tracing::info!(
            "  topics:    must_do={} must_know={}",
            self.topics.must_do_topics.len(),
            self.topics.must_know_topics.len()
        );
    }

    /// Redacted view safe for a `status` CLI dump.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "storage": { "data_dir": self.storage.data_dir },
            "llm": { "provider": self.llm.provider, "configured": self.llm.is_configured() },
            "smtp": { "host": self.smtp.host, "configured": self.smtp.is_configured() },
            "topics": {
                "must_do_topics": self.topics.must_do_topics,
                "must_know_topics": self.topics.must_know_topics,
            },
        })
    }

    /// Whether the minimum config to run a pass is present: an LLM key and
    /// a resolvable timezone. Mirrors spec §4.1 "config is complete".
    pub fn is_complete(&self) -> bool {
        self.llm.is_configured() && crate::clock::parse_tz(&self.policy.time_zone).is_ok()
    }
}

// ── Storage (KVStore/BlobStore backing directory) ───────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }
}

// ── LLM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `"anthropic" | "openai" | "ollama"`.
    pub provider: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "anthropic"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: profiled_env_or(p, "OPENAI_BASE_URL", "https://api.openai.com"),
            ollama_url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            ollama_model: profiled_env_or(p, "OLLAMA_MODEL", "llama3"),
            temperature: profiled_env_opt(p, "LLM_TEMPERATURE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.2),
            max_tokens: profiled_env_opt(p, "LLM_MAX_TOKENS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(4096),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "openai" => self.openai_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── SMTP (Mailer) ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub from: String,
    /// The user's own address — digests and completion/error notifications
    /// are always sent here (spec §4.4: "send to the user's own address").
    pub user_email: String,
}

impl SmtpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "SMTP_HOST", ""),
            port: profiled_env_opt(p, "SMTP_PORT").and_then(|v| v.parse().ok()),
            tls: profiled_env_opt(p, "SMTP_TLS").and_then(|v| v.parse().ok()),
            from: profiled_env_or(p, "SMTP_FROM", "inboxd@localhost"),
            user_email: profiled_env_or(p, "USER_EMAIL", ""),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.user_email.is_empty()
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(if self.tls == Some(false) { 25 } else { 587 })
    }
}

// ── Topics (classification policy) ───────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub must_do_topics: Vec<String>,
    pub must_know_topics: Vec<String>,
    pub must_do_other: bool,
    pub must_know_other: bool,
}

impl TopicConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            must_do_topics: split_lines(&profiled_env_or(p, "MUST_DO_TOPICS", "")),
            must_know_topics: split_lines(&profiled_env_or(p, "MUST_KNOW_TOPICS", "")),
            must_do_other: profiled_env_bool(p, "MUST_DO_OTHER", false),
            must_know_other: profiled_env_bool(p, "MUST_KNOW_OTHER", false),
        }
    }
}

// ── Policy (search scope, labels, side effects) ──────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub addon_name: String,
    pub time_zone: String,
    pub unread_only: bool,
    pub inbox_only: bool,
    pub must_do_label: Option<String>,
    pub must_know_label: Option<String>,
    pub mark_processed_as_read: bool,
    pub remove_uninteresting_from_inbox: bool,
}

impl PolicyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            addon_name: profiled_env_or(p, "ADDON_NAME", "Inboxd"),
            time_zone: profiled_env_or(p, "TIME_ZONE", "UTC"),
            unread_only: profiled_env_bool(p, "UNREAD_ONLY", false),
            inbox_only: profiled_env_bool(p, "INBOX_ONLY", true),
            must_do_label: profiled_env_opt(p, "MUST_DO_LABEL"),
            must_know_label: profiled_env_opt(p, "MUST_KNOW_LABEL"),
            mark_processed_as_read: profiled_env_bool(p, "MARK_PROCESSED_AS_READ", false),
            remove_uninteresting_from_inbox: profiled_env_bool(
                p,
                "REMOVE_UNINTERESTING_FROM_INBOX",
                false,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_trims_and_drops_blanks() {
        let lines = split_lines("invoices\n  travel \n\nlegal\n");
        assert_eq!(lines, vec!["invoices", "travel", "legal"]);
    }

    #[test]
    fn smtp_port_defaults_to_587_when_tls_not_disabled() {
        let cfg = SmtpConfig {
            host: "smtp.example.com".into(),
            port: None,
            tls: None,
            from: "a@example.com".into(),
            user_email: "me@example.com".into(),
        };
        assert_eq!(cfg.port_or_default(), 587);
    }

    #[test]
    fn smtp_port_defaults_to_25_when_tls_explicitly_off() {
        let cfg = SmtpConfig {
            host: "smtp.example.com".into(),
            port: None,
            tls: Some(false),
            from: "a@example.com".into(),
            user_email: "me@example.com".into(),
        };
        assert_eq!(cfg.port_or_default(), 25);
    }

    #[test]
    fn llm_configured_checks_active_provider_only() {
        let mut cfg = LlmConfig::from_env_profiled("");
        cfg.provider = "anthropic".to_string();
        cfg.anthropic_api_key = None;
        assert!(!cfg.is_configured());
        cfg.anthropic_api_key = Some("sk-test".to_string());
        assert!(cfg.is_configured());
    }

    #[test]
    fn for_profile_is_case_insensitive_and_prefixes_keys() {
        std::env::set_var("TEST1_DATA_DIR", "/tmp/profile-data");
        let cfg = Config::for_profile("test1");
        assert_eq!(cfg.storage.data_dir, PathBuf::from("/tmp/profile-data"));
        std::env::remove_var("TEST1_DATA_DIR");
    }
}
