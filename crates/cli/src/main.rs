mod cli;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use inboxd_core::config::Config;
use inboxd_engine::dispatcher::{self, DISPATCHER_HANDLER, KICKOFF_HANDLER};
use inboxd_engine::trigger::KvTriggerService;
use inboxd_engine::Engine;
use inboxd_llm::{create_provider, Classifier};
use inboxd_mail::InMemoryMailStore;
use inboxd_notify::{DigestRenderer, Mailer, SmtpMailer};
use inboxd_store::{FileBlobStore, FileKvStore};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    inboxd_core::config::load_dotenv();

    let args = CliArgs::parse();
    let config = Config::for_profile(&args.profile);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    config.log_summary();

    let kv = FileKvStore::new(&config.storage.data_dir).context("failed to open KV store")?;

    if matches!(args.command, Command::Status) {
        return print_status(&kv);
    }

    let blob = FileBlobStore::new(&config.storage.data_dir).context("failed to open blob store")?;
    let mail = InMemoryMailStore::new(vec![]);

    let provider = create_provider(&config.llm).context("failed to construct LLM provider")?;
    let classifier = Classifier::new(provider, config.llm.temperature, config.llm.max_tokens);

    let mailer: Box<dyn Mailer> = match SmtpMailer::from_config(&config.smtp) {
        Ok(m) => Box::new(m),
        Err(e) => {
            tracing::warn!(error = %e, "SMTP not configured, notifications will be dropped");
            Box::new(inboxd_notify::RecordingMailer::new())
        }
    };

    let triggers = KvTriggerService::new(&kv, vec![DISPATCHER_HANDLER.into(), KICKOFF_HANDLER.into()]);
    let digest = DigestRenderer::new();

    let cron_override = std::env::var("INBOXD_DISPATCHER_CRON").ok();

    let engine = Engine {
        kv: &kv,
        blob: &blob,
        mail: &mail,
        classifier: &classifier,
        mailer: mailer.as_ref(),
        triggers: &triggers,
        digest: &digest,
        topics: &config.topics,
        policy: &config.policy,
        user_email: &config.smtp.user_email,
        configured: config.is_complete(),
    };

    let now = Utc::now();

    match args.command {
        Command::Tick => {
            dispatcher::ensure_dispatcher_with_cadence(&triggers, now, cron_override.as_deref())
                .await
                .context("failed to ensure dispatcher trigger")?;
            engine.dispatcher_tick(now).await.context("dispatcher tick failed")?;
        }
        Command::Start { range } => {
            dispatcher::ensure_dispatcher_with_cadence(&triggers, now, cron_override.as_deref())
                .await
                .context("failed to ensure dispatcher trigger")?;
            engine.start(&range, now).await.context("failed to start active run")?;
        }
        Command::Status => unreachable!("handled above before engine construction"),
    }

    Ok(())
}

fn print_status(kv: &FileKvStore) -> Result<()> {
    let stats = inboxd_store::state::get_latest_run_stats(kv).context("failed to read latest run stats")?;
    let lock = inboxd_store::lock::current(kv).context("failed to read lock state")?;
    let status = serde_json::json!({
        "latestRunStats": stats,
        "lock": lock,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
