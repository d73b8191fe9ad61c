use clap::{Parser, Subcommand};

/// Host-driven entry point for the Inboxd triage engine.
///
/// Nothing in this binary owns an event loop or a scheduler: each
/// subcommand runs exactly one unit of work and exits, the way a cron job
/// or a serverless function handler would be invoked.
#[derive(Parser, Debug)]
#[command(name = "inboxd", about = "Inboxd email triage orchestration engine")]
pub struct CliArgs {
    /// Named environment profile (`INBOXD_PROFILE`), letting one binary
    /// serve more than one mailbox without code changes.
    #[arg(long, env = "INBOXD_PROFILE", default_value = "")]
    pub profile: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one dispatcher tick: reap a timed-out run, advance an active
    /// run by one chunk, or start a passive pass, whichever applies.
    Tick,

    /// Kick off an on-demand active scan over a symbolic date range
    /// (e.g. "1day", "7days", "30days").
    Start {
        #[arg(long)]
        range: String,
    },

    /// Print the latest run stats and current lock state as JSON.
    Status,
}
