//! # Indexer Console CLI (`ixc`)
//!
//! The `ixc` binary is the operator interface to the indexing service. It
//! lists and watches indexing jobs, starts and stops them, tails their logs,
//! and searches the indexed publications.
//!
//! ## Usage
//!
//! ```bash
//! ixc --config ./config/ixc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ixc login` | Log in and persist the session |
//! | `ixc logout` | Forget the session |
//! | `ixc jobs list` | List jobs, optionally filtered and watched |
//! | `ixc jobs show <id>` | Show one job; `--watch` polls until it ends |
//! | `ixc jobs start <type>` | Start an indexing job |
//! | `ixc jobs stop <id>` | Stop a running job (asks for confirmation) |
//! | `ixc logs <id>` | Print a job's logs; `--follow` tails them |
//! | `ixc search` | Search publications; `--interactive` for a session |
//!
//! Diagnostics go to stderr and are controlled by `IXC_LOG`
//! (e.g. `IXC_LOG=indexer_console=debug`); stdout carries results only.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indexer_console::actions;
use indexer_console::client::IndexerApi;
use indexer_console::config;
use indexer_console::error::ApiError;
use indexer_console::progress::OutputMode;
use indexer_console::search::{self, SearchOptions};
use indexer_console::session::{self, SessionStore};
use indexer_console_core::jobs::{JobListFilter, StartJobForm};
use indexer_console_core::{FilterMode, IndexerStatus, IndexerType, PageSize};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Indexer Console: watch, control and search the publication indexer.
#[derive(Parser)]
#[command(name = "ixc", version, about = "Operator console for the publication indexer")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ixc.toml`. A missing file means a local API on
    /// port 8000 and default intervals.
    #[arg(long, global = true, default_value = "./config/ixc.toml")]
    config: PathBuf,

    /// Log debug diagnostics to stderr unless `IXC_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token.
    Login {
        #[arg(long, short)]
        username: String,

        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session.
    Logout,

    /// Inspect and control indexing jobs.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Print a job's logs.
    Logs {
        id: u64,

        /// Keep polling for new entries until interrupted.
        #[arg(long, short)]
        follow: bool,

        #[arg(long)]
        json: bool,
    },

    /// Search indexed publications.
    Search {
        /// Free-text query.
        #[arg(long)]
        text: Option<String>,

        #[arg(long)]
        objeto: Option<String>,

        #[arg(long)]
        agencia: Option<String>,

        #[arg(long)]
        pais: Option<String>,

        #[arg(long)]
        rubro: Option<String>,

        /// Earliest apertura date (YYYY-MM-DD or DD/MM/YYYY).
        #[arg(long)]
        from: Option<String>,

        /// Latest apertura date (YYYY-MM-DD or DD/MM/YYYY).
        #[arg(long)]
        to: Option<String>,

        /// Comma-separated user tag ids; non-numeric entries are ignored.
        #[arg(long)]
        tags: Option<String>,

        /// `all` or `user_tags`.
        #[arg(long)]
        mode: Option<FilterMode>,

        /// Include expired publications.
        #[arg(long)]
        expired: bool,

        /// Only publications still open.
        #[arg(long)]
        current: bool,

        #[arg(long)]
        page: Option<u32>,

        /// One of 15, 50, 100, 200.
        #[arg(long, value_parser = parse_page_size)]
        page_size: Option<PageSize>,

        /// Print the raw result page as JSON.
        #[arg(long)]
        json: bool,

        /// Read filter edits from stdin and print each settled page.
        #[arg(long, short)]
        interactive: bool,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// List jobs.
    List {
        #[arg(long)]
        status: Option<IndexerStatus>,

        #[arg(long = "type")]
        kind: Option<IndexerType>,

        /// Refresh on the list interval until interrupted.
        #[arg(long, short)]
        watch: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show one job.
    Show {
        id: u64,

        /// Poll until the job is completed, failed or stopped.
        #[arg(long, short)]
        watch: bool,

        /// Also print the job's logs.
        #[arg(long)]
        logs: bool,

        #[arg(long)]
        json: bool,
    },

    /// Start a job.
    ///
    /// Types: `index-licitacion` (needs --publicacion-id),
    /// `index-scraper-publications` (needs --scraper-id and --since),
    /// `sync-since` (needs --since), `index-bulk`.
    Start {
        kind: IndexerType,

        #[arg(long)]
        publicacion_id: Option<String>,

        #[arg(long)]
        scraper_id: Option<String>,

        /// `YYYY-MM-DDTHH:MM[:SS]` or `YYYY-MM-DD HH:MM[:SS]`.
        #[arg(long)]
        since: Option<String>,

        /// Follow the new job and its logs until it ends.
        #[arg(long, short)]
        watch: bool,

        #[arg(long)]
        json: bool,
    },

    /// Stop a running job.
    Stop {
        id: u64,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
}

fn parse_page_size(s: &str) -> Result<PageSize, String> {
    let n: u32 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    PageSize::try_from(n).map_err(|e| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .with_env_var("IXC_LOG")
                .from_env_lossy(),
        )
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    // Commands that don't need a session
    match cli.command {
        Commands::Login { username, password } => {
            return session::run_login(&cfg, &username, password).await;
        }
        Commands::Logout => return session::run_logout(&cfg),
        command => {
            let mut store = SessionStore::init(&cfg.session.path)?;
            let api: Arc<dyn IndexerApi> =
                Arc::new(session::authenticated_client(&cfg, &store)?);
            let result = run(command, &cfg, api).await;
            if let Err(e) = &result {
                let unauthorized = e.chain().any(|c| {
                    matches!(
                        c.downcast_ref::<ApiError>(),
                        Some(ApiError::Unauthorized { .. })
                    )
                });
                if unauthorized {
                    warn!("server rejected the session, clearing it");
                    store.logout()?;
                }
            }
            result
        }
    }
}

async fn run(
    command: Commands,
    cfg: &config::Config,
    api: Arc<dyn IndexerApi>,
) -> anyhow::Result<()> {
    match command {
        Commands::Jobs { action } => match action {
            JobsAction::List {
                status,
                kind,
                watch,
                json,
            } => {
                let filter = JobListFilter { status, kind };
                actions::run_jobs_list(
                    api,
                    filter,
                    watch,
                    OutputMode::from_json_flag(json),
                    &cfg.polling,
                )
                .await?;
            }
            JobsAction::Show {
                id,
                watch,
                logs,
                json,
            } => {
                actions::run_jobs_show(
                    api,
                    id,
                    watch,
                    logs,
                    OutputMode::from_json_flag(json),
                    &cfg.polling,
                )
                .await?;
            }
            JobsAction::Start {
                kind,
                publicacion_id,
                scraper_id,
                since,
                watch,
                json,
            } => {
                let form = StartJobForm {
                    kind,
                    publicacion_id,
                    scraper_id,
                    since,
                };
                actions::run_jobs_start(
                    api,
                    form,
                    watch,
                    OutputMode::from_json_flag(json),
                    &cfg.polling,
                )
                .await?;
            }
            JobsAction::Stop { id, yes } => {
                actions::run_jobs_stop(api, id, yes, &cfg.polling).await?;
            }
        },
        Commands::Logs { id, follow, json } => {
            actions::run_logs(api, id, follow, OutputMode::from_json_flag(json), &cfg.polling)
                .await?;
        }
        Commands::Search {
            text,
            objeto,
            agencia,
            pais,
            rubro,
            from,
            to,
            tags,
            mode,
            expired,
            current,
            page,
            page_size,
            json,
            interactive,
        } => {
            let options = SearchOptions {
                text,
                objeto,
                agencia,
                pais,
                rubro,
                from,
                to,
                tags,
                mode,
                include_expired: expired,
                only_current: current,
                page,
                page_size,
            };
            if interactive {
                search::run_interactive(api, &options, &cfg.search, json).await?;
            } else {
                search::run_search(api, &options, &cfg.search, json).await?;
            }
        }
        Commands::Login { .. } | Commands::Logout => {
            // Handled in main (before the session is loaded)
            unreachable!()
        }
    }
    Ok(())
}
