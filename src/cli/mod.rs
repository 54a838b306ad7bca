pub mod report;

use std::{fmt::Display, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::Local;
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use now::DateTimeNow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

use crate::{
    browser::{BrowserHost, DetachedBrowser},
    engine::{detect_shutdown, run_engine, EVENT_BUFFER},
    storage::{
        entities::Theme,
        store::{AggregateStore, JsonStore},
    },
    utils::{dir::create_application_default_path, format::Percentage, logging::enable_logging},
};

const DIR_HELP: &str =
    "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state";

#[derive(Parser, Debug)]
#[command(name = "Wheretime", version, long_about = None)]
#[command(about = "Tracks where your browsing time goes, per web domain", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Log to the console as well as the log files")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Run the tracking engine in the current console")]
    Serve {
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
    #[command(about = "Show accumulated time per domain")]
    Summary {
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
        #[arg(short, long, help = "Show lifetime totals instead of today's")]
        lifetime: bool,
        #[arg(short = 'p', long = "percentage", help = "Filter domains to have at least specified percentage", default_value_t = Percentage::new_opt(1.).unwrap())]
        min_percentage: Percentage,
    },
    #[command(about = "List recent tracked sessions")]
    Sessions {
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
        #[arg(
            short,
            long,
            default_value_t = 20,
            help = "How many of the most recent sessions to show"
        )]
        count: usize,
        #[arg(
            short,
            long,
            help = "Only show sessions since this moment. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\""
        )]
        since: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
        #[arg(
            long = "days",
            default_value_t = false,
            help = "Snap --since to the start of its day"
        )]
        treat_as_days: bool,
    },
    #[command(about = "Manage daily time limits")]
    Limit {
        #[command(subcommand)]
        command: LimitCommand,
    },
    #[command(about = "Set the dashboard theme")]
    Theme {
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
        #[arg(value_enum)]
        theme: Theme,
    },
}

#[derive(Subcommand, Debug)]
enum LimitCommand {
    #[command(about = "Cap a domain to the given number of seconds per day")]
    Set {
        domain: String,
        seconds: u64,
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
    #[command(about = "Remove the daily limit for a domain")]
    Clear {
        domain: String,
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
    #[command(about = "Show configured limits")]
    List {
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Serve { dir } => {
            let dir = resolve_dir(dir)?;
            let logging_level = if args.log { Some(LevelFilter::TRACE) } else { None };
            enable_logging(&dir, logging_level, args.log)?;
            serve(dir).await
        }
        Commands::Summary {
            dir,
            lifetime,
            min_percentage,
        } => {
            let snapshot = open_store(dir)?.load().await?;
            if lifetime {
                report::print_totals("Lifetime", &snapshot.lifetime, min_percentage);
            } else {
                report::print_totals("Today", &snapshot.daily, min_percentage);
            }
            Ok(())
        }
        Commands::Sessions {
            dir,
            count,
            since,
            date_style,
            treat_as_days,
        } => {
            let snapshot = open_store(dir)?.load().await?;
            let mut sessions = snapshot.sessions;
            if let Some(since) = since {
                let cutoff = parse_since(&since, date_style, treat_as_days)?;
                sessions.retain(|record| record.end.with_timezone(&Local) >= cutoff);
            }
            let skip = sessions.len().saturating_sub(count);
            report::print_sessions(&sessions[skip..]);
            Ok(())
        }
        Commands::Limit { command } => match command {
            LimitCommand::Set { domain, seconds, dir } => {
                open_store(dir)?
                    .set_limit(normalize_domain(&domain), seconds)
                    .await
            }
            LimitCommand::Clear { domain, dir } => {
                open_store(dir)?.clear_limit(normalize_domain(&domain)).await
            }
            LimitCommand::List { dir } => {
                let snapshot = open_store(dir)?.load().await?;
                report::print_limits(&snapshot.limits);
                Ok(())
            }
        },
        Commands::Theme { dir, theme } => open_store(dir)?.set_theme(theme).await,
    }
}

/// Runs the engine until ctrl-c. Without an embedder feeding browser events
/// the engine only ticks, which is still useful for debugging state handling.
async fn serve(dir: PathBuf) -> Result<()> {
    let (_sender, receiver) = mpsc::channel(EVENT_BUFFER);
    let shutdown = CancellationToken::new();
    let browser: Arc<dyn BrowserHost> = Arc::new(DetachedBrowser);

    let (_, engine_result) = tokio::join!(
        detect_shutdown(shutdown.clone()),
        run_engine(dir, browser, receiver, shutdown.clone()),
    );
    engine_result
}

fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }
        None => create_application_default_path(),
    }
}

fn open_store(dir: Option<PathBuf>) -> Result<JsonStore> {
    Ok(JsonStore::new(resolve_dir(dir)?)?)
}

/// Limits are keyed the same way tracked time is, so a pasted address with a
/// `www.` prefix still matches.
fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("www.").unwrap_or(domain)
}

fn parse_since(
    since: &str,
    date_style: DateStyle,
    treat_as_days: bool,
) -> Result<chrono::DateTime<Local>> {
    let parsed = match parse_date_string(since, Local::now(), date_style.into()) {
        Ok(v) => v.with_timezone(&Local),
        Err(e) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to parse since date {e}"),
                )
                .into());
        }
    };
    Ok(if treat_as_days {
        parsed.beginning_of_day()
    } else {
        parsed
    })
}
