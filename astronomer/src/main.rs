//! astronomer - CLI for normalizing analytics calls and delivering them to Astronomer
//!
//! This tool provides commands for:
//! - Issuing page, identify, track, group and alias calls from a simulated page
//! - Replaying raw call descriptions from JSON
//! - Inspecting the configuration and the persisted referrer
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/astronomer/data.db (~/.local/share/astronomer/data.db)
//! - Config: $XDG_CONFIG_HOME/astronomer/config.toml (~/.config/astronomer/config.toml)

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use astronomer_core::context::{read_persisted_referrer, REFERRER_KEY};
use astronomer_core::storage::PublicSuffixes;
use astronomer_core::{
    Config, Database, KeyValueStore, PageEnvironment, RawCall, StorageSelector, Tracker,
    UserState,
};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

const DEFAULT_PAGE_URL: &str = "https://localhost/";

#[derive(Parser)]
#[command(name = "astronomer")]
#[command(about = "Normalize analytics calls and deliver them to Astronomer")]
#[command(version)]
struct Args {
    /// Verbose output (writes a log file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// URL of the page issuing the call
    #[arg(long, global = true, default_value = DEFAULT_PAGE_URL)]
    url: String,

    /// User agent reported in the envelope context
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// User id the page already knows about
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Anonymous id the page already knows about
    #[arg(long, global = true)]
    anonymous_id: Option<String>,

    /// Print the envelope instead of sending it
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a page view
    Page {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Page properties as a JSON object
        #[arg(long)]
        properties: Option<String>,
        /// Context overrides as a JSON object
        #[arg(long)]
        options: Option<String>,
    },

    /// Tie the visitor to a user id
    Identify {
        /// Explicit user id for this call
        #[arg(value_name = "USER_ID")]
        id: Option<String>,
        #[arg(long)]
        traits: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },

    /// Record an event
    Track {
        event: String,
        #[arg(long)]
        properties: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },

    /// Associate the visitor with a group
    Group {
        #[arg(value_name = "GROUP_ID")]
        group: String,
        #[arg(long)]
        traits: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },

    /// Link a previous id to a new user id
    Alias { to: String, from: Option<String> },

    /// Send a raw call description read from FILE, or stdin with `-`
    Send { file: String },

    /// Show configuration and readiness
    Status,

    /// Show the referrer persisted for --url
    Referrer {
        /// Forget the persisted referrer
        #[arg(long)]
        clear: bool,
    },
}

/// Returns $HOME or the current directory
fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Sets XDG environment variables to ensure the core library uses XDG paths
fn ensure_xdg_env() {
    let home = home_dir();

    if std::env::var("XDG_DATA_HOME").is_err() {
        std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
    }

    if std::env::var("XDG_STATE_HOME").is_err() {
        std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
    }

    if std::env::var("XDG_CONFIG_HOME").is_err() {
        std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(
            astronomer_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    let call = match &args.command {
        Command::Status => return cmd_status(&config),
        Command::Referrer { clear } => return cmd_referrer(&config, &args, *clear),
        Command::Page {
            category,
            name,
            properties,
            options,
        } => apply_options(
            RawCall::page(category.as_deref(), name.as_deref())
                .with_properties(parse_object("properties", properties)?.unwrap_or_default()),
            parse_object("options", options)?,
        ),
        Command::Identify {
            id,
            traits,
            options,
        } => apply_options(
            RawCall::identify(id.as_deref())
                .with_traits(parse_object("traits", traits)?.unwrap_or_default()),
            parse_object("options", options)?,
        ),
        Command::Track {
            event,
            properties,
            options,
        } => apply_options(
            RawCall::track(event.clone())
                .with_properties(parse_object("properties", properties)?.unwrap_or_default()),
            parse_object("options", options)?,
        ),
        Command::Group {
            group,
            traits,
            options,
        } => apply_options(
            RawCall::group(group.clone())
                .with_traits(parse_object("traits", traits)?.unwrap_or_default()),
            parse_object("options", options)?,
        ),
        Command::Alias { to, from } => RawCall::alias(to.clone(), from.as_deref()),
        Command::Send { file } => read_raw_call(file)?,
    };

    cmd_call(&config, &args, call).await
}

/// Attach `options` when the flag was given
fn apply_options(call: RawCall, options: Option<Map<String, Value>>) -> RawCall {
    match options {
        Some(options) => call.with_options(options),
        None => call,
    }
}

fn parse_object(flag: &str, raw: &Option<String>) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw)
        .with_context(|| format!("--{} is not valid JSON", flag))?
    {
        Value::Object(map) => Ok(Some(map)),
        _ => bail!("--{} must be a JSON object", flag),
    }
}

fn read_raw_call(file: &str) -> Result<RawCall> {
    let json = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read call from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file))?
    };
    Ok(RawCall::from_json(&json)?)
}

fn page_environment(args: &Args) -> Result<PageEnvironment> {
    let user_agent = args
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("astronomer/{}", env!("CARGO_PKG_VERSION")));
    PageEnvironment::from_url(&args.url, user_agent)
        .with_context(|| format!("invalid --url {}", args.url))
}

fn open_database() -> Result<Database> {
    let db_path = Config::database_path();
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {:?}", db_path))?;
    db.migrate().context("failed to run migrations")?;
    Ok(db)
}

async fn cmd_call(config: &Config, args: &Args, call: RawCall) -> Result<()> {
    let page = page_environment(args)?;
    let user = UserState::new(args.user_id.clone(), args.anonymous_id.clone());

    let tracker = Tracker::new(config, open_database()?).context("failed to create tracker")?;
    let envelope = tracker
        .normalize(call, &user, &page)
        .context("failed to build envelope")?;

    if args.dry_run {
        println!("{}", envelope.to_json_pretty()?);
        return Ok(());
    }

    let delivery = tracker
        .dispatch(&page, &envelope)
        .await
        .context("failed to deliver envelope")?;

    tracing::info!(message_id = %envelope.message_id, url = %delivery.url, "Delivered");
    println!(
        "Delivered {} to {} ({})",
        envelope.message_id, delivery.url, delivery.status
    );
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Astronomer Configuration");
    println!("========================");
    println!();

    let integration = &config.integration;

    println!("Host:            {}", integration.host);
    println!(
        "API Key:         {}",
        if integration.api_key.is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    match integration.timeout_secs {
        Some(secs) => println!("Timeout:         {}s", secs),
        None => println!("Timeout:         none"),
    }
    println!("Extra Referrers: {}", config.referrer_networks.len());
    println!("Config:          {}", Config::config_path().display());
    println!("Database:        {}", Config::database_path().display());
    println!("Log File:        {}", Config::log_path().display());

    println!();
    match integration.validate() {
        Ok(()) => println!("Status: Ready to send"),
        Err(e) => println!("Status: Not ready ({})", e),
    }

    Ok(())
}

fn cmd_referrer(config: &Config, args: &Args, clear: bool) -> Result<()> {
    let page = page_environment(args)?;
    let db = open_database()?;
    let suffixes = PublicSuffixes::with_extra(config.cookies.public_suffixes.iter());
    let store = StorageSelector::new(&db, &suffixes).select(&page);

    if clear {
        store
            .set(REFERRER_KEY, None)
            .context("failed to clear referrer")?;
        println!("Referrer cleared for {}", args.url);
        return Ok(());
    }

    match read_persisted_referrer(&store) {
        Some(referrer) => println!("{}", serde_json::to_string_pretty(&referrer)?),
        None => println!("No referrer persisted for {}", args.url),
    }
    Ok(())
}
