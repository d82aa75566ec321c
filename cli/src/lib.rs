//! Command-line front end for the ctx7 helper supervisor
//!
//! Parsing lives here rather than in `main.rs` so commands can be driven
//! from tests with an in-memory writer.

pub mod error;

pub use error::{CliError, Result};

use clap::{ArgGroup, Args, Parser, Subcommand};
use ctx7_core::{
    load_api_key, resolve_config, ApiKey, ContentType, CoreError, DocsClient, DocsQuery,
    HelperStatus, Readiness, StartOutcome, StopOutcome, Supervisor, SupervisorConfig,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// ctx7 command line
#[derive(Parser, Debug)]
#[command(name = "ctx7")]
#[command(about = "Start, stop and query a local Context7 documentation helper")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Supervisor config file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn", value_name = "FILTER")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the helper unless it is already running
    StartServer {
        /// Port for the helper (defaults to the configured port)
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,
    },
    /// Stop the helper; stopping nothing is not an error
    StopServer {
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,
    },
    /// Show whether the helper is running
    Status {
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,
    },
    /// Ask the running helper for library documentation
    Query(QueryArgs),
    /// Show whether an API key is configured
    ApiStatus,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["library_id", "library"])
))]
pub struct QueryArgs {
    /// Exact library id, e.g. /vercel/next.js
    #[arg(long, value_name = "ID")]
    pub library_id: Option<String>,

    /// Library name to resolve, e.g. react
    #[arg(long, value_name = "NAME")]
    pub library: Option<String>,

    /// What to look for
    #[arg(long)]
    pub topic: Option<String>,

    /// examples, api-ref, setup, concepts, troubleshooting, migration, patterns or all
    #[arg(long, default_value = "examples", value_parser = parse_content_type)]
    pub content_type: ContentType,

    /// Port of the running helper
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,
}

fn parse_content_type(s: &str) -> std::result::Result<ContentType, String> {
    s.parse().map_err(|e: CoreError| e.to_string())
}

/// Load the effective configuration for `cli`
pub fn load_config(cli: &Cli) -> Result<SupervisorConfig> {
    resolve_config(cli.config.as_deref()).map_err(|e| match e {
        CoreError::ConfigurationError(msg) | CoreError::ValidationError(msg) => {
            CliError::ConfigError(msg)
        }
        other => CliError::Core(other),
    })
}

/// Run the parsed command, writing user-facing lines to `out`.
///
/// Any error means exit code 1; idempotent no-ops are `Ok`.
pub async fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    if let Commands::ApiStatus = cli.command {
        return render_api_status(load_api_key().as_ref(), out);
    }

    let config = load_config(cli)?;
    let default_port = config.default_port;

    match &cli.command {
        Commands::StartServer { port } => {
            let port = port.unwrap_or(default_port);
            let supervisor = Supervisor::from_config(config).with_api_key(load_api_key());
            start_server(&supervisor, port, out).await
        }
        Commands::StopServer { port } => {
            let supervisor = Supervisor::from_config(config);
            stop_server(&supervisor, port.unwrap_or(default_port), out).await
        }
        Commands::Status { port } => {
            let supervisor = Supervisor::from_config(config);
            status(&supervisor, port.unwrap_or(default_port), out).await
        }
        Commands::Query(args) => {
            let host = config.readiness_host.clone();
            let has_key = load_api_key().is_some();
            let port = args.port.unwrap_or(default_port);
            query(args, &host, port, has_key, out).await
        }
        Commands::ApiStatus => Ok(()),
    }
}

/// `start-server`
pub async fn start_server<W: Write>(supervisor: &Supervisor, port: u16, out: &mut W) -> Result<()> {
    match supervisor.start(port).await? {
        StartOutcome::AlreadyRunning { pid } => {
            writeln!(out, "Context7 helper already running on port {port} (PID {pid})")?;
        }
        StartOutcome::Started {
            pid,
            readiness: Readiness::Listening,
        } => {
            writeln!(out, "✓ Context7 helper started on port {port} (PID {pid})")?;
        }
        StartOutcome::Started {
            pid,
            readiness: Readiness::Alive,
        } => {
            writeln!(
                out,
                "✓ Context7 helper started on port {port} (PID {pid}), still initializing"
            )?;
        }
    }
    writeln!(out, "  Record: {}", supervisor.records().path_for(port).display())?;
    Ok(())
}

/// `stop-server`
pub async fn stop_server<W: Write>(supervisor: &Supervisor, port: u16, out: &mut W) -> Result<()> {
    match supervisor.stop(port).await? {
        StopOutcome::Stopped { pid, forced } => {
            let how = if forced { " (forced)" } else { "" };
            writeln!(out, "✓ Stopped Context7 helper on port {port} (PID {pid}){how}")?;
        }
        StopOutcome::StaleRecord { .. } => {
            writeln!(out, "Context7 helper on port {port} not running (stale record)")?;
        }
        StopOutcome::StoppedByPattern { pids } => {
            let list: Vec<String> = pids.iter().map(u32::to_string).collect();
            writeln!(
                out,
                "✓ Stopped unrecorded Context7 helper on port {port} (PID {})",
                list.join(", ")
            )?;
        }
        StopOutcome::NotRunning => {
            writeln!(out, "Context7 helper on port {port} not running")?;
        }
    }
    Ok(())
}

/// `status`
pub async fn status<W: Write>(supervisor: &Supervisor, port: u16, out: &mut W) -> Result<()> {
    match supervisor.status(port).await? {
        HelperStatus::Running { pid } => {
            writeln!(out, "Context7 helper running on port {port} (PID {pid})")?;
        }
        HelperStatus::StaleRecord { .. } => {
            writeln!(out, "Context7 helper on port {port} not running (stale record)")?;
        }
        HelperStatus::NotRunning => {
            writeln!(out, "Context7 helper on port {port} not running")?;
        }
    }
    Ok(())
}

/// `query`
///
/// Rate-limit and authentication failures are preceded by a hint about the
/// API key; `has_key` selects which one.
pub async fn query<W: Write>(
    args: &QueryArgs,
    host: &str,
    port: u16,
    has_key: bool,
    out: &mut W,
) -> Result<()> {
    let request = DocsQuery::new(
        args.library_id.as_deref(),
        args.library.as_deref(),
        args.topic.as_deref(),
        args.content_type,
    )
    .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    debug!("Querying helper on port {}: {:?}", port, request);

    match DocsClient::for_port(host, port).fetch(&request).await {
        Ok(text) => {
            writeln!(out, "{text}")?;
            Ok(())
        }
        Err(e) => {
            if let Some(hint) = credential_hint(&e, has_key) {
                writeln!(out, "{hint}")?;
            }
            Err(e.into())
        }
    }
}

const KEY_MISSING_HINT: &str = "No Context7 API key is configured. Set CONTEXT7_API_KEY, or save it with\n  echo \"CONTEXT7_API_KEY=<your_key>\" > ~/.context7.env\nand restart the helper. Get a free key at https://context7.com/dashboard";

/// Advice for a failure an API key could fix
pub fn credential_hint(err: &CoreError, has_key: bool) -> Option<&'static str> {
    match (err, has_key) {
        (CoreError::RateLimited(_) | CoreError::AuthFailed(_), false) => Some(KEY_MISSING_HINT),
        (CoreError::RateLimited(_), true) => {
            Some("Your API key may have exceeded its quota. Check https://context7.com/dashboard")
        }
        (CoreError::AuthFailed(_), true) => {
            Some("Your API key may be invalid. Get a new one at https://context7.com/dashboard")
        }
        _ => None,
    }
}

/// `api-status`
pub fn render_api_status<W: Write>(key: Option<&ApiKey>, out: &mut W) -> Result<()> {
    match key {
        Some(key) => {
            writeln!(out, "✓ API key configured")?;
            writeln!(out, "  Key: {}", key.masked())?;
            writeln!(out, "  Source: {}", key.source())?;
        }
        None => {
            writeln!(out, "No API key configured")?;
            writeln!(
                out,
                "  Set CONTEXT7_API_KEY or add it to ./.context7.env or ~/.context7.env"
            )?;
        }
    }
    Ok(())
}
