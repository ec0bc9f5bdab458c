mod editor;
mod filters;
mod io;
mod logging;
mod server;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use editor::{EditorConfigBuilder, SessionRegistry};
use filters::FilterSet;
use logging::{LogConfig, init_logging};
use server::AppState;

/// File descriptor a socket-activating supervisor hands us
const SYSTEMD_FIRST_SOCKET_FD: i32 = 3;

/// Editor command used when neither CLI args nor the environment name one
const DEFAULT_EDITOR: &str = "gvim -f";

/// CLI arguments for the edit server daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 9292)]
    port: u16,

    /// Delay (in minutes) before deleting unused files
    #[arg(short, long, value_name = "MINUTES", default_value_t = 5)]
    delay: u64,

    /// Location of temporary files (defaults to the system temp dir, or $EDIT_SERVER_TEMP if defined)
    #[arg(long, value_name = "DIR")]
    tempdir: Option<PathBuf>,

    /// Disable incremental edits (a request will block until the editor is finished)
    #[arg(
        long = "no-incremental",
        default_value_t = true,
        action = clap::ArgAction::SetFalse
    )]
    incremental: bool,

    /// Disable context-specific filters (e.g. the gmail compose filter)
    #[arg(
        long = "no-filters",
        default_value_t = true,
        action = clap::ArgAction::SetFalse
    )]
    use_filters: bool,

    /// Comma-separated filter names to load, in match order
    #[arg(long, value_name = "NAMES", default_value = "gmail")]
    filters: String,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides EDIT_SERVER_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Editor command (defaults to $EDIT_SERVER_EDITOR, then "gvim -f")
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "EDIT-CMD")]
    editor: Vec<String>,
}

/// Resolve the editor argument vector from CLI args and environment
///
/// Priority: trailing CLI args > $EDIT_SERVER_EDITOR (shell-split) >
/// the built-in default.
fn resolve_editor_command(cli_args: Vec<String>, env_editor: Option<&str>) -> Vec<String> {
    if !cli_args.is_empty() {
        return cli_args;
    }
    if let Some(raw) = env_editor {
        match shlex::split(raw) {
            Some(argv) if !argv.is_empty() => return argv,
            _ => warn!("Could not parse EDIT_SERVER_EDITOR, falling back: {:?}", raw),
        }
    }
    shlex::split(DEFAULT_EDITOR).unwrap_or_default()
}

/// Resolve the temp directory from CLI args and environment
fn resolve_temp_dir(cli_dir: Option<PathBuf>, env_dir: Option<&str>) -> Option<PathBuf> {
    cli_dir.or_else(|| env_dir.map(PathBuf::from))
}

/// Bind the listening socket
///
/// A socket-activating supervisor (systemd) sets LISTEN_PID to our pid
/// and passes a ready-bound socket on fd 3; otherwise bind localhost
/// ourselves.
async fn bind_listener(port: u16) -> std::io::Result<tokio::net::TcpListener> {
    #[cfg(unix)]
    {
        let activated = std::env::var("LISTEN_PID")
            .is_ok_and(|pid| pid == std::process::id().to_string());
        if activated {
            use std::os::unix::io::FromRawFd;
            // SAFETY: the supervisor guarantees fd 3 is our listening socket
            let std_listener =
                unsafe { std::net::TcpListener::from_raw_fd(SYSTEMD_FIRST_SOCKET_FD) };
            std_listener.set_nonblocking(true)?;
            info!(
                "edit-server started on inherited socket fd {}",
                SYSTEMD_FIRST_SOCKET_FD
            );
            return tokio::net::TcpListener::from_std(std_listener);
        }
    }

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("edit-server started on port {}", port);
    Ok(listener)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config =
        LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let editor_command = resolve_editor_command(
        args.editor,
        std::env::var("EDIT_SERVER_EDITOR").ok().as_deref(),
    );
    info!("Using editor command: {:?}", editor_command);

    let mut builder = EditorConfigBuilder::new()
        .editor_command(editor_command)
        .incremental(args.incremental)
        .delete_delay(Duration::from_secs(args.delay * 60));
    if let Some(dir) = resolve_temp_dir(
        args.tempdir,
        std::env::var("EDIT_SERVER_TEMP").ok().as_deref(),
    ) {
        builder = builder.temp_dir(dir);
    }
    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let filters = if args.use_filters {
        FilterSet::from_spec(&args.filters)
    } else {
        FilterSet::empty()
    };
    info!("Loaded {} filters", filters.len());

    let state = AppState {
        config: Arc::new(config),
        registry: SessionRegistry::new(),
        filters: Arc::new(filters),
    };

    info!("edit-server PID is {}", std::process::id());
    let listener = bind_listener(args.port).await?;
    axum::serve(listener, server::app(state)).await?;

    Ok(())
}
