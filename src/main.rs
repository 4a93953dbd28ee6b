//! echopilot: an echo server with signal-driven reload.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGHUP ──┐                          ┌──────────────────────────────┐
//!   SIGINT ──┼─▶ lifecycle::signals ───▶│ lifecycle::coordinator       │
//!   SIGTERM ─┘          │ reload        │  exit code, done token, wait │
//!                       ▼               └──────────────┬───────────────┘
//!   config file ─▶ config::watcher          one loop per protocol
//!                       │                              ▼
//!                       └──────────────▶ lifecycle::manager
//!                                          fetch options (config::server)
//!                                          start listener (http::server)
//!                                          stop within timeout, repeat
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use echopilot::config::PartialConfig;
use echopilot::http::server::{DEFAULT_BODY_LIMIT, DEFAULT_REQUEST_TIMEOUT};
use echopilot::lifecycle::startup::{run_server, StartupOptions};
use echopilot::lifecycle::{ExitCode, SystemdNotifier, SystemdState};
use echopilot::observability::logging;
use echopilot::rpc::client::DEFAULT_CLIENT_TIMEOUT;
use echopilot::rpc::{EchoClient, EchoService};

#[derive(Debug, Parser)]
#[command(name = "echopilot", version, about = "Echo server with hot reload")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the echo server.
    Serve(ServeArgs),
    /// Call the echo service of a running server.
    Client(ClientArgs),
    /// Echo the arguments locally, without a server.
    Exec(ExecArgs),
    /// Talk to systemd.
    Systemd {
        #[command(subcommand)]
        command: SystemdCommand,
    },
}

#[derive(Debug, Subcommand)]
enum SystemdCommand {
    /// Send an sd_notify message when running as a Type=notify unit.
    Notify(NotifyArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Path to the JSON config file.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Public host name of the server.
    #[arg(long)]
    host: Option<String>,

    /// IP address to bind.
    #[arg(long)]
    ip: Option<String>,

    /// Port to bind.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the TLS certificate (PEM).
    #[arg(long = "tlsCert")]
    tls_cert: Option<PathBuf>,

    /// Path to the TLS private key (PEM).
    #[arg(long = "tlsKey")]
    tls_key: Option<PathBuf>,

    /// Serve over TLS.
    #[arg(long = "tlsEnabled")]
    tls_enabled: Option<bool>,

    /// Skip certificate verification on outgoing connections.
    #[arg(long = "tlsSkipVerify")]
    tls_skip_verify: Option<bool>,

    /// Reload when the config file changes.
    #[arg(long)]
    watch: bool,

    /// Per-request timeout in seconds.
    #[arg(long = "requestTimeout", default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    request_timeout: u64,

    /// Maximum request body size in bytes.
    #[arg(long = "bodyLimit", default_value_t = DEFAULT_BODY_LIMIT)]
    body_limit: usize,
}

impl ServeArgs {
    fn startup_options(&self) -> StartupOptions {
        StartupOptions {
            watch: self.watch,
            request_timeout: Duration::from_secs(self.request_timeout),
            body_limit: self.body_limit,
            ..StartupOptions::default()
        }
    }
}

impl From<&ServeArgs> for PartialConfig {
    fn from(args: &ServeArgs) -> Self {
        PartialConfig {
            config_file: args.config.clone(),
            host: args.host.clone(),
            ip: args.ip.clone(),
            port: args.port,
            tls_cert: args.tls_cert.clone(),
            tls_key: args.tls_key.clone(),
            tls_enabled: args.tls_enabled,
            tls_skip_verify: args.tls_skip_verify,
        }
    }
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Address of the echo server.
    #[arg(long, default_value = "https://127.0.0.1:3000")]
    addr: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CLIENT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Accept self-signed server certificates.
    #[arg(long = "tlsSkipVerify", default_value_t = false, action = clap::ArgAction::Set)]
    tls_skip_verify: bool,

    /// Send the content as an integer.
    #[arg(long)]
    int: bool,

    /// Content to echo. Multiple words are joined with spaces.
    #[arg(allow_negative_numbers = true)]
    content: Vec<String>,
}

#[derive(Debug, Args)]
struct ExecArgs {
    /// Content to echo. Multiple words are joined with spaces.
    #[arg(allow_hyphen_values = true)]
    content: Vec<String>,
}

#[derive(Debug, Args)]
struct NotifyArgs {
    /// State to report: ready, stopping, reloading or watchdog.
    #[arg(short, long, default_value = "ready")]
    state: SystemdState,

    /// Remove NOTIFY_SOCKET from the environment after sending.
    #[arg(short, long)]
    unset: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    logging::init(logging::DEFAULT_DIRECTIVES);

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Serve(args) => run_server(PartialConfig::from(&args), args.startup_options()).await,
        Command::Client(args) => run_client(args).await,
        Command::Exec(args) => {
            println!("{}", run_exec(&args));
            ExitCode::Success
        }
        Command::Systemd {
            command: SystemdCommand::Notify(args),
        } => run_notify(&args),
    };

    code.into()
}

async fn run_client(args: ClientArgs) -> ExitCode {
    let client = match EchoClient::new(&args.addr, Duration::from_secs(args.timeout), args.tls_skip_verify) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error while creating client: {e}");
            return ExitCode::Failure;
        }
    };

    let content = args.content.join(" ");
    let result = if args.int {
        match content.trim().parse::<i32>() {
            Ok(n) => client.echo_int(n).await.map(|n| n.to_string()),
            Err(e) => {
                eprintln!("Invalid integer {content:?}: {e}");
                return ExitCode::Failure;
            }
        }
    } else {
        client.echo_string(content).await
    };

    match result {
        Ok(echoed) => {
            println!("{echoed}");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error during client request: {e}");
            ExitCode::Failure
        }
    }
}

fn run_exec(args: &ExecArgs) -> String {
    EchoService.echo_string(args.content.join(" "))
}

fn run_notify(args: &NotifyArgs) -> ExitCode {
    if !SystemdNotifier::detect() {
        tracing::info!("NOTIFY_SOCKET not defined, skipping systemd notify");
        return ExitCode::Success;
    }

    match SystemdNotifier::new(args.unset).notify(args.state) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(state = %args.state, error = %e, "Failed to notify systemd");
            ExitCode::Failure
        }
    }
}
