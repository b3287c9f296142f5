use std::env;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use kilo::api::create_router;
use kilo::client::GatewayClient;
use kilo::config::{self, APP_NAME, AppConfig};
use kilo_protocol::{ChatMessage, ExecutionRequest, Mode};
use tokio::net::TcpListener;
use tracing::{debug, info};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("config file: {}", ctx.config_file.display());

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Plan(cmd) => async_plan(ctx, cmd),
        Command::Execute(cmd) => async_execute(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Kilo - plan, confirm and execute with a coding agent.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true)]
    no_color: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the gateway
    Serve(ServeCommand),
    /// Ask a running gateway for a plan
    Plan(PlanCommand),
    /// Execute confirmed steps on a running gateway and stream the output
    Execute(ExecuteCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Agent service and file-index address
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct PlanCommand {
    /// Gateway address (defaults to the configured server)
    #[arg(long, value_name = "URL")]
    url: Option<String>,
    /// Conversation so far, as user messages
    #[arg(value_name = "MESSAGE", required = true)]
    messages: Vec<String>,
}

#[derive(Debug, Clone, Args)]
struct ExecuteCommand {
    /// Gateway address (defaults to the configured server)
    #[arg(long, value_name = "URL")]
    url: Option<String>,
    /// Agent mode
    #[arg(long, default_value_t = Mode::Coder)]
    mode: Mode,
    /// Confirmed plan steps, in order
    #[arg(value_name = "STEP", required = true)]
    steps: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = match &common.config {
            Some(path) => config::expand_str_path(&path.to_string_lossy())?,
            None => config::default_config_path()?,
        };
        let config = config::load_config(Some(&config_file))?;
        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("kilo={level},kilo_files={level},tower_http={level}"))
        });

        // Logs go to stderr; stdout carries command output.
        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let disable_color = self.common.no_color
                || env::var_os("NO_COLOR").is_some()
                || !io::stderr().is_terminal();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(!disable_color)
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        }

        Ok(())
    }

    fn effective_log_level(&self) -> &str {
        if self.common.quiet {
            "error"
        } else if self.common.trace {
            "trace"
        } else if self.common.debug {
            "debug"
        } else {
            match self.common.verbose {
                0 => self.config.logging.level.as_str(),
                1 => "debug",
                _ => "trace",
            }
        }
    }

    fn gateway_url(&self, url: Option<String>) -> String {
        url.unwrap_or_else(|| {
            format!(
                "http://{}:{}",
                self.config.server.host, self.config.server.port
            )
        })
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let mut config = ctx.config;
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    if let Some(url) = cmd.backend_url {
        config.backend_url = url;
    }

    let state = config.app_state()?;
    info!(
        backend = %config.backend_url,
        transport = %state.transport(),
        "starting gateway"
    );
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn async_plan(ctx: RuntimeContext, cmd: PlanCommand) -> Result<()> {
    let client = GatewayClient::new(ctx.gateway_url(cmd.url))?;
    let messages = cmd.messages.into_iter().map(ChatMessage::user).collect();
    let plan = client.plan(messages).await?;

    let mut stdout = io::stdout().lock();
    if ctx.common.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&plan)?)?;
        return Ok(());
    }

    if plan.is_empty() {
        writeln!(stdout, "(no steps)")?;
    }
    for (index, step) in plan.steps.iter().enumerate() {
        writeln!(stdout, "{}. {}", index + 1, step)?;
    }
    if let Some(summary) = &plan.summary {
        writeln!(stdout, "\n{summary}")?;
    }
    Ok(())
}

#[tokio::main]
async fn async_execute(ctx: RuntimeContext, cmd: ExecuteCommand) -> Result<()> {
    let client = GatewayClient::new(ctx.gateway_url(cmd.url))?;
    let request = ExecutionRequest::from_plan(cmd.mode, cmd.steps);
    let json = ctx.common.json;

    let mut stdout = io::stdout();
    let mut write_err = None;
    let result = client
        .execute(&request, |payload| {
            if write_err.is_some() {
                return;
            }
            let written = if json {
                serde_json::to_string(payload)
                    .map_err(io::Error::other)
                    .and_then(|line| writeln!(stdout, "{line}"))
            } else {
                write!(stdout, "{payload}").and_then(|()| stdout.flush())
            };
            if let Err(err) = written {
                write_err = Some(err);
            }
        })
        .await;

    if let Some(err) = write_err {
        return Err(err).context("writing output");
    }
    let chunks = result.with_context(|| format!("executing on {}", client.base_url()))?;
    if !json {
        writeln!(stdout)?;
    }
    debug!(chunks, "execution complete");
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            if ctx.config_file.exists() && !force {
                info!(
                    "config already exists at {} (use --force to overwrite)",
                    ctx.config_file.display()
                );
                return Ok(());
            }
            config::write_default_config(&ctx.config_file)?;
            println!("{}", ctx.config_file.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
