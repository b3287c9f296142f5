//! One-shot agent call: `kilo-bridge <INPUT_PATH>`.
//!
//! Reads `{"mode": .., "input": ..}` from the file, runs the agent and prints
//! the JSON result on stdout. On failure nothing is printed on stdout; the
//! reason goes to stderr and the exit status is non-zero.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use kilo::agent::{AgentInvoker, HttpAgent};
use kilo::bridge::run_bridge;
use kilo::config::DEFAULT_BACKEND_URL;
use log::{LevelFilter, debug};

#[derive(Debug, Parser)]
#[command(name = "kilo-bridge", version, about = "Run one agent call from an input file")]
struct Args {
    /// JSON file holding `{mode, input}`
    #[arg(value_name = "INPUT_PATH")]
    input: Option<PathBuf>,

    /// Agent service address
    #[arg(long, env = "KILO_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// Seconds to wait for the agent
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Increase logging verbosity (stackable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(io::stderr(), "error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| anyhow!("failed to start runtime: {err}"))?;

    let output = runtime.block_on(async {
        let agent = Arc::new(HttpAgent::new(&args.backend_url)?);
        debug!("calling agent at {}", args.backend_url);
        let invoker = AgentInvoker::new(agent.clone(), agent)
            .with_timeout(Duration::from_secs(args.timeout));
        let output = run_bridge(args.input.as_deref(), &invoker).await?;
        Ok::<_, anyhow::Error>(output)
    })?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{output}")
        .and_then(|()| stdout.flush())
        .map_err(|err| anyhow!("failed to write result: {err}"))
}
