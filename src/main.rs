use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about = "Run pipelines locally, on a remote worker, or across a worker cluster")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline definition (.toml or .json)
    Run(RunArgs),
    /// Start a worker node
    Serve {
        /// Address to bind (overrides [worker].bind)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides [worker].port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Allow cross-origin requests
        #[arg(long)]
        dev: bool,
    },
    /// Manage the port table of a worker
    Ports {
        #[command(subcommand)]
        command: PortsCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args, Clone, Debug)]
pub struct RunArgs {
    /// Pipeline definition file
    pub pipeline: PathBuf,

    /// Run mode: local, remote, clustered (inferred from --server / --cluster)
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Configured server to run on in remote mode
    #[arg(short, long)]
    pub server: Option<String>,

    /// Cluster manifest (defaults to .ferry/cluster.toml)
    #[arg(long)]
    pub cluster: Option<PathBuf>,

    /// Set a declared parameter (KEY=VALUE, repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Set a variable (KEY=VALUE, repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    #[arg(long)]
    pub safe_mode: bool,

    /// Gather step metrics
    #[arg(long)]
    pub metrics: bool,

    /// Pipeline log level: nothing, error, minimal, basic, detailed, debug, rowlevel
    #[arg(long)]
    pub log_level: Option<String>,

    /// Engine for local runs (overrides [defaults].run_configuration)
    #[arg(long)]
    pub engine: Option<String>,

    /// Arguments passed to the pipeline
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(Subcommand, Clone)]
pub enum PortsCommands {
    /// Allocate (or look up) the port for one step connection
    Allocate {
        #[arg(long)]
        server: String,
        /// Host the port is opened on (defaults to the server's host)
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        pipeline: String,
        #[arg(long)]
        source_slave: String,
        #[arg(long)]
        source_step: String,
        #[arg(long, default_value = "0")]
        source_copy: u32,
        #[arg(long)]
        target_slave: String,
        #[arg(long)]
        target_step: String,
        #[arg(long, default_value = "0")]
        target_copy: u32,
        /// Overrides [ports].base_port
        #[arg(long)]
        base_port: Option<u16>,
        #[arg(long, default_value = "")]
        run_id: String,
    },
    /// Free one port on a host
    Deallocate {
        #[arg(long)]
        server: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: u16,
    },
    /// Free every port held by a pipeline
    Release {
        #[arg(long)]
        server: String,
        #[arg(long)]
        pipeline: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default ferry.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ferry::logging::init_logging(cli.verbose, cli.log_json);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&project_dir, args).await?,
        Commands::Serve { bind, port, dev } => {
            cmd::cmd_serve(&project_dir, bind.clone(), *port, *dev).await?
        }
        Commands::Ports { command } => cmd::cmd_ports(&project_dir, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
