//! boxrun CLI
//!
//! A command-line tool for running code snippets in disposable sandboxes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use boxrun::config::CONFIG_PATH_ENV;
use boxrun::docker::MANAGED_LABEL;
use boxrun::{
    Config, ContainerRuntime, DockerCli, EXAMPLE_CONFIG, ExecutionResult, Failure, Sandbox,
    SkillCatalog, create_sandbox, discover,
};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status used when the deadline elapsed, as with timeout(1)
const TIMEOUT_EXIT: i32 = 124;

#[derive(Parser)]
#[command(name = "boxrun")]
#[command(about = "Run untrusted code snippets in disposable sandboxes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Sandbox backend (docker, subprocess), overrides configuration
    #[arg(short, long, global = true)]
    backend: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: boxrun.toml)
        #[arg(short, long, default_value = "boxrun.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Execute code in the configured sandbox
    Run {
        /// File containing the code, `-` for stdin
        #[arg(value_name = "FILE", conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Code passed inline
        #[arg(long)]
        code: Option<String>,

        /// Timeout in seconds (default from configuration)
        #[arg(short, long, default_value = "0")]
        timeout: f64,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether the configured backend is available
    Check,

    /// Remove leftover containers created by boxrun
    Prune,

    /// List discovered skills
    Skills {
        /// Skills directory (default from configuration)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Print the aggregated skill documentation
        #[arg(long)]
        docs: bool,
    },

    /// Run a skill tool in the configured sandbox
    Tool {
        /// Tool name
        name: String,

        /// Tool arguments as JSON
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Skills directory (default from configuration)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Timeout in seconds (default from configuration)
        #[arg(short, long, default_value = "0")]
        timeout: f64,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Logs go to stderr so stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Run {
            file,
            code,
            timeout,
            json,
        } => {
            let code = read_code(file.as_deref(), code).await?;
            run_code(&config, &code, timeout, json).await
        }
        Commands::Check => check_backend(&config).await,
        Commands::Prune => prune_containers(&config).await,
        Commands::Skills { dir, docs } => {
            let dir = dir.unwrap_or_else(|| config.skills.dir.clone());
            let catalog = discover(&dir).context("failed to discover skills")?;
            list_skills(&catalog, docs);
            Ok(())
        }
        Commands::Tool {
            name,
            args,
            dir,
            timeout,
            json,
        } => {
            let dir = dir.unwrap_or_else(|| config.skills.dir.clone());
            run_tool(&config, &dir, &name, &args, timeout, json).await
        }
        Commands::ShowConfig => show_config(&config),
    }
}

async fn read_code(file: Option<&Path>, code: Option<String>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code);
    }
    match file {
        Some(path) if path == Path::new("-") => {
            let mut code = String::new();
            tokio::io::stdin()
                .read_to_string(&mut code)
                .await
                .context("failed to read code from stdin")?;
            Ok(code)
        }
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display())),
        None => bail!("no code given: pass a FILE, `-` for stdin, or --code"),
    }
}

async fn run_code(config: &Config, code: &str, timeout: f64, json: bool) -> Result<()> {
    let sandbox = create_sandbox(config).context("failed to create sandbox")?;
    info!(backend = %sandbox.backend(), "executing code");

    let result = sandbox
        .execute(code, timeout)
        .await
        .context("execution failed")?;
    report(&result, json)
}

async fn run_tool(
    config: &Config,
    dir: &Path,
    name: &str,
    args: &str,
    timeout: f64,
    json: bool,
) -> Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(args).context("tool arguments are not valid JSON")?;
    let catalog = discover(dir).context("failed to discover skills")?;
    let sandbox = create_sandbox(config).context("failed to create sandbox")?;

    info!(tool = name, backend = %sandbox.backend(), "running tool");
    let result = catalog
        .invoke(name, &args, sandbox.as_ref(), timeout)
        .await
        .with_context(|| format!("failed to run tool '{name}'"))?;
    report(&result, json)
}

/// Print a result and exit with a status derived from it
fn report(result: &ExecutionResult, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(result).context("failed to encode result")?;
        println!("{text}");
    } else {
        print!("{}", result.stdout());
        if !result.stderr().is_empty() {
            eprint!("{}", result.stderr());
            if !result.stderr().ends_with('\n') {
                eprintln!();
            }
        }
    }

    // Metadata via tracing (stderr), keeping stdout clean for piping
    info!(
        exit_code = result.exit_code(),
        timed_out = result.timed_out_by_watchdog(),
        failure = result.failure().map(|f| f.as_str()),
        "execution result"
    );

    if result.is_success() {
        return Ok(());
    }
    let status = match result.failure() {
        Some(Failure::Timeout) => TIMEOUT_EXIT,
        Some(_) => 1,
        None if (1..=255).contains(&result.exit_code()) => result.exit_code(),
        None => 1,
    };
    std::process::exit(status);
}

async fn check_backend(config: &Config) -> Result<()> {
    let sandbox = create_sandbox(config).context("failed to create sandbox")?;
    match sandbox.probe().await {
        Ok(()) => {
            println!("{}: available", sandbox.backend());
            Ok(())
        }
        Err(unavailable) => {
            println!("{}: {unavailable}", sandbox.backend());
            std::process::exit(1);
        }
    }
}

async fn prune_containers(config: &Config) -> Result<()> {
    let docker = DockerCli::new(config.docker.docker_binary());
    let label = format!("{MANAGED_LABEL}=true");
    let leftovers = docker
        .list(&label)
        .await
        .context("failed to list containers")?;

    let mut removed = 0usize;
    for id in &leftovers {
        match docker.remove(id).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(container = %id, error = %e, "failed to remove container"),
        }
    }

    println!("Removed {removed} of {} container(s)", leftovers.len());
    if removed < leftovers.len() {
        std::process::exit(1);
    }
    Ok(())
}

fn list_skills(catalog: &SkillCatalog, docs: bool) {
    if catalog.is_empty() {
        println!("No skills found");
        return;
    }

    println!("Skills:\n");
    for report in catalog.reports() {
        let status = if report.is_ok() { "ok" } else { "errors" };
        let tools = if report.tools.is_empty() {
            "-".to_string()
        } else {
            report.tools.join(", ")
        };
        let doc = if report.docs_loaded { "yes" } else { "no" };
        println!(
            "  {:<20} {:<7} tools: {}  docs: {}",
            report.name, status, tools, doc
        );
        for error in &report.errors {
            println!("      {error}");
        }
    }

    if catalog.tools().next().is_some() {
        println!("\nTools:\n");
        for tool in catalog.tools() {
            println!("  {:<20} {} ({})", tool.name, tool.description, tool.skill);
        }
    }

    if docs {
        println!("{}", catalog.docs());
    }
}

fn show_config(config: &Config) -> Result<()> {
    let text = serde_json::to_string_pretty(config).context("failed to encode configuration")?;
    println!("{text}");
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
