mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SANDBOX_UNAVAILABLE};
use mirrors_core::{install_signal_handler, CancelToken, Engine, SyncOptions, TargetFilter};
use mirrors_schema::{default_config_path, Granularity, MirrorConfig};
use mirrors_store::VerifyMode;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "linux-mirrors",
    version,
    about = "Containerized sync orchestrator and integrity verifier for APT and YUM mirrors"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Structural,
    Cryptographic,
}

impl From<ModeArg> for VerifyMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Structural => Self::Structural,
            ModeArg::Cryptographic => Self::Cryptographic,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync mirrors inside sandboxed containers.
    Sync {
        /// Sync every configured distribution.
        #[arg(long, default_value_t = false, conflicts_with = "distribution")]
        all: bool,
        /// Sync a single distribution.
        #[arg(long)]
        distribution: Option<String>,
        /// Restrict the sync to one version of the distribution.
        #[arg(long, requires = "distribution")]
        version: Option<String>,
        /// Maximum number of concurrently running sync jobs.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Per-job timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Sandbox backend (podman, docker or mock).
        #[arg(long)]
        backend: Option<String>,
        /// Run one job per architecture instead of one per version.
        #[arg(long, default_value_t = false)]
        per_arch: bool,
    },
    /// Verify the integrity of synced mirror trees.
    Verify {
        /// Verification depth.
        #[arg(long, value_enum, default_value = "structural")]
        mode: ModeArg,
        /// Verify a single distribution.
        #[arg(long)]
        distribution: Option<String>,
        /// Restrict verification to one version of the distribution.
        #[arg(long, requires = "distribution")]
        version: Option<String>,
        /// Report one result per architecture.
        #[arg(long, default_value_t = false)]
        per_arch: bool,
        /// Accept repository metadata that carries no signature.
        #[arg(long, default_value_t = false)]
        allow_unsigned: bool,
    },
    /// List the targets the configuration expands to.
    Targets {
        /// Restrict the listing to one distribution.
        #[arg(long)]
        distribution: Option<String>,
        /// Split targets per architecture.
        #[arg(long, default_value_t = false)]
        per_arch: bool,
    },
    /// Print the configuration and command a sync would run, without running it.
    Plan {
        /// Distribution name.
        distribution: String,
        /// Distribution version.
        version: String,
        /// Plan for a single architecture.
        #[arg(long)]
        arch: Option<String>,
    },
    /// Show the latest persisted verification report.
    Report,
    /// Run diagnostic checks on the host and configuration.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn granularity(per_arch: bool) -> Granularity {
    if per_arch {
        Granularity::Architecture
    } else {
        Granularity::Version
    }
}

fn load_engine(path: &Path) -> Result<Engine, String> {
    debug!("loading configuration from {}", path.display());
    let config = MirrorConfig::load_or_default(path)
        .map_err(|e| format!("configuration error: {}: {e}", path.display()))?;
    Ok(Engine::new(config))
}

#[allow(clippy::too_many_lines)]
fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LINUX_MIRRORS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let cancel = CancelToken::new();
    install_signal_handler(&cancel);

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Sync {
            all,
            distribution,
            version,
            concurrency,
            timeout,
            backend,
            per_arch,
        } => load_engine(&config_path).and_then(|engine| {
            if !all && distribution.is_none() {
                return Err("specify --all or --distribution".to_owned());
            }
            let filter = TargetFilter {
                distribution,
                version,
                granularity: granularity(per_arch),
            };
            let options = SyncOptions {
                concurrency,
                job_timeout: timeout.map(Duration::from_secs),
                backend,
                tick: None,
            };
            commands::sync::run(&engine, &filter, &options, &cancel, json_output)
        }),
        Commands::Verify {
            mode,
            distribution,
            version,
            per_arch,
            allow_unsigned,
        } => load_engine(&config_path).and_then(|engine| {
            let filter = TargetFilter {
                distribution,
                version,
                granularity: granularity(per_arch),
            };
            commands::verify::run(&engine, &filter, mode.into(), !allow_unsigned, json_output)
        }),
        Commands::Targets {
            distribution,
            per_arch,
        } => load_engine(&config_path).and_then(|engine| {
            let filter = TargetFilter {
                distribution,
                version: None,
                granularity: granularity(per_arch),
            };
            commands::targets::run(&engine, &filter, json_output)
        }),
        Commands::Plan {
            distribution,
            version,
            arch,
        } => load_engine(&config_path).and_then(|engine| {
            commands::plan::run(&engine, &distribution, &version, arch.as_deref(), json_output)
        }),
        Commands::Report => {
            load_engine(&config_path).and_then(|engine| commands::report::run(&engine, json_output))
        }
        Commands::Doctor => commands::doctor::run(&config_path, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("configuration error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("sandbox backend unavailable:") {
                EXIT_SANDBOX_UNAVAILABLE
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
