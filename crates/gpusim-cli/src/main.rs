//! gpusim CLI
//!
//! Command-line interface for running scheduling simulations, multi-seed
//! experiments and parameter sweeps.

mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use gpusim_core::{PolicyKind, SimulationConfig, WorkloadProfile};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

/// gpusim - offline GPU cluster scheduling simulator
#[derive(Parser, Debug)]
#[command(name = "gpusim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate one workload and run it under one or both policies
    Simulate {
        #[command(flatten)]
        sim: SimArgs,

        /// Policy to run
        #[arg(long, value_enum, default_value_t = PolicyChoice::Both)]
        policy: PolicyChoice,

        /// Directory for JSON-lines event logs
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Experiment store directory to record runs in
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Average both policies over several seeds
    Experiment {
        #[command(flatten)]
        sim: SimArgs,

        /// Seeds to average over
        #[arg(long, value_delimiter = ',', default_values_t = [7u64, 11, 19, 23, 31])]
        seeds: Vec<u64>,

        /// Write the summary as CSV
        #[arg(long)]
        out_csv: Option<PathBuf>,
    },

    /// Grid sweep of short_threshold x aging_window for the memory-aware policy
    Sweep {
        #[command(flatten)]
        sim: SimArgs,

        /// Seeds to average over
        #[arg(long, value_delimiter = ',', default_values_t = [7u64, 11, 19, 23, 31])]
        seeds: Vec<u64>,

        /// short_threshold values to sweep
        #[arg(long, value_delimiter = ',', default_values_t = [30.0, 60.0, 90.0, 120.0])]
        short_thresholds: Vec<f64>,

        /// aging_window values to sweep
        #[arg(long, value_delimiter = ',', default_values_t = [60.0, 120.0, 180.0, 240.0, 300.0])]
        aging_windows: Vec<f64>,

        /// Write the table as CSV
        #[arg(long)]
        out_csv: Option<PathBuf>,
    },

    /// Query recorded runs
    Runs {
        /// Experiment store directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Only runs of this policy (memory, fifo)
        #[arg(long)]
        policy: Option<PolicyKind>,

        /// Only runs of this workload (mixed, llm_heavy, vlm_heavy)
        #[arg(long)]
        workload: Option<WorkloadProfile>,

        /// Show per-user and per-GPU details of one run
        #[arg(long)]
        run: Option<Uuid>,
    },
}

/// Simulation parameters; unset values come from the config file or defaults
#[derive(Args, Debug, Default)]
struct SimArgs {
    /// Number of tasks
    #[arg(long)]
    tasks: Option<usize>,

    /// Number of users
    #[arg(long)]
    users: Option<u32>,

    /// Number of GPUs
    #[arg(long)]
    gpus: Option<u32>,

    /// Memory per GPU in GB
    #[arg(long)]
    gpu_mem: Option<f64>,

    /// Workload seed
    #[arg(long)]
    seed: Option<u64>,

    /// Short-task threshold in seconds
    #[arg(long)]
    short_threshold: Option<f64>,

    /// Aging window in seconds
    #[arg(long)]
    aging_window: Option<f64>,

    /// Workload profile (mixed, llm_heavy, vlm_heavy)
    #[arg(long)]
    workload: Option<WorkloadProfile>,
}

impl SimArgs {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(tasks) = self.tasks {
            config.workload.tasks = tasks;
        }
        if let Some(users) = self.users {
            config.workload.users = users;
        }
        if let Some(gpus) = self.gpus {
            config.cluster.gpus = gpus;
        }
        if let Some(gpu_mem) = self.gpu_mem {
            config.cluster.gpu_mem_gb = gpu_mem;
        }
        if let Some(seed) = self.seed {
            config.workload.seed = seed;
        }
        if let Some(short_threshold) = self.short_threshold {
            config.scheduler.short_threshold = short_threshold;
        }
        if let Some(aging_window) = self.aging_window {
            config.scheduler.aging_window = aging_window;
        }
        if let Some(workload) = self.workload {
            config.workload.profile = workload;
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PolicyChoice {
    Memory,
    Fifo,
    Both,
}

impl PolicyChoice {
    fn policies(self) -> Vec<PolicyKind> {
        match self {
            PolicyChoice::Memory => vec![PolicyKind::Memory],
            PolicyChoice::Fifo => vec![PolicyKind::Fifo],
            PolicyChoice::Both => PolicyKind::ALL.to_vec(),
        }
    }
}

/// Default task count for multi-seed commands when no config file is given
const BATCH_TASKS: usize = 200;

fn load_config(path: Option<&PathBuf>, batch: bool) -> anyhow::Result<SimulationConfig> {
    match path {
        Some(path) => Ok(SimulationConfig::from_file(path)?),
        None => {
            let mut config = SimulationConfig::default();
            if batch {
                config.workload.tasks = BATCH_TASKS;
            }
            Ok(config)
        }
    }
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let batch = matches!(
        cli.command,
        Commands::Experiment { .. } | Commands::Sweep { .. }
    );
    let mut config = load_config(cli.config.as_ref(), batch)?;

    // Initialize logging
    init_logging(&config.logging.level, cli.verbose);

    match cli.command {
        Commands::Simulate {
            sim,
            policy,
            log_dir,
            store,
        } => {
            sim.apply(&mut config);
            if log_dir.is_some() {
                config.output.log_dir = log_dir;
            }
            if store.is_some() {
                config.output.store_path = store;
            }
            config.validate()?;
            commands::simulate(&config, &policy.policies()).await?;
        }
        Commands::Experiment {
            sim,
            seeds,
            out_csv,
        } => {
            sim.apply(&mut config);
            config.validate()?;
            commands::experiment(&config, &seeds, out_csv.as_deref())?;
        }
        Commands::Sweep {
            sim,
            seeds,
            short_thresholds,
            aging_windows,
            out_csv,
        } => {
            sim.apply(&mut config);
            config.validate()?;
            commands::sweep(
                &config,
                &seeds,
                &short_thresholds,
                &aging_windows,
                out_csv.as_deref(),
            )?;
        }
        Commands::Runs {
            store,
            policy,
            workload,
            run,
        } => {
            let store = store
                .or(config.output.store_path.clone())
                .ok_or_else(|| anyhow::anyhow!("no store given (use --store or [output] store_path)"))?;
            commands::runs(&store, policy, workload, run).await?;
        }
    }

    Ok(())
}
